//! Single-writer lock for a control document, using a Unix socket.
//!
//! Two service processes pointed at the same store path would both run a
//! safety sweeper and race each other's writes. The lock socket is named
//! after the store path and is released by the OS when the process dies,
//! so no stale lock files remain.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::io;
use std::os::unix::net::UnixListener;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Error types for instance lock operations.
#[derive(Debug, Error)]
pub enum InstanceLockError {
    /// Another instance already manages this control document.
    #[error("another instance already manages {0:?}")]
    AlreadyRunning(PathBuf),

    /// I/O error during lock acquisition.
    #[error("failed to acquire instance lock: {0}")]
    Io(#[from] io::Error),
}

/// Held for as long as the service owns the control document.
pub struct InstanceLock {
    _listener: UnixListener,
    path: PathBuf,
}

impl InstanceLock {
    /// Acquire the lock for `store_path` in the runtime directory.
    pub fn acquire(store_path: &Path) -> Result<Self, InstanceLockError> {
        Self::acquire_in(&runtime_dir(), store_path)
    }

    pub fn acquire_in(dir: &Path, store_path: &Path) -> Result<Self, InstanceLockError> {
        let path = socket_path_in(dir, store_path);

        // A socket left behind by a SIGKILL'd process refuses connections
        if path.exists() {
            match std::os::unix::net::UnixStream::connect(&path) {
                Ok(_) => return Err(InstanceLockError::AlreadyRunning(store_path.to_path_buf())),
                Err(_) => {
                    let _ = std::fs::remove_file(&path);
                }
            }
        }

        match UnixListener::bind(&path) {
            Ok(listener) => Ok(Self {
                _listener: listener,
                path,
            }),
            Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
                Err(InstanceLockError::AlreadyRunning(store_path.to_path_buf()))
            }
            Err(e) => Err(InstanceLockError::Io(e)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// XDG_RUNTIME_DIR if set (auto-cleaned on logout), else /tmp.
fn runtime_dir() -> PathBuf {
    std::env::var("XDG_RUNTIME_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

fn socket_path_in(dir: &Path, store_path: &Path) -> PathBuf {
    let mut hasher = DefaultHasher::new();
    store_path.hash(&mut hasher);
    dir.join(format!("enclosure-control-{:016x}.sock", hasher.finish()))
}
