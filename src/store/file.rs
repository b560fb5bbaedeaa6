//! JSON file backed control store.

use super::{ControlStateStore, check_revision};
use crate::error::StoreError;
use crate::model::ControlState;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;

/// Persists the control document as a single JSON file.
///
/// Writes go to a temporary sibling file that is renamed over the target, so
/// readers never observe a partially written document. Writers are serialized
/// through `write_lock`, which makes the revision check and the rename atomic
/// for this process.
pub struct FileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Fixed sibling used for staging writes. Writers hold `write_lock`, so a
    /// leftover from an interrupted write is simply overwritten by the next.
    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    async fn read_document(&self) -> Result<Option<ControlState>, StoreError> {
        match fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_document(&self, state: &ControlState) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).await?;
        }

        let data = serde_json::to_vec_pretty(state)?;
        let tmp = self.temp_path();
        fs::write(&tmp, data).await?;
        if let Err(e) = fs::rename(&tmp, &self.path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }
}

#[async_trait]
impl ControlStateStore for FileStore {
    async fn load(&self, now: DateTime<Utc>) -> Result<ControlState, StoreError> {
        if let Some(state) = self.read_document().await? {
            return Ok(state);
        }

        let _guard = self.write_lock.lock().await;
        // Another writer may have created it while we waited
        if let Some(state) = self.read_document().await? {
            return Ok(state);
        }
        let state = ControlState::new(now);
        self.write_document(&state).await?;
        info!("[Store] Created control document at {:?}", self.path);
        Ok(state)
    }

    async fn load_existing(&self) -> Result<Option<ControlState>, StoreError> {
        self.read_document().await
    }

    async fn save(&self, state: &ControlState, expected_revision: u64) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let current = self.read_document().await?;
        check_revision(current.as_ref(), expected_revision)?;
        self.write_document(state).await?;
        debug!(
            "[Store] Saved control document revision {} to {:?}",
            state.revision, self.path
        );
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.read_document().await.map(|_| ())
    }
}
