use crate::command::{MAX_TIMER_SECS, TimerLimits};
use log::warn;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Load environment variables from .env file with robust parsing.
/// Handles values with spaces without requiring quotes.
pub fn load_dotenv() {
    load_dotenv_from(Path::new(".env"));
}

fn load_dotenv_from(env_path: &Path) {
    let content = match fs::read_to_string(env_path) {
        Ok(c) => c,
        Err(_) => return,
    };

    for (key, value) in parse_dotenv(&content) {
        // Only set if not already set (env vars take precedence)
        if std::env::var(key).is_err() {
            // SAFETY: called at startup before the async runtime spawns threads
            unsafe { std::env::set_var(key, value) };
        }
    }
}

fn parse_dotenv(content: &str) -> Vec<(&str, &str)> {
    let mut pairs = Vec::new();
    for line in content.lines() {
        let line = line.trim();

        // Skip empty lines and comments
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some(eq_pos) = line.find('=') {
            let key = line[..eq_pos].trim();
            let mut value = line[eq_pos + 1..].trim();

            if value.len() >= 2
                && ((value.starts_with('"') && value.ends_with('"'))
                    || (value.starts_with('\'') && value.ends_with('\'')))
            {
                value = &value[1..value.len() - 1];
            }
            pairs.push((key, value));
        }
    }
    pairs
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub store: StoreConfig,
    pub control: ControlConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub path: PathBuf,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlConfig {
    pub cache_ttl_secs: u64,
    pub sweep_interval_secs: u64,
    pub washer_default_secs: u64,
    pub washer_max_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind_addr: String,
}

/// Default control document location under the platform data directory.
pub fn default_store_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("enclosure-control")
        .join("control.json")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store: StoreConfig {
                path: default_store_path(),
                timeout_ms: 2000,
            },
            control: ControlConfig {
                cache_ttl_secs: 5,
                sweep_interval_secs: 10,
                washer_default_secs: 300,
                washer_max_secs: 3600,
            },
            server: ServerConfig {
                bind_addr: "0.0.0.0:8765".to_string(),
            },
        }
    }
}

impl ControlConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    pub fn timer_limits(&self) -> TimerLimits {
        TimerLimits {
            default_secs: self.washer_default_secs,
            max_secs: self.washer_max_secs,
        }
    }
}

impl StoreConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn parse_var<T: FromStr>(name: &str, value: &str) -> Option<T> {
    match value.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!("Ignoring unparseable {}={:?}, using default", name, value);
            None
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(path) = lookup("CONTROL_STORE_PATH") {
            config.store.path = PathBuf::from(path);
        }
        if let Some(v) = lookup("CONTROL_STORE_TIMEOUT_MS")
            && let Some(ms) = parse_var("CONTROL_STORE_TIMEOUT_MS", &v)
        {
            config.store.timeout_ms = ms;
        }
        if let Some(v) = lookup("CONTROL_CACHE_TTL_SECS")
            && let Some(secs) = parse_var("CONTROL_CACHE_TTL_SECS", &v)
        {
            config.control.cache_ttl_secs = secs;
        }
        if let Some(v) = lookup("CONTROL_SWEEP_INTERVAL_SECS")
            && let Some(secs) = parse_var("CONTROL_SWEEP_INTERVAL_SECS", &v)
        {
            config.control.sweep_interval_secs = secs;
        }
        if let Some(v) = lookup("CONTROL_WASHER_DEFAULT_SECS")
            && let Some(secs) = parse_var("CONTROL_WASHER_DEFAULT_SECS", &v)
        {
            config.control.washer_default_secs = secs;
        }
        if let Some(v) = lookup("CONTROL_WASHER_MAX_SECS")
            && let Some(secs) = parse_var("CONTROL_WASHER_MAX_SECS", &v)
        {
            config.control.washer_max_secs = secs;
        }
        if let Some(addr) = lookup("CONTROL_BIND_ADDR") {
            config.server.bind_addr = addr;
        }

        if config.control.washer_max_secs > MAX_TIMER_SECS {
            warn!(
                "CONTROL_WASHER_MAX_SECS={} exceeds {}s, clamping",
                config.control.washer_max_secs, MAX_TIMER_SECS
            );
            config.control.washer_max_secs = MAX_TIMER_SECS;
        }
        if !config.control.timer_limits().is_valid() {
            let defaults = TimerLimits::default();
            warn!(
                "Washer timer default {}s must lie within 1..={}s, using {}s/{}s",
                config.control.washer_default_secs,
                config.control.washer_max_secs,
                defaults.default_secs,
                defaults.max_secs
            );
            config.control.washer_default_secs = defaults.default_secs;
            config.control.washer_max_secs = defaults.max_secs;
        }

        config
    }
}
