use crate::download::Platform;
use crate::error::StoreError;
use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const CONFIG_ENV: &str = "APK_STORE_CONFIG";
const APP_DIR: &str = "apk-store";

/// Settings read from `config.json`. Every field has a default so partial
/// files (or none at all) still load.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Emulator or proxy endpoint; the public Firestore host when unset.
    #[serde(default)]
    pub firestore_endpoint: Option<String>,
    #[serde(default)]
    pub storage_bucket: Option<String>,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,
    /// Overrides the compile-time platform detection.
    #[serde(default)]
    pub platform: Option<Platform>,
    #[serde(default)]
    pub external_storage_dir: Option<PathBuf>,
    #[serde(default = "default_download_path")]
    pub download_path: PathBuf,
    #[serde(default = "default_session_ttl")]
    pub session_ttl_hours: u64,
    #[serde(default)]
    pub session_file: Option<PathBuf>,
}

fn default_database() -> String {
    "(default)".to_string()
}

fn default_poll_interval() -> u64 {
    5
}

fn default_http_timeout() -> u64 {
    30
}

fn default_download_path() -> PathBuf {
    PathBuf::from("Download/app.apk")
}

fn default_session_ttl() -> u64 {
    12
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            project_id: None,
            database: default_database(),
            api_key: None,
            firestore_endpoint: None,
            storage_bucket: None,
            poll_interval_secs: default_poll_interval(),
            http_timeout_secs: default_http_timeout(),
            platform: None,
            external_storage_dir: None,
            download_path: default_download_path(),
            session_ttl_hours: default_session_ttl(),
            session_file: None,
        }
    }
}

impl AppConfig {
    /// `$APK_STORE_CONFIG`, else `{config_dir}/apk-store/config.json`.
    pub fn default_path() -> PathBuf {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return PathBuf::from(path);
        }
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join("config.json")
    }

    pub fn load() -> Result<Self, StoreError> {
        Self::load_from(&Self::default_path())
    }

    /// A missing file yields the defaults; an unreadable or malformed one is an error.
    pub fn load_from(path: &std::path::Path) -> Result<Self, StoreError> {
        if !path.exists() {
            log::debug!("No config at {:?}, using defaults", path);
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| StoreError::Config(format!("{}: {}", path.display(), e)))?;
        serde_json::from_str(&content)
            .map_err(|e| StoreError::Config(format!("{}: {}", path.display(), e)))
    }

    /// `session_ttl_hours` as a duration; zero or out-of-range values are rejected.
    pub fn session_ttl(&self) -> Result<TimeDelta, StoreError> {
        i64::try_from(self.session_ttl_hours)
            .ok()
            .filter(|hours| *hours > 0)
            .and_then(TimeDelta::try_hours)
            .ok_or_else(|| {
                StoreError::Config(format!(
                    "session_ttl_hours out of range: {}",
                    self.session_ttl_hours
                ))
            })
    }

    pub fn platform(&self) -> Platform {
        self.platform.unwrap_or_else(Platform::detect)
    }

    /// Root that `download_path` is resolved against.
    pub fn external_storage_root(&self) -> PathBuf {
        if let Some(dir) = &self.external_storage_dir {
            return dir.clone();
        }
        if self.platform() == Platform::Android {
            return PathBuf::from("/storage/emulated/0");
        }
        dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn session_file(&self) -> PathBuf {
        self.session_file.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(APP_DIR)
                .join("session.json")
        })
    }
}
