use std::path::PathBuf;

use tracing::warn;

pub const DEFAULT_BASE_URL: &str = "https://api.geode-sdk.org";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const APP_USER_AGENT: &str = concat!("geode-index/", env!("CARGO_PKG_VERSION"));

const APP_DIR_NAME: &str = "geode-index";

/// Client configuration. Environment variables override the defaults when
/// loaded through [`IndexConfig::from_env`].
#[derive(Debug, Clone)]
pub struct IndexConfig {
    /// Index API root, without the `/v1` prefix.
    pub base_url: String,
    pub user_agent: String,
    pub timeout_secs: u64,
    /// Where the session store keeps its file.
    pub data_dir: PathBuf,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            user_agent: APP_USER_AGENT.into(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            data_dir: default_data_dir(),
        }
    }
}

impl IndexConfig {
    /// Defaults overridden by `GEODE_INDEX_URL`, `GEODE_INDEX_TIMEOUT` and
    /// `GEODE_INDEX_DATA_DIR`.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("GEODE_INDEX_URL") {
            if !url.trim().is_empty() {
                config.base_url = url.trim().to_string();
            }
        }

        if let Ok(raw) = std::env::var("GEODE_INDEX_TIMEOUT") {
            match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => config.timeout_secs = secs,
                _ => warn!("Ignoring invalid GEODE_INDEX_TIMEOUT value {:?}", raw),
            }
        }

        if let Ok(dir) = std::env::var("GEODE_INDEX_DATA_DIR") {
            if !dir.trim().is_empty() {
                config.data_dir = PathBuf::from(dir);
            }
        }

        config
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}
