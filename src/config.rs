//! Engine configuration.
//!
//! Configuration is plain data with defaults for every field. With the
//! `config-file` feature it can be loaded from TOML with the following
//! resolution order:
//! 1. Explicit path (e.g. `--config <path>`)
//! 2. `~/.spillway/config.toml` (user)
//! 3. `/etc/spillway/config.toml` (system)
//!
//! Missing files in the default locations are not an error; the defaults
//! apply. An explicit path that does not exist is.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::pump::{DEFAULT_CONCURRENCY, PumpOptions};
use crate::store::DEFAULT_PAGE_SIZE;
use crate::stream::DEFAULT_MAX_BUFFER;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub pump: PumpConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

/// Pump settings.
#[derive(Debug, Clone, Deserialize)]
pub struct PumpConfig {
    /// Units of work in flight (default: 10).
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Poll delay while paused or idle, in milliseconds (default: 1000).
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Per store call deadline in milliseconds (default: none).
    #[serde(default)]
    pub call_timeout_ms: Option<u64>,
}

impl Default for PumpConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            poll_interval_ms: default_poll_interval_ms(),
            call_timeout_ms: None,
        }
    }
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

fn default_poll_interval_ms() -> u64 {
    1000
}

/// Output stream settings.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
    /// Buffered items before an output stream pauses (default: 50000).
    #[serde(default = "default_max_buffer")]
    pub max_buffer: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            max_buffer: default_max_buffer(),
        }
    }
}

fn default_max_buffer() -> usize {
    DEFAULT_MAX_BUFFER
}

/// Bundled store settings.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Root directory for the filesystem store.
    #[serde(default)]
    pub root: Option<PathBuf>,
    /// Entries per listing page (default: 5000).
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: None,
            page_size: default_page_size(),
        }
    }
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

impl EngineConfig {
    /// Pump options described by this configuration.
    pub fn pump_options(&self) -> PumpOptions {
        PumpOptions {
            concurrency: self.pump.concurrency,
            poll_interval: Duration::from_millis(self.pump.poll_interval_ms),
            call_timeout: self.pump.call_timeout_ms.map(Duration::from_millis),
        }
    }
}

#[cfg(feature = "config-file")]
mod file {
    use std::fs;
    use std::path::{Path, PathBuf};

    use super::EngineConfig;
    use crate::{Result, SpillwayError};

    impl EngineConfig {
        /// Parse configuration from TOML text.
        pub fn from_toml_str(content: &str) -> Result<Self> {
            toml::from_str(content).map_err(|e| {
                SpillwayError::Configuration(format!("Failed to parse config: {e}"))
            })
        }

        /// Load configuration from the standard locations.
        pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
            let Some(path) = Self::resolve_config_path(explicit_path)? else {
                return Ok(Self::default());
            };
            let content = fs::read_to_string(&path).map_err(|e| {
                SpillwayError::Configuration(format!("Failed to read config file {path:?}: {e}"))
            })?;
            toml::from_str(&content).map_err(|e| {
                SpillwayError::Configuration(format!("Failed to parse config file {path:?}: {e}"))
            })
        }

        fn resolve_config_path(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
            if let Some(path) = explicit {
                if path.exists() {
                    return Ok(Some(path.to_path_buf()));
                }
                return Err(SpillwayError::Configuration(format!(
                    "Config file not found: {path:?}"
                )));
            }

            // User config
            if let Some(home) = dirs::home_dir() {
                let user_config = home.join(".spillway").join("config.toml");
                if user_config.exists() {
                    return Ok(Some(user_config));
                }
            }

            // System config
            let system_config = PathBuf::from("/etc/spillway/config.toml");
            if system_config.exists() {
                return Ok(Some(system_config));
            }

            Ok(None)
        }
    }
}
