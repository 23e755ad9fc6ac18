// Startup configuration, read once and never written back

use crate::controller::DEFAULT_REPOLL_DELAY;
use crate::scheduler::DEFAULT_POLL_INTERVAL;
use crate::ui::ThemeMode;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_DIR: &str = "portwatch";
const CONFIG_FILE: &str = "config.json";

/// Configuration file structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Milliseconds between automatic polls
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Delay before the re-poll that follows a termination
    #[serde(default = "default_repoll_delay_ms")]
    pub repoll_delay_ms: u64,

    /// Connection enumerator to use instead of the detected best one
    #[serde(default)]
    pub preferred_enumerator: Option<String>,

    #[serde(default)]
    pub theme: ThemeMode,

    /// Initial port filter
    #[serde(default)]
    pub port_filter: Option<String>,

    /// Initial process-name filter
    #[serde(default)]
    pub process_filter: Option<String>,

    /// Open files listed in the detail view before truncating
    #[serde(default = "default_max_open_files_shown")]
    pub max_open_files_shown: usize,
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL.as_millis() as u64
}

fn default_repoll_delay_ms() -> u64 {
    DEFAULT_REPOLL_DELAY.as_millis() as u64
}

fn default_max_open_files_shown() -> usize {
    20
}

impl Default for Config {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            repoll_delay_ms: default_repoll_delay_ms(),
            preferred_enumerator: None,
            theme: ThemeMode::default(),
            port_filter: None,
            process_filter: None,
            max_open_files_shown: default_max_open_files_shown(),
        }
    }
}

impl Config {
    /// Default config file location
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    /// Load from an explicit path, or the default location
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::load_from(path),
            None => match Self::config_path() {
                Some(path) => Self::load_from(&path),
                None => {
                    log::debug!("No config directory on this platform, using defaults");
                    Ok(Config::default())
                }
            },
        }
    }

    /// Load configuration from disk. A missing file means defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("Config file {:?} not found, using defaults", path);
            return Ok(Config::default());
        }

        let contents =
            fs::read_to_string(path).context(format!("Failed to read config file: {:?}", path))?;

        let config = Self::parse(&contents)
            .context(format!("Failed to parse config file: {:?}", path))?;

        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(contents)?;
        if config.poll_interval_ms == 0 {
            anyhow::bail!("poll_interval_ms must be greater than zero");
        }
        Ok(config)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn repoll_delay(&self) -> Duration {
        Duration::from_millis(self.repoll_delay_ms)
    }
}
