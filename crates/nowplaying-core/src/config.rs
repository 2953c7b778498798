use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::NowPlayingError;

const DEFAULT_CONFIG: &str = include_str!("../../../config/default.toml");

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub aggregator: AggregatorConfig,
    pub hub: HubConfig,
    pub adapters: AdaptersConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    /// Candidates not refreshed within this window are dropped from selection.
    pub freshness_window_ms: u64,
    /// Period of the expiry sweep. Half the freshness window when unset.
    pub sweep_interval_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Per-subscriber queue depth; older undelivered snapshots are dropped.
    pub queue_capacity: usize,
    /// Depth of the aggregator to hub broadcast channel.
    pub broadcast_capacity: usize,
    /// Idle time before a push connection is pinged.
    pub ping_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptersConfig {
    pub poll_interval_ms: u64,
    /// Shell-based adapters pay a subprocess per poll, so they run slower.
    pub dumpsys_poll_interval_ms: u64,
    /// `all`, `no-browser` or `apps-only`.
    pub filter: String,
    /// Adapter names to run. Empty means every adapter available on this platform.
    pub enabled: Vec<String>,
    /// Run a notification feed and accept records on `POST /notifications`.
    pub accept_notifications: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8765,
        }
    }
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            freshness_window_ms: 10_000,
            sweep_interval_ms: None,
        }
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1,
            broadcast_capacity: 16,
            ping_interval_secs: 30,
        }
    }
}

impl Default for AdaptersConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            dumpsys_poll_interval_ms: 2000,
            filter: "all".into(),
            enabled: Vec::new(),
            accept_notifications: false,
        }
    }
}

impl AggregatorConfig {
    pub fn freshness_window(&self) -> Duration {
        Duration::from_millis(self.freshness_window_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        match self.sweep_interval_ms {
            Some(ms) if ms > 0 => Duration::from_millis(ms),
            _ => self.freshness_window() / 2,
        }
    }
}

impl HubConfig {
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }
}

impl AdaptersConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn dumpsys_poll_interval(&self) -> Duration {
        Duration::from_millis(self.dumpsys_poll_interval_ms)
    }

    /// Whether the named adapter should run.
    pub fn is_enabled(&self, name: &str) -> bool {
        self.enabled.is_empty() || self.enabled.iter().any(|n| n.eq_ignore_ascii_case(name))
    }
}

impl AppConfig {
    /// Load config: user file (if exists) merged over built-in defaults.
    pub fn load() -> Result<Self, NowPlayingError> {
        let user_path = Self::config_path();
        if user_path.exists() {
            Self::load_from(&user_path)
        } else {
            Self::embedded()
        }
    }

    /// The built-in defaults shipped in `config/default.toml`.
    pub fn embedded() -> Result<Self, NowPlayingError> {
        Self::from_toml(DEFAULT_CONFIG)
    }

    /// Load config from an explicit file. Missing keys fall back to defaults.
    pub fn load_from(path: &Path) -> Result<Self, NowPlayingError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| NowPlayingError::Config(e.to_string()))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, NowPlayingError> {
        let config: AppConfig =
            toml::from_str(content).map_err(|e| NowPlayingError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the aggregator cannot honor.
    pub fn validate(&self) -> Result<(), NowPlayingError> {
        if self.aggregator.freshness_window_ms == 0 {
            return Err(NowPlayingError::Config(
                "aggregator.freshness_window_ms must be greater than zero".into(),
            ));
        }
        if self.hub.queue_capacity == 0 {
            return Err(NowPlayingError::Config(
                "hub.queue_capacity must be greater than zero".into(),
            ));
        }
        if self.hub.broadcast_capacity == 0 {
            return Err(NowPlayingError::Config(
                "hub.broadcast_capacity must be greater than zero".into(),
            ));
        }
        if self.hub.ping_interval_secs == 0 {
            return Err(NowPlayingError::Config(
                "hub.ping_interval_secs must be greater than zero".into(),
            ));
        }
        // Adapters keep their candidates alive by re-emitting; a slower
        // poll than the window would make every source flap.
        let window = self.aggregator.freshness_window_ms;
        for (key, interval) in [
            ("adapters.poll_interval_ms", self.adapters.poll_interval_ms),
            (
                "adapters.dumpsys_poll_interval_ms",
                self.adapters.dumpsys_poll_interval_ms,
            ),
        ] {
            if interval == 0 || interval >= window {
                return Err(NowPlayingError::Config(format!(
                    "{key} must be between 1 and {} (the freshness window)",
                    window - 1
                )));
            }
        }
        Ok(())
    }

    /// Path to user config file (XDG on Linux, AppData on Windows).
    pub fn config_path() -> PathBuf {
        Self::project_dirs()
            .map(|d| d.config_dir().join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("config.toml"))
    }

    /// Path to the user source database override.
    pub fn sources_path() -> PathBuf {
        Self::project_dirs()
            .map(|d| d.config_dir().join("sources.toml"))
            .unwrap_or_else(|| PathBuf::from("sources.toml"))
    }

    fn project_dirs() -> Option<ProjectDirs> {
        ProjectDirs::from("", "", "nowplaying")
    }
}
