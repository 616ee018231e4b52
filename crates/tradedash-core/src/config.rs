//! Dashboard configuration.
//!
//! Loaded from `~/.tradedash/config.yaml`. A missing file is not an error:
//! defaults are used and a debug line is logged.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{DashError, Result};
use crate::types::ThemeId;

/// Top-level dashboard configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    /// Backend base URL (e.g. `http://127.0.0.1:8000`)
    pub base_url: String,

    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,

    /// Scheduler status polling
    pub poller: PollerConfig,

    /// Initial theme
    pub theme: ThemeId,

    /// Dashboard region id -> endpoint path overrides
    pub regions: BTreeMap<String, String>,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            request_timeout_secs: 30,
            poller: PollerConfig::default(),
            theme: ThemeId::default(),
            regions: BTreeMap::new(),
        }
    }
}

/// Adaptive poller delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollerConfig {
    /// Delay after a success and after the first failure of a streak
    pub base_delay_ms: u64,

    /// Delay after every further failure
    pub max_delay_ms: u64,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 5_000,
            max_delay_ms: 10_000,
        }
    }
}

impl PollerConfig {
    /// Base delay (`D0`).
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    /// Capped delay (`Dmax`).
    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

impl DashboardConfig {
    /// Default config location (`~/.tradedash/config.yaml`).
    pub fn default_path() -> Result<PathBuf> {
        Ok(crate::logging::home_dir()?.join("config.yaml"))
    }

    /// Load from the default location, falling back to defaults.
    pub fn load_default() -> Result<Self> {
        Self::load_or_default(&Self::default_path()?)
    }

    /// Load from `path`, falling back to defaults when the file does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// Load and validate a config file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| DashError::io("reading config", path, e))?;
        let config: Self =
            serde_yaml::from_str(&contents).map_err(|e| DashError::ConfigInvalid {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        config.validate()?;
        debug!(path = %path.display(), base_url = %config.base_url, "config loaded");
        Ok(config)
    }

    /// Check value consistency.
    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(DashError::ConfigValidation {
                message: "base_url must not be empty".into(),
            });
        }
        if self.poller.base_delay_ms == 0 {
            return Err(DashError::ConfigValidation {
                message: "poller.base_delay_ms must be positive".into(),
            });
        }
        if self.poller.max_delay_ms < self.poller.base_delay_ms {
            return Err(DashError::ConfigValidation {
                message: format!(
                    "poller.max_delay_ms ({}) is below poller.base_delay_ms ({})",
                    self.poller.max_delay_ms, self.poller.base_delay_ms
                ),
            });
        }
        Ok(())
    }

    /// Override the backend URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Override the poller delays.
    pub fn with_poller(mut self, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        self.poller = PollerConfig {
            base_delay_ms,
            max_delay_ms,
        };
        self
    }

    /// Endpoint path for a region, or `default` when not overridden.
    pub fn region_path<'a>(&'a self, region_id: &str, default: &'a str) -> &'a str {
        self.regions
            .get(region_id)
            .map(String::as_str)
            .unwrap_or(default)
    }
}
