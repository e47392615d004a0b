//! # Node Settings
//!
//! Read from a TOML file. Every section is optional; a missing file or an
//! empty one gives a mainnet node on the system clock.
//!
//! ```toml
//! rpc_port = 9841
//! metrics_port = 9842
//! log_format = "json"
//!
//! [clock]
//! mode = "manual"
//! start = 1596952800
//!
//! [genesis]
//! cooks = ["0xabc..."]
//!
//! [[genesis.allocations]]
//! account = "0xabc..."
//! amount = "20000000000000000000"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

use taconomics_contracts::host::GenesisConfig;
use taconomics_protocol::clock::{Clock, ManualClock, SystemClock};
use taconomics_protocol::types::Timestamp;

use crate::logging::LogFormat;

/// File name `init` writes and `run` looks for inside the data directory.
pub const SETTINGS_FILE: &str = "taco.toml";

pub const DEFAULT_RPC_PORT: u16 = 9841;
pub const DEFAULT_METRICS_PORT: u16 = 9842;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSettings {
    #[serde(default = "default_rpc_port")]
    pub rpc_port: u16,
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
    #[serde(default)]
    pub log_format: LogFormat,
    #[serde(default)]
    pub clock: ClockSettings,
    #[serde(default)]
    pub genesis: GenesisConfig,
}

fn default_rpc_port() -> u16 {
    DEFAULT_RPC_PORT
}

fn default_metrics_port() -> u16 {
    DEFAULT_METRICS_PORT
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            rpc_port: DEFAULT_RPC_PORT,
            metrics_port: DEFAULT_METRICS_PORT,
            log_format: LogFormat::default(),
            clock: ClockSettings::default(),
            genesis: GenesisConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClockMode {
    #[default]
    System,
    /// Frozen until moved with `dev_increaseTime`.
    Manual,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockSettings {
    #[serde(default)]
    pub mode: ClockMode,
    /// Start time of a manual clock. Defaults to the wall clock.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<Timestamp>,
}

/// The clock a node runs on. A manual clock is kept separately so the API
/// can move it.
pub struct NodeClock {
    pub clock: Arc<dyn Clock>,
    pub manual: Option<Arc<ManualClock>>,
}

impl ClockSettings {
    /// Builds the clock. A manual clock never starts before `not_before`,
    /// the time of the last journaled call.
    pub fn build(&self, not_before: Timestamp) -> NodeClock {
        match self.mode {
            ClockMode::System => NodeClock {
                clock: Arc::new(SystemClock),
                manual: None,
            },
            ClockMode::Manual => {
                let start = self
                    .start
                    .unwrap_or_else(|| SystemClock.now())
                    .max(not_before);
                let manual = Arc::new(ManualClock::new(start));
                NodeClock {
                    clock: manual.clone(),
                    manual: Some(manual),
                }
            }
        }
    }
}

impl NodeSettings {
    /// Parses settings from TOML text.
    pub fn from_toml(text: &str) -> Result<Self> {
        let settings: NodeSettings = toml::from_str(text).context("invalid settings")?;
        settings
            .genesis
            .validate()
            .context("invalid genesis section")?;
        Ok(settings)
    }

    /// Reads and parses a settings file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read settings from {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("in {}", path.display()))
    }

    /// Resolves the settings for `run`: an explicit path must exist, the
    /// data directory's file is used if present, defaults otherwise.
    pub fn resolve(explicit: Option<&Path>, data_dir: &Path) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        let path = data_dir.join(SETTINGS_FILE);
        if path.exists() {
            Self::load(&path)
        } else {
            tracing::info!(path = %path.display(), "no settings file, using defaults");
            Ok(Self::default())
        }
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("failed to encode settings")
    }
}
