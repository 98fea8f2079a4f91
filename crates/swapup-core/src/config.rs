//! Upgrade run configuration.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables for an upgrade run.
///
/// The swap time is hardware-dependent (the device is unreachable while it
/// re-flashes and reboots), so it is explicit configuration rather than a
/// constant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpgradeConfig {
    /// Expected duration of the device's image swap after reset, in ms.
    pub estimated_swap_time_ms: u64,
    /// Extra margin on top of the swap time before the wait gives up.
    pub swap_margin_ms: u64,
    /// Poll interval while waiting for the device to come back.
    pub reset_poll_ms: u64,
    /// Chunk payload size for uploads. Transport MTU when unset.
    pub chunk_size: Option<usize>,
}

impl Default for UpgradeConfig {
    fn default() -> Self {
        Self {
            estimated_swap_time_ms: 10_000,
            swap_margin_ms: 5_000,
            reset_poll_ms: 200,
            chunk_size: None,
        }
    }
}

impl UpgradeConfig {
    pub fn estimated_swap_time(&self) -> Duration {
        Duration::from_millis(self.estimated_swap_time_ms)
    }

    pub fn swap_margin(&self) -> Duration {
        Duration::from_millis(self.swap_margin_ms)
    }

    pub fn reset_poll_interval(&self) -> Duration {
        Duration::from_millis(self.reset_poll_ms)
    }

    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: UpgradeConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
