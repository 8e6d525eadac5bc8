//! Execution policy knobs, loadable from a TOML file.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::JournalError;

/// The default name for the kiln configuration file.
pub const KILNCONF_FILENAME: &str = "Kiln.toml";

/// Policy for the transaction lifecycle and batch execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Confirmation depth a transaction needs before it counts as confirmed.
    pub required_confirmations: u64,
    /// Milliseconds between confirmation polls.
    pub block_polling_interval_ms: u64,
    /// Milliseconds an attempt may stay unconfirmed before its fees are
    /// bumped.
    pub fee_bump_interval_ms: u64,
    /// How many fee bumps one interaction gets before timing out; total
    /// attempts are one more than this.
    pub max_fee_bumps: u32,
    /// Never resend with higher fees; the first unconfirmed attempt goes
    /// straight to timeout after the wait.
    pub disable_fee_bumping: bool,
    /// Sender account index used when a future does not name one.
    pub default_sender: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            required_confirmations: 5,
            block_polling_interval_ms: 1_000,
            fee_bump_interval_ms: 180_000,
            max_fee_bumps: 4,
            disable_fee_bumping: false,
            default_sender: 0,
        }
    }
}

impl ExecutionConfig {
    pub fn block_polling_interval(&self) -> Duration {
        Duration::from_millis(self.block_polling_interval_ms)
    }

    pub fn fee_bump_interval(&self) -> Duration {
        Duration::from_millis(self.fee_bump_interval_ms)
    }

    /// Save the configuration to a TOML file.
    pub fn save_to_file(&self, path: &PathBuf) -> Result<(), JournalError> {
        let content = toml::to_string_pretty(self).map_err(|e| JournalError::Corrupt {
            line: 0,
            reason: format!("unserializable config: {e}"),
        })?;
        std::fs::write(path, content)?;
        tracing::info!(path = %path.display(), "Configuration saved");
        Ok(())
    }

    /// Load the configuration from a TOML file, or from `Kiln.toml` inside a
    /// directory.
    pub fn load_from_file(path: &PathBuf) -> Result<Self, JournalError> {
        let config_path = if path.is_dir() {
            path.join(KILNCONF_FILENAME)
        } else {
            path.clone()
        };
        let content = std::fs::read_to_string(&config_path)?;
        let config: Self = toml::from_str(&content).map_err(|e| JournalError::Corrupt {
            line: 0,
            reason: format!("invalid config file: {e}"),
        })?;
        tracing::info!(path = %config_path.display(), "Configuration loaded");
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn defaults_match_policy() {
        let config = ExecutionConfig::default();
        assert_eq!(config.required_confirmations, 5);
        assert_eq!(config.max_fee_bumps, 4);
        assert!(!config.disable_fee_bumping);
    }

    #[test]
    fn save_and_load_round_trips() {
        let dir = TempDir::new("kiln-config").expect("Failed to create temp dir");
        let path = dir.path().join(KILNCONF_FILENAME);

        let config = ExecutionConfig {
            max_fee_bumps: 2,
            block_polling_interval_ms: 50,
            ..Default::default()
        };
        config.save_to_file(&path).unwrap();

        let loaded = ExecutionConfig::load_from_file(&dir.path().to_path_buf()).unwrap();
        assert_eq!(config, loaded);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let config: ExecutionConfig = toml::from_str("max_fee_bumps = 1").unwrap();
        assert_eq!(config.max_fee_bumps, 1);
        assert_eq!(config.required_confirmations, 5);
    }
}
