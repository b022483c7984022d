//! Orchestrator configuration: the recognized options record and its
//! TOML loading/validation.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Recognized configuration fields and their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Period of the I/O loop's periodic tick, in milliseconds.
    pub cycle_period_ms: u64,
    /// Timeout passed to `adapter.exchange` on every tick, in microseconds.
    pub exchange_timeout_us: u32,
    /// Consecutive WKC-low strikes before `adapter.recover` is invoked.
    pub wkc_recovery_threshold: u32,
    /// Timeout passed to `adapter.recover`, in milliseconds.
    pub recovery_timeout_ms: u32,
    /// Delay between `adapter.shutdown` and `adapter.initialize` during a
    /// re-initialize.
    pub reinitialization_delay_ms: u64,
    /// Default settle timeout for motion commands that don't specify one,
    /// in milliseconds.
    pub default_settle_timeout_ms: u64,
    /// Emit a `debug!` per tick with phase timings and WKC.
    pub enable_cycle_trace_logging: bool,
    /// Minimum interval between repeated `Faulted` events for the same
    /// `(slave, code)` pair, in milliseconds.
    pub fault_repeat_interval_ms: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            cycle_period_ms: 2,
            exchange_timeout_us: 100_000,
            wkc_recovery_threshold: 3,
            recovery_timeout_ms: 500,
            reinitialization_delay_ms: 200,
            default_settle_timeout_ms: 10_000,
            enable_cycle_trace_logging: false,
            fault_repeat_interval_ms: 5_000,
        }
    }
}

impl OrchestratorConfig {
    /// Parse a TOML document into a validated configuration.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that would make the loop meaningless or spin.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cycle_period_ms == 0 {
            return Err(ConfigError::InvalidField {
                field: "cycle_period_ms",
                reason: "must be at least 1 ms".to_string(),
            });
        }
        if !(1..=5).contains(&self.cycle_period_ms) {
            return Err(ConfigError::InvalidField {
                field: "cycle_period_ms",
                reason: "spec range is 1-5 ms".to_string(),
            });
        }
        if self.exchange_timeout_us == 0 {
            return Err(ConfigError::InvalidField {
                field: "exchange_timeout_us",
                reason: "must be nonzero".to_string(),
            });
        }
        if self.wkc_recovery_threshold == 0 {
            return Err(ConfigError::InvalidField {
                field: "wkc_recovery_threshold",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    pub fn cycle_period(&self) -> Duration {
        Duration::from_millis(self.cycle_period_ms)
    }

    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_millis(self.recovery_timeout_ms as u64)
    }

    pub fn reinitialization_delay(&self) -> Duration {
        Duration::from_millis(self.reinitialization_delay_ms)
    }

    pub fn default_settle_timeout(&self) -> Duration {
        Duration::from_millis(self.default_settle_timeout_ms)
    }

    pub fn fault_repeat_interval(&self) -> Duration {
        Duration::from_millis(self.fault_repeat_interval_ms)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration field `{field}`: {reason}")]
    InvalidField {
        field: &'static str,
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.cycle_period_ms, 2);
        assert_eq!(config.exchange_timeout_us, 100_000);
        assert_eq!(config.wkc_recovery_threshold, 3);
        assert_eq!(config.recovery_timeout_ms, 500);
        assert_eq!(config.reinitialization_delay_ms, 200);
        assert_eq!(config.default_settle_timeout_ms, 10_000);
        assert!(!config.enable_cycle_trace_logging);
        assert_eq!(config.fault_repeat_interval_ms, 5_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_zero_cycle_period() {
        let mut config = OrchestratorConfig::default();
        config.cycle_period_ms = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidField { field: "cycle_period_ms", .. })
        ));
    }

    #[test]
    fn rejects_cycle_period_out_of_spec_range() {
        let mut config = OrchestratorConfig::default();
        config.cycle_period_ms = 9;
        assert!(config.validate().is_err());
    }

    #[test]
    fn parses_partial_toml_with_defaults() {
        let config = OrchestratorConfig::from_toml("cycle_period_ms = 3\n").unwrap();
        assert_eq!(config.cycle_period_ms, 3);
        assert_eq!(config.exchange_timeout_us, 100_000);
    }

    #[test]
    fn rejects_malformed_toml() {
        assert!(OrchestratorConfig::from_toml("not valid toml = = =").is_err());
    }
}
