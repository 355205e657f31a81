//! Configuration loading and representation.
//!
//! Values come from a JSON document (every field optional) and may be
//! overridden by `KARDEX_*` environment variables:
//!
//! | variable                       | field                               |
//! |--------------------------------|-------------------------------------|
//! | `KARDEX_MIN_JUSTIFICATION_LEN` | `ledger.min_justification_len`      |
//! | `KARDEX_COST_SCALE`            | `ledger.cost_scale`                 |
//! | `KARDEX_MAX_CONFLICT_RETRIES`  | `dispatch.max_conflict_retries`     |
//! | `KARDEX_LOG_FORMAT`            | `log_format` (`json` / `pretty`)    |

use serde::{Deserialize, Serialize};
use thiserror::Error;

use kardex_inventory::LedgerPolicy;
use kardex_observability::LogFormat;

pub const ENV_MIN_JUSTIFICATION_LEN: &str = "KARDEX_MIN_JUSTIFICATION_LEN";
pub const ENV_COST_SCALE: &str = "KARDEX_COST_SCALE";
pub const ENV_MAX_CONFLICT_RETRIES: &str = "KARDEX_MAX_CONFLICT_RETRIES";
pub const ENV_LOG_FORMAT: &str = "KARDEX_LOG_FORMAT";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("malformed configuration document: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid value '{value}' for {key}")]
    InvalidValue { key: &'static str, value: String },

    #[error("{0}")]
    OutOfRange(String),
}

/// Dispatch tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchSettings {
    /// Re-runs of a whole call after `ConcurrentModification` (0 = no retry).
    pub max_conflict_retries: u32,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            max_conflict_retries: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogisticsConfig {
    pub ledger: LedgerPolicy,
    pub dispatch: DispatchSettings,
    pub log_format: LogFormat,
}

impl LogisticsConfig {
    pub fn from_json(document: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(document)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply `KARDEX_*` overrides read through `lookup`.
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(v) = lookup(ENV_MIN_JUSTIFICATION_LEN) {
            self.ledger.min_justification_len = parse(ENV_MIN_JUSTIFICATION_LEN, &v)?;
        }
        if let Some(v) = lookup(ENV_COST_SCALE) {
            self.ledger.cost_scale = parse(ENV_COST_SCALE, &v)?;
        }
        if let Some(v) = lookup(ENV_MAX_CONFLICT_RETRIES) {
            self.dispatch.max_conflict_retries = parse(ENV_MAX_CONFLICT_RETRIES, &v)?;
        }
        if let Some(v) = lookup(ENV_LOG_FORMAT) {
            self.log_format = v.parse().map_err(|_| ConfigError::InvalidValue {
                key: ENV_LOG_FORMAT,
                value: v.clone(),
            })?;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ledger.cost_scale > LedgerPolicy::MAX_COST_SCALE {
            return Err(ConfigError::OutOfRange(format!(
                "cost_scale must be at most {} (got {})",
                LedgerPolicy::MAX_COST_SCALE,
                self.ledger.cost_scale
            )));
        }
        Ok(())
    }
}

fn parse<T: core::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults() {
        let c = LogisticsConfig::default();
        assert_eq!(c.ledger.min_justification_len, 20);
        assert_eq!(c.ledger.cost_scale, 2);
        assert_eq!(c.dispatch.max_conflict_retries, 3);
        assert_eq!(c.log_format, LogFormat::Json);
    }

    #[test]
    fn partial_json_keeps_remaining_defaults() {
        let c = LogisticsConfig::from_json(r#"{ "ledger": { "cost_scale": 4 }, "log_format": "pretty" }"#)
            .unwrap();
        assert_eq!(c.ledger.cost_scale, 4);
        assert_eq!(c.ledger.min_justification_len, 20);
        assert_eq!(c.log_format, LogFormat::Pretty);
    }

    #[test]
    fn env_overrides_win() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_MIN_JUSTIFICATION_LEN, "30"),
            (ENV_MAX_CONFLICT_RETRIES, "0"),
        ]);
        let c = LogisticsConfig::default()
            .with_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(c.ledger.min_justification_len, 30);
        assert_eq!(c.dispatch.max_conflict_retries, 0);
    }

    #[test]
    fn bad_values_are_rejected() {
        let err = LogisticsConfig::default()
            .with_overrides(|k| (k == ENV_COST_SCALE).then(|| "two".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: ENV_COST_SCALE, .. }));

        assert!(matches!(
            LogisticsConfig::from_json(r#"{ "ledger": { "cost_scale": 40 } }"#),
            Err(ConfigError::OutOfRange(_))
        ));
    }
}
