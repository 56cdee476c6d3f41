use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::BacktestError;
use crate::signals::Predicate;

/// How clamped forward returns enter the summary statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NullPolicy {
    /// Clamped returns are left out of every denominator.
    #[default]
    DropNull,
    /// Clamped returns count as 0.0.
    ZeroFill,
}

impl fmt::Display for NullPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NullPolicy::DropNull => write!(f, "drop_null"),
            NullPolicy::ZeroFill => write!(f, "zero_fill"),
        }
    }
}

/// Parameters for one backtest run. Passed by value into every worker so
/// several configurations can run side by side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestConfig {
    /// Holding horizons in bars, strictly ascending.
    #[serde(default = "default_horizons")]
    pub horizons: Vec<usize>,

    /// First bar index eligible for a signal.
    #[serde(default = "default_warm_up")]
    pub warm_up: usize,

    /// Series shorter than this are skipped.
    #[serde(default = "default_min_bars")]
    pub min_bars: usize,

    #[serde(default = "default_return_decimals")]
    pub return_decimals: u32,

    #[serde(default)]
    pub null_policy: NullPolicy,

    #[serde(default = "Predicate::ignition")]
    pub predicate: Predicate,
}

fn default_horizons() -> Vec<usize> {
    vec![1, 3, 5, 7, 14, 20, 30]
}

fn default_warm_up() -> usize {
    60
}

fn default_min_bars() -> usize {
    100
}

fn default_return_decimals() -> u32 {
    2
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            horizons: default_horizons(),
            warm_up: default_warm_up(),
            min_bars: default_min_bars(),
            return_decimals: default_return_decimals(),
            null_policy: NullPolicy::default(),
            predicate: Predicate::ignition(),
        }
    }
}

impl BacktestConfig {
    pub fn validate(&self) -> Result<(), BacktestError> {
        if self.horizons.is_empty() {
            return Err(BacktestError::InvalidConfig("horizons must not be empty".into()));
        }
        if self.horizons.contains(&0) {
            return Err(BacktestError::InvalidConfig("horizons must be positive".into()));
        }
        if self.horizons.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(BacktestError::InvalidConfig(
                "horizons must be strictly ascending".into(),
            ));
        }
        if self.return_decimals > 10 {
            return Err(BacktestError::InvalidConfig(format!(
                "return_decimals {} is out of range (0..=10)",
                self.return_decimals
            )));
        }
        self.predicate.validate().map_err(BacktestError::InvalidConfig)
    }

    pub fn max_horizon(&self) -> usize {
        self.horizons.iter().copied().max().unwrap_or(0)
    }

    /// Signal scanning starts here: the configured warm-up, or later if the
    /// predicate needs more history.
    pub fn effective_warm_up(&self) -> usize {
        self.warm_up.max(self.predicate.required_history())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = BacktestConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_horizon(), 30);
        assert_eq!(config.effective_warm_up(), 60);
        assert_eq!(config.null_policy, NullPolicy::DropNull);
    }

    #[test]
    fn test_validate_horizons() {
        let mut config = BacktestConfig::default();
        config.horizons = vec![];
        assert!(config.validate().is_err());
        config.horizons = vec![1, 0];
        assert!(config.validate().is_err());
        config.horizons = vec![5, 3];
        assert!(config.validate().is_err());
        config.horizons = vec![3, 3];
        assert!(config.validate().is_err());
        config.horizons = vec![2, 10];
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_effective_warm_up_follows_predicate() {
        let mut config = BacktestConfig::default();
        config.warm_up = 0;
        assert_eq!(config.effective_warm_up(), 6);
    }

    #[test]
    fn test_null_policy_display() {
        assert_eq!(NullPolicy::DropNull.to_string(), "drop_null");
        assert_eq!(NullPolicy::ZeroFill.to_string(), "zero_fill");
    }

    #[test]
    fn test_config_from_json_defaults() {
        let config: BacktestConfig = serde_json::from_str(r#"{"null_policy":"zero_fill"}"#).unwrap();
        assert_eq!(config.horizons, vec![1, 3, 5, 7, 14, 20, 30]);
        assert_eq!(config.null_policy, NullPolicy::ZeroFill);
        assert_eq!(config.predicate.name, "ignition");
    }
}
