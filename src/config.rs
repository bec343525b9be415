//! Configuration types for the early-stopping controller

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::trend::TrendRule;

/// Width of each value written to the state file
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum Precision {
    F32,
    #[default]
    F64,
}

impl Precision {
    /// Bytes occupied by one encoded value.
    pub fn width(self) -> usize {
        match self {
            Precision::F32 => 4,
            Precision::F64 => 8,
        }
    }
}

/// Configuration for the early-stopping controller.
///
/// Loaded once at startup and never mutated afterwards. The legacy option
/// names (`lamina`, `time_interval`, `iter_train`, `iter_test`, `path_tmp`)
/// are accepted as aliases when reading JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Stop decision cutoff
    #[serde(default = "default_threshold")]
    pub threshold: f64,

    /// Sensitivity multiplier applied to the trend score
    #[serde(default = "default_scale_factor", alias = "lamina")]
    pub scale_factor: f64,

    /// Number of validation epochs retained in the window
    #[serde(default = "default_window_capacity", alias = "time_interval")]
    pub window_capacity: usize,

    /// Training iterations per epoch
    #[serde(default = "default_train_steps", alias = "iter_train")]
    pub train_steps_per_epoch: usize,

    /// Validation iterations per epoch
    #[serde(default = "default_validation_steps", alias = "iter_test")]
    pub validation_steps_per_epoch: usize,

    /// Location of the persisted validation window
    #[serde(default = "default_state_path", alias = "path_tmp")]
    pub state_path: PathBuf,

    /// Formula used to score the window
    #[serde(default)]
    pub trend_rule: TrendRule,

    /// Numeric width of the state file entries
    #[serde(default)]
    pub precision: Precision,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            scale_factor: default_scale_factor(),
            window_capacity: default_window_capacity(),
            train_steps_per_epoch: default_train_steps(),
            validation_steps_per_epoch: default_validation_steps(),
            state_path: default_state_path(),
            trend_rule: TrendRule::default(),
            precision: Precision::default(),
        }
    }
}

fn default_threshold() -> f64 {
    0.05
}

fn default_scale_factor() -> f64 {
    1.0
}

fn default_window_capacity() -> usize {
    5
}

fn default_train_steps() -> usize {
    100
}

fn default_validation_steps() -> usize {
    10
}

fn default_state_path() -> PathBuf {
    PathBuf::from("./earlystop_state.bin")
}

impl ControllerConfig {
    /// Check every option; any violation aborts controller initialization.
    pub fn validate(&self) -> Result<()> {
        if self.window_capacity == 0 {
            return Err(Error::Config("window_capacity must be > 0".to_string()));
        }
        if self.train_steps_per_epoch == 0 {
            return Err(Error::Config("train_steps_per_epoch must be > 0".to_string()));
        }
        if self.validation_steps_per_epoch == 0 {
            return Err(Error::Config(
                "validation_steps_per_epoch must be > 0".to_string(),
            ));
        }
        if !self.threshold.is_finite() {
            return Err(Error::Config(format!(
                "threshold must be finite, got {}",
                self.threshold
            )));
        }
        if !self.scale_factor.is_finite() || self.scale_factor <= 0.0 {
            return Err(Error::Config(format!(
                "scale_factor must be a positive finite number, got {}",
                self.scale_factor
            )));
        }
        if self.state_path.as_os_str().is_empty() {
            return Err(Error::Config("state_path must not be empty".to_string()));
        }
        Ok(())
    }

    /// Load configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a JSON file
    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(ControllerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let config = ControllerConfig {
            window_capacity: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_zero_step_counts_rejected() {
        let train = ControllerConfig {
            train_steps_per_epoch: 0,
            ..Default::default()
        };
        let validation = ControllerConfig {
            validation_steps_per_epoch: 0,
            ..Default::default()
        };
        assert!(train.validate().is_err());
        assert!(validation.validate().is_err());
    }

    #[test]
    fn test_bad_scale_factor_rejected() {
        for scale_factor in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let config = ControllerConfig {
                scale_factor,
                ..Default::default()
            };
            assert!(config.validate().is_err(), "accepted {scale_factor}");
        }
    }

    #[test]
    fn test_legacy_aliases() {
        let json = r#"{
            "threshold": 0.2,
            "lamina": 2.5,
            "time_interval": 4,
            "iter_train": 50,
            "iter_test": 5,
            "path_tmp": "/tmp/tmp.bin"
        }"#;
        let config: ControllerConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.scale_factor, 2.5);
        assert_eq!(config.window_capacity, 4);
        assert_eq!(config.train_steps_per_epoch, 50);
        assert_eq!(config.validation_steps_per_epoch, 5);
        assert_eq!(config.state_path, PathBuf::from("/tmp/tmp.bin"));
        assert_eq!(config.trend_rule, TrendRule::RelativeImprovement);
        assert_eq!(config.precision, Precision::F64);
    }

    #[test]
    fn test_precision_width() {
        assert_eq!(Precision::F32.width(), 4);
        assert_eq!(Precision::F64.width(), 8);
    }
}
