//! Error types shared across the crate.

use thiserror::Error;

/// Invalid configuration, reported by constructors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{name} must lie in [0, 1], got {value}")]
    OutOfUnitRange { name: &'static str, value: f32 },
    #[error("{name} must be a finite non-negative number, got {value}")]
    Negative { name: &'static str, value: f32 },
    #[error("{name} must be strictly positive, got {value}")]
    NotPositive { name: &'static str, value: f32 },
    #[error("fusion weights must sum to 1, got {sum}")]
    WeightsNotNormalized { sum: f32 },
    #[error("identity prefix must not be empty")]
    EmptyPrefix,
}

/// Failure of a gallery store call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("gallery store is unavailable")]
    Unavailable,
    #[error("identity {0} not found in gallery store")]
    NotFound(String),
    #[error("gallery store backend error: {0}")]
    Backend(String),
}

pub(crate) fn check_unit(name: &'static str, value: f32) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfUnitRange { name, value })
    }
}

pub(crate) fn check_non_negative(name: &'static str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Negative { name, value })
    }
}

pub(crate) fn check_positive(name: &'static str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NotPositive { name, value })
    }
}
