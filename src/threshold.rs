//! Threshold resolution and validation of user-supplied threshold values.

use crate::models::SubscriberRecord;
use thiserror::Error;

/// Threshold used when nothing more specific is configured.
pub const GLOBAL_DEFAULT_THRESHOLD: f64 = 1.0;

/// Smallest threshold a subscriber may choose, in percent.
pub const MIN_THRESHOLD: f64 = 0.1;

/// Largest threshold a subscriber may choose, in percent.
pub const MAX_THRESHOLD: f64 = 50.0;

/// Why a threshold value was rejected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ThresholdError {
    #[error("'{0}' is not a number, enter a value such as 1.5")]
    Parse(String),

    #[error("{value}% is out of range, enter a number from 0.1 to 50")]
    OutOfRange { value: f64 },
}

/// Parse and validate a threshold entered by a subscriber.
///
/// Accepts a trailing `%` and a decimal comma. The value must lie in
/// `[MIN_THRESHOLD, MAX_THRESHOLD]` inclusive.
pub fn parse_threshold(text: &str) -> Result<f64, ThresholdError> {
    let cleaned = text.trim().trim_end_matches('%').trim().replace(',', ".");
    let value: f64 = cleaned
        .parse()
        .map_err(|_| ThresholdError::Parse(text.trim().to_string()))?;

    // "nan" and "inf" parse fine but are not numbers a person means
    if !value.is_finite() {
        return Err(ThresholdError::Parse(text.trim().to_string()));
    }

    validate_threshold(value)
}

/// Range-check an already numeric threshold.
pub fn validate_threshold(value: f64) -> Result<f64, ThresholdError> {
    if (MIN_THRESHOLD..=MAX_THRESHOLD).contains(&value) {
        Ok(value)
    } else {
        Err(ThresholdError::OutOfRange { value })
    }
}

/// Effective threshold for a subscriber/asset pair.
///
/// Override for the asset, else the subscriber's default, else the global default.
pub fn effective_threshold(record: Option<&SubscriberRecord>, asset: &str) -> f64 {
    match record {
        Some(r) => r
            .overrides
            .get(asset)
            .copied()
            .unwrap_or(r.default_threshold),
        None => GLOBAL_DEFAULT_THRESHOLD,
    }
}

/// Where an effective threshold came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdSource {
    Override,
    Default,
}

impl ThresholdSource {
    pub fn of(record: &SubscriberRecord, asset: &str) -> Self {
        if record.overrides.contains_key(asset) {
            ThresholdSource::Override
        } else {
            ThresholdSource::Default
        }
    }
}

impl std::fmt::Display for ThresholdSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ThresholdSource::Override => write!(f, "individual"),
            ThresholdSource::Default => write!(f, "default"),
        }
    }
}
