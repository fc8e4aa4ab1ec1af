//! Error kinds for the detection path
//!
//! A single flow's failure inside the detection loop is recovered locally;
//! these types carry enough context for the log line. Startup failures go
//! through `anyhow` at the binary edge instead.

use thiserror::Error;

/// Errors produced while scoring an expired flow or updating the
/// detection configuration.
#[derive(Debug, Error)]
pub enum DetectError {
    /// Feature vector dimension disagrees with the scaler or classifier.
    #[error("feature vector has {got} elements, expected {expected}")]
    FeatureShapeMismatch { expected: usize, got: usize },

    /// Standardization failed.
    #[error("scaler transform failed: {0}")]
    Scaler(String),

    /// Classifier runtime failure.
    #[error("inference failed: {0}")]
    Inference(String),

    /// Rejected at the control surface; no state change.
    #[error("detection threshold {0} out of range, expected 0 < t <= 1")]
    ThresholdOutOfRange(f64),
}
