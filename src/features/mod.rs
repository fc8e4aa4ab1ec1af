//! Feature extraction and standardization
//!
//! Projects an expired flow onto the fixed 78-element vector the
//! classifier was trained on, then standardizes it with pre-fit
//! per-feature mean/scale parameters.

pub mod extractor;
pub mod scaler;

pub use extractor::{extract, FEATURE_COUNT};
pub use scaler::{Scaler, ScalerParams};
