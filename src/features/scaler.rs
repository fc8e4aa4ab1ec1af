//! Feature standardization
//!
//! Applies the per-feature affine transform `(x - mean) / scale` using
//! parameters fit at training time and shipped as a JSON document.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use super::extractor::FEATURE_COUNT;
use crate::error::DetectError;

/// Pre-fit standardization parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct ScalerParams {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
    pub feature_names: Vec<String>,
}

/// Immutable standardizer.
pub struct Scaler {
    params: ScalerParams,
}

impl Scaler {
    /// Load parameters from a JSON file. Missing keys or wrong vector
    /// lengths are fatal.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read scaler parameters: {:?}", path.as_ref()))?;
        let params: ScalerParams =
            serde_json::from_str(&data).with_context(|| "Failed to parse scaler parameters")?;
        Self::from_params(params)
    }

    pub fn from_params(params: ScalerParams) -> Result<Self> {
        if params.mean.len() != FEATURE_COUNT {
            anyhow::bail!(
                "scaler mean vector has {} entries, expected {}",
                params.mean.len(),
                FEATURE_COUNT
            );
        }
        if params.scale.len() != FEATURE_COUNT {
            anyhow::bail!(
                "scaler scale vector has {} entries, expected {}",
                params.scale.len(),
                FEATURE_COUNT
            );
        }
        if params.feature_names.len() != FEATURE_COUNT {
            anyhow::bail!(
                "scaler feature_names has {} entries, expected {}",
                params.feature_names.len(),
                FEATURE_COUNT
            );
        }

        Ok(Self { params })
    }

    /// Standardize a raw feature vector. A zero scale is treated as 1.
    pub fn transform(&self, features: &[f32]) -> Result<Vec<f32>, DetectError> {
        if features.len() != self.params.mean.len() {
            return Err(DetectError::FeatureShapeMismatch {
                expected: self.params.mean.len(),
                got: features.len(),
            });
        }

        Ok(features
            .iter()
            .enumerate()
            .map(|(i, &x)| {
                let scale = if self.params.scale[i] == 0.0 {
                    1.0
                } else {
                    self.params.scale[i]
                };
                ((x as f64 - self.params.mean[i]) / scale) as f32
            })
            .collect())
    }

    pub fn feature_names(&self) -> &[String] {
        &self.params.feature_names
    }

    pub fn dimension(&self) -> usize {
        self.params.mean.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> ScalerParams {
        let mut mean = vec![0.0; FEATURE_COUNT];
        let mut scale = vec![1.0; FEATURE_COUNT];
        mean[0] = 10.0;
        scale[0] = 2.0;
        mean[1] = -4.0;
        scale[1] = 0.5;
        scale[2] = 0.0; // constant training column

        ScalerParams {
            mean,
            scale,
            feature_names: (0..FEATURE_COUNT).map(|i| format!("f{}", i)).collect(),
        }
    }

    #[test]
    fn test_transform() {
        let scaler = Scaler::from_params(params()).unwrap();
        let mut input = vec![0f32; FEATURE_COUNT];
        input[0] = 14.0;
        input[1] = -3.0;
        input[2] = 7.0;

        let out = scaler.transform(&input).unwrap();
        assert_eq!(out.len(), FEATURE_COUNT);
        assert!((out[0] - 2.0).abs() < 1e-6); // (14 - 10) / 2
        assert!((out[1] - 2.0).abs() < 1e-6); // (-3 + 4) / 0.5
        assert!((out[2] - 7.0).abs() < 1e-6); // zero scale treated as 1
        assert_eq!(out[3], 0.0);
    }

    #[test]
    fn test_dimension_mismatch() {
        let scaler = Scaler::from_params(params()).unwrap();
        let err = scaler.transform(&[1.0, 2.0, 3.0]).unwrap_err();
        assert!(matches!(
            err,
            DetectError::FeatureShapeMismatch { expected: 78, got: 3 }
        ));
    }

    #[test]
    fn test_wrong_length_rejected() {
        let mut p = params();
        p.scale.pop();
        assert!(Scaler::from_params(p).is_err());

        let mut p = params();
        p.feature_names.truncate(10);
        assert!(Scaler::from_params(p).is_err());
    }

    #[test]
    fn test_parse_json_document() {
        let mean: Vec<String> = (0..FEATURE_COUNT).map(|_| "0.0".to_string()).collect();
        let scale: Vec<String> = (0..FEATURE_COUNT).map(|_| "1.0".to_string()).collect();
        let names: Vec<String> = (0..FEATURE_COUNT).map(|i| format!("\"f{}\"", i)).collect();
        let doc = format!(
            "{{\"mean\": [{}], \"scale\": [{}], \"feature_names\": [{}]}}",
            mean.join(","),
            scale.join(","),
            names.join(",")
        );

        let parsed: ScalerParams = serde_json::from_str(&doc).unwrap();
        let scaler = Scaler::from_params(parsed).unwrap();
        assert_eq!(scaler.dimension(), FEATURE_COUNT);
        assert_eq!(scaler.feature_names()[5], "f5");
    }

    #[test]
    fn test_missing_key_is_error() {
        let doc = r#"{"mean": [1.0], "scale": [1.0]}"#;
        assert!(serde_json::from_str::<ScalerParams>(doc).is_err());
    }
}
