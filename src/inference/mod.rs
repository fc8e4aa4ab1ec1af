//! Classifier inference
//!
//! Wraps one ONNX Runtime session over the pre-trained flow classifier:
//! a `[1, 78]` float input named `features`, a `[1, K]` float output
//! named `logits`. Logits are turned into probabilities with a
//! numerically stable softmax and the top label is returned. The engine
//! is invoked serially from the detection worker.

use std::cmp::Ordering as CmpOrdering;
use std::sync::Arc;

use anyhow::{Context, Result};
use ndarray::{Array2, CowArray};
use ort::{Environment, GraphOptimizationLevel, LoggingLevel, Session, SessionBuilder, Value};
use tracing::{debug, info};

use crate::error::DetectError;
use crate::features::FEATURE_COUNT;

/// Built-in class map, matching the training label encoding.
pub const DEFAULT_LABELS: [&str; 6] = [
    "Benign",
    "Bot",
    "Brute Force",
    "DoS",
    "PortScan",
    "Web Attack",
];

/// The label predictions are compared against for gating.
pub const BENIGN_LABEL: &str = "Benign";

/// Inference result for one flow.
#[derive(Debug, Clone)]
pub struct Prediction {
    pub label: String,
    pub probability: f32,
    pub index: usize,
}

/// The scoring seam the detection worker drives. [`Engine`] is the
/// production implementation.
pub trait Classifier: Send {
    fn predict(&self, features: &[f32]) -> Result<Prediction, DetectError>;
}

/// One classifier session plus its class-label list.
pub struct Engine {
    _environment: Arc<Environment>,
    session: Session,
    labels: Vec<String>,
}

impl Engine {
    /// Build the runtime environment and load the model.
    ///
    /// `ort_lib_path` points at the ONNX Runtime shared library; it is
    /// resolved through the loader's `ORT_DYLIB_PATH` mechanism before
    /// the environment is created.
    pub fn new(model_path: &str, ort_lib_path: &str, labels: Vec<String>) -> Result<Self> {
        if !ort_lib_path.is_empty() {
            std::env::set_var("ORT_DYLIB_PATH", ort_lib_path);
        }

        let environment = Arc::new(
            Environment::builder()
                .with_name("flowwarden")
                .with_log_level(LoggingLevel::Warning)
                .build()
                .context("Failed to create ONNX Runtime environment")?,
        );

        let session = SessionBuilder::new(&environment)?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(1)?
            .with_model_from_file(model_path)
            .with_context(|| format!("Failed to load classifier model from {}", model_path))?;

        if session.inputs.len() != 1 {
            anyhow::bail!(
                "classifier model must have exactly one input, found {}",
                session.inputs.len()
            );
        }
        if session.outputs.len() != 1 {
            anyhow::bail!(
                "classifier model must have exactly one output, found {}",
                session.outputs.len()
            );
        }
        debug!(
            input = %session.inputs[0].name,
            output = %session.outputs[0].name,
            "classifier graph loaded"
        );

        let labels = if labels.is_empty() {
            DEFAULT_LABELS.iter().map(|s| s.to_string()).collect()
        } else {
            labels
        };
        info!("Inference engine ready ({} classes)", labels.len());

        Ok(Self {
            _environment: environment,
            session,
            labels,
        })
    }

    /// Score one standardized feature vector.
    pub fn predict(&self, features: &[f32]) -> Result<Prediction, DetectError> {
        if features.len() != FEATURE_COUNT {
            return Err(DetectError::FeatureShapeMismatch {
                expected: FEATURE_COUNT,
                got: features.len(),
            });
        }

        let input = Array2::from_shape_vec((1, FEATURE_COUNT), features.to_vec())
            .map_err(|e| DetectError::Inference(e.to_string()))?;
        let input = CowArray::from(input.into_dyn());

        let tensor = Value::from_array(self.session.allocator(), &input)
            .map_err(|e| DetectError::Inference(e.to_string()))?;
        let outputs = self
            .session
            .run(vec![tensor])
            .map_err(|e| DetectError::Inference(e.to_string()))?;

        let logits_tensor = outputs
            .first()
            .ok_or_else(|| DetectError::Inference("classifier produced no output".to_string()))?
            .try_extract::<f32>()
            .map_err(|e| DetectError::Inference(e.to_string()))?;
        let logits: Vec<f32> = logits_tensor.view().iter().copied().collect();

        if logits.is_empty() {
            return Err(DetectError::Inference("empty logits tensor".to_string()));
        }

        let probs = softmax(&logits);
        top_prediction(&probs, &self.labels)
            .ok_or_else(|| DetectError::Inference("empty probability vector".to_string()))
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }
}

impl Classifier for Engine {
    fn predict(&self, features: &[f32]) -> Result<Prediction, DetectError> {
        Engine::predict(self, features)
    }
}

/// Numerically stable softmax: shift by the max logit before
/// exponentiating so large activations cannot overflow.
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&l| (l - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.iter().map(|&e| e / sum).collect()
}

/// Highest-probability class, labeled. Classes past the end of the label
/// list get a synthetic `class-N` name.
fn top_prediction(probs: &[f32], labels: &[String]) -> Option<Prediction> {
    let (index, &probability) = probs
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(CmpOrdering::Equal))?;

    let label = labels
        .get(index)
        .cloned()
        .unwrap_or_else(|| format!("class-{}", index));

    Some(Prediction {
        label,
        probability,
        index,
    })
}

/// Load the class-label list. An empty path selects the built-in map.
/// The document is either a JSON array of names (index order) or an
/// object mapping names to class indices.
pub fn load_labels(path: &str) -> Result<Vec<String>> {
    if path.is_empty() {
        return Ok(DEFAULT_LABELS.iter().map(|s| s.to_string()).collect());
    }

    let data = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read label map: {}", path))?;
    let value: serde_json::Value =
        serde_json::from_str(&data).with_context(|| "Failed to parse label map")?;

    let labels = match value {
        serde_json::Value::Array(items) => items
            .into_iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| anyhow::anyhow!("label map array entries must be strings"))
            })
            .collect::<Result<Vec<_>>>()?,
        serde_json::Value::Object(map) => {
            let mut pairs = map
                .into_iter()
                .map(|(name, index)| {
                    index
                        .as_u64()
                        .map(|i| (i as usize, name))
                        .ok_or_else(|| anyhow::anyhow!("label map object values must be indices"))
                })
                .collect::<Result<Vec<_>>>()?;
            pairs.sort_by_key(|(index, _)| *index);
            pairs.into_iter().map(|(_, name)| name).collect()
        }
        _ => anyhow::bail!("label map must be a JSON array or object"),
    };

    if labels.is_empty() {
        anyhow::bail!("label map is empty");
    }
    Ok(labels)
}
