//! Detection worker
//!
//! On every cleanup tick: expire idle flows, then for each one run
//! extract -> scale -> predict and gate the prediction against the
//! current threshold. One flow's failure is logged and skipped; the
//! loop never aborts.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::events::{EventSender, ThreatEvent};
use crate::config::SharedConfig;
use crate::error::DetectError;
use crate::features::{extract, Scaler};
use crate::flow::{Flow, FlowTable};
use crate::inference::{Classifier, Prediction, BENIGN_LABEL};

/// True when a prediction should raise a threat event: non-benign and at
/// least as confident as the configured threshold.
pub fn should_alert(label: &str, probability: f32, threshold: f64) -> bool {
    label != BENIGN_LABEL && f64::from(probability) >= threshold
}

pub struct DetectionWorker {
    pub table: Arc<FlowTable>,
    pub scaler: Scaler,
    pub classifier: Box<dyn Classifier + Send>,
    pub config: SharedConfig,
    pub events: EventSender,
    pub cleanup_interval: Duration,
}

impl DetectionWorker {
    /// Tick loop; runs until shutdown is signaled.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Detection worker started (tick every {}s)",
            self.cleanup_interval.as_secs()
        );

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("Detection worker shutting down");
                    break;
                }
                _ = tokio::time::sleep(self.cleanup_interval) => {
                    self.sweep(Utc::now());
                }
            }
        }
    }

    /// Expire idle flows and score each one.
    pub fn sweep(&self, now: DateTime<Utc>) {
        let expired = self.table.expire(now);
        if expired.is_empty() {
            return;
        }
        debug!(count = expired.len(), "scoring expired flows");

        for flow in &expired {
            match self.score(flow) {
                Ok(prediction) => {
                    // Re-read on every decision; never cached across flows.
                    let threshold = self.config.detection_threshold();
                    if should_alert(&prediction.label, prediction.probability, threshold) {
                        self.events.send(ThreatEvent {
                            source_ip: flow.key.src_ip.clone(),
                            dest_ip: flow.key.dst_ip.clone(),
                            label: prediction.label,
                            confidence: prediction.probability,
                            timestamp: Utc::now(),
                            payload: String::from_utf8_lossy(&flow.raw_payload).into_owned(),
                        });
                    }
                }
                Err(e) => warn!(flow = %flow.key, error = %e, "flow scoring failed"),
            }
        }
    }

    fn score(&self, flow: &Flow) -> Result<Prediction, DetectError> {
        let raw = extract(flow);
        let scaled = self.scaler.transform(&raw)?;
        self.classifier.predict(&scaled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, FlowConfig};
    use crate::features::{ScalerParams, FEATURE_COUNT};
    use crate::flow::stats::testutil::*;
    use crate::flow::FlowKey;
    use crate::pipeline::events::event_channel;
    use chrono::TimeZone;

    struct FixedClassifier {
        label: &'static str,
        probability: f32,
    }

    impl Classifier for FixedClassifier {
        fn predict(&self, features: &[f32]) -> Result<Prediction, DetectError> {
            if features.len() != FEATURE_COUNT {
                return Err(DetectError::FeatureShapeMismatch {
                    expected: FEATURE_COUNT,
                    got: features.len(),
                });
            }
            Ok(Prediction {
                label: self.label.to_string(),
                probability: self.probability,
                index: 0,
            })
        }
    }

    struct FailingClassifier;

    impl Classifier for FailingClassifier {
        fn predict(&self, _features: &[f32]) -> Result<Prediction, DetectError> {
            Err(DetectError::Inference("session gone".to_string()))
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn identity_scaler() -> Scaler {
        Scaler::from_params(ScalerParams {
            mean: vec![0.0; FEATURE_COUNT],
            scale: vec![1.0; FEATURE_COUNT],
            feature_names: (0..FEATURE_COUNT).map(|i| format!("f{}", i)).collect(),
        })
        .unwrap()
    }

    fn test_config() -> SharedConfig {
        let toml = r#"
[capture]
interface = "eth0"

[detection]
model_path = "model.onnx"
scaler_path = "scaler.json"
threshold = 0.8
"#;
        let config: Config = toml::from_str(toml).unwrap();
        SharedConfig::new(config)
    }

    fn worker(classifier: Box<dyn Classifier + Send>) -> (DetectionWorker, crossbeam_channel::Receiver<ThreatEvent>) {
        let table = Arc::new(FlowTable::new(&FlowConfig {
            tcp_timeout: 1,
            udp_timeout: 1,
            max_flows: 100,
            cleanup_interval: 1,
        }));
        let (events, rx) = event_channel(16);
        (
            DetectionWorker {
                table,
                scaler: identity_scaler(),
                classifier,
                config: test_config(),
                events,
                cleanup_interval: Duration::from_secs(1),
            },
            rx,
        )
    }

    fn seed_flow(worker: &DetectionWorker) {
        let pkt = tcp_packet(t0(), "192.168.1.1", 12345, "10.0.0.1", 80, 60, 0x02, 1024, b"probe");
        worker.table.record(FlowKey::from_packet(&pkt), &pkt);
    }

    #[test]
    fn test_should_alert_gating() {
        assert!(!should_alert("DoS", 0.79, 0.8));
        assert!(should_alert("DoS", 0.81, 0.8));
        assert!(!should_alert("Benign", 0.99, 0.8));
        // boundary: exactly at the threshold fires
        assert!(should_alert("PortScan", 0.8, 0.8));
    }

    #[test]
    fn test_sweep_emits_event_over_threshold() {
        let (worker, rx) = worker(Box::new(FixedClassifier {
            label: "DoS",
            probability: 0.81,
        }));
        seed_flow(&worker);

        worker.sweep(t0() + chrono::Duration::seconds(2));

        let event = rx.try_recv().unwrap();
        assert_eq!(event.label, "DoS");
        assert_eq!(event.source_ip, "192.168.1.1");
        assert_eq!(event.dest_ip, "10.0.0.1");
        assert!((event.confidence - 0.81).abs() < 1e-6);
        assert_eq!(event.payload, "probe");
        // exactly one event
        assert!(rx.try_recv().is_err());
        // the flow was removed before scoring
        assert_eq!(worker.table.count(), 0);
    }

    #[test]
    fn test_sweep_below_threshold_no_event() {
        let (worker, rx) = worker(Box::new(FixedClassifier {
            label: "DoS",
            probability: 0.79,
        }));
        seed_flow(&worker);

        worker.sweep(t0() + chrono::Duration::seconds(2));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_sweep_benign_no_event() {
        let (worker, rx) = worker(Box::new(FixedClassifier {
            label: "Benign",
            probability: 0.99,
        }));
        seed_flow(&worker);

        worker.sweep(t0() + chrono::Duration::seconds(2));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_sweep_survives_classifier_failure() {
        let (worker, rx) = worker(Box::new(FailingClassifier));
        seed_flow(&worker);

        // the failure is logged and swallowed; the loop (and table) stay healthy
        worker.sweep(t0() + chrono::Duration::seconds(2));
        assert!(rx.try_recv().is_err());
        assert_eq!(worker.table.count(), 0);
    }

    #[test]
    fn test_hot_threshold_applies_to_next_sweep() {
        let (worker, rx) = worker(Box::new(FixedClassifier {
            label: "Bot",
            probability: 0.7,
        }));
        seed_flow(&worker);

        worker.config.update_threshold(0.6).unwrap();
        worker.sweep(t0() + chrono::Duration::seconds(2));
        assert_eq!(rx.try_recv().unwrap().label, "Bot");
    }
}
