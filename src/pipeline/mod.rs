//! Pipeline module - worker orchestration
//!
//! Wires the packet source into the flow table and the cleanup tick into
//! the scoring chain. Three long-lived workers cooperate over shared
//! state: ingest (blocking), detection (tick-driven), and the traffic
//! rate sampler. A watch channel fans the shutdown signal out to all of
//! them.

pub mod detect;
pub mod events;
pub mod ingest;
pub mod traffic;

pub use detect::{should_alert, DetectionWorker};
pub use events::{event_channel, spawn_logging_consumer, EventSender, ThreatEvent};
pub use ingest::IngestWorker;
pub use traffic::TrafficTracker;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use ipnetwork::IpNetwork;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::capture::PacketSource;
use crate::config::{Config, SharedConfig};
use crate::features::Scaler;
use crate::flow::FlowTable;
use crate::inference::Classifier;

/// Main pipeline orchestrator.
pub struct Pipeline {
    config: SharedConfig,
    table: Arc<FlowTable>,
    traffic: Arc<TrafficTracker>,
    home_nets: Vec<IpNetwork>,
    cleanup_interval: Duration,
    shutdown_tx: watch::Sender<bool>,
}

impl Pipeline {
    pub fn new(config: &Config, shared: SharedConfig) -> Self {
        let home_nets: Vec<IpNetwork> = config
            .networks
            .home_net
            .iter()
            .filter_map(|cidr| match cidr.parse() {
                Ok(net) => Some(net),
                Err(e) => {
                    warn!("Ignoring invalid home_net entry '{}': {}", cidr, e);
                    None
                }
            })
            .collect();

        let (shutdown_tx, _) = watch::channel(false);

        Self {
            config: shared,
            table: Arc::new(FlowTable::new(&config.flow)),
            traffic: Arc::new(TrafficTracker::new()),
            home_nets,
            cleanup_interval: Duration::from_secs(config.flow.cleanup_interval),
            shutdown_tx,
        }
    }

    /// Inspection surface: the live flow table (count / recent).
    pub fn table(&self) -> Arc<FlowTable> {
        Arc::clone(&self.table)
    }

    /// Inspection surface: traffic totals and rates.
    pub fn traffic(&self) -> Arc<TrafficTracker> {
        Arc::clone(&self.traffic)
    }

    /// Control surface: hot-updatable configuration.
    pub fn config(&self) -> SharedConfig {
        self.config.clone()
    }

    /// Signal shutdown. Workers observe it at their next suspension
    /// point; pending flows are discarded without scoring.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Run the workers until the source ends or shutdown is signaled.
    pub async fn run(
        &self,
        source: Box<dyn PacketSource>,
        scaler: Scaler,
        classifier: Box<dyn Classifier + Send>,
        events: EventSender,
    ) -> Result<()> {
        info!("Starting detection pipeline");

        let ingest = IngestWorker {
            table: Arc::clone(&self.table),
            traffic: Arc::clone(&self.traffic),
            home_nets: self.home_nets.clone(),
        };
        let ingest_shutdown = self.shutdown_tx.subscribe();
        let ingest_handle =
            tokio::task::spawn_blocking(move || ingest.run(source, ingest_shutdown));

        let detector = DetectionWorker {
            table: Arc::clone(&self.table),
            scaler,
            classifier,
            config: self.config.clone(),
            events,
            cleanup_interval: self.cleanup_interval,
        };
        let detect_shutdown = self.shutdown_tx.subscribe();
        let detect_handle = tokio::spawn(detector.run(detect_shutdown));

        let traffic = Arc::clone(&self.traffic);
        let mut sampler_shutdown = self.shutdown_tx.subscribe();
        let sampler_handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = sampler_shutdown.changed() => break,
                    _ = tokio::time::sleep(Duration::from_secs(1)) => traffic.sample(),
                }
            }
        });

        // A finished source (end of a replay, or shutdown) takes the
        // remaining workers down with it.
        let _ = ingest_handle.await;
        let _ = self.shutdown_tx.send(true);
        let _ = detect_handle.await;
        let _ = sampler_handle.await;

        info!("Pipeline stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        toml::from_str(
            r#"
[capture]
interface = "eth0"

[networks]
home_net = ["192.168.0.0/16"]

[detection]
model_path = "model.onnx"
scaler_path = "scaler.json"
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_pipeline_surfaces() {
        let cfg = config();
        let shared = SharedConfig::new(cfg.clone());
        let pipeline = Pipeline::new(&cfg, shared);

        assert_eq!(pipeline.table().count(), 0);
        assert_eq!(pipeline.traffic().totals(), (0, 0));
        assert_eq!(pipeline.config().detection_threshold(), 0.8);
        assert_eq!(pipeline.home_nets.len(), 1);
    }

    #[test]
    fn test_invalid_home_net_ignored() {
        let mut cfg = config();
        cfg.networks.home_net.push("bogus".to_string());
        let shared = SharedConfig::new(cfg.clone());
        let pipeline = Pipeline::new(&cfg, shared);
        assert_eq!(pipeline.home_nets.len(), 1);
    }
}
