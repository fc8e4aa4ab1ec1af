//! Threat events and their outbound channel
//!
//! The detector publishes through a bounded channel with a non-blocking
//! send: when the consumer falls behind, new events are dropped and
//! counted rather than stalling the detection loop.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, Receiver, TrySendError};
use serde::Serialize;
use tracing::warn;

/// A detection the core hands to the alert consumer.
#[derive(Debug, Clone, Serialize)]
pub struct ThreatEvent {
    pub source_ip: String,
    pub dest_ip: String,
    pub label: String,
    pub confidence: f32,
    pub timestamp: DateTime<Utc>,
    /// Audit payload of the flow's first packets, lossily decoded
    pub payload: String,
}

/// Non-blocking sending half of the event channel.
#[derive(Clone)]
pub struct EventSender {
    tx: crossbeam_channel::Sender<ThreatEvent>,
    dropped: Arc<AtomicU64>,
}

impl EventSender {
    /// Hand an event to the consumer. Never blocks; a full channel drops
    /// the event.
    pub fn send(&self, event: ThreatEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(label = %event.label, src = %event.source_ip, "event channel full, dropping alert");
            }
            Err(TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Create the bounded event channel.
pub fn event_channel(capacity: usize) -> (EventSender, Receiver<ThreatEvent>) {
    let (tx, rx) = bounded(capacity);
    (
        EventSender {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        },
        rx,
    )
}

/// Thin in-process consumer standing in for the external alert store:
/// logs each event with structured fields. Exits when every sender is
/// gone.
pub fn spawn_logging_consumer(rx: Receiver<ThreatEvent>) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        while let Ok(event) = rx.recv() {
            warn!(
                src = %event.source_ip,
                dst = %event.dest_ip,
                label = %event.label,
                confidence = format!("{:.2}", event.confidence).as_str(),
                "Intrusion threat detected"
            );
        }
    })
}
