//! Flow table
//!
//! Owns every live flow behind a single reader/writer lock. Packet
//! accounting resolves forward and reverse keys to the same flow inside
//! one critical section; expiry removes and returns idle flows as a
//! consistent snapshot.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tracing::debug;

use super::key::FlowKey;
use super::stats::Flow;
use crate::config::FlowConfig;
use crate::decode::{protocol, IpPacket};

/// Summary record for the inspection surface. Derived copies only; the
/// flow itself never leaves the table alive.
#[derive(Debug, Clone, Serialize)]
pub struct FlowBrief {
    pub src_port: u16,
    pub dst_port: u16,
    /// "TCP" or "UDP"
    pub protocol: String,
    /// e.g. "12s"
    pub duration: String,
}

/// Keyed map of live flows.
pub struct FlowTable {
    flows: RwLock<HashMap<FlowKey, Flow>>,
    tcp_timeout: Duration,
    udp_timeout: Duration,
    max_flows: usize,
    dropped_flows: AtomicU64,
}

impl FlowTable {
    pub fn new(config: &FlowConfig) -> Self {
        Self {
            flows: RwLock::new(HashMap::new()),
            tcp_timeout: Duration::seconds(config.tcp_timeout as i64),
            udp_timeout: Duration::seconds(config.udp_timeout as i64),
            max_flows: config.max_flows,
            dropped_flows: AtomicU64::new(0),
        }
    }

    /// Account a packet to its flow, creating the flow if the key is new.
    ///
    /// The forward probe, the reverse probe, the optional insert, and the
    /// statistics update form a single critical section; no other thread
    /// can observe a half-inserted flow. Returns the packet's direction,
    /// or `None` when the table is full and the packet was dropped.
    pub fn record(&self, key: FlowKey, pkt: &IpPacket) -> Option<bool> {
        let mut flows = self.flows.write();

        if let Some(flow) = flows.get_mut(&key) {
            flow.update(pkt, true);
            return Some(true);
        }

        let reverse = key.reverse();
        if let Some(flow) = flows.get_mut(&reverse) {
            flow.update(pkt, false);
            return Some(false);
        }

        if flows.len() >= self.max_flows {
            self.dropped_flows.fetch_add(1, Ordering::Relaxed);
            debug!(flow = %key, "flow table full, dropping packet");
            return None;
        }

        let mut flow = Flow::new(key.clone(), pkt);
        flow.update(pkt, true);
        flows.insert(key, flow);
        Some(true)
    }

    /// Remove and return every flow idle past its timeout.
    ///
    /// Keys are collected first and deleted afterwards to bound the time
    /// each map entry is touched under the write lock.
    pub fn expire(&self, now: DateTime<Utc>) -> Vec<Flow> {
        let mut flows = self.flows.write();

        let expired_keys: Vec<FlowKey> = flows
            .iter()
            .filter_map(|(key, flow)| {
                let idle = now.signed_duration_since(flow.last_time);
                (idle > self.timeout_for(key.protocol)).then(|| key.clone())
            })
            .collect();

        expired_keys
            .into_iter()
            .filter_map(|key| flows.remove(&key))
            .collect()
    }

    /// Number of live flows.
    pub fn count(&self) -> usize {
        self.flows.read().len()
    }

    /// Up to `limit` brief records for the dashboard.
    pub fn recent(&self, limit: usize) -> Vec<FlowBrief> {
        let flows = self.flows.read();
        let now = Utc::now();

        flows
            .values()
            .take(limit)
            .map(|flow| {
                let secs = now
                    .signed_duration_since(flow.start_time)
                    .num_seconds()
                    .max(0);
                FlowBrief {
                    src_port: flow.key.src_port,
                    dst_port: flow.key.dst_port,
                    protocol: if flow.key.protocol == protocol::UDP {
                        "UDP".to_string()
                    } else {
                        "TCP".to_string()
                    },
                    duration: format!("{}s", secs),
                }
            })
            .collect()
    }

    /// Copy of a flow for inspection. Flows are never aliased out of the
    /// table; callers get derived state only.
    pub fn lookup(&self, key: &FlowKey) -> Option<Flow> {
        let flows = self.flows.read();
        flows
            .get(key)
            .or_else(|| flows.get(&key.reverse()))
            .cloned()
    }

    /// Packets dropped because the table was at capacity.
    pub fn dropped_flows(&self) -> u64 {
        self.dropped_flows.load(Ordering::Relaxed)
    }

    fn timeout_for(&self, proto: u8) -> Duration {
        if proto == protocol::TCP {
            self.tcp_timeout
        } else {
            self.udp_timeout
        }
    }
}
