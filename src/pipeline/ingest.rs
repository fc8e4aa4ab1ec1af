//! Ingest worker
//!
//! Drains the packet source: decode, account traffic direction, resolve
//! the flow, update statistics. A single bad packet never fails the
//! loop; non-IP and malformed frames are skipped silently.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use ipnetwork::IpNetwork;
use tokio::sync::watch;
use tracing::{debug, info};

use super::traffic::{classify_direction, TrafficTracker};
use crate::capture::{PacketSource, RawFrame, SourcePoll};
use crate::decode;
use crate::flow::{FlowKey, FlowTable};

/// How long one source poll may block before the shutdown flag is
/// rechecked.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// True when the textual address falls inside any home net block.
pub fn is_home_net(nets: &[IpNetwork], addr: &str) -> bool {
    match addr.parse::<IpAddr>() {
        Ok(ip) => nets.iter().any(|net| net.contains(ip)),
        Err(_) => false,
    }
}

pub struct IngestWorker {
    pub table: Arc<FlowTable>,
    pub traffic: Arc<TrafficTracker>,
    pub home_nets: Vec<IpNetwork>,
}

impl IngestWorker {
    /// Blocking drain loop; runs until the source ends or shutdown is
    /// signaled.
    pub fn run(self, mut source: Box<dyn PacketSource>, shutdown: watch::Receiver<bool>) {
        info!("Ingest worker started");

        loop {
            if *shutdown.borrow() {
                break;
            }
            match source.next_frame(POLL_INTERVAL) {
                SourcePoll::Frame(frame) => self.handle_frame(&frame),
                SourcePoll::Timeout => {}
                SourcePoll::Closed => {
                    info!("Packet source ended");
                    break;
                }
            }
        }

        source.close();
        info!("Ingest worker stopped");
    }

    fn handle_frame(&self, frame: &RawFrame) {
        let Some(pkt) = decode::decode(frame) else {
            return;
        };

        let len = frame.capture_len as u64;
        let src_home = is_home_net(&self.home_nets, &pkt.src_ip);
        let dst_home = is_home_net(&self.home_nets, &pkt.dst_ip);
        let (inbound, outbound) = classify_direction(src_home, dst_home, len);
        self.traffic.add(inbound, outbound);

        let key = FlowKey::from_packet(&pkt);
        if self.table.record(key, &pkt).is_none() {
            debug!("packet not accounted, flow table at capacity");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FlowConfig;
    use crate::decode::testutil::tcp_test_frame;

    fn home_nets() -> Vec<IpNetwork> {
        vec![
            "192.168.0.0/16".parse().unwrap(),
            "10.0.0.0/8".parse().unwrap(),
        ]
    }

    #[test]
    fn test_is_home_net() {
        let nets = home_nets();
        assert!(is_home_net(&nets, "192.168.1.44"));
        assert!(is_home_net(&nets, "10.20.30.40"));
        assert!(!is_home_net(&nets, "8.8.8.8"));
        assert!(!is_home_net(&nets, "not-an-address"));
    }

    #[test]
    fn test_handle_frame_updates_table_and_traffic() {
        let worker = IngestWorker {
            table: Arc::new(FlowTable::new(&FlowConfig::default())),
            traffic: Arc::new(TrafficTracker::new()),
            home_nets: home_nets(),
        };

        // home -> external: outbound
        let data = tcp_test_frame([192, 168, 1, 1], 40000, [93, 184, 216, 34], 443, 0x02, 64240, b"");
        let len = data.len() as u32;
        let frame = RawFrame::new(chrono::Utc::now(), len, data);
        worker.handle_frame(&frame);

        assert_eq!(worker.table.count(), 1);
        let (inbound, outbound) = worker.traffic.totals();
        assert_eq!(inbound, 0);
        assert_eq!(outbound, len as u64);
    }

    #[test]
    fn test_handle_frame_skips_non_ip() {
        let worker = IngestWorker {
            table: Arc::new(FlowTable::new(&FlowConfig::default())),
            traffic: Arc::new(TrafficTracker::new()),
            home_nets: home_nets(),
        };

        let mut data = vec![0xffu8; 12];
        data.extend_from_slice(&[0x08, 0x06]); // ARP
        data.extend_from_slice(&[0u8; 28]);
        let frame = RawFrame::new(chrono::Utc::now(), data.len() as u32, data);
        worker.handle_frame(&frame);

        assert_eq!(worker.table.count(), 0);
        assert_eq!(worker.traffic.totals(), (0, 0));
    }
}
