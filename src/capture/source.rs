//! Packet sources
//!
//! [`PacketSource`] is the pluggable sequence of captured frames the
//! pipeline drains. [`PnetSource`] is the live implementation: a capture
//! thread reads a pnet datalink channel and pushes frames into a bounded
//! queue; the queue is lossy under pressure so capture never blocks.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, TrySendError};
use pnet::datalink::{self, Channel, Config as DatalinkConfig};
use tracing::{debug, error, info};

use super::frame::RawFrame;
use super::interface::NetworkInterface;

/// Result of polling a packet source.
#[derive(Debug)]
pub enum SourcePoll {
    /// A frame arrived.
    Frame(RawFrame),
    /// Nothing arrived within the timeout; the stream is still open.
    Timeout,
    /// End of stream; no further frames will arrive.
    Closed,
}

/// A pluggable sequence of captured frames.
pub trait PacketSource: Send {
    /// Wait up to `timeout` for the next frame. The bounded wait lets the
    /// caller interleave shutdown checks with draining.
    fn next_frame(&mut self, timeout: Duration) -> SourcePoll;

    /// Release the underlying capture resources. Idempotent.
    fn close(&mut self);
}

/// Capture statistics
#[derive(Debug, Default)]
pub struct CaptureStats {
    /// Total packets captured
    pub packets_captured: AtomicU64,
    /// Total bytes captured
    pub bytes_captured: AtomicU64,
    /// Frames dropped because the queue was full
    pub packets_dropped: AtomicU64,
}

impl CaptureStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> CaptureStatsSnapshot {
        CaptureStatsSnapshot {
            packets_captured: self.packets_captured.load(Ordering::Relaxed),
            bytes_captured: self.bytes_captured.load(Ordering::Relaxed),
            packets_dropped: self.packets_dropped.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of capture statistics (non-atomic copy)
#[derive(Debug, Clone)]
pub struct CaptureStatsSnapshot {
    pub packets_captured: u64,
    pub bytes_captured: u64,
    pub packets_dropped: u64,
}

/// Live capture source backed by pnet's datalink layer.
pub struct PnetSource {
    interface_name: String,
    frames: Receiver<RawFrame>,
    stats: Arc<CaptureStats>,
    running: Arc<AtomicBool>,
    capture_thread: Option<JoinHandle<()>>,
}

impl PnetSource {
    /// Open `interface_name` for live capture and start the capture thread.
    pub fn new(
        interface_name: &str,
        snaplen: usize,
        promiscuous: bool,
        queue_size: usize,
    ) -> Result<Self> {
        let interface = NetworkInterface::by_name(interface_name)?;
        interface.validate_for_capture()?;

        let config = DatalinkConfig {
            read_timeout: Some(Duration::from_millis(100)),
            write_buffer_size: 0,
            read_buffer_size: 65536,
            promiscuous,
            ..Default::default()
        };

        let pnet_interface = datalink::interfaces()
            .into_iter()
            .find(|i| i.name == interface_name)
            .with_context(|| format!("Interface '{}' not found", interface_name))?;

        let mut rx = match datalink::channel(&pnet_interface, config) {
            Ok(Channel::Ethernet(_, rx)) => rx,
            Ok(_) => bail!("Unhandled datalink channel type"),
            Err(e) => bail!("Failed to open datalink channel on '{}': {}", interface_name, e),
        };

        let (tx, frames) = bounded(queue_size);
        let stats = Arc::new(CaptureStats::new());
        let running = Arc::new(AtomicBool::new(true));

        info!(
            "Started capture on interface '{}' (promiscuous: {}, snaplen: {})",
            interface_name, promiscuous, snaplen
        );

        let thread_stats = Arc::clone(&stats);
        let thread_running = Arc::clone(&running);
        let capture_thread = std::thread::spawn(move || {
            while thread_running.load(Ordering::SeqCst) {
                match rx.next() {
                    Ok(packet) => {
                        let original_len = packet.len() as u32;
                        thread_stats.packets_captured.fetch_add(1, Ordering::Relaxed);
                        thread_stats
                            .bytes_captured
                            .fetch_add(original_len as u64, Ordering::Relaxed);

                        let data = if packet.len() > snaplen {
                            packet[..snaplen].to_vec()
                        } else {
                            packet.to_vec()
                        };
                        let frame = RawFrame::new(Utc::now(), original_len, data);

                        match tx.try_send(frame) {
                            Ok(()) => {}
                            Err(TrySendError::Full(_)) => {
                                thread_stats.packets_dropped.fetch_add(1, Ordering::Relaxed);
                            }
                            Err(TrySendError::Disconnected(_)) => break,
                        }
                    }
                    Err(e) => {
                        // Read timeouts are the shutdown poll interval.
                        let err_str = e.to_string().to_lowercase();
                        if !err_str.contains("timed out") && !err_str.contains("timeout") {
                            error!("Error receiving packet: {}", e);
                        }
                    }
                }
            }
            debug!("Capture thread exiting");
        });

        Ok(Self {
            interface_name: interface_name.to_string(),
            frames,
            stats,
            running,
            capture_thread: Some(capture_thread),
        })
    }

    pub fn interface_name(&self) -> &str {
        &self.interface_name
    }

    pub fn stats(&self) -> Arc<CaptureStats> {
        Arc::clone(&self.stats)
    }
}

impl PacketSource for PnetSource {
    fn next_frame(&mut self, timeout: Duration) -> SourcePoll {
        match self.frames.recv_timeout(timeout) {
            Ok(frame) => SourcePoll::Frame(frame),
            Err(RecvTimeoutError::Timeout) => {
                if self.running.load(Ordering::SeqCst) {
                    SourcePoll::Timeout
                } else {
                    SourcePoll::Closed
                }
            }
            Err(RecvTimeoutError::Disconnected) => SourcePoll::Closed,
        }
    }

    fn close(&mut self) {
        if self.running.swap(false, Ordering::SeqCst) {
            if let Some(handle) = self.capture_thread.take() {
                let _ = handle.join();
            }
            let stats = self.stats.snapshot();
            info!(
                "Capture stopped on '{}': packets={}, bytes={}, dropped={}",
                self.interface_name,
                stats.packets_captured,
                stats.bytes_captured,
                stats.packets_dropped
            );
        }
    }
}

impl Drop for PnetSource {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// In-memory source used across the test suite.
    pub struct VecSource {
        frames: std::vec::IntoIter<RawFrame>,
        closed: bool,
    }

    impl VecSource {
        pub fn new(frames: Vec<RawFrame>) -> Self {
            Self {
                frames: frames.into_iter(),
                closed: false,
            }
        }
    }

    impl PacketSource for VecSource {
        fn next_frame(&mut self, _timeout: Duration) -> SourcePoll {
            if self.closed {
                return SourcePoll::Closed;
            }
            match self.frames.next() {
                Some(f) => SourcePoll::Frame(f),
                None => SourcePoll::Closed,
            }
        }

        fn close(&mut self) {
            self.closed = true;
        }
    }

    #[test]
    fn test_vec_source_drains_then_closes() {
        let frames = vec![
            RawFrame::new(Utc::now(), 60, vec![0u8; 60]),
            RawFrame::new(Utc::now(), 40, vec![0u8; 40]),
        ];
        let mut source = VecSource::new(frames);

        assert!(matches!(source.next_frame(Duration::ZERO), SourcePoll::Frame(_)));
        assert!(matches!(source.next_frame(Duration::ZERO), SourcePoll::Frame(_)));
        assert!(matches!(source.next_frame(Duration::ZERO), SourcePoll::Closed));
    }

    #[test]
    fn test_close_ends_stream() {
        let mut source = VecSource::new(vec![RawFrame::new(Utc::now(), 60, vec![0u8; 60])]);
        source.close();
        assert!(matches!(source.next_frame(Duration::ZERO), SourcePoll::Closed));
    }

    #[test]
    fn test_capture_stats_snapshot() {
        let stats = CaptureStats::new();
        stats.packets_captured.fetch_add(100, Ordering::Relaxed);
        stats.bytes_captured.fetch_add(5000, Ordering::Relaxed);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.packets_captured, 100);
        assert_eq!(snapshot.bytes_captured, 5000);
        assert_eq!(snapshot.packets_dropped, 0);
    }
}
