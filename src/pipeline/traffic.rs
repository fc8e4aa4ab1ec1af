//! Inbound/outbound traffic accounting
//!
//! Byte totals accumulate as packets are ingested; a once-per-second
//! sampler converts the deltas to Mbps. All access goes through one
//! short lock.

use parking_lot::Mutex;

#[derive(Debug, Default)]
struct TrafficState {
    bytes_in: u64,
    bytes_out: u64,
    rate_in_mbps: f64,
    rate_out_mbps: f64,
    last_in: u64,
    last_out: u64,
}

/// Shared byte counters plus derived rates.
#[derive(Debug, Default)]
pub struct TrafficTracker {
    state: Mutex<TrafficState>,
}

impl TrafficTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Account one packet's bytes to the inbound/outbound totals.
    pub fn add(&self, inbound: u64, outbound: u64) {
        let mut state = self.state.lock();
        state.bytes_in += inbound;
        state.bytes_out += outbound;
    }

    /// Fold the bytes accumulated since the previous call into the rate
    /// fields. Called once per second by the sampler task.
    pub fn sample(&self) {
        let mut state = self.state.lock();
        let diff_in = state.bytes_in - state.last_in;
        let diff_out = state.bytes_out - state.last_out;

        state.rate_in_mbps = (diff_in * 8) as f64 / 1_000_000.0;
        state.rate_out_mbps = (diff_out * 8) as f64 / 1_000_000.0;

        state.last_in = state.bytes_in;
        state.last_out = state.bytes_out;
    }

    /// Current (inbound, outbound) rates in Mbps.
    pub fn rates(&self) -> (f64, f64) {
        let state = self.state.lock();
        (state.rate_in_mbps, state.rate_out_mbps)
    }

    /// Lifetime (inbound, outbound) byte totals.
    pub fn totals(&self) -> (u64, u64) {
        let state = self.state.lock();
        (state.bytes_in, state.bytes_out)
    }
}

/// Split one packet's bytes into (inbound, outbound) contributions.
///
/// A source inside the home net counts as outbound, a destination inside
/// counts as inbound. Traffic touching no home net is accounted as
/// inbound, the transit fallback.
pub fn classify_direction(src_home: bool, dst_home: bool, len: u64) -> (u64, u64) {
    let mut inbound = 0;
    let mut outbound = 0;

    if src_home {
        outbound = len;
    }
    if dst_home {
        inbound = len;
    }
    if !src_home && !dst_home {
        inbound = len;
    }

    (inbound, outbound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_classification() {
        // outbound only
        assert_eq!(classify_direction(true, false, 100), (0, 100));
        // inbound only
        assert_eq!(classify_direction(false, true, 100), (100, 0));
        // internal traffic counts both ways
        assert_eq!(classify_direction(true, true, 100), (100, 100));
        // transit fallback
        assert_eq!(classify_direction(false, false, 100), (100, 0));
    }

    #[test]
    fn test_rate_sampling() {
        let tracker = TrafficTracker::new();
        tracker.add(125_000, 250_000);
        tracker.sample();

        let (rate_in, rate_out) = tracker.rates();
        assert!((rate_in - 1.0).abs() < 1e-9); // 125 KB/s = 1 Mbps
        assert!((rate_out - 2.0).abs() < 1e-9);

        // no new traffic: rates decay to zero on the next sample
        tracker.sample();
        assert_eq!(tracker.rates(), (0.0, 0.0));

        assert_eq!(tracker.totals(), (125_000, 250_000));
    }
}
