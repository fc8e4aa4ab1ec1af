//! Flow feature extraction
//!
//! The element order is contractual: the scaler's mean/scale vectors and
//! the classifier's input schema are indexed the same way. Do not reorder.

use crate::flow::{mean, std_dev, Flow};

/// Dimension of the feature vector.
pub const FEATURE_COUNT: usize = 78;

/// Min accumulators never touched by an observation still hold their
/// large placeholder; map those (and any negative artifact) to 0.
fn sanitize(value: f64) -> f32 {
    if value >= 1e9 || value < 0.0 {
        return 0.0;
    }
    value as f32
}

/// Project a flow's accumulated statistics onto the 78-element vector.
pub fn extract(f: &Flow) -> Vec<f32> {
    let mut features = vec![0f32; FEATURE_COUNT];

    // 0: Destination Port
    features[0] = f.key.dst_port as f32;

    // 1: Flow Duration (microseconds)
    let duration = f
        .last_time
        .signed_duration_since(f.start_time)
        .num_microseconds()
        .unwrap_or(0) as f64;
    features[1] = duration as f32;

    // 2-5: packet and byte totals per direction
    features[2] = f.fwd_packets as f32;
    features[3] = f.bwd_packets as f32;
    features[4] = f.fwd_bytes as f32;
    features[5] = f.bwd_bytes as f32;

    // 6-9: Fwd Packet Length (Max, Min, Mean, Std)
    features[6] = f.fwd_pkt_len_max as f32;
    features[7] = sanitize(f.fwd_pkt_len_min);
    features[8] = mean(f.fwd_pkt_len_sum, f.fwd_packets) as f32;
    features[9] = std_dev(f.fwd_pkt_len_sum, f.fwd_pkt_len_sq_sum, f.fwd_packets) as f32;

    // 10-13: Bwd Packet Length (Max, Min, Mean, Std)
    features[10] = f.bwd_pkt_len_max as f32;
    features[11] = sanitize(f.bwd_pkt_len_min);
    features[12] = mean(f.bwd_pkt_len_sum, f.bwd_packets) as f32;
    features[13] = std_dev(f.bwd_pkt_len_sum, f.bwd_pkt_len_sq_sum, f.bwd_packets) as f32;

    // 14-15: Flow Bytes/s, Flow Packets/s
    let total_pkts = f.fwd_packets + f.bwd_packets;
    if duration > 0.0 {
        let secs = duration / 1_000_000.0;
        features[14] = ((f.fwd_bytes + f.bwd_bytes) as f64 / secs) as f32;
        features[15] = (total_pkts as f64 / secs) as f32;
    }

    // 16-19: Flow IAT (Mean, Std, Max, Min); samples = packets - 1
    let iat_count = total_pkts.saturating_sub(1);
    features[16] = mean(f.flow_iat_sum, iat_count) as f32;
    features[17] = std_dev(f.flow_iat_sum, f.flow_iat_sq_sum, iat_count) as f32;
    features[18] = f.flow_iat_max as f32;
    features[19] = sanitize(f.flow_iat_min);

    // 20-24: Fwd IAT (Total, Mean, Std, Max, Min)
    let fwd_iat_count = f.fwd_packets.saturating_sub(1);
    features[20] = f.fwd_iat_sum as f32;
    features[21] = mean(f.fwd_iat_sum, fwd_iat_count) as f32;
    features[22] = std_dev(f.fwd_iat_sum, f.fwd_iat_sq_sum, fwd_iat_count) as f32;
    features[23] = f.fwd_iat_max as f32;
    features[24] = sanitize(f.fwd_iat_min);

    // 25-29: Bwd IAT (Total, Mean, Std, Max, Min)
    let bwd_iat_count = f.bwd_packets.saturating_sub(1);
    features[25] = f.bwd_iat_sum as f32;
    features[26] = mean(f.bwd_iat_sum, bwd_iat_count) as f32;
    features[27] = std_dev(f.bwd_iat_sum, f.bwd_iat_sq_sum, bwd_iat_count) as f32;
    features[28] = f.bwd_iat_max as f32;
    features[29] = sanitize(f.bwd_iat_min);

    // 30-33: PSH/URG flags per direction
    features[30] = f.fwd_psh_flags as f32;
    features[31] = f.bwd_psh_flags as f32;
    features[32] = f.fwd_urg_flags as f32;
    features[33] = f.bwd_urg_flags as f32;

    // 34-35: header length totals
    features[34] = f.fwd_header_len as f32;
    features[35] = f.bwd_header_len as f32;

    // 36-37: packets/s per direction
    if duration > 0.0 {
        let secs = duration / 1_000_000.0;
        features[36] = (f.fwd_packets as f64 / secs) as f32;
        features[37] = (f.bwd_packets as f64 / secs) as f32;
    }

    // 38-42: combined packet length (Min, Max, Mean, Std, Var)
    features[38] = sanitize(f.pkt_len_min);
    features[39] = f.pkt_len_max as f32;
    features[40] = mean(f.pkt_len_sum, total_pkts) as f32;
    let pkt_std = std_dev(f.pkt_len_sum, f.pkt_len_sq_sum, total_pkts);
    features[41] = pkt_std as f32;
    features[42] = (pkt_std * pkt_std) as f32;

    // 43-50: global TCP flag counts
    features[43] = f.fin_flag_count as f32;
    features[44] = f.syn_flag_count as f32;
    features[45] = f.rst_flag_count as f32;
    features[46] = f.psh_flag_count as f32;
    features[47] = f.ack_flag_count as f32;
    features[48] = f.urg_flag_count as f32;
    features[49] = f.cwr_flag_count as f32;
    features[50] = f.ece_flag_count as f32;

    // 51: Down/Up ratio
    if f.fwd_packets > 0 {
        features[51] = f.bwd_packets as f32 / f.fwd_packets as f32;
    }

    // 52: average packet size
    features[52] = mean(f.pkt_len_sum, total_pkts) as f32;

    // 53-54: average segment size per direction
    features[53] = mean(f.fwd_pkt_len_sum, f.fwd_packets) as f32;
    features[54] = mean(f.bwd_pkt_len_sum, f.bwd_packets) as f32;

    // 55: forward header length again; the model's training schema
    // carries the column twice
    features[55] = f.fwd_header_len as f32;

    // 56-61: bulk-transfer statistics, not tracked in this revision
    // (left at zero)

    // 62-65: subflow counts mirror the flow totals
    features[62] = f.fwd_packets as f32;
    features[63] = f.fwd_bytes as f32;
    features[64] = f.bwd_packets as f32;
    features[65] = f.bwd_bytes as f32;

    // 66-67: initial TCP windows
    features[66] = f.init_win_bytes_fwd as f32;
    features[67] = f.init_win_bytes_bwd as f32;

    // 68: forward packets with data
    features[68] = f.fwd_act_data_pkts as f32;

    // 69: minimum forward segment size
    features[69] = f.fwd_min_seg_size as f32;

    // 70-77: active/idle summaries from the (zero) accumulators
    features[70] = f.active_sum as f32;
    features[71] = std_dev(f.active_sum, f.active_sq_sum, 1) as f32;
    features[72] = f.active_max as f32;
    features[73] = sanitize(f.active_min);
    features[74] = f.idle_sum as f32;
    features[75] = std_dev(f.idle_sum, f.idle_sq_sum, 1) as f32;
    features[76] = f.idle_max as f32;
    features[77] = sanitize(f.idle_min);

    features
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::stats::testutil::*;
    use crate::flow::FlowKey;
    use chrono::{DateTime, TimeZone, Utc};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn approx(value: f32, expected: f32) -> bool {
        (value - expected).abs() < 1e-3 * expected.abs().max(1.0)
    }

    #[test]
    fn test_vector_length() {
        let pkt = tcp_packet(t0(), "192.168.1.1", 1, "10.0.0.1", 80, 60, 0x02, 1024, b"");
        let mut flow = Flow::new(FlowKey::from_packet(&pkt), &pkt);
        flow.update(&pkt, true);

        assert_eq!(extract(&flow).len(), FEATURE_COUNT);
    }

    #[test]
    fn test_single_syn_features() {
        let pkt = tcp_packet(t0(), "192.168.1.1", 12345, "10.0.0.1", 80, 60, 0x02, 64240, b"");
        let mut flow = Flow::new(FlowKey::from_packet(&pkt), &pkt);
        flow.update(&pkt, true);

        let v = extract(&flow);
        assert_eq!(v[0], 80.0); // destination port
        assert_eq!(v[2], 1.0); // fwd packets
        assert_eq!(v[3], 0.0); // bwd packets
        assert_eq!(v[4], 60.0); // fwd bytes
        assert_eq!(v[44], 1.0); // SYN count
        assert_eq!(v[66], 64240.0); // init win fwd
    }

    #[test]
    fn test_single_packet_no_nan() {
        let pkt = tcp_packet(t0(), "192.168.1.1", 1, "10.0.0.1", 80, 60, 0x02, 1024, b"");
        let mut flow = Flow::new(FlowKey::from_packet(&pkt), &pkt);
        flow.update(&pkt, true);

        let v = extract(&flow);
        for (i, value) in v.iter().enumerate() {
            assert!(value.is_finite(), "feature {} is not finite: {}", i, value);
        }
        // stddev and IAT fields collapse to 0, not NaN
        assert_eq!(v[9], 0.0);
        assert_eq!(v[16], 0.0);
        assert_eq!(v[17], 0.0);
        assert_eq!(v[19], 0.0); // sentinel min -> 0
    }

    #[test]
    fn test_zero_duration_rates() {
        let pkt = tcp_packet(t0(), "192.168.1.1", 1, "10.0.0.1", 80, 60, 0x02, 1024, b"");
        let mut flow = Flow::new(FlowKey::from_packet(&pkt), &pkt);
        flow.update(&pkt, true);

        let v = extract(&flow);
        assert_eq!(v[1], 0.0); // duration
        assert_eq!(v[14], 0.0); // bytes/s
        assert_eq!(v[15], 0.0); // pkts/s
        assert_eq!(v[36], 0.0);
        assert_eq!(v[37], 0.0);
    }

    #[test]
    fn test_untouched_mins_map_to_zero() {
        let pkt = tcp_packet(t0(), "192.168.1.1", 1, "10.0.0.1", 80, 60, 0x02, 1024, b"");
        let mut flow = Flow::new(FlowKey::from_packet(&pkt), &pkt);
        flow.update(&pkt, true);

        let v = extract(&flow);
        assert_eq!(v[11], 0.0); // bwd pkt len min, no bwd packets
        assert_eq!(v[24], 0.0); // fwd IAT min, single packet
        assert_eq!(v[29], 0.0); // bwd IAT min
        assert_eq!(v[73], 0.0); // active min placeholder
        assert_eq!(v[77], 0.0); // idle min placeholder
    }

    #[test]
    fn test_bidirectional_features() {
        let fwd1 = tcp_packet(t0(), "192.168.1.1", 12345, "10.0.0.1", 80, 60, 0x02, 64240, b"");
        let mut flow = Flow::new(FlowKey::from_packet(&fwd1), &fwd1);
        flow.update(&fwd1, true);

        let bwd = tcp_packet(
            t0() + chrono::Duration::milliseconds(10),
            "10.0.0.1",
            80,
            "192.168.1.1",
            12345,
            40,
            0x12,
            29200,
            b"",
        );
        flow.update(&bwd, false);

        let fwd2 = tcp_packet(
            t0() + chrono::Duration::milliseconds(20),
            "192.168.1.1",
            12345,
            "10.0.0.1",
            80,
            100,
            0x18,
            64240,
            b"hello",
        );
        flow.update(&fwd2, true);

        let v = extract(&flow);
        assert_eq!(v[1], 20_000.0); // duration in microseconds
        assert!(approx(v[14], 10_000.0)); // 200 bytes / 0.02 s
        assert!(approx(v[15], 150.0)); // 3 packets / 0.02 s
        assert_eq!(v[2], 2.0);
        assert_eq!(v[3], 1.0);
        assert_eq!(v[44], 2.0); // SYN
        assert_eq!(v[47], 2.0); // ACK
        assert_eq!(v[46], 1.0); // PSH
        assert_eq!(v[30], 1.0); // fwd PSH
        assert!(approx(v[51], 0.5)); // bwd/fwd ratio
        assert_eq!(v[38], 40.0); // combined min
        assert_eq!(v[39], 100.0); // combined max
        // subflow mirrors totals
        assert_eq!(v[62], v[2]);
        assert_eq!(v[63], v[4]);
        // duplicated forward header length column
        assert_eq!(v[55], v[34]);
        // bulk features stay zero
        for i in 56..=61 {
            assert_eq!(v[i], 0.0);
        }
    }
}
