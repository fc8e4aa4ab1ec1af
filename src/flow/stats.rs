//! Per-flow statistic accumulation
//!
//! Every counter the feature extractor needs is maintained incrementally
//! here so that extraction on expiry is O(1): counts, byte totals,
//! min/max/sum/sum-of-squares of packet lengths, inter-arrival times in
//! microseconds, TCP flag tallies, header-length accumulators, and the
//! audit payload buffer.

use chrono::{DateTime, Utc};

use super::key::FlowKey;
use crate::decode::{protocol, IpPacket};

/// Placeholder for min counters with no observation yet; the extractor
/// maps it to 0.
pub const MIN_SENTINEL: f64 = 1e9;

/// Audit payload caps: first 10 packets, at most 4096 bytes total.
const PAYLOAD_MAX_BYTES: usize = 4096;
const PAYLOAD_MAX_PACKETS: u32 = 10;

/// State of a single bidirectional conversation.
///
/// Owned by the flow table; mutated only under its write lock, and never
/// mutated again once `expire` has handed it out.
#[derive(Debug, Clone)]
pub struct Flow {
    pub key: FlowKey,
    pub start_time: DateTime<Utc>,
    pub last_time: DateTime<Utc>,

    // Base counts
    pub fwd_packets: u64,
    pub bwd_packets: u64,
    pub fwd_bytes: u64,
    pub bwd_bytes: u64,

    // Packet length stats (forward)
    pub fwd_pkt_len_max: f64,
    pub fwd_pkt_len_min: f64,
    pub fwd_pkt_len_sum: f64,
    pub fwd_pkt_len_sq_sum: f64,

    // Packet length stats (backward)
    pub bwd_pkt_len_max: f64,
    pub bwd_pkt_len_min: f64,
    pub bwd_pkt_len_sum: f64,
    pub bwd_pkt_len_sq_sum: f64,

    // Packet length stats (combined)
    pub pkt_len_max: f64,
    pub pkt_len_min: f64,
    pub pkt_len_sum: f64,
    pub pkt_len_sq_sum: f64,

    // Inter-arrival times, microseconds (whole flow)
    pub flow_iat_max: f64,
    pub flow_iat_min: f64,
    pub flow_iat_sum: f64,
    pub flow_iat_sq_sum: f64,

    // Forward IAT
    last_fwd_time: Option<DateTime<Utc>>,
    pub fwd_iat_max: f64,
    pub fwd_iat_min: f64,
    pub fwd_iat_sum: f64,
    pub fwd_iat_sq_sum: f64,

    // Backward IAT
    last_bwd_time: Option<DateTime<Utc>>,
    pub bwd_iat_max: f64,
    pub bwd_iat_min: f64,
    pub bwd_iat_sum: f64,
    pub bwd_iat_sq_sum: f64,

    // Per-direction PSH/URG tallies
    pub fwd_psh_flags: u64,
    pub bwd_psh_flags: u64,
    pub fwd_urg_flags: u64,
    pub bwd_urg_flags: u64,

    // Global TCP flag tallies
    pub fin_flag_count: u64,
    pub syn_flag_count: u64,
    pub rst_flag_count: u64,
    pub psh_flag_count: u64,
    pub ack_flag_count: u64,
    pub urg_flag_count: u64,
    pub cwr_flag_count: u64,
    pub ece_flag_count: u64,

    // Header length accumulators
    pub fwd_header_len: u64,
    pub bwd_header_len: u64,

    // TCP window at the first packet of each direction
    pub init_win_bytes_fwd: u32,
    pub init_win_bytes_bwd: u32,

    /// Forward packets carrying data
    pub fwd_act_data_pkts: u64,
    /// Minimum forward TCP header length in bytes; 0 until first observed
    pub fwd_min_seg_size: u32,

    // Active/idle summaries. Accumulation is not wired up in this
    // revision; the extractor emits them from these zero values.
    pub active_sum: f64,
    pub active_max: f64,
    pub active_min: f64,
    pub active_sq_sum: f64,
    pub idle_sum: f64,
    pub idle_max: f64,
    pub idle_min: f64,
    pub idle_sq_sum: f64,

    last_flow_pkt_time: DateTime<Utc>,

    /// Application payload of the first packets, for attack auditing.
    pub raw_payload: Vec<u8>,
    pkt_count: u32,
}

impl Flow {
    /// Initialize a new flow from its first packet.
    pub fn new(key: FlowKey, pkt: &IpPacket) -> Self {
        let now = resolve_timestamp(pkt.timestamp);

        Self {
            key,
            start_time: now,
            last_time: now,

            fwd_packets: 0,
            bwd_packets: 0,
            fwd_bytes: 0,
            bwd_bytes: 0,

            fwd_pkt_len_max: 0.0,
            fwd_pkt_len_min: MIN_SENTINEL,
            fwd_pkt_len_sum: 0.0,
            fwd_pkt_len_sq_sum: 0.0,

            bwd_pkt_len_max: 0.0,
            bwd_pkt_len_min: MIN_SENTINEL,
            bwd_pkt_len_sum: 0.0,
            bwd_pkt_len_sq_sum: 0.0,

            pkt_len_max: 0.0,
            pkt_len_min: MIN_SENTINEL,
            pkt_len_sum: 0.0,
            pkt_len_sq_sum: 0.0,

            flow_iat_max: 0.0,
            flow_iat_min: MIN_SENTINEL,
            flow_iat_sum: 0.0,
            flow_iat_sq_sum: 0.0,

            last_fwd_time: None,
            fwd_iat_max: 0.0,
            fwd_iat_min: MIN_SENTINEL,
            fwd_iat_sum: 0.0,
            fwd_iat_sq_sum: 0.0,

            last_bwd_time: None,
            bwd_iat_max: 0.0,
            bwd_iat_min: MIN_SENTINEL,
            bwd_iat_sum: 0.0,
            bwd_iat_sq_sum: 0.0,

            fwd_psh_flags: 0,
            bwd_psh_flags: 0,
            fwd_urg_flags: 0,
            bwd_urg_flags: 0,

            fin_flag_count: 0,
            syn_flag_count: 0,
            rst_flag_count: 0,
            psh_flag_count: 0,
            ack_flag_count: 0,
            urg_flag_count: 0,
            cwr_flag_count: 0,
            ece_flag_count: 0,

            fwd_header_len: 0,
            bwd_header_len: 0,

            init_win_bytes_fwd: 0,
            init_win_bytes_bwd: 0,

            fwd_act_data_pkts: 0,
            fwd_min_seg_size: 0,

            active_sum: 0.0,
            active_max: 0.0,
            active_min: MIN_SENTINEL,
            active_sq_sum: 0.0,
            idle_sum: 0.0,
            idle_max: 0.0,
            idle_min: MIN_SENTINEL,
            idle_sq_sum: 0.0,

            last_flow_pkt_time: now,

            raw_payload: Vec::new(),
            pkt_count: 0,
        }
    }

    /// Account one packet to this flow. `is_forward` is true when the
    /// packet travels in the direction the flow was created with.
    pub fn update(&mut self, pkt: &IpPacket, is_forward: bool) {
        let now = resolve_timestamp(pkt.timestamp);

        // Flow IAT; the first packet contributes no sample.
        if self.fwd_packets + self.bwd_packets > 0 {
            let iat = micros_between(self.last_flow_pkt_time, now);
            if iat > self.flow_iat_max {
                self.flow_iat_max = iat;
            }
            if iat < self.flow_iat_min {
                self.flow_iat_min = iat;
            }
            self.flow_iat_sum += iat;
            self.flow_iat_sq_sum += iat * iat;
        }
        self.last_flow_pkt_time = now;
        self.last_time = now;

        // Audit payload from the first packets
        self.pkt_count += 1;
        if self.pkt_count <= PAYLOAD_MAX_PACKETS
            && self.raw_payload.len() < PAYLOAD_MAX_BYTES
            && !pkt.payload.is_empty()
        {
            let room = PAYLOAD_MAX_BYTES - self.raw_payload.len();
            let take = pkt.payload.len().min(room);
            self.raw_payload.extend_from_slice(&pkt.payload[..take]);
        }

        // Combined packet length stats
        let pkt_len = pkt.length as f64;
        if pkt_len > self.pkt_len_max {
            self.pkt_len_max = pkt_len;
        }
        if pkt_len < self.pkt_len_min {
            self.pkt_len_min = pkt_len;
        }
        self.pkt_len_sum += pkt_len;
        self.pkt_len_sq_sum += pkt_len * pkt_len;

        // TCP flag tallies and initial window capture
        if let Some(tcp) = &pkt.tcp {
            self.tally_flags(tcp.flags.to_byte());
            if is_forward && self.fwd_packets == 0 {
                self.init_win_bytes_fwd = tcp.window as u32;
            } else if !is_forward && self.bwd_packets == 0 {
                self.init_win_bytes_bwd = tcp.window as u32;
            }
        }

        // Header length. The IP contribution counts the IPv4 header only.
        let mut header_len: u64 = if pkt.version == 4 {
            pkt.ip_header_len as u64
        } else {
            0
        };
        if let Some(tcp) = &pkt.tcp {
            header_len += tcp.data_offset as u64;
            if is_forward {
                let seg = tcp.data_offset as u32;
                if self.fwd_min_seg_size == 0 || seg < self.fwd_min_seg_size {
                    self.fwd_min_seg_size = seg;
                }
            }
        } else if pkt.protocol == protocol::UDP {
            header_len += 8;
        }

        if is_forward {
            self.fwd_packets += 1;
            self.fwd_bytes += pkt.length as u64;
            self.fwd_header_len += header_len;

            if pkt_len > self.fwd_pkt_len_max {
                self.fwd_pkt_len_max = pkt_len;
            }
            if pkt_len < self.fwd_pkt_len_min {
                self.fwd_pkt_len_min = pkt_len;
            }
            self.fwd_pkt_len_sum += pkt_len;
            self.fwd_pkt_len_sq_sum += pkt_len * pkt_len;

            if let Some(last) = self.last_fwd_time {
                let iat = micros_between(last, now);
                if iat > self.fwd_iat_max {
                    self.fwd_iat_max = iat;
                }
                if iat < self.fwd_iat_min {
                    self.fwd_iat_min = iat;
                }
                self.fwd_iat_sum += iat;
                self.fwd_iat_sq_sum += iat * iat;
            }
            self.last_fwd_time = Some(now);

            if pkt_len > 0.0 {
                self.fwd_act_data_pkts += 1;
            }
            if let Some(tcp) = &pkt.tcp {
                if tcp.flags.psh {
                    self.fwd_psh_flags += 1;
                }
                if tcp.flags.urg {
                    self.fwd_urg_flags += 1;
                }
            }
        } else {
            self.bwd_packets += 1;
            self.bwd_bytes += pkt.length as u64;
            self.bwd_header_len += header_len;

            if pkt_len > self.bwd_pkt_len_max {
                self.bwd_pkt_len_max = pkt_len;
            }
            if pkt_len < self.bwd_pkt_len_min {
                self.bwd_pkt_len_min = pkt_len;
            }
            self.bwd_pkt_len_sum += pkt_len;
            self.bwd_pkt_len_sq_sum += pkt_len * pkt_len;

            if let Some(last) = self.last_bwd_time {
                let iat = micros_between(last, now);
                if iat > self.bwd_iat_max {
                    self.bwd_iat_max = iat;
                }
                if iat < self.bwd_iat_min {
                    self.bwd_iat_min = iat;
                }
                self.bwd_iat_sum += iat;
                self.bwd_iat_sq_sum += iat * iat;
            }
            self.last_bwd_time = Some(now);

            if let Some(tcp) = &pkt.tcp {
                if tcp.flags.psh {
                    self.bwd_psh_flags += 1;
                }
                if tcp.flags.urg {
                    self.bwd_urg_flags += 1;
                }
            }
        }
    }

    fn tally_flags(&mut self, flags: u8) {
        if flags & 0x01 != 0 {
            self.fin_flag_count += 1;
        }
        if flags & 0x02 != 0 {
            self.syn_flag_count += 1;
        }
        if flags & 0x04 != 0 {
            self.rst_flag_count += 1;
        }
        if flags & 0x08 != 0 {
            self.psh_flag_count += 1;
        }
        if flags & 0x10 != 0 {
            self.ack_flag_count += 1;
        }
        if flags & 0x20 != 0 {
            self.urg_flag_count += 1;
        }
        if flags & 0x40 != 0 {
            self.ece_flag_count += 1;
        }
        if flags & 0x80 != 0 {
            self.cwr_flag_count += 1;
        }
    }

    /// Total packets accounted so far.
    pub fn total_packets(&self) -> u64 {
        self.fwd_packets + self.bwd_packets
    }
}

/// Mean of an accumulated sum, 0 for an empty sample.
pub fn mean(sum: f64, count: u64) -> f64 {
    if count == 0 {
        return 0.0;
    }
    sum / count as f64
}

/// Population standard deviation from running sum and sum of squares;
/// 0 for fewer than two samples.
pub fn std_dev(sum: f64, sq_sum: f64, count: u64) -> f64 {
    if count <= 1 {
        return 0.0;
    }
    let m = sum / count as f64;
    let variance = (sq_sum / count as f64) - m * m;
    if variance < 0.0 {
        return 0.0;
    }
    variance.sqrt()
}

/// Microseconds between two timestamps as a real.
fn micros_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> f64 {
    later
        .signed_duration_since(earlier)
        .num_microseconds()
        .unwrap_or(0) as f64
}

/// A capture that cannot timestamp produces the epoch; substitute wall
/// clock at the moment of ingestion.
fn resolve_timestamp(ts: DateTime<Utc>) -> DateTime<Utc> {
    if ts.timestamp() == 0 && ts.timestamp_subsec_nanos() == 0 {
        Utc::now()
    } else {
        ts
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;
    use crate::decode::{IpPacket, TcpFlags, TcpMeta};

    pub fn tcp_packet(
        ts: DateTime<Utc>,
        src_ip: &str,
        src_port: u16,
        dst_ip: &str,
        dst_port: u16,
        length: u32,
        flags: u8,
        window: u16,
        payload: &[u8],
    ) -> IpPacket {
        IpPacket {
            timestamp: ts,
            length,
            src_ip: src_ip.to_string(),
            dst_ip: dst_ip.to_string(),
            src_port,
            dst_port,
            protocol: protocol::TCP,
            version: 4,
            ip_header_len: 20,
            ttl: 64,
            tcp: Some(TcpMeta {
                flags: TcpFlags::from_byte(flags),
                window,
                data_offset: 20,
            }),
            payload: payload.to_vec(),
        }
    }

    pub fn udp_packet(
        ts: DateTime<Utc>,
        src_ip: &str,
        src_port: u16,
        dst_ip: &str,
        dst_port: u16,
        length: u32,
        payload: &[u8],
    ) -> IpPacket {
        IpPacket {
            timestamp: ts,
            length,
            src_ip: src_ip.to_string(),
            dst_ip: dst_ip.to_string(),
            src_port,
            dst_port,
            protocol: protocol::UDP,
            version: 4,
            ip_header_len: 20,
            ttl: 64,
            tcp: None,
            payload: payload.to_vec(),
        }
    }
}
