//! Flow identity

use std::fmt;

use crate::decode::{protocol_name, IpPacket};

/// Unique identifier for a flow: the 5-tuple of the first observed packet.
///
/// Direction matters: the key preserves the original orientation so the
/// table can distinguish forward from backward traffic, and `reverse()`
/// produces the matching key for the opposite direction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FlowKey {
    pub src_ip: String,
    pub dst_ip: String,
    pub src_port: u16,
    pub dst_port: u16,
    pub protocol: u8,
}

impl FlowKey {
    /// Build a key from a decoded packet, preserving its orientation.
    pub fn from_packet(pkt: &IpPacket) -> Self {
        Self {
            src_ip: pkt.src_ip.clone(),
            dst_ip: pkt.dst_ip.clone(),
            src_port: pkt.src_port,
            dst_port: pkt.dst_port,
            protocol: pkt.protocol,
        }
    }

    /// The same conversation seen from the other endpoint.
    pub fn reverse(&self) -> Self {
        Self {
            src_ip: self.dst_ip.clone(),
            dst_ip: self.src_ip.clone(),
            src_port: self.dst_port,
            dst_port: self.src_port,
            protocol: self.protocol,
        }
    }
}

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} -> {}:{} [{}]",
            self.src_ip,
            self.src_port,
            self.dst_ip,
            self.dst_port,
            protocol_name(self.protocol)
        )
    }
}
