//! Frame decoding module
//!
//! Maps a raw captured frame to a structured [`IpPacket`] view exposing
//! the 5-tuple, TCP metadata, and application payload. Non-IP frames
//! (ARP, LLDP, anything else) and malformed frames decode to `None`;
//! a skip is not an error. All functions are stateless and safe to share
//! across threads.

pub mod ethernet;
pub mod ipv4;
pub mod ipv6;
pub mod transport;

use chrono::{DateTime, Utc};

use crate::capture::RawFrame;
pub use ipv4::{protocol, protocol_name};
pub use transport::TcpFlags;

/// TCP-specific view of a decoded packet.
#[derive(Debug, Clone)]
pub struct TcpMeta {
    pub flags: TcpFlags,
    pub window: u16,
    /// TCP header length in bytes (data offset * 4)
    pub data_offset: usize,
}

/// Structured view of a decoded IP packet.
#[derive(Debug, Clone)]
pub struct IpPacket {
    pub timestamp: DateTime<Utc>,
    /// Length of the packet as it appeared on the wire
    pub length: u32,
    /// Textual source address, used for flow keying
    pub src_ip: String,
    pub dst_ip: String,
    /// 0 when the transport layer is not TCP/UDP (or was truncated away)
    pub src_port: u16,
    pub dst_port: u16,
    /// IP protocol number (6 TCP, 17 UDP, other)
    pub protocol: u8,
    /// IP version (4 or 6)
    pub version: u8,
    /// IP header length in bytes (IHL*4 for IPv4, fixed 40 for IPv6)
    pub ip_header_len: usize,
    pub ttl: u8,
    pub tcp: Option<TcpMeta>,
    /// Application-layer payload
    pub payload: Vec<u8>,
}

/// Decode a captured frame. `None` means the frame is skipped.
pub fn decode(frame: &RawFrame) -> Option<IpPacket> {
    let data = frame.data.as_slice();
    let (ethertype, offset) = ethernet::parse_ethernet(data)?;

    match ethertype {
        ethernet::ETHERTYPE_IPV4 => {
            let ip = ipv4::parse_ipv4(data.get(offset..)?)?;
            let l4 = &data[offset + ip.header_length..];
            Some(assemble(
                frame,
                4,
                ip.header_length,
                ip.protocol,
                ip.src_ip.to_string(),
                ip.dst_ip.to_string(),
                ip.ttl,
                l4,
            ))
        }
        ethernet::ETHERTYPE_IPV6 => {
            let ip = ipv6::parse_ipv6(data.get(offset..)?)?;
            let l4 = &data[offset + ipv6::IPV6_HEADER_LEN..];
            Some(assemble(
                frame,
                6,
                ipv6::IPV6_HEADER_LEN,
                ip.next_header,
                ip.src_ip.to_string(),
                ip.dst_ip.to_string(),
                ip.hop_limit,
                l4,
            ))
        }
        _ => None,
    }
}

/// Attach the transport view. A transport header lost to snap-length
/// truncation degrades the packet to a portless one rather than skipping
/// it.
#[allow(clippy::too_many_arguments)]
fn assemble(
    frame: &RawFrame,
    version: u8,
    ip_header_len: usize,
    proto: u8,
    src_ip: String,
    dst_ip: String,
    ttl: u8,
    l4: &[u8],
) -> IpPacket {
    let mut pkt = IpPacket {
        timestamp: frame.timestamp,
        length: frame.original_len,
        src_ip,
        dst_ip,
        src_port: 0,
        dst_port: 0,
        protocol: proto,
        version,
        ip_header_len,
        ttl,
        tcp: None,
        payload: Vec::new(),
    };

    match proto {
        protocol::TCP => {
            if let Some(seg) = transport::parse_tcp(l4) {
                pkt.src_port = seg.src_port;
                pkt.dst_port = seg.dst_port;
                pkt.payload = l4[seg.data_offset..].to_vec();
                pkt.tcp = Some(TcpMeta {
                    flags: seg.flags,
                    window: seg.window,
                    data_offset: seg.data_offset,
                });
            }
        }
        protocol::UDP => {
            if let Some(dgram) = transport::parse_udp(l4) {
                pkt.src_port = dgram.src_port;
                pkt.dst_port = dgram.dst_port;
                pkt.payload = l4[transport::UDP_HEADER_LEN..].to_vec();
            }
        }
        _ => {}
    }

    pkt
}
