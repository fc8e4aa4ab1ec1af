//! IPv4 header parsing

use std::net::Ipv4Addr;

/// Parsed IPv4 information
#[derive(Debug, Clone)]
pub struct Ipv4Info {
    /// Header length in bytes (IHL * 4, options included)
    pub header_length: usize,
    /// Time To Live
    pub ttl: u8,
    /// Protocol number (6=TCP, 17=UDP, 1=ICMP, etc.)
    pub protocol: u8,
    /// Source IP address
    pub src_ip: Ipv4Addr,
    /// Destination IP address
    pub dst_ip: Ipv4Addr,
}

/// IP protocol numbers
pub mod protocol {
    pub const ICMP: u8 = 1;
    pub const TCP: u8 = 6;
    pub const UDP: u8 = 17;
    pub const ICMPV6: u8 = 58;
}

/// Get protocol name from number
pub fn protocol_name(proto: u8) -> &'static str {
    match proto {
        protocol::ICMP => "ICMP",
        protocol::TCP => "TCP",
        protocol::UDP => "UDP",
        protocol::ICMPV6 => "ICMPv6",
        _ => "Other",
    }
}

/// Parse an IPv4 header
///
/// IPv4 header format:
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |Version|  IHL  |Type of Service|          Total Length         |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |         Identification        |Flags|      Fragment Offset    |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |  Time to Live |    Protocol   |         Header Checksum       |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                       Source Address                          |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                    Destination Address                        |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
pub fn parse_ipv4(data: &[u8]) -> Option<Ipv4Info> {
    if data.len() < 20 {
        return None;
    }

    let version = (data[0] >> 4) & 0x0F;
    if version != 4 {
        return None;
    }

    let ihl = (data[0] & 0x0F) as usize;
    let header_length = ihl * 4;
    if header_length < 20 || data.len() < header_length {
        return None;
    }

    let ttl = data[8];
    let protocol = data[9];
    let src_ip = Ipv4Addr::new(data[12], data[13], data[14], data[15]);
    let dst_ip = Ipv4Addr::new(data[16], data[17], data[18], data[19]);

    Some(Ipv4Info {
        header_length,
        ttl,
        protocol,
        src_ip,
        dst_ip,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ipv4_header() {
        // version=4, IHL=5, protocol=TCP, src=192.168.1.1, dst=192.168.1.2
        let data = vec![
            0x45, 0x00, // Version + IHL, DSCP + ECN
            0x00, 0x28, // Total length (40 bytes)
            0x00, 0x01, // Identification
            0x40, 0x00, // Flags (DF=1) + Fragment offset
            0x40, 0x06, // TTL (64) + Protocol (TCP)
            0x00, 0x00, // Header checksum
            0xc0, 0xa8, 0x01, 0x01, // Source: 192.168.1.1
            0xc0, 0xa8, 0x01, 0x02, // Destination: 192.168.1.2
        ];

        let info = parse_ipv4(&data).unwrap();
        assert_eq!(info.header_length, 20);
        assert_eq!(info.ttl, 64);
        assert_eq!(info.protocol, protocol::TCP);
        assert_eq!(info.src_ip.to_string(), "192.168.1.1");
        assert_eq!(info.dst_ip.to_string(), "192.168.1.2");
    }

    #[test]
    fn test_parse_ipv4_with_options() {
        // IHL=6 (24-byte header)
        let data = vec![
            0x46, 0x00,
            0x00, 0x2c,
            0x00, 0x01, 0x40, 0x00,
            0x40, 0x11, // TTL, Protocol (UDP)
            0x00, 0x00,
            0x0a, 0x00, 0x00, 0x01, // 10.0.0.1
            0x0a, 0x00, 0x00, 0x02, // 10.0.0.2
            0x00, 0x00, 0x00, 0x00, // Options (4 bytes padding)
        ];

        let info = parse_ipv4(&data).unwrap();
        assert_eq!(info.header_length, 24);
        assert_eq!(info.protocol, protocol::UDP);
    }

    #[test]
    fn test_invalid_version() {
        let data = vec![
            0x65, 0x00, 0x00, 0x28, 0x00, 0x01, 0x40, 0x00,
            0x40, 0x06, 0x00, 0x00,
            0xc0, 0xa8, 0x01, 0x01,
            0xc0, 0xa8, 0x01, 0x02,
        ];
        assert!(parse_ipv4(&data).is_none());
    }

    #[test]
    fn test_invalid_ihl() {
        let mut data = vec![0u8; 20];
        data[0] = 0x42; // version 4, IHL 2 (8 bytes, below minimum)
        assert!(parse_ipv4(&data).is_none());
    }

    #[test]
    fn test_truncated_header() {
        assert!(parse_ipv4(&[0x45, 0x00, 0x00]).is_none());
    }

    #[test]
    fn test_protocol_names() {
        assert_eq!(protocol_name(protocol::TCP), "TCP");
        assert_eq!(protocol_name(protocol::UDP), "UDP");
        assert_eq!(protocol_name(protocol::ICMP), "ICMP");
        assert_eq!(protocol_name(200), "Other");
    }
}
