// src/model.rs
use chrono::{DateTime, Local};
use std::net::Ipv4Addr;

/// Link-layer framing of a captured buffer, derived from the pcap datalink value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkType {
    Ethernet,
    /// Bare IP packet with no link header
    RawIp,
    /// BSD loopback, 4-byte address family header
    Loopback,
    /// Linux cooked capture (`any` device), 16-byte header
    LinuxSll,
    Other(i32),
}

impl LinkType {
    pub fn from_dlt(dlt: i32) -> Self {
        match dlt {
            1 => LinkType::Ethernet,
            12 | 14 | 101 | 228 => LinkType::RawIp,
            0 | 108 => LinkType::Loopback,
            113 => LinkType::LinuxSll,
            other => LinkType::Other(other),
        }
    }
}

/// One buffer as delivered by the capture source.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub link_type: LinkType,
    pub data: Vec<u8>,
    pub timestamp: DateTime<Local>,
}

/// A TCP segment with a non-empty payload, borrowed from its frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedSegment<'a> {
    pub source_address: Ipv4Addr,
    pub dest_address: Ipv4Addr,
    pub source_port: u16,
    pub dest_port: u16,
    pub payload: &'a [u8],
    pub arrival_time: DateTime<Local>,
    /// Source address lies outside the private ranges
    pub is_from_remote: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn datalink_values_map_to_framing() {
        assert_eq!(LinkType::from_dlt(1), LinkType::Ethernet);
        assert_eq!(LinkType::from_dlt(12), LinkType::RawIp);
        assert_eq!(LinkType::from_dlt(101), LinkType::RawIp);
        assert_eq!(LinkType::from_dlt(0), LinkType::Loopback);
        assert_eq!(LinkType::from_dlt(113), LinkType::LinuxSll);
        assert_eq!(LinkType::from_dlt(127), LinkType::Other(127));
    }
}
