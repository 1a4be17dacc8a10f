use etherparse::{NetSlice, SlicedPacket, TransportSlice};
use std::net::Ipv4Addr;

use crate::model::{ClassifiedSegment, LinkType, RawFrame};

const LOOPBACK_HEADER_LEN: usize = 4;
const LINUX_SLL_HEADER_LEN: usize = 16;

/// True iff `addr` lies in 10.0.0.0/8, 172.16.0.0/12 or 192.168.0.0/16.
pub fn is_internal(addr: Ipv4Addr) -> bool {
    let [first, second, ..] = addr.octets();
    match first {
        10 => true,
        172 => (16..32).contains(&second),
        192 => second == 168,
        _ => false,
    }
}

/// Decode a frame into a TCP segment.
///
/// Returns `None` for anything that is not IPv4 + TCP, and for segments
/// without payload (pure ACK/control traffic).
pub fn classify(frame: &RawFrame) -> Option<ClassifiedSegment<'_>> {
    let packet = decode(frame.link_type, &frame.data)?;

    let Some(NetSlice::Ipv4(ipv4)) = &packet.net else {
        return None;
    };
    let Some(TransportSlice::Tcp(tcp)) = &packet.transport else {
        return None;
    };

    let ip = ipv4.header();
    let payload = tcp.payload();
    if payload.is_empty() {
        return None;
    }

    let source_address = ip.source_addr();
    Some(ClassifiedSegment {
        source_address,
        dest_address: ip.destination_addr(),
        source_port: tcp.source_port(),
        dest_port: tcp.destination_port(),
        payload,
        arrival_time: frame.timestamp,
        is_from_remote: !is_internal(source_address),
    })
}

fn decode(link_type: LinkType, data: &[u8]) -> Option<SlicedPacket<'_>> {
    match link_type {
        LinkType::Ethernet => SlicedPacket::from_ethernet(data).ok(),
        LinkType::RawIp => SlicedPacket::from_ip(data).ok(),
        LinkType::Loopback => SlicedPacket::from_ip(data.get(LOOPBACK_HEADER_LEN..)?).ok(),
        LinkType::LinuxSll => SlicedPacket::from_ip(data.get(LINUX_SLL_HEADER_LEN..)?).ok(),
        LinkType::Other(_) => None,
    }
}
