//! ICMP echo frame builders and parsers.
//!
//! Probes are plain ICMPv4 echo frames. The same builders serve both
//! sides: scenarios build requests to inject, the simulated engine
//! builds the replies it sends back.

use std::net::Ipv4Addr;

use smoltcp::wire::{
    EthernetAddress, EthernetFrame, EthernetProtocol, EthernetRepr, Icmpv4Message, Icmpv4Packet,
    Icmpv4Repr, IpProtocol, Ipv4Packet, Ipv4Repr,
};

/// Build an ICMP echo request wrapped in IPv4/Ethernet.
pub fn icmp_echo_request(
    src_mac: [u8; 6],
    dst_mac: [u8; 6],
    src_ip: Ipv4Addr,
    dst_ip: Ipv4Addr,
    ident: u16,
    seq_no: u16,
    data: &[u8],
) -> Vec<u8> {
    let icmp_repr = Icmpv4Repr::EchoRequest {
        ident,
        seq_no,
        data,
    };
    emit_echo(src_mac, dst_mac, src_ip, dst_ip, icmp_repr)
}

/// Build an ICMP echo reply wrapped in IPv4/Ethernet.
pub fn icmp_echo_reply(
    src_mac: [u8; 6],
    dst_mac: [u8; 6],
    src_ip: Ipv4Addr,
    dst_ip: Ipv4Addr,
    ident: u16,
    seq_no: u16,
    data: &[u8],
) -> Vec<u8> {
    let icmp_repr = Icmpv4Repr::EchoReply {
        ident,
        seq_no,
        data,
    };
    emit_echo(src_mac, dst_mac, src_ip, dst_ip, icmp_repr)
}

fn emit_echo(
    src_mac: [u8; 6],
    dst_mac: [u8; 6],
    src_ip: Ipv4Addr,
    dst_ip: Ipv4Addr,
    icmp_repr: Icmpv4Repr<'_>,
) -> Vec<u8> {
    let ipv4_repr = Ipv4Repr {
        src_addr: src_ip,
        dst_addr: dst_ip,
        next_header: IpProtocol::Icmp,
        payload_len: icmp_repr.buffer_len(),
        hop_limit: 64,
    };

    let eth_repr = EthernetRepr {
        src_addr: EthernetAddress::from_bytes(&src_mac),
        dst_addr: EthernetAddress::from_bytes(&dst_mac),
        ethertype: EthernetProtocol::Ipv4,
    };

    let total_len = eth_repr.buffer_len() + ipv4_repr.buffer_len() + icmp_repr.buffer_len();
    let mut buffer = vec![0u8; total_len];

    let mut frame = EthernetFrame::new_unchecked(&mut buffer);
    eth_repr.emit(&mut frame);

    let mut ipv4_packet = Ipv4Packet::new_unchecked(frame.payload_mut());
    ipv4_repr.emit(
        &mut ipv4_packet,
        &smoltcp::phy::ChecksumCapabilities::default(),
    );

    let mut icmp_packet = Icmpv4Packet::new_unchecked(ipv4_packet.payload_mut());
    icmp_repr.emit(
        &mut icmp_packet,
        &smoltcp::phy::ChecksumCapabilities::default(),
    );

    buffer
}

/// Parsed ICMP echo request
#[derive(Debug, Clone)]
pub struct IcmpEchoRequest {
    pub src_mac: [u8; 6],
    pub dst_mac: [u8; 6],
    pub src_ip: Ipv4Addr,
    pub dst_ip: Ipv4Addr,
    pub ident: u16,
    pub seq_no: u16,
    pub data: Vec<u8>,
}

/// Parse an ICMP echo request from an Ethernet frame.
///
/// Anything else, including malformed frames, is `None` so the caller
/// can silently skip unrelated traffic.
pub fn parse_icmp_echo_request(frame: &[u8]) -> Option<IcmpEchoRequest> {
    let eth = EthernetFrame::new_checked(frame).ok()?;
    if eth.ethertype() != EthernetProtocol::Ipv4 {
        return None;
    }

    let ipv4 = Ipv4Packet::new_checked(eth.payload()).ok()?;
    if ipv4.next_header() != IpProtocol::Icmp {
        return None;
    }

    let icmp = Icmpv4Packet::new_checked(ipv4.payload()).ok()?;
    if icmp.msg_type() != Icmpv4Message::EchoRequest {
        return None;
    }

    let repr = Icmpv4Repr::parse(&icmp, &smoltcp::phy::ChecksumCapabilities::default()).ok()?;

    if let Icmpv4Repr::EchoRequest {
        ident,
        seq_no,
        data,
    } = repr
    {
        Some(IcmpEchoRequest {
            src_mac: eth.src_addr().as_bytes().try_into().ok()?,
            dst_mac: eth.dst_addr().as_bytes().try_into().ok()?,
            src_ip: ipv4.src_addr(),
            dst_ip: ipv4.dst_addr(),
            ident,
            seq_no,
            data: data.to_vec(),
        })
    } else {
        None
    }
}

/// Parsed ICMP echo reply
#[derive(Debug, Clone)]
pub struct IcmpEchoReply {
    pub src_ip: Ipv4Addr,
    pub dst_ip: Ipv4Addr,
    pub ident: u16,
    pub seq_no: u16,
    pub data: Vec<u8>,
}

/// Parse an ICMP echo reply from an Ethernet frame.
pub fn parse_icmp_echo_reply(frame: &[u8]) -> Option<IcmpEchoReply> {
    let eth = EthernetFrame::new_checked(frame).ok()?;
    if eth.ethertype() != EthernetProtocol::Ipv4 {
        return None;
    }

    let ipv4 = Ipv4Packet::new_checked(eth.payload()).ok()?;
    if ipv4.next_header() != IpProtocol::Icmp {
        return None;
    }

    let icmp = Icmpv4Packet::new_checked(ipv4.payload()).ok()?;
    if icmp.msg_type() != Icmpv4Message::EchoReply {
        return None;
    }

    let repr = Icmpv4Repr::parse(&icmp, &smoltcp::phy::ChecksumCapabilities::default()).ok()?;

    if let Icmpv4Repr::EchoReply {
        ident,
        seq_no,
        data,
    } = repr
    {
        Some(IcmpEchoReply {
            src_ip: ipv4.src_addr(),
            dst_ip: ipv4.dst_addr(),
            ident,
            seq_no,
            data: data.to_vec(),
        })
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SRC_MAC: [u8; 6] = [0x02, 0, 0, 0, 0, 0x10];
    const DST_MAC: [u8; 6] = [0x02, 0, 0, 0, 0, 0x01];

    #[test]
    fn test_request_builds_and_parses() {
        let frame = icmp_echo_request(
            SRC_MAC,
            DST_MAC,
            Ipv4Addr::new(10, 0, 0, 100),
            Ipv4Addr::new(10, 0, 0, 1),
            7,
            0,
            b"probe",
        );

        let req = parse_icmp_echo_request(&frame).expect("request should parse");
        assert_eq!(req.src_mac, SRC_MAC);
        assert_eq!(req.dst_mac, DST_MAC);
        assert_eq!(req.src_ip, Ipv4Addr::new(10, 0, 0, 100));
        assert_eq!(req.dst_ip, Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(req.ident, 7);
        assert_eq!(req.seq_no, 0);
        assert_eq!(req.data, b"probe");

        // A request is not a reply.
        assert!(parse_icmp_echo_reply(&frame).is_none());
    }

    #[test]
    fn test_reply_builds_and_parses() {
        let frame = icmp_echo_reply(
            DST_MAC,
            SRC_MAC,
            Ipv4Addr::new(10, 0, 0, 1),
            Ipv4Addr::new(10, 0, 0, 100),
            7,
            0,
            b"probe",
        );

        let reply = parse_icmp_echo_reply(&frame).expect("reply should parse");
        assert_eq!(reply.src_ip, Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(reply.dst_ip, Ipv4Addr::new(10, 0, 0, 100));
        assert_eq!(reply.ident, 7);
        assert!(parse_icmp_echo_request(&frame).is_none());
    }

    #[test]
    fn test_foreign_traffic_is_ignored() {
        assert!(parse_icmp_echo_request(b"not an ethernet frame").is_none());
        assert!(parse_icmp_echo_reply(&[0u8; 64]).is_none());
    }
}
