//! Data-plane probes: ICMP echo requests against addressed interfaces.
//!
//! Each probe carries the target's interface index in the echo ident,
//! so replies correlate back to the interface that answered without
//! relying on capture order.

use std::net::Ipv4Addr;

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::iface::IfaceHandle;
use crate::packets::{icmp_echo_request, parse_icmp_echo_reply, parse_icmp_echo_request};
use crate::verify::{Mismatch, VerifyReport};

/// Destination MAC probes are addressed to. The engine forwards on the
/// IP header, so one well-known unicast MAC covers every interface.
pub const ENGINE_MAC: [u8; 6] = [0x02, 0x00, 0x00, 0x00, 0x00, 0x01];

/// Fixed payload carried by every probe.
pub const PROBE_PAYLOAD: &[u8] = b"planecheck probe";

/// Probe construction errors.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("Interface {index} ({name}) has no address to probe")]
    NoAddress { index: u32, name: String },

    #[error("Interface index {index} does not fit the 16-bit echo ident")]
    TokenOverflow { index: u32 },
}

/// The host sending and receiving probes.
#[derive(Debug, Clone, Copy)]
pub struct ProbeEndpoint {
    pub mac: [u8; 6],
    pub addr: Ipv4Addr,
}

impl ProbeEndpoint {
    pub fn new(mac: [u8; 6], addr: Ipv4Addr) -> Self {
        ProbeEndpoint { mac, addr }
    }
}

/// One ready-to-inject probe frame.
#[derive(Debug, Clone)]
pub struct ProbePacket {
    /// Echo ident, equal to the target's interface index.
    pub token: u16,
    /// Address the probe is aimed at.
    pub dst: Ipv4Addr,
    /// Raw Ethernet frame.
    pub frame: Vec<u8>,
}

/// Direction of a captured echo frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EchoKind {
    Request,
    Reply,
}

/// One captured echo frame, reduced to the fields checks care about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CaptureRecord {
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    pub kind: EchoKind,
    pub token: u16,
}

/// Build one echo request per handle, aimed at its configured address.
pub fn build_requests(
    requester: &ProbeEndpoint,
    handles: &[IfaceHandle],
) -> std::result::Result<Vec<ProbePacket>, ProbeError> {
    let mut requests = Vec::with_capacity(handles.len());
    for handle in handles {
        let dst = handle
            .address()
            .ok_or_else(|| ProbeError::NoAddress {
                index: handle.index(),
                name: handle.name().to_string(),
            })?
            .addr();
        let token = u16::try_from(handle.index()).map_err(|_| ProbeError::TokenOverflow {
            index: handle.index(),
        })?;
        let frame = icmp_echo_request(
            requester.mac,
            ENGINE_MAC,
            requester.addr,
            dst,
            token,
            0,
            PROBE_PAYLOAD,
        );
        requests.push(ProbePacket { token, dst, frame });
    }
    Ok(requests)
}

/// Reduce captured frames to echo records, dropping unrelated traffic.
pub fn classify(frames: &[Vec<u8>]) -> Vec<CaptureRecord> {
    let mut records = Vec::new();
    for frame in frames {
        if let Some(reply) = parse_icmp_echo_reply(frame) {
            records.push(CaptureRecord {
                src: reply.src_ip,
                dst: reply.dst_ip,
                kind: EchoKind::Reply,
                token: reply.ident,
            });
        } else if let Some(request) = parse_icmp_echo_request(frame) {
            records.push(CaptureRecord {
                src: request.src_ip,
                dst: request.dst_ip,
                kind: EchoKind::Request,
                token: request.ident,
            });
        } else {
            debug!(len = frame.len(), "dropping unrelated frame");
        }
    }
    records
}

/// Check that every handle answered with a well-formed reply: echoed
/// token, source set to the probed address, destination the requester.
/// A handle no request could have been built for fails the check, so an
/// empty capture never passes for handles that were never probeable.
pub fn verify_all_responded(
    records: &[CaptureRecord],
    handles: &[IfaceHandle],
    requester: &ProbeEndpoint,
) -> VerifyReport {
    let mut report = VerifyReport::new();
    for handle in handles {
        let Ok(token) = u16::try_from(handle.index()) else {
            report.push(Mismatch::Unprobeable {
                index: handle.index(),
                name: handle.name().to_string(),
                reason: "index does not fit the 16-bit echo ident",
            });
            continue;
        };
        let Some(addr) = handle.address().map(|a| a.addr()) else {
            report.push(Mismatch::Unprobeable {
                index: handle.index(),
                name: handle.name().to_string(),
                reason: "no address configured",
            });
            continue;
        };

        let exact = records.iter().any(|r| {
            r.kind == EchoKind::Reply
                && r.token == token
                && r.src == addr
                && r.dst == requester.addr
        });
        if exact {
            continue;
        }

        match records.iter().find(|r| r.token == token) {
            None => report.push(Mismatch::MissingReply {
                index: handle.index(),
                addr,
                token,
            }),
            Some(candidate) => {
                if candidate.kind != EchoKind::Reply {
                    report.push(Mismatch::ReplyFieldMismatch {
                        token,
                        field: "type",
                        expected: "echo reply".to_string(),
                        actual: "echo request".to_string(),
                    });
                }
                if candidate.src != addr {
                    report.push(Mismatch::ReplyFieldMismatch {
                        token,
                        field: "source address",
                        expected: addr.to_string(),
                        actual: candidate.src.to_string(),
                    });
                }
                if candidate.dst != requester.addr {
                    report.push(Mismatch::ReplyFieldMismatch {
                        token,
                        field: "destination address",
                        expected: requester.addr.to_string(),
                        actual: candidate.dst.to_string(),
                    });
                }
            }
        }
    }
    report
}

/// Check that the capture holds no echo traffic at all.
pub fn verify_none_responded(records: &[CaptureRecord]) -> VerifyReport {
    let mut report = VerifyReport::new();
    if !records.is_empty() {
        report.push(Mismatch::CaptureNotEmpty {
            count: records.len(),
        });
    }
    report
}
