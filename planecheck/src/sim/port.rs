//! Simulated traffic port.
//!
//! A port runs one forwarding thread. It pulls injected frames off a
//! channel, resolves destinations against the published forwarding view
//! and answers echo requests for interfaces that currently forward.
//! Replies surface on a tokio channel so async scenarios can await them.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::sync::mpsc;
use tracing::debug;

use crate::capture::{CaptureError, Result, TrafficPort};
use crate::packets::{icmp_echo_reply, parse_icmp_echo_request};

use super::engine::{ForwardingState, SimEngine};

enum PortCommand {
    Frame(Vec<u8>),
    Shutdown,
}

/// Data-plane attachment point to a `SimEngine`.
pub struct SimPort {
    name: String,
    inject_tx: crossbeam_channel::Sender<PortCommand>,
    replies: mpsc::UnboundedReceiver<Vec<u8>>,
    thread: Option<JoinHandle<()>>,
}

impl SimPort {
    /// Attach a new port to `engine` and start its forwarding thread.
    pub fn attach(engine: &SimEngine, name: impl Into<String>) -> Self {
        let name = name.into();
        let (inject_tx, inject_rx) = crossbeam_channel::unbounded();
        let (reply_tx, replies) = mpsc::unbounded_channel();
        let forwarding = engine.forwarding_handle();

        let thread = std::thread::Builder::new()
            .name(format!("simport-{name}"))
            .spawn(move || forward_loop(inject_rx, reply_tx, forwarding))
            .expect("Failed to spawn port thread");

        debug!(port = %name, "port attached");
        SimPort {
            name,
            inject_tx,
            replies,
            thread: Some(thread),
        }
    }
}

fn forward_loop(
    inject_rx: crossbeam_channel::Receiver<PortCommand>,
    reply_tx: mpsc::UnboundedSender<Vec<u8>>,
    forwarding: Arc<ArcSwap<ForwardingState>>,
) {
    loop {
        let frame = match inject_rx.recv() {
            Ok(PortCommand::Frame(frame)) => frame,
            Ok(PortCommand::Shutdown) | Err(_) => break,
        };

        // Non-echo traffic is dropped, same as unroutable traffic.
        let Some(request) = parse_icmp_echo_request(&frame) else {
            debug!(len = frame.len(), "dropping non-echo frame");
            continue;
        };

        let Some(responder) = forwarding.load().lookup(request.dst_ip) else {
            debug!(dst = %request.dst_ip, "no forwarding entry, dropping");
            continue;
        };

        // The reply sources from the responder's configured address,
        // which is not necessarily the probed destination.
        let reply = icmp_echo_reply(
            request.dst_mac,
            request.src_mac,
            responder.addr,
            request.src_ip,
            request.ident,
            request.seq_no,
            &request.data,
        );
        if reply_tx.send(reply).is_err() {
            break;
        }
    }
}

impl TrafficPort for SimPort {
    fn name(&self) -> &str {
        &self.name
    }

    async fn inject(&self, frame: Vec<u8>) -> Result<()> {
        self.inject_tx
            .send(PortCommand::Frame(frame))
            .map_err(|_| CaptureError::Closed)
    }

    async fn expect(&mut self, count: usize, timeout: Duration) -> Result<Vec<Vec<u8>>> {
        let deadline = tokio::time::Instant::now() + timeout;
        let mut frames = Vec::with_capacity(count);
        while frames.len() < count {
            match tokio::time::timeout_at(deadline, self.replies.recv()).await {
                Ok(Some(frame)) => frames.push(frame),
                Ok(None) => return Err(CaptureError::Closed),
                Err(_) => {
                    return Err(CaptureError::Timeout {
                        expected: count,
                        got: frames.len(),
                        waited_ms: timeout.as_millis() as u64,
                    });
                }
            }
        }
        Ok(frames)
    }

    async fn expect_none(&mut self, grace: Duration) -> Result<()> {
        let deadline = tokio::time::Instant::now() + grace;
        let mut count = 0;
        loop {
            match tokio::time::timeout_at(deadline, self.replies.recv()).await {
                Ok(Some(_)) => count += 1,
                Ok(None) | Err(_) => break,
            }
        }
        if count > 0 {
            return Err(CaptureError::UnexpectedTraffic { count });
        }
        Ok(())
    }
}

impl Drop for SimPort {
    fn drop(&mut self) {
        let _ = self.inject_tx.send(PortCommand::Shutdown);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    use crate::client::{ControlPlane, InterfaceKind};
    use crate::packets::{icmp_echo_request, parse_icmp_echo_reply};
    use crate::probe::{ENGINE_MAC, PROBE_PAYLOAD};

    const HOST_MAC: [u8; 6] = [0x02, 0, 0, 0, 0, 0x10];
    const HOST_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 100);

    async fn engine_with_active(addr: &str) -> (SimEngine, u32) {
        let engine = SimEngine::new();
        let indices = engine
            .create_interfaces(InterfaceKind::Loopback, 1)
            .await
            .unwrap();
        engine
            .set_address(indices[0], addr.parse().unwrap())
            .await
            .unwrap();
        engine.set_admin_state(indices[0], true).await.unwrap();
        (engine, indices[0])
    }

    #[tokio::test]
    async fn test_active_interface_answers_echo() {
        let (engine, index) = engine_with_active("10.0.0.1/32").await;
        let mut port = SimPort::attach(&engine, "port0");

        let frame = icmp_echo_request(
            HOST_MAC,
            ENGINE_MAC,
            HOST_IP,
            Ipv4Addr::new(10, 0, 0, 1),
            index as u16,
            0,
            PROBE_PAYLOAD,
        );
        port.inject(frame).await.unwrap();

        let frames = port.expect(1, Duration::from_secs(2)).await.unwrap();
        let reply = parse_icmp_echo_reply(&frames[0]).expect("reply should parse");
        assert_eq!(reply.src_ip, Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(reply.dst_ip, HOST_IP);
        assert_eq!(reply.ident, index as u16);
        assert_eq!(reply.data, PROBE_PAYLOAD);
    }

    #[tokio::test]
    async fn test_down_interface_stays_silent() {
        let (engine, index) = engine_with_active("10.0.0.1/32").await;
        engine.set_admin_state(index, false).await.unwrap();
        let mut port = SimPort::attach(&engine, "port0");

        let frame = icmp_echo_request(
            HOST_MAC,
            ENGINE_MAC,
            HOST_IP,
            Ipv4Addr::new(10, 0, 0, 1),
            index as u16,
            0,
            PROBE_PAYLOAD,
        );
        port.inject(frame).await.unwrap();
        port.expect_none(Duration::from_millis(200)).await.unwrap();
    }

    #[tokio::test]
    async fn test_expect_reports_partial_capture() {
        let (engine, index) = engine_with_active("10.0.0.1/32").await;
        let mut port = SimPort::attach(&engine, "port0");

        let frame = icmp_echo_request(
            HOST_MAC,
            ENGINE_MAC,
            HOST_IP,
            Ipv4Addr::new(10, 0, 0, 1),
            index as u16,
            0,
            PROBE_PAYLOAD,
        );
        port.inject(frame).await.unwrap();

        let err = port
            .expect(2, Duration::from_millis(300))
            .await
            .unwrap_err();
        match err {
            CaptureError::Timeout {
                expected: 2,
                got: 1,
                ..
            } => {}
            other => panic!("unexpected error: {other}"),
        }
    }
}
