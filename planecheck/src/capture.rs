//! Traffic-port contract: frame injection and capture.
//!
//! A port is one attachment point to the engine's data plane. Scenarios
//! inject raw Ethernet frames and collect whatever comes back; the
//! bounded waits keep both a missing reply and an unexpected one
//! observable.

use std::time::Duration;

use thiserror::Error;

/// Capture errors.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("Capture timed out: expected {expected} frames, got {got} after {waited_ms}ms")]
    Timeout {
        expected: usize,
        got: usize,
        waited_ms: u64,
    },

    #[error("Captured {count} unexpected frame(s) during quiet period")]
    UnexpectedTraffic { count: usize },

    #[error("Traffic port closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, CaptureError>;

/// Injection and capture surface of one data-plane attachment point.
#[allow(async_fn_in_trait)]
pub trait TrafficPort {
    /// Port name, for logs.
    fn name(&self) -> &str;

    /// Inject one raw Ethernet frame into the engine.
    async fn inject(&self, frame: Vec<u8>) -> Result<()>;

    /// Collect exactly `count` frames, waiting at most `timeout`.
    ///
    /// Frames already captured when the deadline hits are reported in
    /// the `Timeout` error so a partial capture is diagnosable.
    async fn expect(&mut self, count: usize, timeout: Duration) -> Result<Vec<Vec<u8>>>;

    /// Assert silence: no frame arrives within `grace`.
    async fn expect_none(&mut self, grace: Duration) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_message_names_counts() {
        let err = CaptureError::Timeout {
            expected: 20,
            got: 3,
            waited_ms: 2000,
        };
        assert_eq!(
            err.to_string(),
            "Capture timed out: expected 20 frames, got 3 after 2000ms"
        );
    }

    #[test]
    fn test_unexpected_traffic_message() {
        let err = CaptureError::UnexpectedTraffic { count: 2 };
        assert_eq!(
            err.to_string(),
            "Captured 2 unexpected frame(s) during quiet period"
        );
    }
}
