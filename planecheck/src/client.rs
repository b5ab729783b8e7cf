//! Control-plane contract of the packet engine.
//!
//! Everything the verification layers know about the engine goes through
//! the `ControlPlane` trait: creation, configuration and deletion of
//! interfaces plus the two dump calls. Implementations are expected to
//! be synchronous request/response; callers await one call at a time.

use serde::Serialize;
use thiserror::Error;

use crate::dump::{DumpFilter, InterfaceRecord, RouteRecord};

/// Engine-reported failures, surfaced verbatim.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("Engine rejected {call}: {reason}")]
    Rejected {
        /// Operation the engine refused.
        call: &'static str,
        /// Reason string exactly as the engine reported it.
        reason: String,
    },
}

impl EngineError {
    /// Build a rejection for `call` with the engine's reason text.
    pub fn rejected(call: &'static str, reason: impl Into<String>) -> Self {
        EngineError::Rejected {
            call,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Interface kinds the engine can create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum InterfaceKind {
    /// Virtual interface with no physical medium.
    Loopback,
}

impl InterfaceKind {
    /// Name prefix the engine uses for instances of this kind.
    pub fn name_prefix(&self) -> &'static str {
        match self {
            InterfaceKind::Loopback => "loop",
        }
    }
}

/// Synchronous request/response surface of the packet engine.
///
/// No retries happen at this layer; a rejection is returned verbatim to
/// the caller. Side effects of `set_address` and `set_admin_state` may
/// land asynchronously on the engine side, so routing-table visibility
/// is only guaranteed after a subsequent dump confirms it.
#[allow(async_fn_in_trait)]
pub trait ControlPlane {
    /// Create `count` interfaces of `kind`, returning their engine-assigned
    /// indices in creation order.
    async fn create_interfaces(&self, kind: InterfaceKind, count: u32) -> Result<Vec<u32>>;

    /// Dump interface records matching `filter`.
    ///
    /// An empty result is a valid answer, never an error.
    async fn dump_interfaces(&self, filter: &DumpFilter) -> Result<Vec<InterfaceRecord>>;

    /// Dump the FIB entries of the table identified by `table_id`.
    async fn dump_routes(&self, table_id: u32) -> Result<Vec<RouteRecord>>;

    /// Bind an IPv4 address (with prefix length) to the interface at `index`.
    async fn set_address(&self, index: u32, addr: ipnet::Ipv4Net) -> Result<()>;

    /// Remove the address binding from the interface at `index`.
    async fn clear_address(&self, index: u32) -> Result<()>;

    /// Set the administrative flag of the interface at `index`.
    async fn set_admin_state(&self, index: u32, up: bool) -> Result<()>;

    /// Delete the interface at `index`. The index becomes invalid on success.
    async fn delete_interface(&self, index: u32) -> Result<()>;
}
