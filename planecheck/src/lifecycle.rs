//! Batch lifecycle orchestration.
//!
//! Batches apply one operation to many handles in index order and abort
//! on the first failure. The error keeps which handles already went
//! through, so a scenario can tell a clean abort from a half-applied one.

use std::net::Ipv4Addr;

use ipnet::Ipv4Net;
use thiserror::Error;
use tracing::info;

use crate::client::{ControlPlane, EngineError, InterfaceKind};
use crate::iface::{HandleError, IfaceHandle};
use crate::session::Session;

/// Batch errors.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error(
        "Batch {op} aborted at interface {failed_index} after {} succeeded: {source}",
        succeeded.len()
    )]
    Partial {
        /// Operation that was being applied.
        op: &'static str,
        /// Indices the operation already succeeded on, in order.
        succeeded: Vec<u32>,
        /// Index the operation failed on.
        failed_index: u32,
        #[source]
        source: HandleError,
    },

    #[error("Address plan exhausted at position {position}")]
    PlanExhausted { position: usize },

    #[error(transparent)]
    Engine(#[from] EngineError),
}

pub type Result<T> = std::result::Result<T, BatchError>;

/// Deterministic address assignment: position `n` gets `base + n * step`
/// with the plan's prefix length.
#[derive(Debug, Clone, Copy)]
pub struct AddressPlan {
    base: Ipv4Addr,
    prefix_len: u8,
    step: u32,
}

impl AddressPlan {
    pub fn new(base: Ipv4Addr, prefix_len: u8, step: u32) -> Self {
        AddressPlan {
            base,
            prefix_len,
            step,
        }
    }

    /// Consecutive host routes starting at `base`.
    pub fn host_routes(base: Ipv4Addr) -> Self {
        AddressPlan::new(base, 32, 1)
    }

    /// Address at position `n`, if it stays inside the IPv4 space.
    pub fn nth(&self, n: usize) -> Option<Ipv4Net> {
        let offset = u32::try_from(n).ok()?.checked_mul(self.step)?;
        let raw = u32::from(self.base).checked_add(offset)?;
        Ipv4Net::new(Ipv4Addr::from(raw), self.prefix_len).ok()
    }
}

/// Create `count` interfaces of `kind` inside `session`.
pub async fn create_batch<C: ControlPlane>(
    session: &mut Session<C>,
    kind: InterfaceKind,
    count: u32,
) -> Result<Vec<IfaceHandle>> {
    Ok(session.create_interfaces(kind, count).await?)
}

/// Configure each handle with its planned address, in order.
pub async fn configure_batch<C: ControlPlane>(
    session: &mut Session<C>,
    handles: &mut [IfaceHandle],
    plan: &AddressPlan,
) -> Result<()> {
    let mut succeeded = Vec::new();
    for (position, handle) in handles.iter_mut().enumerate() {
        let addr = plan
            .nth(position)
            .ok_or(BatchError::PlanExhausted { position })?;
        if let Err(source) = handle.configure_address(session, addr).await {
            return Err(BatchError::Partial {
                op: "configure_address",
                succeeded,
                failed_index: handle.index(),
                source,
            });
        }
        succeeded.push(handle.index());
    }
    info!(count = handles.len(), "batch addresses configured");
    Ok(())
}

/// Strip the address binding from each handle, in order.
pub async fn unconfigure_batch<C: ControlPlane>(
    session: &mut Session<C>,
    handles: &mut [IfaceHandle],
) -> Result<()> {
    let mut succeeded = Vec::new();
    for handle in handles.iter_mut() {
        if let Err(source) = handle.unconfigure_address(session).await {
            return Err(BatchError::Partial {
                op: "unconfigure_address",
                succeeded,
                failed_index: handle.index(),
                source,
            });
        }
        succeeded.push(handle.index());
    }
    info!(count = handles.len(), "batch addresses removed");
    Ok(())
}

/// Set the administrative flag on each handle, in order.
pub async fn admin_batch<C: ControlPlane>(
    session: &mut Session<C>,
    handles: &mut [IfaceHandle],
    up: bool,
) -> Result<()> {
    let mut succeeded = Vec::new();
    for handle in handles.iter_mut() {
        if let Err(source) = handle.set_admin_state(session, up).await {
            return Err(BatchError::Partial {
                op: "set_admin_state",
                succeeded,
                failed_index: handle.index(),
                source,
            });
        }
        succeeded.push(handle.index());
    }
    info!(count = handles.len(), up, "batch admin state set");
    Ok(())
}

/// Delete each handle, in order. Deleted handles are terminal.
pub async fn delete_batch<C: ControlPlane>(
    session: &mut Session<C>,
    handles: &mut [IfaceHandle],
) -> Result<()> {
    let mut succeeded = Vec::new();
    for handle in handles.iter_mut() {
        if let Err(source) = handle.delete(session).await {
            return Err(BatchError::Partial {
                op: "delete",
                succeeded,
                failed_index: handle.index(),
                source,
            });
        }
        succeeded.push(handle.index());
    }
    info!(count = handles.len(), "batch deleted");
    Ok(())
}

/// Address and bring up the whole batch; afterwards every handle is
/// active.
pub async fn activate_batch<C: ControlPlane>(
    session: &mut Session<C>,
    handles: &mut [IfaceHandle],
    plan: &AddressPlan,
) -> Result<()> {
    configure_batch(session, handles, plan).await?;
    admin_batch(session, handles, true).await
}

/// Bring the whole batch down and strip addresses, without deleting.
pub async fn deactivate_batch<C: ControlPlane>(
    session: &mut Session<C>,
    handles: &mut [IfaceHandle],
) -> Result<()> {
    admin_batch(session, handles, false).await?;
    unconfigure_batch(session, handles).await
}
