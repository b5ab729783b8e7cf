//! Interface handles and the lifecycle state machine.
//!
//! A handle is the in-memory view of one virtual interface: its
//! engine-assigned identity, its intended configuration and its declared
//! lifecycle state. Every mutation goes through the owning session so it
//! lands in the call trace; the declared state moves in lockstep and is
//! what the verifier checks observations against.

use ipnet::Ipv4Net;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::client::{ControlPlane, EngineError, InterfaceKind};
use crate::session::Session;

/// Handle errors.
#[derive(Debug, Error)]
pub enum HandleError {
    #[error("Interface {index} ({name}) was deleted, handle is terminal")]
    UseAfterDelete { index: u32, name: String },

    #[error(transparent)]
    Engine(#[from] EngineError),
}

pub type Result<T> = std::result::Result<T, HandleError>;

/// Declared lifecycle state of an interface.
///
/// The three predicates below are the observable contract per state:
/// whether a dump must report the interface, whether its connected route
/// must sit in the FIB, and whether it must answer probes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LifecycleState {
    /// Created; no address bound.
    Unconfigured,
    /// Address bound, admin down.
    Addressed,
    /// Address bound and admin up; forwarding.
    Active,
    /// Taken back down after having been active.
    Deactivated,
    /// Removed from the engine; terminal.
    Deleted,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Unconfigured => "unconfigured",
            LifecycleState::Addressed => "addressed",
            LifecycleState::Active => "active",
            LifecycleState::Deactivated => "deactivated",
            LifecycleState::Deleted => "deleted",
        }
    }

    /// Whether a dump must still report the interface in this state.
    pub fn in_dump(&self) -> bool {
        !matches!(self, LifecycleState::Deleted)
    }

    /// Whether the connected route must be installed in this state.
    pub fn in_fib(&self) -> bool {
        matches!(self, LifecycleState::Active)
    }

    /// Whether the interface must answer probes in this state.
    pub fn forwards(&self) -> bool {
        matches!(self, LifecycleState::Active)
    }
}

/// In-memory view of one virtual interface.
///
/// Exclusively owned by the session-bound scenario that created it. Once
/// `delete` succeeds the handle is terminal and every further operation
/// fails with `UseAfterDelete`; the index must not be reused.
#[derive(Debug, Clone, Serialize)]
pub struct IfaceHandle {
    index: u32,
    name: String,
    kind: InterfaceKind,
    address: Option<Ipv4Net>,
    last_address: Option<Ipv4Net>,
    admin_up: bool,
    state: LifecycleState,
}

impl IfaceHandle {
    pub(crate) fn new(index: u32, name: String, kind: InterfaceKind) -> Self {
        IfaceHandle {
            index,
            name,
            kind,
            address: None,
            last_address: None,
            admin_up: false,
            state: LifecycleState::Unconfigured,
        }
    }

    /// Engine-assigned index, stable for the handle's lifetime.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Engine-assigned name, e.g. `loop3`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Kind the interface was created as.
    pub fn kind(&self) -> InterfaceKind {
        self.kind
    }

    /// Currently intended address binding, once configured.
    pub fn address(&self) -> Option<Ipv4Net> {
        self.address
    }

    /// Most recent address binding, retained across unconfigure and
    /// delete so absence checks know which prefix to look for.
    pub fn last_address(&self) -> Option<Ipv4Net> {
        self.last_address
    }

    /// Intended administrative flag.
    pub fn admin_up(&self) -> bool {
        self.admin_up
    }

    /// Declared lifecycle state.
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Bind an IPv4 address. Routing-table visibility is not guaranteed
    /// until a subsequent dump confirms it.
    pub async fn configure_address<C: ControlPlane>(
        &mut self,
        session: &mut Session<C>,
        addr: Ipv4Net,
    ) -> Result<()> {
        self.ensure_live()?;
        session.set_address(self.index, addr).await?;
        self.apply_address(addr);
        debug!(index = self.index, %addr, state = self.state.as_str(), "address configured");
        Ok(())
    }

    /// Remove the address binding without deleting the interface.
    pub async fn unconfigure_address<C: ControlPlane>(
        &mut self,
        session: &mut Session<C>,
    ) -> Result<()> {
        self.ensure_live()?;
        session.clear_address(self.index).await?;
        self.apply_unconfigure();
        debug!(index = self.index, state = self.state.as_str(), "address unconfigured");
        Ok(())
    }

    /// Toggle the administrative flag.
    pub async fn set_admin_state<C: ControlPlane>(
        &mut self,
        session: &mut Session<C>,
        up: bool,
    ) -> Result<()> {
        self.ensure_live()?;
        session.set_admin_state(self.index, up).await?;
        self.apply_admin(up);
        debug!(index = self.index, up, state = self.state.as_str(), "admin state set");
        Ok(())
    }

    /// Delete the interface. The handle is terminal afterwards.
    pub async fn delete<C: ControlPlane>(&mut self, session: &mut Session<C>) -> Result<()> {
        self.ensure_live()?;
        session.delete_interface(self.index).await?;
        self.apply_delete();
        info!(index = self.index, name = %self.name, "interface deleted");
        Ok(())
    }

    fn ensure_live(&self) -> Result<()> {
        if self.state == LifecycleState::Deleted {
            return Err(HandleError::UseAfterDelete {
                index: self.index,
                name: self.name.clone(),
            });
        }
        Ok(())
    }

    pub(crate) fn apply_address(&mut self, addr: Ipv4Net) {
        self.address = Some(addr);
        self.last_address = Some(addr);
        self.state = if self.admin_up {
            LifecycleState::Active
        } else {
            LifecycleState::Addressed
        };
    }

    pub(crate) fn apply_unconfigure(&mut self) {
        self.address = None;
        self.state = match self.state {
            LifecycleState::Active | LifecycleState::Deactivated => LifecycleState::Deactivated,
            LifecycleState::Addressed => LifecycleState::Unconfigured,
            other => other,
        };
    }

    pub(crate) fn apply_admin(&mut self, up: bool) {
        self.admin_up = up;
        self.state = match (self.state, up) {
            (LifecycleState::Deleted, _) => LifecycleState::Deleted,
            (_, true) if self.address.is_some() => LifecycleState::Active,
            (LifecycleState::Active, false) => LifecycleState::Deactivated,
            (other, _) => other,
        };
    }

    pub(crate) fn apply_delete(&mut self) {
        self.state = LifecycleState::Deleted;
    }
}
