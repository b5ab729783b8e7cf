//! planecheck: state-consistency checks for virtual interface lifecycles.
//!
//! Scenarios drive a packet engine's control plane through interface
//! create/configure/up/down/delete cycles and verify that dumps, route
//! tables and data-plane behavior agree with the declared state at
//! every step.

pub mod capture;
pub mod client;
pub mod dump;
pub mod iface;
pub mod lifecycle;
pub mod packets;
pub mod probe;
pub mod session;
pub mod sim;
pub mod trace;
pub mod verify;

pub use capture::{CaptureError, TrafficPort};
pub use client::{ControlPlane, EngineError, InterfaceKind};
pub use dump::{DumpFilter, DumpSnapshot, IndexFilter, RouteSnapshot};
pub use iface::{HandleError, IfaceHandle, LifecycleState};
pub use lifecycle::{AddressPlan, BatchError};
pub use probe::{CaptureRecord, ProbeEndpoint};
pub use session::Session;
pub use sim::{SimEngine, SimPort};
pub use trace::CallTrace;
pub use verify::{Mismatch, VerifyError, VerifyReport};
