//! In-process simulated engine: control plane plus traffic ports.
//!
//! The simulation exists so consistency scenarios run hermetically. It
//! honors the observable contract a real engine would: interfaces stay
//! visible in dumps until deleted, connected routes exist only while
//! admin-up and addressed, and only forwarding interfaces answer probes.

pub mod engine;
pub mod port;

pub use engine::{ForwardingState, MGMT_NAME, Responder, SimEngine};
pub use port::SimPort;
