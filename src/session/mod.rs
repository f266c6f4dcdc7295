//! Per-station protocol sessions and the live-connection registry

pub mod charge_point;
pub mod registry;

pub use charge_point::{ChargePointSession, OutboundCallError, SessionState};
pub use registry::{ConnectionRegistry, SharedRegistry};
