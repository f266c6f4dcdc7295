//! OCPP-J wire protocol: framing, call correlation and typed payloads

pub mod correlation;
pub mod frame;
pub mod messages;

pub use correlation::{CallReply, PendingCalls};
pub use frame::{Frame, FrameError};
