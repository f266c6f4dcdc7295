//! Heartbeat handler

use chrono::Utc;

use crate::protocol::messages::HeartbeatResponse;
use crate::session::ChargePointSession;

/// Replies with the current time only; no state changes in any session
/// state.
pub async fn handle_heartbeat(_session: &ChargePointSession) -> HeartbeatResponse {
    HeartbeatResponse {
        current_time: Utc::now(),
    }
}
