//! OCPP 1.6 action handlers
//!
//! Each supported action has its own handler module. Anything else coming
//! from a station is answered with a `NotImplemented` protocol error.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::session::ChargePointSession;

mod handle_boot_notification;
mod handle_heartbeat;
mod handle_meter_values;
mod handle_start_transaction;
mod handle_status_notification;
mod handle_stop_transaction;

pub use handle_boot_notification::handle_boot_notification;
pub use handle_heartbeat::handle_heartbeat;
pub use handle_meter_values::handle_meter_values;
pub use handle_start_transaction::handle_start_transaction;
pub use handle_status_notification::handle_status_notification;
pub use handle_stop_transaction::handle_stop_transaction;

/// Protocol-level rejection of an inbound Call, rendered as a CallError.
#[derive(Debug)]
pub struct ProtocolError {
    pub code: &'static str,
    pub description: String,
}

impl ProtocolError {
    fn formation(e: serde_json::Error) -> Self {
        Self {
            code: "FormationViolation",
            description: e.to_string(),
        }
    }

    fn not_implemented(action: &str) -> Self {
        Self {
            code: "NotImplemented",
            description: format!("Unsupported action: {}", action),
        }
    }

    fn internal(e: serde_json::Error) -> Self {
        Self {
            code: "InternalError",
            description: e.to_string(),
        }
    }
}

/// Route an inbound Call payload to its handler; returns the CallResult
/// payload.
pub async fn dispatch(
    session: &ChargePointSession,
    action: &str,
    payload: Value,
) -> Result<Value, ProtocolError> {
    match action {
        "BootNotification" => {
            encode(handle_boot_notification(session, parse(payload)?).await)
        }
        "Heartbeat" => encode(handle_heartbeat(session).await),
        "StatusNotification" => {
            encode(handle_status_notification(session, parse(payload)?).await)
        }
        "StartTransaction" => {
            encode(handle_start_transaction(session, parse(payload)?).await)
        }
        "StopTransaction" => {
            encode(handle_stop_transaction(session, parse(payload)?).await)
        }
        "MeterValues" => encode(handle_meter_values(session, parse(payload)?).await),
        other => {
            warn!(
                station_id = session.station_id.as_str(),
                action = other,
                "Unsupported action from station"
            );
            Err(ProtocolError::not_implemented(other))
        }
    }
}

fn parse<T: DeserializeOwned>(payload: Value) -> Result<T, ProtocolError> {
    serde_json::from_value(payload).map_err(ProtocolError::formation)
}

fn encode<T: Serialize>(response: T) -> Result<Value, ProtocolError> {
    serde_json::to_value(response).map_err(ProtocolError::internal)
}
