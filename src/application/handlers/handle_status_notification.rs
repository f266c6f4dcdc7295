//! StatusNotification handler

use tracing::{info, warn};

use crate::domain::StationStatus;
use crate::infrastructure::WriteJob;
use crate::protocol::messages::{StatusNotificationRequest, StatusNotificationResponse};
use crate::session::ChargePointSession;

/// Persists the reported status asynchronously; the frame is acknowledged
/// unconditionally.
pub async fn handle_status_notification(
    session: &ChargePointSession,
    request: StatusNotificationRequest,
) -> StatusNotificationResponse {
    info!(
        station_id = session.station_id.as_str(),
        connector_id = request.connector_id,
        status = request.status.as_str(),
        error_code = request.error_code.as_str(),
        "StatusNotification"
    );

    match StationStatus::parse(&request.status) {
        Some(status) => {
            session.writes.submit(WriteJob::UpdateStationStatus {
                station_id: session.station_id.clone(),
                status,
            });
        }
        None => {
            warn!(
                station_id = session.station_id.as_str(),
                status = request.status.as_str(),
                "Ignoring status outside the OCPP 1.6 vocabulary"
            );
        }
    }

    StatusNotificationResponse {}
}
