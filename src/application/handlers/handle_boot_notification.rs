//! BootNotification handler

use chrono::Utc;
use tracing::info;

use crate::domain::Station;
use crate::infrastructure::WriteJob;
use crate::protocol::messages::{
    BootNotificationRequest, BootNotificationResponse, RegistrationStatus,
};
use crate::session::ChargePointSession;

pub async fn handle_boot_notification(
    session: &ChargePointSession,
    request: BootNotificationRequest,
) -> BootNotificationResponse {
    info!(
        station_id = session.station_id.as_str(),
        vendor = request.charge_point_vendor.as_str(),
        model = request.charge_point_model.as_str(),
        "BootNotification"
    );

    let now = Utc::now();
    session.mark_registered();

    // a fresh connection means the physical unit rebooted: status goes back
    // to Available no matter what was persisted before
    session.writes.submit(WriteJob::UpsertStation(Station::booted(
        session.station_id.clone(),
        request.charge_point_vendor,
        request.charge_point_model,
        now,
    )));

    BootNotificationResponse {
        current_time: now,
        interval: session.heartbeat_interval,
        status: RegistrationStatus::Accepted,
    }
}
