//! StopTransaction handler
//!
//! The one place where billing happens: close the transaction, price it
//! against the station's tariff, persist the finalized record, return the
//! station to Available.

use chrono::Local;
use tracing::{info, warn};

use crate::application::billing;
use crate::domain::{StationStatus, TransactionRecord};
use crate::infrastructure::WriteJob;
use crate::protocol::messages::{IdTagInfo, StopTransactionRequest, StopTransactionResponse};
use crate::session::ChargePointSession;

pub async fn handle_stop_transaction(
    session: &ChargePointSession,
    request: StopTransactionRequest,
) -> StopTransactionResponse {
    info!(
        station_id = session.station_id.as_str(),
        transaction_id = request.transaction_id,
        meter_stop = request.meter_stop,
        "StopTransaction"
    );

    let Some(transaction) =
        session
            .ledger
            .finish(request.transaction_id, request.meter_stop, request.timestamp)
    else {
        // unknown id: the protocol still requires an acceptance reply, and
        // refusing here could wedge the station in a stopping loop
        warn!(
            station_id = session.station_id.as_str(),
            transaction_id = request.transaction_id,
            "StopTransaction for unknown transaction, skipping billing"
        );
        return accepted();
    };

    let kwh_usage = transaction.energy_kwh().unwrap_or(0.0);
    let duration_minutes = transaction.duration_minutes().unwrap_or(0.0);

    // the only persistence call the close path waits for
    let tariff = match session.gateway.fetch_tariff(&session.station_id).await {
        Ok(tariff) => tariff,
        Err(e) => {
            warn!(
                station_id = session.station_id.as_str(),
                error = %e,
                "Tariff lookup failed, billing at zero"
            );
            None
        }
    };

    let bill = billing::compute_bill(tariff.as_ref(), kwh_usage, duration_minutes, Local::now());
    info!(
        station_id = session.station_id.as_str(),
        transaction_id = transaction.id,
        kwh_usage,
        duration_minutes,
        total_amount = bill.total_amount,
        tariff = bill.tariff_name.as_str(),
        carbon_saved_kg = bill.carbon_saved_kg,
        "Transaction billed"
    );
    metrics::counter!("transactions_completed_total").increment(1);

    session
        .writes
        .submit(WriteJob::InsertTransaction(TransactionRecord::completed(
            transaction,
            bill,
        )));
    session.writes.submit(WriteJob::UpdateStationStatus {
        station_id: session.station_id.clone(),
        status: StationStatus::Available,
    });

    accepted()
}

fn accepted() -> StopTransactionResponse {
    StopTransactionResponse {
        id_tag_info: Some(IdTagInfo::accepted()),
    }
}
