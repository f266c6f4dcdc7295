//! StartTransaction handler

use tracing::{info, warn};

use crate::domain::{StationStatus, TransactionRecord};
use crate::infrastructure::WriteJob;
use crate::protocol::messages::{
    AuthorizationStatus, IdTagInfo, StartTransactionRequest, StartTransactionResponse,
};
use crate::session::ChargePointSession;

pub async fn handle_start_transaction(
    session: &ChargePointSession,
    request: StartTransactionRequest,
) -> StartTransactionResponse {
    info!(
        station_id = session.station_id.as_str(),
        connector_id = request.connector_id,
        id_tag = request.id_tag.as_str(),
        meter_start = request.meter_start,
        "StartTransaction"
    );

    let transaction = match session.ledger.begin(
        request.connector_id,
        &request.id_tag,
        request.meter_start,
        request.timestamp,
    ) {
        Ok(transaction) => transaction,
        Err(e) => {
            // the connector already has an open transaction; refuse without
            // touching it
            warn!(
                station_id = session.station_id.as_str(),
                connector_id = request.connector_id,
                "Refusing StartTransaction: {}",
                e
            );
            return StartTransactionResponse {
                transaction_id: 0,
                id_tag_info: IdTagInfo {
                    status: AuthorizationStatus::ConcurrentTx,
                },
            };
        }
    };

    let transaction_id = transaction.id;
    session
        .writes
        .submit(WriteJob::InsertTransaction(TransactionRecord::open(
            transaction,
        )));
    session.writes.submit(WriteJob::UpdateStationStatus {
        station_id: session.station_id.clone(),
        status: StationStatus::Charging,
    });

    StartTransactionResponse {
        transaction_id,
        id_tag_info: IdTagInfo::accepted(),
    }
}
