use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("connector {connector_id} on {station_id} already has open transaction {transaction_id}")]
    TransactionConflict {
        station_id: String,
        connector_id: u32,
        transaction_id: i64,
    },

    #[error("storage failure: {0}")]
    Persistence(String),
}

pub type DomainResult<T> = Result<T, DomainError>;
