//! Persistence gateway trait
//!
//! The durable store is an external collaborator; the protocol core only
//! sees this seam. Every write is fire-and-forget from the core's point of
//! view except the tariff lookup, which the transaction-close path awaits.

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{
    Command, DomainResult, LiveTelemetry, Station, StationStatus, Tariff, TransactionRecord,
};

#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Create or refresh a station record (BootNotification).
    async fn upsert_station(&self, station: Station) -> DomainResult<()>;

    async fn update_station_status(
        &self,
        station_id: &str,
        status: StationStatus,
    ) -> DomainResult<()>;

    async fn update_live_telemetry(
        &self,
        station_id: &str,
        telemetry: LiveTelemetry,
    ) -> DomainResult<()>;

    /// Insert or replace a transaction record; called once with the open
    /// record and once with the completed, billed record.
    async fn insert_transaction(&self, record: TransactionRecord) -> DomainResult<()>;

    /// Tariff assigned to a station. `None` means the station is unpriced.
    async fn fetch_tariff(&self, station_id: &str) -> DomainResult<Option<Tariff>>;

    // ── Command feed ───────────────────────────────────────

    async fn fetch_pending_commands(&self) -> DomainResult<Vec<Command>>;

    async fn mark_command_executed(&self, command_id: i64) -> DomainResult<()>;

    async fn mark_command_failed(&self, command_id: i64) -> DomainResult<()>;
}

/// Shared, reference-counted gateway handle
pub type SharedGateway = Arc<dyn PersistenceGateway>;
