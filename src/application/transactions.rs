//! Per-station transaction ledger
//!
//! Tracks the open transaction of each connector for one session's
//! lifetime. A connector owns at most one open transaction; ids are
//! time-seeded and monotonic so they stay unique across restarts.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::domain::{DomainError, DomainResult, Transaction};

pub struct TransactionLedger {
    station_id: String,
    /// Open transactions keyed by connector id
    open: DashMap<u32, Transaction>,
    next_id: AtomicI64,
}

impl TransactionLedger {
    pub fn new(station_id: impl Into<String>) -> Self {
        Self {
            station_id: station_id.into(),
            open: DashMap::new(),
            // seeded from the epoch clock; incremented per transaction
            next_id: AtomicI64::new(Utc::now().timestamp()),
        }
    }

    /// Open a transaction on `connector_id`. Rejected when the connector
    /// already has one open.
    pub fn begin(
        &self,
        connector_id: u32,
        id_tag: &str,
        meter_start: i64,
        started_at: DateTime<Utc>,
    ) -> DomainResult<Transaction> {
        if let Some(existing) = self.open.get(&connector_id) {
            return Err(DomainError::TransactionConflict {
                station_id: self.station_id.clone(),
                connector_id,
                transaction_id: existing.id,
            });
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let transaction = Transaction::new(
            id,
            self.station_id.clone(),
            connector_id,
            id_tag,
            meter_start,
            started_at,
        );
        self.open.insert(connector_id, transaction.clone());
        Ok(transaction)
    }

    /// Close the open transaction with `transaction_id`, freeing its
    /// connector. Returns `None` when no open transaction carries that id.
    pub fn finish(
        &self,
        transaction_id: i64,
        meter_stop: i64,
        stopped_at: DateTime<Utc>,
    ) -> Option<Transaction> {
        let connector_id = self
            .open
            .iter()
            .find(|entry| entry.id == transaction_id)
            .map(|entry| *entry.key())?;

        let (_, mut transaction) = self.open.remove(&connector_id)?;
        transaction.close(meter_stop, stopped_at);
        Some(transaction)
    }

    /// Id of any currently open transaction, for RemoteStop resolution.
    pub fn open_transaction_id(&self) -> Option<i64> {
        self.open.iter().map(|entry| entry.id).next()
    }

    pub fn open_count(&self) -> usize {
        self.open.len()
    }
}

// ── Tests ──────────────────────────────────────────────────────
