//! Transaction domain entity

use chrono::{DateTime, Utc};

use crate::application::billing::Bill;

/// Transaction status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    /// Charging session in progress
    Open,
    /// Closed by StopTransaction; immutable from here on
    Completed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Completed => "COMPLETED",
        }
    }
}

/// One charging session bounded by Start/Stop events, billed exactly once.
#[derive(Debug, Clone)]
pub struct Transaction {
    pub id: i64,
    pub station_id: String,
    pub connector_id: u32,
    /// Driver/card identifier that started the session
    pub id_tag: String,
    /// Absolute energy register at start (Wh)
    pub meter_start: i64,
    /// Absolute energy register at stop (Wh)
    pub meter_stop: Option<i64>,
    pub started_at: DateTime<Utc>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub status: TransactionStatus,
}

impl Transaction {
    pub fn new(
        id: i64,
        station_id: impl Into<String>,
        connector_id: u32,
        id_tag: impl Into<String>,
        meter_start: i64,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            station_id: station_id.into(),
            connector_id,
            id_tag: id_tag.into(),
            meter_start,
            meter_stop: None,
            started_at,
            stopped_at: None,
            status: TransactionStatus::Open,
        }
    }

    pub fn close(&mut self, meter_stop: i64, stopped_at: DateTime<Utc>) {
        self.meter_stop = Some(meter_stop);
        self.stopped_at = Some(stopped_at);
        self.status = TransactionStatus::Completed;
    }

    /// Energy delivered over the session (kWh). Meter registers are Wh.
    pub fn energy_kwh(&self) -> Option<f64> {
        self.meter_stop
            .map(|stop| (stop - self.meter_start) as f64 / 1000.0)
    }

    /// Elapsed wall time between start and stop, in minutes.
    pub fn duration_minutes(&self) -> Option<f64> {
        self.stopped_at
            .map(|stop| (stop - self.started_at).num_seconds() as f64 / 60.0)
    }

    pub fn is_open(&self) -> bool {
        self.status == TransactionStatus::Open
    }
}

/// What the persistence gateway receives for a transaction: the session
/// itself plus, once closed, the priced outcome. An open transaction is
/// persisted without a bill so a disconnect leaves it visible in storage.
#[derive(Debug, Clone)]
pub struct TransactionRecord {
    pub transaction: Transaction,
    pub bill: Option<Bill>,
}

impl TransactionRecord {
    pub fn open(transaction: Transaction) -> Self {
        Self {
            transaction,
            bill: None,
        }
    }

    pub fn completed(transaction: Transaction, bill: Bill) -> Self {
        Self {
            transaction,
            bill: Some(bill),
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────
