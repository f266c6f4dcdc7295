//! Bounded persistence write pool
//!
//! Store writes triggered by protocol handlers are fire-and-forget: the
//! station's acknowledgment never waits on storage. A semaphore caps how
//! many writes run at once so a slow store cannot pile up unbounded work.
//! Failures are logged and dropped; see the error taxonomy.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::warn;

use crate::domain::{LiveTelemetry, Station, StationStatus, TransactionRecord};

use super::SharedGateway;

/// One deferred store write.
#[derive(Debug)]
pub enum WriteJob {
    UpsertStation(Station),
    UpdateStationStatus {
        station_id: String,
        status: StationStatus,
    },
    UpdateLiveTelemetry {
        station_id: String,
        telemetry: LiveTelemetry,
    },
    InsertTransaction(TransactionRecord),
}

impl WriteJob {
    fn describe(&self) -> &'static str {
        match self {
            Self::UpsertStation(_) => "upsert_station",
            Self::UpdateStationStatus { .. } => "update_station_status",
            Self::UpdateLiveTelemetry { .. } => "update_live_telemetry",
            Self::InsertTransaction(_) => "insert_transaction",
        }
    }
}

#[derive(Clone)]
pub struct PersistencePool {
    gateway: SharedGateway,
    permits: Arc<Semaphore>,
}

impl PersistencePool {
    pub fn new(gateway: SharedGateway, workers: usize) -> Self {
        Self {
            gateway,
            permits: Arc::new(Semaphore::new(workers.max(1))),
        }
    }

    /// Hand a write to the pool. Returns immediately; the write runs as
    /// soon as a permit frees up. The returned handle is only awaited by
    /// tests.
    pub fn submit(&self, job: WriteJob) -> tokio::task::JoinHandle<()> {
        let gateway = self.gateway.clone();
        let permits = self.permits.clone();
        tokio::spawn(async move {
            let _permit = match permits.acquire_owned().await {
                Ok(permit) => permit,
                // semaphore closed during shutdown
                Err(_) => return,
            };

            let what = job.describe();
            let result = match job {
                WriteJob::UpsertStation(station) => gateway.upsert_station(station).await,
                WriteJob::UpdateStationStatus { station_id, status } => {
                    gateway.update_station_status(&station_id, status).await
                }
                WriteJob::UpdateLiveTelemetry {
                    station_id,
                    telemetry,
                } => gateway.update_live_telemetry(&station_id, telemetry).await,
                WriteJob::InsertTransaction(record) => gateway.insert_transaction(record).await,
            };

            if let Err(e) = result {
                metrics::counter!("persistence_write_failures_total", "job" => what).increment(1);
                warn!(job = what, error = %e, "Persistence write failed");
            }
        })
    }
}

// ── Tests ──────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::StationStatus;
    use crate::infrastructure::InMemoryGateway;
    use chrono::Utc;

    #[tokio::test]
    async fn submitted_jobs_reach_the_gateway() {
        let gateway = Arc::new(InMemoryGateway::new());
        let pool = PersistencePool::new(gateway.clone(), 3);

        pool.submit(WriteJob::UpsertStation(Station::booted(
            "CP-1",
            "V",
            "M",
            Utc::now(),
        )))
        .await
        .unwrap();
        pool.submit(WriteJob::UpdateStationStatus {
            station_id: "CP-1".into(),
            status: StationStatus::Charging,
        })
        .await
        .unwrap();

        assert_eq!(
            gateway.station("CP-1").unwrap().status,
            StationStatus::Charging
        );
    }

    #[tokio::test]
    async fn pool_survives_many_concurrent_writes() {
        let gateway = Arc::new(InMemoryGateway::new());
        let pool = PersistencePool::new(gateway.clone(), 3);

        let handles: Vec<_> = (0..50)
            .map(|i| {
                pool.submit(WriteJob::UpdateStationStatus {
                    station_id: format!("CP-{}", i),
                    status: StationStatus::Available,
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        assert!(gateway.station("CP-49").is_some());
    }
}
