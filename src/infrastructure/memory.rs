//! In-memory persistence gateway for development and testing

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;

use crate::domain::{
    Command, CommandAction, CommandStatus, DomainError, DomainResult, LiveTelemetry, Station,
    StationStatus, Tariff, TransactionRecord,
};

use super::PersistenceGateway;

/// DashMap-backed gateway. The binary runs against this until a real store
/// is wired in; tests use it as the double for the external collaborator.
pub struct InMemoryGateway {
    stations: DashMap<String, Station>,
    transactions: DashMap<i64, TransactionRecord>,
    /// Station-specific tariff assignments
    tariffs: DashMap<String, Tariff>,
    /// Fallback tariff for stations without an assignment
    default_tariff: RwLock<Option<Tariff>>,
    commands: DashMap<i64, Command>,
    command_counter: AtomicI64,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self {
            stations: DashMap::new(),
            transactions: DashMap::new(),
            tariffs: DashMap::new(),
            default_tariff: RwLock::new(None),
            commands: DashMap::new(),
            command_counter: AtomicI64::new(1),
        }
    }

    /// Gateway pre-seeded with the standard tariff, like a fresh deployment.
    pub fn seeded() -> Self {
        let gateway = Self::new();
        gateway.set_default_tariff(Tariff::default());
        gateway
    }

    pub fn set_default_tariff(&self, tariff: Tariff) {
        if let Ok(mut slot) = self.default_tariff.write() {
            *slot = Some(tariff);
        }
    }

    pub fn assign_tariff(&self, station_id: impl Into<String>, tariff: Tariff) {
        self.tariffs.insert(station_id.into(), tariff);
    }

    /// Queue a command the way the control plane would.
    pub fn queue_command(
        &self,
        station_id: impl Into<String>,
        user_id: impl Into<String>,
        action: CommandAction,
    ) -> Command {
        let id = self.command_counter.fetch_add(1, Ordering::SeqCst);
        let command = Command {
            id,
            station_id: station_id.into(),
            user_id: user_id.into(),
            action,
            status: CommandStatus::Pending,
            created_at: Utc::now(),
        };
        self.commands.insert(id, command.clone());
        command
    }

    // ── Inspection helpers ─────────────────────────────────

    pub fn station(&self, id: &str) -> Option<Station> {
        self.stations.get(id).map(|s| s.clone())
    }

    pub fn transaction(&self, id: i64) -> Option<TransactionRecord> {
        self.transactions.get(&id).map(|t| t.clone())
    }

    pub fn transaction_count(&self) -> usize {
        self.transactions.len()
    }

    pub fn command(&self, id: i64) -> Option<Command> {
        self.commands.get(&id).map(|c| c.clone())
    }

    fn set_command_status(&self, command_id: i64, status: CommandStatus) -> DomainResult<()> {
        let mut command = self
            .commands
            .get_mut(&command_id)
            .ok_or_else(|| DomainError::Persistence(format!("no command {}", command_id)))?;
        command.status = status;
        Ok(())
    }
}

impl Default for InMemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PersistenceGateway for InMemoryGateway {
    async fn upsert_station(&self, station: Station) -> DomainResult<()> {
        self.stations.insert(station.id.clone(), station);
        Ok(())
    }

    async fn update_station_status(
        &self,
        station_id: &str,
        status: StationStatus,
    ) -> DomainResult<()> {
        match self.stations.get_mut(station_id) {
            Some(mut station) => station.status = status,
            // status may arrive before the first Boot persisted the station
            None => {
                let mut station = Station::new(station_id);
                station.status = status;
                self.stations.insert(station_id.to_string(), station);
            }
        }
        Ok(())
    }

    async fn update_live_telemetry(
        &self,
        station_id: &str,
        telemetry: LiveTelemetry,
    ) -> DomainResult<()> {
        let mut station = self
            .stations
            .entry(station_id.to_string())
            .or_insert_with(|| Station::new(station_id));
        if let Some(kwh) = telemetry.session_energy_kwh {
            station.session_energy_kwh = kwh;
        }
        if let Some(kw) = telemetry.power_kw {
            station.current_power_kw = kw;
        }
        if let Some(soc) = telemetry.soc_percent {
            station.soc_percent = Some(soc);
        }
        Ok(())
    }

    async fn insert_transaction(&self, record: TransactionRecord) -> DomainResult<()> {
        self.transactions.insert(record.transaction.id, record);
        Ok(())
    }

    async fn fetch_tariff(&self, station_id: &str) -> DomainResult<Option<Tariff>> {
        if let Some(tariff) = self.tariffs.get(station_id) {
            return Ok(Some(tariff.clone()));
        }
        Ok(self
            .default_tariff
            .read()
            .map(|slot| slot.clone())
            .unwrap_or(None))
    }

    async fn fetch_pending_commands(&self) -> DomainResult<Vec<Command>> {
        Ok(self
            .commands
            .iter()
            .filter(|c| c.status == CommandStatus::Pending)
            .map(|c| c.clone())
            .collect())
    }

    async fn mark_command_executed(&self, command_id: i64) -> DomainResult<()> {
        self.set_command_status(command_id, CommandStatus::Executed)
    }

    async fn mark_command_failed(&self, command_id: i64) -> DomainResult<()> {
        self.set_command_status(command_id, CommandStatus::Failed)
    }
}

// ── Tests ──────────────────────────────────────────────────────
