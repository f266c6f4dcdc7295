//! Command dispatch bridge
//!
//! Polls the pending-command feed on a fixed interval and translates each
//! command into an outbound remote call on the target's live session.
//! Dispatch is fire-and-forget: the command is marked EXECUTED once it is
//! handed to the session, without waiting for the station's reply. A
//! command whose target is not connected stays PENDING for a later cycle
//! (at-least-once). No single cycle error ever stops the loop.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::domain::{Command, CommandAction};
use crate::infrastructure::{SharedGateway, ShutdownSignal};
use crate::session::SharedRegistry;

pub struct CommandBridge {
    gateway: SharedGateway,
    registry: SharedRegistry,
    poll_interval: Duration,
}

impl CommandBridge {
    pub fn new(gateway: SharedGateway, registry: SharedRegistry, poll_interval: Duration) -> Self {
        Self {
            gateway,
            registry,
            poll_interval,
        }
    }

    /// Run until shutdown. Each tick is one [`CommandBridge::run_cycle`].
    pub async fn run(&self, shutdown: ShutdownSignal) {
        info!(
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "Command bridge started"
        );
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.run_cycle().await,
                _ = shutdown.wait() => {
                    info!("Command bridge stopping");
                    return;
                }
            }
        }
    }

    /// One polling cycle: fetch PENDING commands and dispatch those whose
    /// target is connected.
    pub async fn run_cycle(&self) {
        let commands = match self.gateway.fetch_pending_commands().await {
            Ok(commands) => commands,
            Err(e) => {
                warn!(error = %e, "Failed to fetch pending commands");
                return;
            }
        };

        for command in commands {
            self.dispatch(command).await;
        }
    }

    async fn dispatch(&self, command: Command) {
        let Some(session) = self.registry.get(&command.station_id) else {
            // target offline: stays PENDING for a future cycle
            debug!(
                command_id = command.id,
                station_id = command.station_id.as_str(),
                "Command target not connected, deferring"
            );
            return;
        };

        if !session.can_dispatch() {
            // the session is tearing down; the registry entry will go away
            // and the command retries against the next connection
            debug!(
                command_id = command.id,
                station_id = command.station_id.as_str(),
                "Session closing, deferring command"
            );
            return;
        }

        info!(
            command_id = command.id,
            station_id = command.station_id.as_str(),
            action = %command.action,
            "Dispatching command"
        );

        match command.action {
            CommandAction::RemoteStart => {
                let id_tag = command.user_id.clone();
                tokio::spawn(async move {
                    if let Err(e) = session.remote_start(&id_tag).await {
                        warn!(
                            station_id = session.station_id.as_str(),
                            error = %e,
                            "RemoteStart did not complete"
                        );
                    }
                });
                self.mark_executed(command.id).await;
            }
            CommandAction::RemoteStop => {
                // the control plane only names the station; the live open
                // transaction is resolved here
                match session.open_transaction_id() {
                    Some(transaction_id) => {
                        tokio::spawn(async move {
                            if let Err(e) = session.remote_stop(transaction_id).await {
                                warn!(
                                    station_id = session.station_id.as_str(),
                                    transaction_id,
                                    error = %e,
                                    "RemoteStop did not complete"
                                );
                            }
                        });
                        self.mark_executed(command.id).await;
                    }
                    None => {
                        warn!(
                            command_id = command.id,
                            station_id = command.station_id.as_str(),
                            "RemoteStop with no open transaction, failing command"
                        );
                        self.mark_failed(command.id).await;
                    }
                }
            }
        }
    }

    async fn mark_executed(&self, command_id: i64) {
        metrics::counter!("bridge_commands_total", "outcome" => "executed").increment(1);
        if let Err(e) = self.gateway.mark_command_executed(command_id).await {
            warn!(command_id, error = %e, "Failed to mark command executed");
        }
    }

    async fn mark_failed(&self, command_id: i64) {
        metrics::counter!("bridge_commands_total", "outcome" => "failed").increment(1);
        if let Err(e) = self.gateway.mark_command_failed(command_id).await {
            warn!(command_id, error = %e, "Failed to mark command failed");
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::Utc;
    use tokio::sync::mpsc;

    use crate::domain::CommandStatus;
    use crate::infrastructure::{InMemoryGateway, PersistencePool};
    use crate::protocol::Frame;
    use crate::session::{ChargePointSession, ConnectionRegistry};

    struct Rig {
        gateway: Arc<InMemoryGateway>,
        registry: SharedRegistry,
        bridge: CommandBridge,
    }

    fn rig() -> Rig {
        let gateway = Arc::new(InMemoryGateway::seeded());
        let shared: SharedGateway = gateway.clone();
        let registry = ConnectionRegistry::shared();
        let bridge = CommandBridge::new(shared, registry.clone(), Duration::from_millis(1500));
        Rig {
            gateway,
            registry,
            bridge,
        }
    }

    fn connect(rig: &Rig, station_id: &str) -> mpsc::UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        let shared: SharedGateway = rig.gateway.clone();
        let writes = PersistencePool::new(shared.clone(), 1);
        let session = Arc::new(ChargePointSession::new(station_id, tx, shared, writes, 30));
        rig.registry.register(session);
        rx
    }

    #[tokio::test]
    async fn pending_command_executes_exactly_once() {
        let rig = rig();
        let mut outbox = connect(&rig, "CP-1");
        let cmd = rig
            .gateway
            .queue_command("CP-1", "USER-1", CommandAction::RemoteStart);

        rig.bridge.run_cycle().await;
        assert_eq!(
            rig.gateway.command(cmd.id).unwrap().status,
            CommandStatus::Executed
        );

        // the remote call went out
        let sent = outbox.recv().await.unwrap();
        match Frame::decode(&sent).unwrap() {
            Frame::Call { action, payload, .. } => {
                assert_eq!(action, "RemoteStartTransaction");
                assert_eq!(payload["idTag"], "USER-1");
            }
            other => panic!("expected Call, got {:?}", other),
        }

        // later cycles must not dispatch it again
        rig.bridge.run_cycle().await;
        rig.bridge.run_cycle().await;
        assert!(outbox.try_recv().is_err());
    }

    #[tokio::test]
    async fn command_stays_pending_while_target_absent() {
        let rig = rig();
        let cmd = rig
            .gateway
            .queue_command("CP-404", "USER-1", CommandAction::RemoteStart);

        for _ in 0..3 {
            rig.bridge.run_cycle().await;
            assert_eq!(
                rig.gateway.command(cmd.id).unwrap().status,
                CommandStatus::Pending
            );
        }

        // once the target shows up, the next cycle delivers
        let mut outbox = connect(&rig, "CP-404");
        rig.bridge.run_cycle().await;
        assert_eq!(
            rig.gateway.command(cmd.id).unwrap().status,
            CommandStatus::Executed
        );
        assert!(outbox.recv().await.is_some());
    }

    #[tokio::test]
    async fn remote_stop_resolves_open_transaction() {
        let rig = rig();
        let mut outbox = connect(&rig, "CP-1");
        let session = rig.registry.get("CP-1").unwrap();
        let tx = session
            .ledger
            .begin(1, "TAG", 1000, Utc::now())
            .unwrap();

        let cmd = rig
            .gateway
            .queue_command("CP-1", "USER-1", CommandAction::RemoteStop);
        rig.bridge.run_cycle().await;

        assert_eq!(
            rig.gateway.command(cmd.id).unwrap().status,
            CommandStatus::Executed
        );
        let sent = outbox.recv().await.unwrap();
        match Frame::decode(&sent).unwrap() {
            Frame::Call { action, payload, .. } => {
                assert_eq!(action, "RemoteStopTransaction");
                assert_eq!(payload["transactionId"], tx.id);
            }
            other => panic!("expected Call, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn remote_stop_without_transaction_fails_command() {
        let rig = rig();
        let _outbox = connect(&rig, "CP-1");
        let cmd = rig
            .gateway
            .queue_command("CP-1", "USER-1", CommandAction::RemoteStop);

        rig.bridge.run_cycle().await;
        assert_eq!(
            rig.gateway.command(cmd.id).unwrap().status,
            CommandStatus::Failed
        );
    }

    #[tokio::test]
    async fn closing_session_defers_command() {
        let rig = rig();
        let outbox = connect(&rig, "CP-1");
        drop(outbox); // writer side gone: the session cannot dispatch
        let cmd = rig
            .gateway
            .queue_command("CP-1", "USER-1", CommandAction::RemoteStart);

        rig.bridge.run_cycle().await;
        assert_eq!(
            rig.gateway.command(cmd.id).unwrap().status,
            CommandStatus::Pending
        );
    }

    #[tokio::test]
    async fn cycle_survives_multiple_commands() {
        let rig = rig();
        let mut outbox_a = connect(&rig, "CP-A");
        let cmd_a = rig
            .gateway
            .queue_command("CP-A", "USER-1", CommandAction::RemoteStart);
        let cmd_b = rig
            .gateway
            .queue_command("CP-B", "USER-2", CommandAction::RemoteStart);

        rig.bridge.run_cycle().await;
        assert_eq!(
            rig.gateway.command(cmd_a.id).unwrap().status,
            CommandStatus::Executed
        );
        assert_eq!(
            rig.gateway.command(cmd_b.id).unwrap().status,
            CommandStatus::Pending
        );
        assert!(outbox_a.recv().await.is_some());
    }
}
