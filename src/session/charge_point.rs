//! Per-station protocol session
//!
//! One instance per connected station. Owns the frame correlation table
//! and the per-connector transaction ledger, dispatches inbound Calls to
//! the action handlers, and exposes the outbound remote-call API used by
//! the command bridge. Inbound frames are processed strictly in arrival
//! order by the connection task; the bridge only touches the outbound
//! side.

use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::application::handlers;
use crate::application::transactions::TransactionLedger;
use crate::infrastructure::{PersistencePool, SharedGateway};
use crate::protocol::messages::{
    RemoteStartStopResponse, RemoteStartStopStatus, RemoteStartTransactionRequest,
    RemoteStopTransactionRequest,
};
use crate::protocol::{CallReply, Frame, FrameError, PendingCalls};

/// How long an outbound Call waits for the station's reply.
const CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Lifecycle of the protocol session itself. Station-level charging state
/// (Available, Charging, ...) lives on the persisted [`crate::domain::Station`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Transport is up, no BootNotification seen yet
    Connecting,
    /// BootNotification accepted
    Registered,
    /// Transport closed; terminal
    Disconnected,
}

/// Errors for outbound remote calls.
#[derive(Debug, Error)]
pub enum OutboundCallError {
    #[error("station is not connected")]
    NotConnected,

    #[error("failed to send: {0}")]
    SendFailed(String),

    #[error("timed out waiting for the station's reply")]
    Timeout,

    #[error("pending call abandoned before the station answered")]
    Abandoned,

    #[error("station returned {code}: {description}")]
    CallError { code: String, description: String },

    #[error("unparseable reply payload: {0}")]
    InvalidReply(String),
}

pub struct ChargePointSession {
    pub station_id: String,
    sender: mpsc::UnboundedSender<String>,
    state: Mutex<SessionState>,
    pending: PendingCalls,
    pub(crate) ledger: TransactionLedger,
    pub(crate) gateway: SharedGateway,
    pub(crate) writes: PersistencePool,
    /// Heartbeat interval handed to the station at Boot, in seconds
    pub(crate) heartbeat_interval: u32,
    pub connected_at: DateTime<Utc>,
}

impl ChargePointSession {
    pub fn new(
        station_id: impl Into<String>,
        sender: mpsc::UnboundedSender<String>,
        gateway: SharedGateway,
        writes: PersistencePool,
        heartbeat_interval: u32,
    ) -> Self {
        let station_id = station_id.into();
        Self {
            ledger: TransactionLedger::new(station_id.clone()),
            station_id,
            sender,
            state: Mutex::new(SessionState::Connecting),
            pending: PendingCalls::new(),
            gateway,
            writes,
            heartbeat_interval,
            connected_at: Utc::now(),
        }
    }

    // ── State ──────────────────────────────────────────────

    pub fn state(&self) -> SessionState {
        self.state
            .lock()
            .map(|s| *s)
            .unwrap_or(SessionState::Disconnected)
    }

    pub(crate) fn mark_registered(&self) {
        if let Ok(mut state) = self.state.lock() {
            if *state == SessionState::Connecting {
                *state = SessionState::Registered;
            }
        }
    }

    /// Terminal: entered on transport close. Pending outbound calls are
    /// abandoned; in-flight persistence writes complete on their own.
    pub fn disconnect(&self) {
        if let Ok(mut state) = self.state.lock() {
            *state = SessionState::Disconnected;
        }
        self.pending.abandon_all();
    }

    /// Whether an outbound call can still be handed to this session.
    pub fn can_dispatch(&self) -> bool {
        self.state() != SessionState::Disconnected && !self.sender.is_closed()
    }

    /// Id of the session's open transaction, if any.
    pub fn open_transaction_id(&self) -> Option<i64> {
        self.ledger.open_transaction_id()
    }

    // ── Inbound ────────────────────────────────────────────

    /// Process one inbound frame; returns the reply to write back, if any.
    pub async fn handle(&self, text: &str) -> Option<String> {
        metrics::counter!("ocpp_frames_total", "direction" => "in").increment(1);

        match Frame::decode(text) {
            Ok(Frame::Call {
                unique_id,
                action,
                payload,
            }) => {
                let reply = match handlers::dispatch(self, &action, payload).await {
                    Ok(result) => Frame::CallResult {
                        unique_id,
                        payload: result,
                    },
                    Err(e) => {
                        warn!(
                            station_id = self.station_id.as_str(),
                            action = action.as_str(),
                            code = e.code,
                            "Call rejected: {}",
                            e.description
                        );
                        Frame::error_reply(unique_id, e.code, e.description)
                    }
                };
                Some(reply.encode())
            }

            Ok(Frame::CallResult { unique_id, payload }) => {
                if !self.pending.resolve(&unique_id, CallReply::Result(payload)) {
                    warn!(
                        station_id = self.station_id.as_str(),
                        unique_id = unique_id.as_str(),
                        "Dropping reply with no pending call"
                    );
                }
                None
            }

            Ok(Frame::CallError {
                unique_id,
                code,
                description,
                ..
            }) => {
                let matched = self.pending.resolve(
                    &unique_id,
                    CallReply::Error {
                        code: code.clone(),
                        description: description.clone(),
                    },
                );
                if !matched {
                    warn!(
                        station_id = self.station_id.as_str(),
                        unique_id = unique_id.as_str(),
                        code = code.as_str(),
                        "Dropping error reply with no pending call"
                    );
                }
                None
            }

            Err(e) => self.reject_malformed(text, e),
        }
    }

    /// A malformed frame is dropped; when a unique id can be salvaged the
    /// station still gets a protocol error so it can stop retrying.
    fn reject_malformed(&self, text: &str, error: FrameError) -> Option<String> {
        metrics::counter!("ocpp_malformed_frames_total").increment(1);
        warn!(
            station_id = self.station_id.as_str(),
            error = %error,
            "Dropping malformed frame"
        );
        crate::protocol::frame::salvage_unique_id(text).map(|unique_id| {
            Frame::error_reply(unique_id, "FormationViolation", error.to_string()).encode()
        })
    }

    // ── Outbound ───────────────────────────────────────────

    /// Queue raw text for the socket writer task.
    pub fn send_raw(&self, message: String) -> Result<(), String> {
        metrics::counter!("ocpp_frames_total", "direction" => "out").increment(1);
        self.sender
            .send(message)
            .map_err(|e| format!("Failed to send message: {}", e))
    }

    /// Send a Call and await the correlated reply. Other inbound traffic
    /// keeps flowing while this waits.
    pub async fn call(&self, action: &str, payload: Value) -> Result<Value, OutboundCallError> {
        if self.state() == SessionState::Disconnected {
            return Err(OutboundCallError::NotConnected);
        }

        let (unique_id, reply) = self.pending.register();
        let frame = Frame::Call {
            unique_id: unique_id.clone(),
            action: action.to_string(),
            payload,
        };

        if let Err(e) = self.send_raw(frame.encode()) {
            self.pending.forget(&unique_id);
            return Err(OutboundCallError::SendFailed(e));
        }

        match timeout(CALL_TIMEOUT, reply).await {
            Ok(Ok(CallReply::Result(payload))) => Ok(payload),
            Ok(Ok(CallReply::Error { code, description })) => {
                Err(OutboundCallError::CallError { code, description })
            }
            Ok(Err(_)) => Err(OutboundCallError::Abandoned),
            Err(_) => {
                self.pending.forget(&unique_id);
                warn!(
                    station_id = self.station_id.as_str(),
                    action, "Outbound call timed out"
                );
                Err(OutboundCallError::Timeout)
            }
        }
    }

    /// Ask the station to start charging for `id_tag`.
    pub async fn remote_start(
        &self,
        id_tag: &str,
    ) -> Result<RemoteStartStopStatus, OutboundCallError> {
        info!(
            station_id = self.station_id.as_str(),
            id_tag, "Sending RemoteStartTransaction"
        );
        let request = RemoteStartTransactionRequest {
            id_tag: id_tag.to_string(),
            connector_id: None,
        };
        let status = self
            .remote_call("RemoteStartTransaction", encode_payload(&request)?)
            .await?;
        info!(
            station_id = self.station_id.as_str(),
            ?status,
            "RemoteStartTransaction answered"
        );
        Ok(status)
    }

    /// Ask the station to stop transaction `transaction_id`.
    pub async fn remote_stop(
        &self,
        transaction_id: i64,
    ) -> Result<RemoteStartStopStatus, OutboundCallError> {
        info!(
            station_id = self.station_id.as_str(),
            transaction_id, "Sending RemoteStopTransaction"
        );
        let request = RemoteStopTransactionRequest { transaction_id };
        let status = self
            .remote_call("RemoteStopTransaction", encode_payload(&request)?)
            .await?;
        info!(
            station_id = self.station_id.as_str(),
            ?status,
            "RemoteStopTransaction answered"
        );
        Ok(status)
    }

    async fn remote_call(
        &self,
        action: &str,
        payload: Value,
    ) -> Result<RemoteStartStopStatus, OutboundCallError> {
        let reply = self.call(action, payload).await?;
        let parsed: RemoteStartStopResponse = serde_json::from_value(reply)
            .map_err(|e| OutboundCallError::InvalidReply(e.to_string()))?;
        Ok(parsed.status)
    }
}

fn encode_payload<T: serde::Serialize>(payload: &T) -> Result<Value, OutboundCallError> {
    serde_json::to_value(payload).map_err(|e| OutboundCallError::InvalidReply(e.to_string()))
}

// ── Tests ──────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use serde_json::json;

    use crate::domain::{StationStatus, TransactionStatus};
    use crate::infrastructure::InMemoryGateway;

    struct Harness {
        session: Arc<ChargePointSession>,
        gateway: Arc<InMemoryGateway>,
        outbox: mpsc::UnboundedReceiver<String>,
    }

    fn harness_on(gateway: Arc<InMemoryGateway>) -> Harness {
        let (tx, rx) = mpsc::unbounded_channel();
        let shared: SharedGateway = gateway.clone();
        let writes = PersistencePool::new(shared.clone(), 3);
        Harness {
            session: Arc::new(ChargePointSession::new("CP-1", tx, shared, writes, 30)),
            gateway,
            outbox: rx,
        }
    }

    fn harness() -> Harness {
        harness_on(Arc::new(InMemoryGateway::seeded()))
    }

    /// Let fire-and-forget persistence writes land.
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(25)).await;
    }

    fn call_frame(id: &str, action: &str, payload: Value) -> String {
        Frame::Call {
            unique_id: id.into(),
            action: action.into(),
            payload,
        }
        .encode()
    }

    fn reply_payload(reply: &str) -> Value {
        match Frame::decode(reply).unwrap() {
            Frame::CallResult { payload, .. } => payload,
            other => panic!("expected CallResult, got {:?}", other),
        }
    }

    async fn boot(h: &Harness) {
        let reply = h
            .session
            .handle(&call_frame(
                "boot-1",
                "BootNotification",
                json!({"chargePointVendor": "VendorX", "chargePointModel": "ModelY"}),
            ))
            .await
            .unwrap();
        assert_eq!(reply_payload(&reply)["status"], "Accepted");
        settle().await;
    }

    async fn start_transaction(h: &Harness, connector: u32, meter_start: i64) -> i64 {
        let reply = h
            .session
            .handle(&call_frame(
                "start-1",
                "StartTransaction",
                json!({
                    "connectorId": connector,
                    "idTag": "T1",
                    "meterStart": meter_start,
                    "timestamp": "2024-06-01T10:00:00Z"
                }),
            ))
            .await
            .unwrap();
        let payload = reply_payload(&reply);
        assert_eq!(payload["idTagInfo"]["status"], "Accepted");
        settle().await;
        payload["transactionId"].as_i64().unwrap()
    }

    #[tokio::test]
    async fn boot_registers_station_as_available() {
        let mut h = harness();
        boot(&h).await;
        settle().await;

        assert_eq!(h.session.state(), SessionState::Registered);
        let station = h.gateway.station("CP-1").unwrap();
        assert_eq!(station.vendor.as_deref(), Some("VendorX"));
        assert_eq!(station.model.as_deref(), Some("ModelY"));
        assert_eq!(station.status, StationStatus::Available);
        assert!(h.outbox.try_recv().is_err());
    }

    #[tokio::test]
    async fn heartbeat_echoes_current_time_without_side_effects() {
        let h = harness();
        let reply = h
            .session
            .handle(&call_frame("hb-1", "Heartbeat", json!({})))
            .await
            .unwrap();
        let payload = reply_payload(&reply);
        assert!(payload["currentTime"].is_string());
        assert_eq!(h.gateway.transaction_count(), 0);
    }

    #[tokio::test]
    async fn status_notification_updates_station() {
        let h = harness();
        boot(&h).await;

        let reply = h
            .session
            .handle(&call_frame(
                "st-1",
                "StatusNotification",
                json!({"connectorId": 1, "errorCode": "NoError", "status": "Charging"}),
            ))
            .await
            .unwrap();
        assert_eq!(reply_payload(&reply), json!({}));
        settle().await;

        assert_eq!(
            h.gateway.station("CP-1").unwrap().status,
            StationStatus::Charging
        );
    }

    #[tokio::test]
    async fn unknown_status_is_acknowledged_but_not_persisted() {
        let h = harness();
        boot(&h).await;
        settle().await;

        let reply = h
            .session
            .handle(&call_frame(
                "st-2",
                "StatusNotification",
                json!({"connectorId": 1, "errorCode": "NoError", "status": "Melting"}),
            ))
            .await;
        assert!(reply.is_some());
        settle().await;

        assert_eq!(
            h.gateway.station("CP-1").unwrap().status,
            StationStatus::Available
        );
    }

    #[tokio::test]
    async fn start_transaction_opens_and_marks_charging() {
        let h = harness();
        boot(&h).await;
        let tx_id = start_transaction(&h, 1, 1000).await;
        settle().await;

        assert!(tx_id > 0);
        assert_eq!(h.session.open_transaction_id(), Some(tx_id));
        assert_eq!(
            h.gateway.station("CP-1").unwrap().status,
            StationStatus::Charging
        );
        // the open transaction is already visible in storage, unbilled
        let record = h.gateway.transaction(tx_id).unwrap();
        assert_eq!(record.transaction.status, TransactionStatus::Open);
        assert!(record.bill.is_none());
    }

    #[tokio::test]
    async fn concurrent_start_on_same_connector_is_refused() {
        let h = harness();
        boot(&h).await;
        let first = start_transaction(&h, 1, 1000).await;

        let reply = h
            .session
            .handle(&call_frame(
                "start-2",
                "StartTransaction",
                json!({
                    "connectorId": 1,
                    "idTag": "T2",
                    "meterStart": 2000,
                    "timestamp": "2024-06-01T10:05:00Z"
                }),
            ))
            .await
            .unwrap();
        let payload = reply_payload(&reply);
        assert_eq!(payload["idTagInfo"]["status"], "ConcurrentTx");
        assert_eq!(payload["transactionId"], 0);
        // the original transaction is untouched
        assert_eq!(h.session.open_transaction_id(), Some(first));
    }

    #[tokio::test]
    async fn stop_transaction_bills_and_returns_to_available() {
        let h = harness();
        boot(&h).await;
        let tx_id = start_transaction(&h, 1, 1000).await;

        let reply = h
            .session
            .handle(&call_frame(
                "stop-1",
                "StopTransaction",
                json!({
                    "transactionId": tx_id,
                    "meterStop": 11_000,
                    "timestamp": "2024-06-01T10:45:00Z"
                }),
            ))
            .await
            .unwrap();
        assert_eq!(reply_payload(&reply)["idTagInfo"]["status"], "Accepted");
        settle().await;

        let record = h.gateway.transaction(tx_id).unwrap();
        assert_eq!(record.transaction.status, TransactionStatus::Completed);
        assert_eq!(record.transaction.energy_kwh(), Some(10.0));
        assert_eq!(record.transaction.duration_minutes(), Some(45.0));

        let bill = record.bill.unwrap();
        assert_eq!(bill.carbon_saved_kg, 8.5);
        assert!(bill.tariff_name.starts_with("Standard"));
        // total always reconciles against its parts
        assert_eq!(
            bill.total_amount,
            ((bill.subtotal + bill.tax_amount) * 100.0).round() / 100.0
        );

        assert_eq!(h.session.open_transaction_id(), None);
        assert_eq!(
            h.gateway.station("CP-1").unwrap().status,
            StationStatus::Available
        );
    }

    #[tokio::test]
    async fn stop_without_tariff_still_closes_with_zero_bill() {
        // no tariff assigned anywhere
        let h = harness_on(Arc::new(InMemoryGateway::new()));

        boot(&h).await;
        let tx_id = start_transaction(&h, 1, 1000).await;
        h.session
            .handle(&call_frame(
                "stop-1",
                "StopTransaction",
                json!({
                    "transactionId": tx_id,
                    "meterStop": 11_000,
                    "timestamp": "2024-06-01T10:45:00Z"
                }),
            ))
            .await
            .unwrap();
        settle().await;

        let bill = h.gateway.transaction(tx_id).unwrap().bill.unwrap();
        assert_eq!(bill.total_amount, 0.0);
        assert_eq!(bill.tariff_name, "Unknown");
        assert_eq!(bill.carbon_saved_kg, 8.5);
    }

    #[tokio::test]
    async fn stop_with_unknown_id_is_accepted_without_billing() {
        let h = harness();
        boot(&h).await;
        settle().await;
        let before = h.gateway.transaction_count();

        let reply = h
            .session
            .handle(&call_frame(
                "stop-9",
                "StopTransaction",
                json!({
                    "transactionId": 123_456_789,
                    "meterStop": 5000,
                    "timestamp": "2024-06-01T11:00:00Z"
                }),
            ))
            .await
            .unwrap();
        // protocol requires an acceptance reply even for unknown ids
        assert_eq!(reply_payload(&reply)["idTagInfo"]["status"], "Accepted");
        settle().await;
        assert_eq!(h.gateway.transaction_count(), before);
    }

    #[tokio::test]
    async fn meter_values_update_live_telemetry_only() {
        let h = harness();
        boot(&h).await;
        let tx_id = start_transaction(&h, 1, 1000).await;

        let reply = h
            .session
            .handle(&call_frame(
                "mv-1",
                "MeterValues",
                json!({
                    "connectorId": 1,
                    "transactionId": tx_id,
                    "meterValue": [{
                        "timestamp": "2024-06-01T10:10:00Z",
                        "sampledValue": [
                            {"value": "15500", "measurand": "Energy.Active.Import.Register", "unit": "Wh"},
                            {"value": "11000", "measurand": "Power.Active.Import", "unit": "W"},
                            {"value": "64", "measurand": "SoC"},
                            {"value": "not-a-number", "measurand": "Power.Active.Import"}
                        ]
                    }]
                }),
            ))
            .await
            .unwrap();
        assert_eq!(reply_payload(&reply), json!({}));
        settle().await;

        let station = h.gateway.station("CP-1").unwrap();
        assert_eq!(station.session_energy_kwh, 15.5);
        assert_eq!(station.current_power_kw, 11.0);
        assert_eq!(station.soc_percent, Some(64));
        // no transaction update happens on meter values
        let record = h.gateway.transaction(tx_id).unwrap();
        assert_eq!(record.transaction.meter_stop, None);
    }

    #[tokio::test]
    async fn unknown_action_gets_not_implemented() {
        let h = harness();
        let reply = h
            .session
            .handle(&call_frame("x-1", "FlashFirmware", json!({})))
            .await
            .unwrap();
        match Frame::decode(&reply).unwrap() {
            Frame::CallError { code, .. } => assert_eq!(code, "NotImplemented"),
            other => panic!("expected CallError, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn bad_payload_gets_formation_violation() {
        let h = harness();
        let reply = h
            .session
            .handle(&call_frame(
                "x-2",
                "StartTransaction",
                json!({"connectorId": "one"}),
            ))
            .await
            .unwrap();
        match Frame::decode(&reply).unwrap() {
            Frame::CallError { code, .. } => assert_eq!(code, "FormationViolation"),
            other => panic!("expected CallError, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn malformed_frame_with_salvageable_id_is_answered() {
        let h = harness();
        let reply = h.session.handle(r#"[9,"weird-1","Nope",{}]"#).await.unwrap();
        match Frame::decode(&reply).unwrap() {
            Frame::CallError { unique_id, code, .. } => {
                assert_eq!(unique_id, "weird-1");
                assert_eq!(code, "FormationViolation");
            }
            other => panic!("expected CallError, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn unparseable_garbage_is_dropped_silently() {
        let h = harness();
        assert!(h.session.handle("totally not json").await.is_none());
    }

    #[tokio::test]
    async fn unmatched_reply_is_dropped() {
        let h = harness();
        assert!(h.session.handle(r#"[3,"ghost",{}]"#).await.is_none());
        assert!(h
            .session
            .handle(r#"[4,"ghost","InternalError","",{}]"#)
            .await
            .is_none());
    }

    #[tokio::test]
    async fn remote_start_correlates_with_reply() {
        let mut h = harness();
        let session = h.session.clone();

        let caller = tokio::spawn(async move { session.remote_start("USER-1").await });

        // the station answers the Call we find in the outbox
        let sent = h.outbox.recv().await.unwrap();
        let (unique_id, action, payload) = match Frame::decode(&sent).unwrap() {
            Frame::Call {
                unique_id,
                action,
                payload,
            } => (unique_id, action, payload),
            other => panic!("expected Call, got {:?}", other),
        };
        assert_eq!(action, "RemoteStartTransaction");
        assert_eq!(payload["idTag"], "USER-1");

        let reply = Frame::CallResult {
            unique_id,
            payload: json!({"status": "Accepted"}),
        };
        assert!(h.session.handle(&reply.encode()).await.is_none());

        assert_eq!(caller.await.unwrap().unwrap(), RemoteStartStopStatus::Accepted);
    }

    #[tokio::test]
    async fn remote_stop_surfaces_station_error() {
        let mut h = harness();
        let session = h.session.clone();

        let caller = tokio::spawn(async move { session.remote_stop(42).await });

        let sent = h.outbox.recv().await.unwrap();
        let unique_id = Frame::decode(&sent).unwrap().unique_id().to_string();
        let reply = Frame::error_reply(unique_id, "InternalError", "busy");
        h.session.handle(&reply.encode()).await;

        match caller.await.unwrap() {
            Err(OutboundCallError::CallError { code, .. }) => assert_eq!(code, "InternalError"),
            other => panic!("expected CallError, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn disconnect_abandons_pending_calls() {
        let h = harness();
        let session = h.session.clone();

        let caller = tokio::spawn(async move { session.remote_start("USER-1").await });
        // give the call a chance to register its slot
        tokio::time::sleep(Duration::from_millis(10)).await;

        h.session.disconnect();
        match caller.await.unwrap() {
            Err(OutboundCallError::Abandoned) => {}
            other => panic!("expected Abandoned, got {:?}", other),
        }
        assert!(matches!(
            h.session.remote_start("USER-1").await,
            Err(OutboundCallError::NotConnected)
        ));
    }
}
