//! WebSocket server for station connections

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::domain::StationStatus;
use crate::session::{ChargePointSession, SharedRegistry};

use super::pool::{PersistencePool, WriteJob};
use super::shutdown::ShutdownSignal;
use super::SharedGateway;

/// WebSocket subprotocol stations negotiate
const OCPP_SUBPROTOCOL: &str = "ocpp1.6";

/// Identifier for a station that connected without a path segment
const UNKNOWN_STATION_ID: &str = "UNKNOWN";

pub struct OcppServer {
    config: ServerConfig,
    registry: SharedRegistry,
    gateway: SharedGateway,
    writes: PersistencePool,
    shutdown: Option<ShutdownSignal>,
}

impl OcppServer {
    pub fn new(
        config: ServerConfig,
        registry: SharedRegistry,
        gateway: SharedGateway,
        writes: PersistencePool,
    ) -> Self {
        Self {
            config,
            registry,
            gateway,
            writes,
            shutdown: None,
        }
    }

    /// Set the shutdown signal for graceful shutdown
    pub fn with_shutdown(mut self, signal: ShutdownSignal) -> Self {
        self.shutdown = Some(signal);
        self
    }

    /// Bind and serve until shutdown.
    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let addr = self.config.address();
        let listener = TcpListener::bind(&addr).await?;
        info!("OCPP central system listening on ws://{}", addr);
        info!(
            "   Stations connect to: ws://{}/ocpp/{{station_id}}",
            addr
        );
        self.serve(listener).await
    }

    /// Accept loop over an already-bound listener.
    pub async fn serve(
        &self,
        listener: TcpListener,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => self.spawn_connection(stream, addr),
                        Err(e) => error!("Failed to accept connection: {}", e),
                    }
                }
                _ = wait_for(&self.shutdown) => {
                    info!("WebSocket server received shutdown signal");
                    return Ok(());
                }
            }
        }
    }

    fn spawn_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let registry = self.registry.clone();
        let gateway = self.gateway.clone();
        let writes = self.writes.clone();
        let heartbeat_interval = self.config.heartbeat_interval;
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            if let Err(e) = handle_connection(
                stream,
                addr,
                registry,
                gateway,
                writes,
                heartbeat_interval,
                shutdown,
            )
            .await
            {
                error!("Connection error from {}: {}", addr, e);
            }
        });
    }
}

/// Station id from the request path: the last path segment, with an
/// optional `/ocpp` prefix. An empty path maps to the `UNKNOWN` sentinel.
fn extract_station_id(path: &str) -> String {
    let trimmed = path.trim_matches('/');
    let id = trimmed.rsplit('/').next().unwrap_or("");
    if id.is_empty() || id == "ocpp" {
        UNKNOWN_STATION_ID.to_string()
    } else {
        id.to_string()
    }
}

async fn wait_for(shutdown: &Option<ShutdownSignal>) {
    match shutdown {
        Some(signal) => signal.wait().await,
        None => std::future::pending().await,
    }
}

#[allow(clippy::too_many_arguments)]
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    registry: SharedRegistry,
    gateway: SharedGateway,
    writes: PersistencePool,
    heartbeat_interval: u32,
    shutdown: Option<ShutdownSignal>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    info!("New connection from {}", addr);

    // filled in during the handshake callback
    let mut station_id = UNKNOWN_STATION_ID.to_string();

    let ws_stream =
        tokio_tungstenite::accept_hdr_async(stream, |req: &Request, mut response: Response| {
            let path = req.uri().path();
            station_id = extract_station_id(path);
            debug!("Handshake from {}: path={}", addr, path);

            // echo the ocpp1.6 subprotocol when the station offers it;
            // stations that omit it are accepted all the same
            let offered = req
                .headers()
                .get("Sec-WebSocket-Protocol")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("");
            let supports_ocpp = offered.split(',').map(str::trim).any(|p| p == OCPP_SUBPROTOCOL);
            if supports_ocpp {
                if let Ok(value) = OCPP_SUBPROTOCOL.parse() {
                    response
                        .headers_mut()
                        .insert("Sec-WebSocket-Protocol", value);
                }
            } else if !offered.is_empty() {
                warn!("Station offered subprotocols without {}: {}", OCPP_SUBPROTOCOL, offered);
            }

            Ok(response)
        })
        .await?;

    info!(station_id = station_id.as_str(), "Station connected from {}", addr);
    metrics::counter!("station_connections_total").increment(1);

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    // frames queued by the session (replies and outbound calls) flow
    // through this channel to the single socket writer
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    let session = Arc::new(ChargePointSession::new(
        station_id.clone(),
        tx,
        gateway,
        writes.clone(),
        heartbeat_interval,
    ));
    registry.register(session.clone());

    let writer_station = station_id.clone();
    let send_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            debug!(station_id = writer_station.as_str(), "-> {}", message);
            if let Err(e) = ws_sender.send(Message::Text(message)).await {
                error!(station_id = writer_station.as_str(), "Send error: {}", e);
                break;
            }
        }
    });

    // inbound frames are handled one at a time, in arrival order
    loop {
        tokio::select! {
            message = ws_receiver.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        debug!(station_id = station_id.as_str(), "<- {}", text);
                        if let Some(reply) = session.handle(&text).await {
                            if let Err(e) = session.send_raw(reply) {
                                error!(station_id = station_id.as_str(), "Failed to queue reply: {}", e);
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                        // pongs are handled by the transport
                    }
                    Some(Ok(Message::Close(frame))) => {
                        info!(station_id = station_id.as_str(), "Close frame received: {:?}", frame);
                        break;
                    }
                    Some(Ok(Message::Binary(data))) => {
                        warn!(
                            station_id = station_id.as_str(),
                            "Ignoring binary message ({} bytes)",
                            data.len()
                        );
                    }
                    Some(Ok(Message::Frame(_))) => {}
                    Some(Err(e)) => {
                        error!(station_id = station_id.as_str(), "WebSocket error: {}", e);
                        break;
                    }
                    None => break,
                }
            }
            _ = wait_for(&shutdown) => {
                info!(station_id = station_id.as_str(), "Closing connection for shutdown");
                break;
            }
        }
    }

    // teardown: abandon pending calls, drop from the registry, mark the
    // station offline. An open transaction stays OPEN in the store;
    // reconciliation is the operator's concern.
    session.disconnect();
    registry.unregister(&station_id);
    writes.submit(WriteJob::UpdateStationStatus {
        station_id: station_id.clone(),
        status: StationStatus::Offline,
    });
    send_task.abort();

    info!(station_id = station_id.as_str(), "Station disconnected");
    Ok(())
}

// ── Tests ──────────────────────────────────────────────────────
