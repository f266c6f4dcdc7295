//! # FleetPoint OCPP Central System
//!
//! OCPP 1.6 central system core for operating a fleet of EV charging
//! stations: per-station protocol sessions, remote-command dispatch and
//! transaction billing.
//!
//! ## Architecture
//!
//! - **domain**: business entities (stations, transactions, tariffs,
//!   commands)
//! - **protocol**: OCPP-J framing, call correlation and typed payloads
//! - **application**: billing engine, transaction ledger, action handlers
//!   and the command dispatch bridge
//! - **session**: per-station sessions and the live-connection registry
//! - **infrastructure**: persistence gateway seam, write pool, WebSocket
//!   server, shutdown

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod protocol;
pub mod session;

pub use config::{default_config_path, AppConfig};
