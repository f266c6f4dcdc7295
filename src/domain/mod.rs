//! Core business entities and types

pub mod command;
pub mod error;
pub mod station;
pub mod tariff;
pub mod transaction;

pub use command::{Command, CommandAction, CommandStatus};
pub use error::{DomainError, DomainResult};
pub use station::{LiveTelemetry, Station, StationStatus};
pub use tariff::Tariff;
pub use transaction::{Transaction, TransactionRecord, TransactionStatus};
