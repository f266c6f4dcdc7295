//! Business logic: billing, transaction tracking, action handlers and the
//! command dispatch bridge

pub mod billing;
pub mod bridge;
pub mod handlers;
pub mod transactions;

pub use billing::{compute_bill, compute_carbon_saved, Bill};
pub use bridge::CommandBridge;
pub use transactions::TransactionLedger;
