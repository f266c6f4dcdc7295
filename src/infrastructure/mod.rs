//! External concerns: persistence seam, write pool, WebSocket server and
//! shutdown coordination

pub mod gateway;
pub mod memory;
pub mod pool;
pub mod server;
pub mod shutdown;

pub use gateway::{PersistenceGateway, SharedGateway};
pub use memory::InMemoryGateway;
pub use pool::{PersistencePool, WriteJob};
pub use server::OcppServer;
pub use shutdown::{listen_for_shutdown_signals, ShutdownSignal};
