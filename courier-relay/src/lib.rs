pub mod config;
pub mod error;
pub mod queue;
pub mod transport;
pub mod worker;

pub use config::RelayConfig;
pub use error::TransportError;
pub use queue::EventSink;
pub use transport::{Connection, Connector, MockConnector, TcpConnector};
pub use worker::RelayWorker;
