//! Ledger Gateway Simulator
//!
//! A gateway endpoint for local development and end-to-end tests. It speaks
//! the same framed protocol as [`ledger_gateway::TcpTransport`] and answers
//! from an in-memory ledger.
//!
//! ```rust,ignore
//! let server = GatewayServer::bind("127.0.0.1:7053", LedgerSim::new()).await?;
//! tokio::spawn(server.run());
//! ```

pub mod ledger;
pub mod server;
pub mod service;

pub use ledger::LedgerSim;
pub use server::GatewayServer;
pub use service::GatewayService;

/// Listen address used when `GATEWAY_SIM_ADDR` is not set
pub const DEFAULT_ADDR: &str = "127.0.0.1:7053";
