//! Ledger Gateway
//!
//! Client-side gateway adapter for a remote ledger network. An application
//! hands signed proposals to a [`Gateway`], which carries them over a single
//! channel to the gateway endpoint:
//! - `evaluate` - unary call, resolves with the result value as text
//! - `endorse` - unary call, resolves with the endorsed transaction
//! - `submit` - streaming call, reports commit events and resolves when the
//!   endpoint ends the stream
//!
//! ## Architecture
//!
//! ```text
//!   GatewayBuilder ──validate──> Gateway ──> call bridge ──> GatewayTransport
//!   (url, signer)                   │          (deadlines,       │
//!                                   │           settlement)      ├─ ChannelTransport (in-process)
//!                         get_network(name)                      └─ TcpTransport (framed bincode)
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use ledger_gateway::{create_builder, CommitEvent, SignedProposal};
//!
//! let gateway = create_builder()
//!     .url("localhost:7053")
//!     .signer(|payload: &[u8]| my_key.sign(payload))
//!     .connect()
//!     .await?;
//!
//! let value = gateway.evaluate(proposal).await?;
//! let endorsed = gateway.endorse(other_proposal).await?;
//! gateway
//!     .submit(endorsed, &mut |event: &CommitEvent| println!("{}", event.value_lossy()))
//!     .await?;
//! ```

pub mod bridge;
pub mod config;
pub mod connection;
pub mod error;
pub mod messages;
pub mod network;
pub mod signer;
pub mod transport;

// Re-export commonly used types
pub use bridge::{CommitObserver, SignalForwarder};
pub use config::{CredentialsConfig, CredentialsMode, GatewayClientConfig};
pub use connection::{ConnectionConfig, ConnectionState, Gateway, GatewayBuilder, create_builder};
pub use error::{ConfigError, GatewayError, TransportError};
pub use messages::{
    CallStatus, CommitEvent, EndorsedTransaction, EvaluateResponse, PreparedTransaction,
    SignedProposal, StatusCode, SubmitSignal,
};
pub use network::Network;
pub use signer::Signer;
pub use transport::{
    CallOptions, CommitStream, GatewayTransport, TransportConfig, TransportConnector,
    TransportCredentials,
    channel::{ChannelConnector, ChannelResponder, ChannelTransport, CommitSink, IncomingCall},
    tcp::{TcpConnector, TcpTransport},
};
