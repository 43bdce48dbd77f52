//! Transport abstraction layer
//!
//! The gateway talks to the remote endpoint through [`GatewayTransport`],
//! which describes the three call shapes: two unary calls (evaluate,
//! endorse) and one unary-request/streaming-response call (submit).
//! Implementations must support concurrent outstanding calls on one channel.
//!
//! Two transports ship with the crate:
//! - [`channel::ChannelTransport`]: tokio channels, single process (tests, embedding)
//! - [`tcp::TcpTransport`]: length-prefixed bincode frames over one TCP socket

pub mod channel;
pub mod config;
pub mod tcp;
pub mod wire;

pub use config::TransportConfig;

use crate::error::TransportError;
use crate::messages::{
    EndorsedTransaction, EvaluateResponse, PreparedTransaction, SignedProposal, SubmitSignal,
};
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;

/// One item of a submit stream
pub type StreamItem = Result<SubmitSignal, TransportError>;

/// Per-call options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallOptions {
    /// Upper bound on the call's duration, measured from issue
    pub deadline: Option<Duration>,
}

impl CallOptions {
    pub fn with_deadline(deadline: Duration) -> Self {
        Self {
            deadline: Some(deadline),
        }
    }

    /// Deadline in whole milliseconds, as sent on the wire
    pub fn timeout_ms(&self) -> Option<u64> {
        self.deadline
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }
}

/// TLS settings, opaque to the built-in transports
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsSettings {
    /// PEM-encoded CA certificate(s) used to verify the endpoint
    pub ca_cert_pem: Option<Vec<u8>>,
    /// Server name to verify, if it differs from the endpoint host
    pub server_name: Option<String>,
}

/// Credentials used to open a transport
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TransportCredentials {
    /// Plaintext, unauthenticated
    #[default]
    Insecure,
    /// Authenticated transport; only connectors that understand TLS accept it
    Tls(TlsSettings),
}

impl TransportCredentials {
    pub fn insecure() -> Self {
        Self::Insecure
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Insecure => "insecure",
            Self::Tls(_) => "tls",
        }
    }
}

/// Runs a hook when dropped, unless disarmed
///
/// Transports use it to release per-call state (and cancel the remote call)
/// when the caller stops waiting.
pub struct CallGuard {
    on_drop: Option<Box<dyn FnOnce() + Send>>,
}

impl CallGuard {
    pub fn new(on_drop: impl FnOnce() + Send + 'static) -> Self {
        Self {
            on_drop: Some(Box::new(on_drop)),
        }
    }

    /// The call settled normally; do not run the hook
    pub fn disarm(&mut self) {
        self.on_drop = None;
    }
}

impl Drop for CallGuard {
    fn drop(&mut self) {
        if let Some(hook) = self.on_drop.take() {
            hook();
        }
    }
}

/// Receiving end of a submit stream
///
/// Yields items in the order the endpoint produced them. `None` means the
/// underlying channel closed; a well-behaved transport sends
/// [`SubmitSignal::End`] or an error first.
pub struct CommitStream {
    rx: mpsc::Receiver<StreamItem>,
    guard: Option<CallGuard>,
}

impl CommitStream {
    pub fn new(rx: mpsc::Receiver<StreamItem>) -> Self {
        Self { rx, guard: None }
    }

    pub fn with_guard(rx: mpsc::Receiver<StreamItem>, guard: CallGuard) -> Self {
        Self {
            rx,
            guard: Some(guard),
        }
    }

    /// Create a sender/stream pair with the given capacity
    pub fn channel(capacity: usize) -> (mpsc::Sender<StreamItem>, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (tx, Self::new(rx))
    }

    /// Wait for the next item
    pub async fn next(&mut self) -> Option<StreamItem> {
        let item = self.rx.recv().await;
        let settled = match &item {
            Some(Ok(signal)) => signal.is_terminal(),
            Some(Err(_)) | None => true,
        };
        if settled && let Some(guard) = self.guard.as_mut() {
            guard.disarm();
        }
        item
    }
}

/// The three call shapes of a gateway endpoint
#[async_trait]
pub trait GatewayTransport: Send + Sync {
    /// Unary call: evaluate a proposal without committing it
    async fn evaluate(
        &self,
        proposal: SignedProposal,
        options: &CallOptions,
    ) -> Result<EvaluateResponse, TransportError>;

    /// Unary call: collect endorsements for a proposal
    async fn endorse(
        &self,
        proposal: SignedProposal,
        options: &CallOptions,
    ) -> Result<EndorsedTransaction, TransportError>;

    /// Streaming call: submit a transaction and follow its commit progress
    async fn submit(
        &self,
        transaction: PreparedTransaction,
        options: &CallOptions,
    ) -> Result<CommitStream, TransportError>;

    /// Check if the channel is still usable
    fn is_active(&self) -> bool {
        true
    }
}

/// Opens a transport to an endpoint
#[async_trait]
pub trait TransportConnector: Send + Sync {
    type Transport: GatewayTransport + 'static;

    async fn open(
        &self,
        endpoint: &str,
        credentials: &TransportCredentials,
        config: &TransportConfig,
    ) -> Result<Self::Transport, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    // Ensure the transport trait is object-safe
    fn _assert_transport_object_safe(_: &dyn GatewayTransport) {}

    #[test]
    fn test_timeout_ms() {
        assert_eq!(CallOptions::default().timeout_ms(), None);
        assert_eq!(
            CallOptions::with_deadline(Duration::from_millis(1500)).timeout_ms(),
            Some(1500)
        );
    }

    #[test]
    fn test_guard_runs_on_drop() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();
        drop(CallGuard::new(move || flag.store(true, Ordering::SeqCst)));
        assert!(fired.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_stream_disarms_guard_after_end() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();
        let (tx, rx) = mpsc::channel(4);
        let mut stream =
            CommitStream::with_guard(rx, CallGuard::new(move || flag.store(true, Ordering::SeqCst)));

        tx.send(Ok(SubmitSignal::event("a"))).await.unwrap();
        tx.send(Ok(SubmitSignal::End)).await.unwrap();

        assert_eq!(stream.next().await, Some(Ok(SubmitSignal::event("a"))));
        assert_eq!(stream.next().await, Some(Ok(SubmitSignal::End)));
        drop(stream);
        assert!(!fired.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_stream_dropped_early_runs_guard() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();
        let (tx, rx) = mpsc::channel(4);
        let mut stream =
            CommitStream::with_guard(rx, CallGuard::new(move || flag.store(true, Ordering::SeqCst)));

        tx.send(Ok(SubmitSignal::event("a"))).await.unwrap();
        stream.next().await;
        drop(stream);
        assert!(fired.load(Ordering::SeqCst));
    }
}
