//! Tokio channel-based transport for single-process mode
//!
//! Calls travel over an mpsc queue to a [`ChannelResponder`], which plays
//! the remote endpoint. No serialization overhead - messages are passed
//! directly. Unary calls carry a one-shot reply; submit carries a
//! [`CommitSink`] that feeds the caller's [`CommitStream`].

use crate::error::TransportError;
use crate::messages::{
    CallStatus, CommitEvent, EndorsedTransaction, EvaluateResponse, PreparedTransaction,
    SignedProposal, SubmitSignal,
};
use crate::transport::config::TransportConfig;
use crate::transport::{
    CallOptions, CommitStream, GatewayTransport, StreamItem, TransportConnector,
    TransportCredentials,
};
use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

/// One-shot reply handle for a unary call
///
/// Consumed by the first reply, so a call settles exactly once.
pub struct UnaryReply<T> {
    tx: oneshot::Sender<Result<T, TransportError>>,
}

impl<T> UnaryReply<T> {
    pub fn new(tx: oneshot::Sender<Result<T, TransportError>>) -> Self {
        Self { tx }
    }

    /// Reply with a response. Returns false if the caller stopped waiting.
    pub fn send(self, response: T) -> bool {
        self.tx.send(Ok(response)).is_ok()
    }

    /// Reject the call with a remote status
    pub fn reject(self, status: CallStatus) -> bool {
        self.fail(TransportError::Rejected(status))
    }

    /// Fail the call with a transport error
    pub fn fail(self, error: TransportError) -> bool {
        self.tx.send(Err(error)).is_ok()
    }

    /// Check if the caller stopped waiting
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Producer side of a submit stream
///
/// `end`, `reject` and `fail` consume the sink, so nothing can follow a
/// terminal signal.
pub struct CommitSink {
    tx: mpsc::Sender<StreamItem>,
}

impl CommitSink {
    pub fn new(tx: mpsc::Sender<StreamItem>) -> Self {
        Self { tx }
    }

    /// Emit a commit event
    pub async fn event(&self, event: CommitEvent) -> Result<(), TransportError> {
        self.push(Ok(SubmitSignal::Event(event))).await
    }

    /// Emit status metadata
    pub async fn status(&self, status: CallStatus) -> Result<(), TransportError> {
        self.push(Ok(SubmitSignal::Status(status))).await
    }

    /// End the stream normally
    pub async fn end(self) -> Result<(), TransportError> {
        self.push(Ok(SubmitSignal::End)).await
    }

    /// End the stream with a remote status
    pub async fn reject(self, status: CallStatus) -> Result<(), TransportError> {
        self.push(Err(TransportError::Rejected(status))).await
    }

    /// End the stream with a transport error
    pub async fn fail(self, error: TransportError) -> Result<(), TransportError> {
        self.push(Err(error)).await
    }

    /// Check if the caller stopped listening
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    async fn push(&self, item: StreamItem) -> Result<(), TransportError> {
        self.tx
            .send(item)
            .await
            .map_err(|_| TransportError::ChannelClosed)
    }
}

/// A call delivered to the responder
pub enum IncomingCall {
    Evaluate {
        proposal: SignedProposal,
        options: CallOptions,
        reply: UnaryReply<EvaluateResponse>,
    },
    Endorse {
        proposal: SignedProposal,
        options: CallOptions,
        reply: UnaryReply<EndorsedTransaction>,
    },
    Submit {
        transaction: PreparedTransaction,
        options: CallOptions,
        sink: CommitSink,
    },
}

impl IncomingCall {
    pub fn kind(&self) -> &'static str {
        match self {
            IncomingCall::Evaluate { .. } => "evaluate",
            IncomingCall::Endorse { .. } => "endorse",
            IncomingCall::Submit { .. } => "submit",
        }
    }
}

/// Channel-based gateway transport (client side)
#[derive(Clone)]
pub struct ChannelTransport {
    tx: mpsc::Sender<IncomingCall>,
    stream_capacity: usize,
}

impl ChannelTransport {
    /// Create a transport/responder pair
    pub fn pair(capacity: usize) -> (Self, ChannelResponder) {
        Self::pair_with_config(capacity, &TransportConfig::default())
    }

    /// Create a transport/responder pair with custom stream buffering
    pub fn pair_with_config(capacity: usize, config: &TransportConfig) -> (Self, ChannelResponder) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                tx,
                stream_capacity: config.stream_capacity,
            },
            ChannelResponder { rx },
        )
    }

    async fn unary<T>(
        &self,
        make_call: impl FnOnce(UnaryReply<T>) -> IncomingCall,
    ) -> Result<T, TransportError> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.tx
            .send(make_call(UnaryReply::new(reply_tx)))
            .await
            .map_err(|_| TransportError::ChannelClosed)?;

        reply_rx.await.map_err(|_| TransportError::ChannelClosed)?
    }
}

#[async_trait]
impl GatewayTransport for ChannelTransport {
    async fn evaluate(
        &self,
        proposal: SignedProposal,
        options: &CallOptions,
    ) -> Result<EvaluateResponse, TransportError> {
        let options = *options;
        self.unary(|reply| IncomingCall::Evaluate {
            proposal,
            options,
            reply,
        })
        .await
    }

    async fn endorse(
        &self,
        proposal: SignedProposal,
        options: &CallOptions,
    ) -> Result<EndorsedTransaction, TransportError> {
        let options = *options;
        self.unary(|reply| IncomingCall::Endorse {
            proposal,
            options,
            reply,
        })
        .await
    }

    async fn submit(
        &self,
        transaction: PreparedTransaction,
        options: &CallOptions,
    ) -> Result<CommitStream, TransportError> {
        let (stream_tx, stream) = CommitStream::channel(self.stream_capacity);

        self.tx
            .send(IncomingCall::Submit {
                transaction,
                options: *options,
                sink: CommitSink::new(stream_tx),
            })
            .await
            .map_err(|_| TransportError::ChannelClosed)?;

        Ok(stream)
    }

    fn is_active(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// Channel-based responder (endpoint side)
pub struct ChannelResponder {
    rx: mpsc::Receiver<IncomingCall>,
}

impl ChannelResponder {
    /// Receive the next call
    pub async fn next(&mut self) -> Option<IncomingCall> {
        self.rx.recv().await
    }
}

/// Connector that hands out an already-paired [`ChannelTransport`]
///
/// Credentials are irrelevant in-process and ignored.
pub struct ChannelConnector {
    transport: ChannelTransport,
}

impl ChannelConnector {
    pub fn new(transport: ChannelTransport) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl TransportConnector for ChannelConnector {
    type Transport = ChannelTransport;

    async fn open(
        &self,
        _endpoint: &str,
        _credentials: &TransportCredentials,
        _config: &TransportConfig,
    ) -> Result<Self::Transport, TransportError> {
        if !self.transport.is_active() {
            return Err(TransportError::ChannelClosed);
        }
        Ok(self.transport.clone())
    }
}
