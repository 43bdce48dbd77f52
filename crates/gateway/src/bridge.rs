//! Call bridge
//!
//! Turns the three transport call shapes into one async contract:
//! every call resolves to a single `Result`, errors are mapped onto
//! [`GatewayError`] kinds, and an optional deadline bounds the whole call.
//!
//! A call settles exactly once. Unary calls get that from the transport's
//! `Result`; `submit` stops reading its stream at the first terminal signal,
//! so anything the endpoint sends afterwards is never observed.

use crate::error::{GatewayError, TransportError};
use crate::messages::{
    CallStatus, CommitEvent, EndorsedTransaction, PreparedTransaction, SignedProposal, StatusCode,
    SubmitSignal,
};
use crate::transport::{CallOptions, CommitStream, GatewayTransport};
use log::debug;
use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;

/// Receives commit progress while a submit is in flight
///
/// Closures `FnMut(&CommitEvent)` implement this; their status metadata is
/// logged at debug level.
pub trait CommitObserver: Send {
    /// Called for each event, in the order the endpoint produced them
    fn on_event(&mut self, event: &CommitEvent);

    /// Called for status metadata; never affects the outcome of the call
    fn on_status(&mut self, status: &CallStatus) {
        debug!("Commit status: {}", status);
    }
}

impl<F> CommitObserver for F
where
    F: FnMut(&CommitEvent) + Send,
{
    fn on_event(&mut self, event: &CommitEvent) {
        self(event)
    }
}

/// Observer that forwards events and status into a channel
///
/// The terminal outcome is not forwarded; it is the result of `submit`.
pub struct SignalForwarder {
    tx: mpsc::UnboundedSender<SubmitSignal>,
}

impl SignalForwarder {
    pub fn new(tx: mpsc::UnboundedSender<SubmitSignal>) -> Self {
        Self { tx }
    }

    /// Create a forwarder and the receiver it feeds
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SubmitSignal>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl CommitObserver for SignalForwarder {
    fn on_event(&mut self, event: &CommitEvent) {
        let _ = self.tx.send(SubmitSignal::Event(event.clone()));
    }

    fn on_status(&mut self, status: &CallStatus) {
        let _ = self.tx.send(SubmitSignal::Status(status.clone()));
    }
}

/// Evaluate a proposal and decode the result value as UTF-8
pub async fn evaluate(
    transport: &dyn GatewayTransport,
    proposal: SignedProposal,
    options: &CallOptions,
) -> Result<String, GatewayError> {
    let response = with_deadline(options.deadline, async {
        transport
            .evaluate(proposal, options)
            .await
            .map_err(GatewayError::from_call)
    })
    .await?;

    Ok(String::from_utf8(response.value)?)
}

/// Endorse a proposal, returning the endpoint's response unmodified
pub async fn endorse(
    transport: &dyn GatewayTransport,
    proposal: SignedProposal,
    options: &CallOptions,
) -> Result<EndorsedTransaction, GatewayError> {
    with_deadline(options.deadline, async {
        transport
            .endorse(proposal, options)
            .await
            .map_err(GatewayError::from_call)
    })
    .await
}

/// Submit a transaction and follow its commit stream to the end
pub async fn submit<O>(
    transport: &dyn GatewayTransport,
    transaction: PreparedTransaction,
    options: &CallOptions,
    observer: &mut O,
) -> Result<(), GatewayError>
where
    O: CommitObserver + ?Sized,
{
    with_deadline(options.deadline, async {
        let mut stream = transport
            .submit(transaction, options)
            .await
            .map_err(GatewayError::from_call)?;
        follow_commit(&mut stream, observer).await
    })
    .await
}

/// Drain a commit stream into an observer until its first terminal signal
pub async fn follow_commit<O>(
    stream: &mut CommitStream,
    observer: &mut O,
) -> Result<(), GatewayError>
where
    O: CommitObserver + ?Sized,
{
    let mut observed = 0usize;

    loop {
        match stream.next().await {
            Some(Ok(SubmitSignal::Event(event))) => {
                observed += 1;
                observer.on_event(&event);
            }
            Some(Ok(SubmitSignal::Status(status))) => observer.on_status(&status),
            Some(Ok(SubmitSignal::End)) => {
                debug!("Commit stream ended after {} event(s)", observed);
                return Ok(());
            }
            Some(Err(TransportError::Rejected(status)))
                if status.code == StatusCode::DeadlineExceeded =>
            {
                return Err(GatewayError::DeadlineExceeded);
            }
            Some(Err(source)) => {
                return Err(GatewayError::StreamTermination { observed, source });
            }
            None => {
                return Err(GatewayError::StreamTermination {
                    observed,
                    source: TransportError::ChannelClosed,
                });
            }
        }
    }
}

async fn with_deadline<T, F>(deadline: Option<Duration>, call: F) -> Result<T, GatewayError>
where
    F: Future<Output = Result<T, GatewayError>>,
{
    match deadline {
        Some(deadline) => tokio::time::timeout(deadline, call)
            .await
            .map_err(|_| GatewayError::DeadlineExceeded)?,
        None => call.await,
    }
}
