//! TCP transport
//!
//! One socket carries any number of concurrent calls. A single writer task
//! serializes outbound frames; a single reader task demultiplexes inbound
//! frames by `call_id` into the pending-call table:
//!
//! ```text
//!   evaluate ─┐                       ┌─ oneshot (call 1)
//!   endorse  ─┼─> outbound ─> writer  │
//!   submit   ─┘                       ├─ oneshot (call 2)
//!                     reader ─> pending table ─┤
//!                                     └─ mpsc stream (call 3)
//! ```
//!
//! Terminal frames remove the call from the table, so a call settles once;
//! anything arriving for it afterwards is dropped. When the reader stops
//! the failure is recorded, pending calls fail with it, and every later call
//! fails with the same error. There is no reconnection.
//!
//! The reader never waits on a caller. A submit stream that falls more than
//! `stream_capacity` items behind is cancelled and ends with
//! [`TransportError::StreamOverflow`]; other calls on the connection are
//! unaffected.

use crate::error::TransportError;
use crate::messages::{
    EndorsedTransaction, EvaluateResponse, PreparedTransaction, SignedProposal, SubmitSignal,
};
use crate::transport::config::{TransportConfig, endpoint_authority};
use crate::transport::wire::{Frame, read_frame, write_frame};
use crate::transport::{
    CallGuard, CallOptions, CommitStream, GatewayTransport, StreamItem, TransportConnector,
    TransportCredentials,
};
use async_trait::async_trait;
use dashmap::DashMap;
use log::{debug, info, trace, warn};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// An outstanding call awaiting its terminal frame
enum PendingCall {
    Evaluate(oneshot::Sender<Result<EvaluateResponse, TransportError>>),
    Endorse(oneshot::Sender<Result<EndorsedTransaction, TransportError>>),
    Submit(mpsc::Sender<StreamItem>),
}

impl PendingCall {
    fn kind(&self) -> &'static str {
        match self {
            PendingCall::Evaluate(_) => "evaluate",
            PendingCall::Endorse(_) => "endorse",
            PendingCall::Submit(_) => "submit",
        }
    }

    fn fail(self, error: TransportError) {
        match self {
            PendingCall::Evaluate(tx) => {
                let _ = tx.send(Err(error));
            }
            PendingCall::Endorse(tx) => {
                let _ = tx.send(Err(error));
            }
            PendingCall::Submit(tx) => finish_stream(tx, Err(error)),
        }
    }
}

/// Deliver the last item of a stream without blocking the caller
///
/// If the buffer is full the item is handed to a task that waits for room,
/// so it still arrives after everything already buffered.
fn finish_stream(tx: mpsc::Sender<StreamItem>, item: StreamItem) {
    match tx.try_send(item) {
        Ok(()) | Err(TrySendError::Closed(_)) => {}
        Err(TrySendError::Full(item)) => {
            tokio::spawn(async move {
                let _ = tx.send(item).await;
            });
        }
    }
}

/// State shared by the transport handle, its background tasks and call guards
struct Shared {
    pending: DashMap<u64, PendingCall>,
    failure: Mutex<Option<TransportError>>,
    outbound: mpsc::UnboundedSender<Frame>,
    next_call_id: AtomicU64,
}

impl Shared {
    fn failure(&self) -> Option<TransportError> {
        self.failure.lock().clone()
    }

    /// Add a call to the pending table and assign its id
    fn register(&self, call: PendingCall) -> Result<u64, TransportError> {
        if let Some(err) = self.failure() {
            return Err(err);
        }

        let call_id = self.next_call_id.fetch_add(1, Ordering::Relaxed);
        self.pending.insert(call_id, call);

        // Raced with shut_down: whoever removes the entry settles it.
        if let Some(err) = self.failure()
            && self.pending.remove(&call_id).is_some()
        {
            return Err(err);
        }

        Ok(call_id)
    }

    fn send(&self, frame: Frame) -> Result<(), TransportError> {
        self.outbound
            .send(frame)
            .map_err(|_| self.failure().unwrap_or(TransportError::ChannelClosed))
    }

    /// Guard that releases the call and cancels it remotely if the caller stops waiting
    fn cancel_guard(self: &Arc<Self>, call_id: u64) -> CallGuard {
        let shared = Arc::clone(self);
        CallGuard::new(move || {
            if shared.pending.remove(&call_id).is_some() {
                debug!("Call {} abandoned by caller, cancelling", call_id);
                let _ = shared.outbound.send(Frame::Cancel { call_id });
            }
        })
    }

    /// Route one inbound frame to its call
    fn dispatch(&self, frame: Frame) {
        trace!("Received {} frame for call {}", frame.kind(), frame.call_id());

        match frame {
            Frame::Response { call_id, response } => match self.pending.remove(&call_id) {
                Some((_, PendingCall::Evaluate(tx))) => {
                    let _ = tx.send(Ok(response));
                }
                Some((_, other)) => self.mismatch(call_id, other, "response"),
                None => debug!("Ignoring response for settled call {}", call_id),
            },
            Frame::Endorsed {
                call_id,
                transaction,
            } => match self.pending.remove(&call_id) {
                Some((_, PendingCall::Endorse(tx))) => {
                    let _ = tx.send(Ok(transaction));
                }
                Some((_, other)) => self.mismatch(call_id, other, "endorsed"),
                None => debug!("Ignoring endorsement for settled call {}", call_id),
            },
            Frame::Event { call_id, event } => {
                self.forward(call_id, SubmitSignal::Event(event));
            }
            Frame::Status { call_id, status } => {
                self.forward(call_id, SubmitSignal::Status(status));
            }
            Frame::End { call_id } => match self.pending.remove(&call_id) {
                Some((_, PendingCall::Submit(tx))) => finish_stream(tx, Ok(SubmitSignal::End)),
                Some((_, other)) => self.mismatch(call_id, other, "end"),
                None => debug!("Ignoring end for settled call {}", call_id),
            },
            Frame::Error { call_id, status } => match self.pending.remove(&call_id) {
                Some((_, call)) => {
                    debug!("Call {} rejected: {}", call_id, status);
                    call.fail(TransportError::Rejected(status));
                }
                None => debug!("Ignoring error for settled call {}", call_id),
            },
            Frame::Evaluate { call_id, .. }
            | Frame::Endorse { call_id, .. }
            | Frame::Submit { call_id, .. }
            | Frame::Cancel { call_id } => {
                warn!("Ignoring client-bound frame from endpoint (call {})", call_id);
            }
        }
    }

    /// Forward a non-terminal stream signal
    fn forward(&self, call_id: u64, signal: SubmitSignal) {
        let tx = match self.pending.get(&call_id) {
            Some(entry) => match entry.value() {
                PendingCall::Submit(tx) => Some(tx.clone()),
                _ => None,
            },
            None => {
                debug!("Ignoring stream signal for settled call {}", call_id);
                return;
            }
        };

        let Some(tx) = tx else {
            if let SubmitSignal::Status(status) = signal {
                // Status metadata never settles a call
                debug!("Dropping status for unary call {}: {}", call_id, status);
            } else if let Some((_, call)) = self.pending.remove(&call_id) {
                self.mismatch(call_id, call, "event");
            }
            return;
        };

        match tx.try_send(Ok(signal)) {
            Ok(()) => {}
            Err(TrySendError::Closed(_)) => {
                // Listener went away; release the call
                self.pending.remove(&call_id);
            }
            Err(TrySendError::Full(_)) => {
                if self.pending.remove(&call_id).is_some() {
                    let capacity = tx.max_capacity();
                    warn!(
                        "Submit stream for call {} fell {} items behind, cancelling",
                        call_id, capacity
                    );
                    let _ = self.outbound.send(Frame::Cancel { call_id });
                    finish_stream(tx, Err(TransportError::StreamOverflow { capacity }));
                }
            }
        }
    }

    fn mismatch(&self, call_id: u64, call: PendingCall, frame_kind: &str) {
        let kind = call.kind();
        warn!(
            "Endpoint sent {} frame for {} call {}",
            frame_kind, kind, call_id
        );
        call.fail(TransportError::Protocol(format!(
            "unexpected {} frame for {} call",
            frame_kind, kind
        )));
    }

    /// Record a channel failure and fail every pending call with it
    fn shut_down(&self, error: TransportError) {
        let error = {
            let mut failure = self.failure.lock();
            failure.get_or_insert(error).clone()
        };

        let ids: Vec<u64> = self.pending.iter().map(|entry| *entry.key()).collect();
        for call_id in ids {
            if let Some((_, call)) = self.pending.remove(&call_id) {
                call.fail(error.clone());
            }
        }
    }
}

/// Gateway transport over a single multiplexed TCP connection
pub struct TcpTransport {
    shared: Arc<Shared>,
    stream_capacity: usize,
    reader_handle: JoinHandle<()>,
    writer_handle: JoinHandle<()>,
}

impl TcpTransport {
    /// Dial an endpoint (`host:port`, optionally `tcp://`, `grpc://` or `http://`)
    pub async fn connect(endpoint: &str, config: &TransportConfig) -> Result<Self, TransportError> {
        let authority = endpoint_authority(endpoint).ok_or_else(|| {
            TransportError::Connection(format!("invalid endpoint URL '{}'", endpoint))
        })?;

        let stream = tokio::time::timeout(config.connect_timeout(), TcpStream::connect(authority))
            .await
            .map_err(|_| TransportError::Connection(format!("timed out connecting to {}", authority)))?
            .map_err(|e| TransportError::Connection(format!("{}: {}", authority, e)))?;
        stream.set_nodelay(config.nodelay)?;

        info!("Connected to gateway endpoint {}", authority);
        Ok(Self::from_io(stream, config))
    }

    /// Run the protocol over an already-established byte stream
    pub fn from_io<S>(io: S, config: &TransportConfig) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(io);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        let shared = Arc::new(Shared {
            pending: DashMap::new(),
            failure: Mutex::new(None),
            outbound: outbound_tx,
            next_call_id: AtomicU64::new(1),
        });

        let max_frame_bytes = config.max_frame_bytes;
        let reader_handle = tokio::spawn(reader_loop(
            read_half,
            Arc::clone(&shared),
            max_frame_bytes,
        ));
        let writer_handle = tokio::spawn(writer_loop(
            write_half,
            outbound_rx,
            Arc::clone(&shared),
            max_frame_bytes,
        ));

        Self {
            shared,
            stream_capacity: config.stream_capacity,
            reader_handle,
            writer_handle,
        }
    }

    /// Number of calls awaiting a terminal frame
    pub fn pending_calls(&self) -> usize {
        self.shared.pending.len()
    }

    /// The error that made the channel unusable, if any
    pub fn failure(&self) -> Option<TransportError> {
        self.shared.failure()
    }

    async fn unary<T>(
        &self,
        pending: impl FnOnce(oneshot::Sender<Result<T, TransportError>>) -> PendingCall,
        frame: impl FnOnce(u64) -> Frame,
    ) -> Result<T, TransportError> {
        let (tx, rx) = oneshot::channel();
        let call_id = self.shared.register(pending(tx))?;
        let mut guard = self.shared.cancel_guard(call_id);

        self.shared.send(frame(call_id))?;

        let result = rx.await;
        guard.disarm();
        match result {
            Ok(result) => result,
            Err(_) => Err(self.shared.failure().unwrap_or(TransportError::ChannelClosed)),
        }
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        self.reader_handle.abort();
        self.writer_handle.abort();
    }
}

#[async_trait]
impl GatewayTransport for TcpTransport {
    async fn evaluate(
        &self,
        proposal: SignedProposal,
        options: &CallOptions,
    ) -> Result<EvaluateResponse, TransportError> {
        let timeout_ms = options.timeout_ms();
        self.unary(PendingCall::Evaluate, |call_id| Frame::Evaluate {
            call_id,
            timeout_ms,
            proposal,
        })
        .await
    }

    async fn endorse(
        &self,
        proposal: SignedProposal,
        options: &CallOptions,
    ) -> Result<EndorsedTransaction, TransportError> {
        let timeout_ms = options.timeout_ms();
        self.unary(PendingCall::Endorse, |call_id| Frame::Endorse {
            call_id,
            timeout_ms,
            proposal,
        })
        .await
    }

    async fn submit(
        &self,
        transaction: PreparedTransaction,
        options: &CallOptions,
    ) -> Result<CommitStream, TransportError> {
        let (tx, rx) = mpsc::channel(self.stream_capacity.max(1));
        let call_id = self.shared.register(PendingCall::Submit(tx))?;
        let guard = self.shared.cancel_guard(call_id);

        self.shared.send(Frame::Submit {
            call_id,
            timeout_ms: options.timeout_ms(),
            transaction,
        })?;

        Ok(CommitStream::with_guard(rx, guard))
    }

    fn is_active(&self) -> bool {
        self.shared.failure().is_none()
    }
}

async fn reader_loop<R>(mut reader: R, shared: Arc<Shared>, max_frame_bytes: usize)
where
    R: AsyncRead + Unpin,
{
    let failure = loop {
        match read_frame(&mut reader, max_frame_bytes).await {
            Ok(Some(frame)) => shared.dispatch(frame),
            Ok(None) => {
                break TransportError::Connection("connection closed by endpoint".to_string());
            }
            Err(e) => break e,
        }
    };

    warn!("Gateway connection unusable: {}", failure);
    shared.shut_down(failure);
}

async fn writer_loop<W>(
    mut writer: W,
    mut outbound: mpsc::UnboundedReceiver<Frame>,
    shared: Arc<Shared>,
    max_frame_bytes: usize,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = outbound.recv().await {
        match write_frame(&mut writer, &frame, max_frame_bytes).await {
            Ok(()) => trace!("Sent {} frame for call {}", frame.kind(), frame.call_id()),
            Err(e @ TransportError::FrameTooLarge { .. }) => {
                // Nothing was written; only this call is affected
                warn!("Dropping {} frame for call {}: {}", frame.kind(), frame.call_id(), e);
                if let Some((_, call)) = shared.pending.remove(&frame.call_id()) {
                    call.fail(e);
                }
            }
            Err(e) => {
                warn!("Gateway connection write failed: {}", e);
                shared.shut_down(e);
                break;
            }
        }
    }
}

/// Connector for [`TcpTransport`]
///
/// Speaks plaintext only; TLS credentials are refused.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

#[async_trait]
impl TransportConnector for TcpConnector {
    type Transport = TcpTransport;

    async fn open(
        &self,
        endpoint: &str,
        credentials: &TransportCredentials,
        config: &TransportConfig,
    ) -> Result<Self::Transport, TransportError> {
        match credentials {
            TransportCredentials::Insecure => TcpTransport::connect(endpoint, config).await,
            other => Err(TransportError::UnsupportedCredentials(other.kind().to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{CallStatus, CommitEvent, StatusCode};
    use std::time::Duration;
    use tokio::io::{DuplexStream, ReadHalf, WriteHalf};

    const MAX: usize = 64 * 1024;

    /// Endpoint side of an in-memory connection
    struct FakeEndpoint {
        reader: ReadHalf<DuplexStream>,
        writer: WriteHalf<DuplexStream>,
    }

    impl FakeEndpoint {
        async fn recv(&mut self) -> Frame {
            read_frame(&mut self.reader, MAX)
                .await
                .expect("read failed")
                .expect("client closed")
        }

        async fn send(&mut self, frame: Frame) {
            write_frame(&mut self.writer, &frame, MAX).await.unwrap();
        }
    }

    fn connected() -> (TcpTransport, FakeEndpoint) {
        connected_with(TransportConfig::default())
    }

    fn connected_with(config: TransportConfig) -> (TcpTransport, FakeEndpoint) {
        let (client, server) = tokio::io::duplex(MAX);
        let transport = TcpTransport::from_io(client, &config);
        let (reader, writer) = tokio::io::split(server);
        (transport, FakeEndpoint { reader, writer })
    }

    fn proposal(bytes: &[u8]) -> SignedProposal {
        SignedProposal::new(bytes.to_vec(), b"sig".to_vec())
    }

    #[tokio::test]
    async fn test_evaluate_round_trip() {
        let (transport, mut endpoint) = connected();

        let server = tokio::spawn(async move {
            let frame = endpoint.recv().await;
            let Frame::Evaluate {
                call_id,
                timeout_ms,
                proposal,
            } = frame
            else {
                panic!("expected evaluate, got {:?}", frame);
            };
            assert_eq!(timeout_ms, Some(500));
            assert_eq!(proposal.proposal_bytes, b"balance".to_vec());
            endpoint
                .send(Frame::Response {
                    call_id,
                    response: EvaluateResponse::new("42"),
                })
                .await;
            endpoint
        });

        let response = transport
            .evaluate(
                proposal(b"balance"),
                &CallOptions::with_deadline(Duration::from_millis(500)),
            )
            .await
            .unwrap();
        assert_eq!(response.value, b"42".to_vec());
        assert_eq!(transport.pending_calls(), 0);

        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_calls_answered_out_of_order() {
        let (transport, mut endpoint) = connected();

        let server = tokio::spawn(async move {
            let first = endpoint.recv().await;
            let second = endpoint.recv().await;
            // Answer in reverse order of arrival
            for frame in [second, first] {
                match frame {
                    Frame::Evaluate {
                        call_id, proposal, ..
                    } => {
                        endpoint
                            .send(Frame::Response {
                                call_id,
                                response: EvaluateResponse::new(proposal.proposal_bytes),
                            })
                            .await
                    }
                    Frame::Endorse {
                        call_id, proposal, ..
                    } => {
                        endpoint
                            .send(Frame::Endorsed {
                                call_id,
                                transaction: EndorsedTransaction::new(proposal.proposal_bytes),
                            })
                            .await
                    }
                    other => panic!("unexpected frame {:?}", other),
                }
            }
            endpoint
        });

        let options = CallOptions::default();
        let (evaluated, endorsed) = tokio::join!(
            transport.evaluate(proposal(b"query"), &options),
            transport.endorse(proposal(b"invoke"), &options),
        );
        assert_eq!(evaluated.unwrap().value, b"query".to_vec());
        assert_eq!(endorsed.unwrap().payload, b"invoke".to_vec());

        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_second_terminal_frame_is_ignored() {
        let (transport, mut endpoint) = connected();

        let server = tokio::spawn(async move {
            let call_id = endpoint.recv().await.call_id();
            endpoint
                .send(Frame::Response {
                    call_id,
                    response: EvaluateResponse::new("first"),
                })
                .await;
            endpoint
                .send(Frame::Error {
                    call_id,
                    status: CallStatus::new(StatusCode::Internal, "late error"),
                })
                .await;
            endpoint
                .send(Frame::Response {
                    call_id,
                    response: EvaluateResponse::new("second"),
                })
                .await;

            let call_id = endpoint.recv().await.call_id();
            endpoint
                .send(Frame::Response {
                    call_id,
                    response: EvaluateResponse::new("next"),
                })
                .await;
            endpoint
        });

        let options = CallOptions::default();
        let first = transport.evaluate(proposal(b"a"), &options).await.unwrap();
        assert_eq!(first.value, b"first".to_vec());

        let next = transport.evaluate(proposal(b"b"), &options).await.unwrap();
        assert_eq!(next.value, b"next".to_vec());
        assert!(transport.is_active());

        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_submit_stream_and_trailing_signals() {
        let (transport, mut endpoint) = connected();

        let server = tokio::spawn(async move {
            let call_id = endpoint.recv().await.call_id();
            endpoint
                .send(Frame::Event {
                    call_id,
                    event: CommitEvent::new("A"),
                })
                .await;
            endpoint
                .send(Frame::Status {
                    call_id,
                    status: CallStatus::ok().with_metadata("block", "7"),
                })
                .await;
            endpoint
                .send(Frame::Event {
                    call_id,
                    event: CommitEvent::new("B"),
                })
                .await;
            endpoint.send(Frame::End { call_id }).await;
            // Arrives after settlement and must not surface
            endpoint
                .send(Frame::Event {
                    call_id,
                    event: CommitEvent::new("C"),
                })
                .await;
            endpoint
        });

        let mut stream = transport
            .submit(PreparedTransaction::new(b"tx".to_vec()), &CallOptions::default())
            .await
            .unwrap();

        assert_eq!(stream.next().await, Some(Ok(SubmitSignal::event("A"))));
        assert!(matches!(
            stream.next().await,
            Some(Ok(SubmitSignal::Status(s))) if s.metadata_value("block") == Some("7")
        ));
        assert_eq!(stream.next().await, Some(Ok(SubmitSignal::event("B"))));
        assert_eq!(stream.next().await, Some(Ok(SubmitSignal::End)));
        assert_eq!(stream.next().await, None);

        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_remote_error_rejects_call() {
        let (transport, mut endpoint) = connected();

        tokio::spawn(async move {
            let call_id = endpoint.recv().await.call_id();
            endpoint
                .send(Frame::Error {
                    call_id,
                    status: CallStatus::new(StatusCode::NotFound, "no such contract"),
                })
                .await;
            endpoint
        });

        let err = transport
            .endorse(proposal(b"p"), &CallOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Rejected(s) if s.code == StatusCode::NotFound));
    }

    #[tokio::test]
    async fn test_mismatched_frame_is_protocol_error() {
        let (transport, mut endpoint) = connected();

        tokio::spawn(async move {
            let call_id = endpoint.recv().await.call_id();
            endpoint.send(Frame::End { call_id }).await;
            endpoint
        });

        let err = transport
            .evaluate(proposal(b"q"), &CallOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_status_for_unary_call_is_dropped() {
        let (transport, mut endpoint) = connected();

        tokio::spawn(async move {
            let call_id = endpoint.recv().await.call_id();
            endpoint
                .send(Frame::Status {
                    call_id,
                    status: CallStatus::ok().with_metadata("block", "7"),
                })
                .await;
            endpoint
                .send(Frame::Response {
                    call_id,
                    response: EvaluateResponse::new("42"),
                })
                .await;
            endpoint
        });

        let response = transport
            .evaluate(proposal(b"q"), &CallOptions::default())
            .await
            .unwrap();
        assert_eq!(response.value, b"42".to_vec());
        assert_eq!(transport.pending_calls(), 0);
    }

    #[tokio::test]
    async fn test_unread_stream_does_not_stall_other_calls() {
        let _ = env_logger::try_init();
        let (transport, mut endpoint) =
            connected_with(TransportConfig::default().with_stream_capacity(4));

        let mut stream = transport
            .submit(PreparedTransaction::new(b"tx".to_vec()), &CallOptions::default())
            .await
            .unwrap();

        let server = tokio::spawn(async move {
            let submit_id = endpoint.recv().await.call_id();
            let evaluate_id = endpoint.recv().await.call_id();
            for i in 0..10 {
                endpoint
                    .send(Frame::Event {
                        call_id: submit_id,
                        event: CommitEvent::new(format!("e{}", i)),
                    })
                    .await;
            }
            endpoint
                .send(Frame::Response {
                    call_id: evaluate_id,
                    response: EvaluateResponse::new("ok"),
                })
                .await;
            let cancel = endpoint.recv().await;
            (submit_id, cancel)
        });

        let response = tokio::time::timeout(
            Duration::from_secs(5),
            transport.evaluate(proposal(b"q"), &CallOptions::default()),
        )
        .await
        .expect("evaluate held up by unread stream")
        .unwrap();
        assert_eq!(response.value, b"ok".to_vec());

        let (submit_id, cancel) = server.await.unwrap();
        assert_eq!(cancel, Frame::Cancel { call_id: submit_id });
        assert_eq!(transport.pending_calls(), 0);

        // Buffered events survive, then the overflow ends the stream
        for i in 0..4 {
            assert_eq!(
                stream.next().await,
                Some(Ok(SubmitSignal::event(format!("e{}", i))))
            );
        }
        assert_eq!(
            stream.next().await,
            Some(Err(TransportError::StreamOverflow { capacity: 4 }))
        );
    }

    #[tokio::test]
    async fn test_connection_loss_with_full_stream_fails_every_call() {
        let (transport, mut endpoint) =
            connected_with(TransportConfig::default().with_stream_capacity(2));

        let mut stream = transport
            .submit(PreparedTransaction::new(b"tx".to_vec()), &CallOptions::default())
            .await
            .unwrap();

        tokio::spawn(async move {
            let submit_id = endpoint.recv().await.call_id();
            let _ = endpoint.recv().await;
            for name in ["A", "B"] {
                endpoint
                    .send(Frame::Event {
                        call_id: submit_id,
                        event: CommitEvent::new(name),
                    })
                    .await;
            }
            drop(endpoint);
        });

        let err = tokio::time::timeout(
            Duration::from_secs(5),
            transport.evaluate(proposal(b"q"), &CallOptions::default()),
        )
        .await
        .expect("shutdown held up by full stream")
        .unwrap_err();
        assert!(matches!(err, TransportError::Connection(_)));

        assert_eq!(stream.next().await, Some(Ok(SubmitSignal::event("A"))));
        assert_eq!(stream.next().await, Some(Ok(SubmitSignal::event("B"))));
        assert_eq!(stream.next().await, Some(Err(err)));
    }

    #[tokio::test]
    async fn test_closed_connection_fails_pending_and_later_calls() {
        let (transport, mut endpoint) = connected();

        tokio::spawn(async move {
            let _ = endpoint.recv().await;
            // Endpoint goes away without answering
            drop(endpoint);
        });

        let err = transport
            .evaluate(proposal(b"q"), &CallOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Connection(_)));
        assert!(!transport.is_active());

        let later = transport
            .submit(PreparedTransaction::new(b"tx".to_vec()), &CallOptions::default())
            .await
            .err()
            .expect("call on failed channel must fail");
        assert_eq!(later, err);
        assert_eq!(transport.failure(), Some(err));
    }

    #[tokio::test]
    async fn test_abandoned_call_is_cancelled() {
        let (transport, mut endpoint) = connected();

        let result = tokio::time::timeout(
            Duration::from_millis(50),
            transport.evaluate(proposal(b"slow"), &CallOptions::default()),
        )
        .await;
        assert!(result.is_err());
        assert_eq!(transport.pending_calls(), 0);

        let first = endpoint.recv().await;
        assert!(matches!(first, Frame::Evaluate { .. }));
        let cancel = endpoint.recv().await;
        assert_eq!(cancel, Frame::Cancel {
            call_id: first.call_id()
        });
    }

    #[tokio::test]
    async fn test_tls_credentials_refused() {
        let err = TcpConnector
            .open(
                "localhost:7053",
                &TransportCredentials::Tls(Default::default()),
                &TransportConfig::default(),
            )
            .await
            .err()
            .expect("tls must be refused");
        assert_eq!(err, TransportError::UnsupportedCredentials("tls".to_string()));
    }

    #[tokio::test]
    async fn test_invalid_endpoint() {
        let err = TcpTransport::connect("https://peer0:7051", &TransportConfig::default())
            .await
            .err()
            .expect("scheme must be rejected");
        assert!(matches!(err, TransportError::Connection(_)));
    }
}
