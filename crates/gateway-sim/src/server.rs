//! TCP server for the gateway wire protocol
//!
//! One task per connection reads frames and spawns one task per call.
//! Replies from all calls on a connection funnel through a single writer
//! task, so frames never interleave on the socket.

use crate::service::GatewayService;
use dashmap::DashMap;
use ledger_gateway::transport::wire::{Frame, read_frame, write_frame};
use ledger_gateway::{
    CallStatus, CommitSink, StatusCode, SubmitSignal, TransportConfig, TransportError,
};
use log::{debug, info, trace, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::{mpsc, oneshot};
use tokio::task::AbortHandle;

/// Calls running on one connection, by call id
type CallTable = Arc<DashMap<u64, AbortHandle>>;

/// Gateway endpoint serving a [`GatewayService`]
pub struct GatewayServer<S> {
    listener: TcpListener,
    service: Arc<S>,
    config: TransportConfig,
}

impl<S: GatewayService> GatewayServer<S> {
    pub async fn bind(addr: impl ToSocketAddrs, service: S) -> Result<Self, TransportError> {
        Self::bind_with_config(addr, service, TransportConfig::default()).await
    }

    /// Bind with explicit frame and stream limits
    pub async fn bind_with_config(
        addr: impl ToSocketAddrs,
        service: S,
        config: TransportConfig,
    ) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            service: Arc::new(service),
            config,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.listener.local_addr()?)
    }

    pub fn service(&self) -> &Arc<S> {
        &self.service
    }

    /// Accept connections until the task is dropped
    pub async fn run(self) -> Result<(), TransportError> {
        info!("Gateway simulator listening on {}", self.local_addr()?);

        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("Accept failed: {}", e);
                    continue;
                }
            };
            if let Err(e) = stream.set_nodelay(self.config.nodelay) {
                warn!("Could not set TCP_NODELAY for {}: {}", peer, e);
            }

            info!("Client connected from {}", peer);
            let service = Arc::clone(&self.service);
            let config = self.config.clone();
            tokio::spawn(async move {
                serve_connection(stream, service, config).await;
                info!("Client {} disconnected", peer);
            });
        }
    }
}

async fn serve_connection<S: GatewayService>(
    stream: TcpStream,
    service: Arc<S>,
    config: TransportConfig,
) {
    let (mut reader, writer) = stream.into_split();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let writer_handle = tokio::spawn(writer_loop(writer, outbound_rx, config.max_frame_bytes));
    let calls: CallTable = Arc::new(DashMap::new());

    loop {
        let frame = match read_frame(&mut reader, config.max_frame_bytes).await {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(e) => {
                warn!("Dropping connection: {}", e);
                break;
            }
        };
        trace!("Received {} frame for call {}", frame.kind(), frame.call_id());

        match frame {
            Frame::Cancel { call_id } => {
                if let Some((_, handle)) = calls.remove(&call_id) {
                    handle.abort();
                    debug!("Call {} cancelled by client", call_id);
                }
            }
            Frame::Evaluate { .. } | Frame::Endorse { .. } | Frame::Submit { .. } => {
                spawn_call(
                    frame,
                    Arc::clone(&service),
                    outbound_tx.clone(),
                    &calls,
                    config.stream_capacity,
                );
            }
            other => warn!(
                "Ignoring unexpected {} frame for call {}",
                other.kind(),
                other.call_id()
            ),
        }
    }

    for call in calls.iter() {
        call.value().abort();
    }
    calls.clear();
    drop(outbound_tx);
    let _ = writer_handle.await;
}

fn spawn_call<S: GatewayService>(
    frame: Frame,
    service: Arc<S>,
    outbound: mpsc::UnboundedSender<Frame>,
    calls: &CallTable,
    stream_capacity: usize,
) {
    let call_id = frame.call_id();
    let deadline = match &frame {
        Frame::Evaluate { timeout_ms, .. }
        | Frame::Endorse { timeout_ms, .. }
        | Frame::Submit { timeout_ms, .. } => timeout_ms.map(Duration::from_millis),
        _ => None,
    };

    // The call must be in the table before it can remove itself
    let (registered_tx, registered_rx) = oneshot::channel::<()>();
    let table = Arc::clone(calls);

    let handle = tokio::spawn(async move {
        if registered_rx.await.is_err() {
            return;
        }

        let call = handle_call(frame, service.as_ref(), &outbound, stream_capacity);
        let finished = match deadline {
            Some(deadline) => tokio::time::timeout(deadline, call).await.is_ok(),
            None => {
                call.await;
                true
            }
        };
        if !finished {
            debug!("Call {} ran past its deadline", call_id);
            let _ = outbound.send(Frame::Error {
                call_id,
                status: CallStatus::new(StatusCode::DeadlineExceeded, "deadline exceeded"),
            });
        }
        table.remove(&call_id);
    });

    calls.insert(call_id, handle.abort_handle());
    let _ = registered_tx.send(());
}

async fn handle_call<S: GatewayService>(
    frame: Frame,
    service: &S,
    outbound: &mpsc::UnboundedSender<Frame>,
    stream_capacity: usize,
) {
    let reply = match frame {
        Frame::Evaluate {
            call_id, proposal, ..
        } => match service.evaluate(proposal).await {
            Ok(response) => Frame::Response { call_id, response },
            Err(status) => Frame::Error { call_id, status },
        },
        Frame::Endorse {
            call_id, proposal, ..
        } => match service.endorse(proposal).await {
            Ok(transaction) => Frame::Endorsed {
                call_id,
                transaction,
            },
            Err(status) => Frame::Error { call_id, status },
        },
        Frame::Submit {
            call_id,
            transaction,
            ..
        } => {
            let (tx, mut rx) = mpsc::channel(stream_capacity.max(1));
            let sink = CommitSink::new(tx);

            let run = async move {
                let result = service.submit(transaction, &sink).await;
                drop(sink);
                result
            };
            let forward = async {
                while let Some(item) = rx.recv().await {
                    let frame = match item {
                        Ok(SubmitSignal::Event(event)) => Frame::Event { call_id, event },
                        Ok(SubmitSignal::Status(status)) => Frame::Status { call_id, status },
                        // The service result decides how the stream ends
                        _ => continue,
                    };
                    let _ = outbound.send(frame);
                }
            };

            match tokio::join!(run, forward) {
                (Ok(()), ()) => Frame::End { call_id },
                (Err(status), ()) => Frame::Error { call_id, status },
            }
        }
        other => {
            warn!("Not a call frame: {}", other.kind());
            return;
        }
    };

    let _ = outbound.send(reply);
}

async fn writer_loop(
    mut writer: OwnedWriteHalf,
    mut outbound: mpsc::UnboundedReceiver<Frame>,
    max_frame_bytes: usize,
) {
    while let Some(frame) = outbound.recv().await {
        match write_frame(&mut writer, &frame, max_frame_bytes).await {
            Ok(()) => trace!("Sent {} frame for call {}", frame.kind(), frame.call_id()),
            Err(e @ TransportError::FrameTooLarge { .. }) => {
                warn!("Reply for call {} not sent: {}", frame.call_id(), e);
                let error = Frame::Error {
                    call_id: frame.call_id(),
                    status: CallStatus::new(StatusCode::Internal, e.to_string()),
                };
                if write_frame(&mut writer, &error, max_frame_bytes).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                debug!("Write failed, closing connection: {}", e);
                break;
            }
        }
    }
}
