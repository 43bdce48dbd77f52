//! Wire format for the TCP transport
//!
//! Every frame is a 4-byte big-endian length followed by the bincode
//! encoding of a [`Frame`]. Calls are multiplexed over one connection by
//! `call_id`, assigned by the client.

use crate::error::TransportError;
use crate::messages::{
    CallStatus, CommitEvent, EndorsedTransaction, EvaluateResponse, PreparedTransaction,
    SignedProposal,
};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Length prefix size in bytes
pub const LENGTH_PREFIX: usize = 4;

/// Protocol frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Frame {
    // Client -> endpoint
    Evaluate {
        call_id: u64,
        timeout_ms: Option<u64>,
        proposal: SignedProposal,
    },
    Endorse {
        call_id: u64,
        timeout_ms: Option<u64>,
        proposal: SignedProposal,
    },
    Submit {
        call_id: u64,
        timeout_ms: Option<u64>,
        transaction: PreparedTransaction,
    },
    /// The client stopped waiting for the call
    Cancel { call_id: u64 },

    // Endpoint -> client
    Response {
        call_id: u64,
        response: EvaluateResponse,
    },
    Endorsed {
        call_id: u64,
        transaction: EndorsedTransaction,
    },
    Event { call_id: u64, event: CommitEvent },
    Status { call_id: u64, status: CallStatus },
    End { call_id: u64 },
    Error { call_id: u64, status: CallStatus },
}

impl Frame {
    pub fn call_id(&self) -> u64 {
        match self {
            Frame::Evaluate { call_id, .. }
            | Frame::Endorse { call_id, .. }
            | Frame::Submit { call_id, .. }
            | Frame::Cancel { call_id }
            | Frame::Response { call_id, .. }
            | Frame::Endorsed { call_id, .. }
            | Frame::Event { call_id, .. }
            | Frame::Status { call_id, .. }
            | Frame::End { call_id }
            | Frame::Error { call_id, .. } => *call_id,
        }
    }

    /// Short name for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Evaluate { .. } => "evaluate",
            Frame::Endorse { .. } => "endorse",
            Frame::Submit { .. } => "submit",
            Frame::Cancel { .. } => "cancel",
            Frame::Response { .. } => "response",
            Frame::Endorsed { .. } => "endorsed",
            Frame::Event { .. } => "event",
            Frame::Status { .. } => "status",
            Frame::End { .. } => "end",
            Frame::Error { .. } => "error",
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, TransportError> {
        Ok(bincode::serialize(self)?)
    }

    pub fn decode(data: &[u8]) -> Result<Self, TransportError> {
        Ok(bincode::deserialize(data)?)
    }
}

/// Write one length-prefixed frame and flush
pub async fn write_frame<W>(
    writer: &mut W,
    frame: &Frame,
    max_frame_bytes: usize,
) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    let body = frame.encode()?;
    if body.len() > max_frame_bytes {
        return Err(TransportError::FrameTooLarge {
            size: body.len(),
            limit: max_frame_bytes,
        });
    }
    let len = u32::try_from(body.len()).map_err(|_| TransportError::FrameTooLarge {
        size: body.len(),
        limit: u32::MAX as usize,
    })?;

    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(&body).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one length-prefixed frame
///
/// Returns `Ok(None)` when the peer closed the connection on a frame
/// boundary.
pub async fn read_frame<R>(
    reader: &mut R,
    max_frame_bytes: usize,
) -> Result<Option<Frame>, TransportError>
where
    R: AsyncRead + Unpin,
{
    // Only EOF before the first prefix byte is a clean close
    let mut len_buf = [0u8; LENGTH_PREFIX];
    let mut filled = 0;
    while filled < LENGTH_PREFIX {
        match reader.read(&mut len_buf[filled..]).await? {
            0 if filled == 0 => return Ok(None),
            0 => {
                return Err(TransportError::Protocol(format!(
                    "connection closed after {} of {} length prefix bytes",
                    filled, LENGTH_PREFIX
                )));
            }
            n => filled += n,
        }
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > max_frame_bytes {
        return Err(TransportError::FrameTooLarge {
            size: len,
            limit: max_frame_bytes,
        });
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Frame::decode(&body).map(Some)
}
