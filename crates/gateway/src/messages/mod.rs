//! Message types carried between the gateway client and the remote endpoint
//!
//! Payloads are opaque byte buffers: this layer transports them without
//! interpreting their contents. All types serialize with bincode for the
//! TCP wire format.

pub mod commit;
pub mod proposal;
pub mod status;

pub use commit::{CommitEvent, SubmitSignal};
pub use proposal::{EndorsedTransaction, EvaluateResponse, PreparedTransaction, SignedProposal};
pub use status::{CallStatus, StatusCode};
