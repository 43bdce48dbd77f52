//! Endpoint-side call handling

use async_trait::async_trait;
use ledger_gateway::{
    CallStatus, CommitSink, EndorsedTransaction, EvaluateResponse, PreparedTransaction,
    SignedProposal,
};

/// What a gateway endpoint does with each call
///
/// The server owns framing, deadlines and cancellation; implementations only
/// produce results. A returned `CallStatus` is sent to the client as the
/// call's error.
#[async_trait]
pub trait GatewayService: Send + Sync + 'static {
    async fn evaluate(&self, proposal: SignedProposal) -> Result<EvaluateResponse, CallStatus>;

    async fn endorse(&self, proposal: SignedProposal) -> Result<EndorsedTransaction, CallStatus>;

    /// Report commit progress through `sink`
    ///
    /// The stream is ended by the server once this returns: `Ok` ends it
    /// normally, `Err` ends it with the status.
    async fn submit(
        &self,
        transaction: PreparedTransaction,
        sink: &CommitSink,
    ) -> Result<(), CallStatus>;
}
