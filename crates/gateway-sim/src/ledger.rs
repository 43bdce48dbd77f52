//! In-memory ledger service
//!
//! Keeps a flat key/value world state. Proposals name a key, transactions
//! carry a `key=value` write.

use crate::service::GatewayService;
use async_trait::async_trait;
use ledger_gateway::{
    CallStatus, CommitEvent, CommitSink, EndorsedTransaction, EvaluateResponse,
    PreparedTransaction, SignedProposal, StatusCode,
};
use log::{debug, info};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Prefix marking a proposal that went through endorsement
pub const ENDORSED_PREFIX: &[u8] = b"endorsed:";

/// Commit phases reported to submitters, in order
pub const COMMIT_PHASES: [&str; 3] = ["received", "validated", "committed"];

pub struct LedgerSim {
    state: RwLock<HashMap<String, Vec<u8>>>,
    commit_delay: Duration,
    next_tx: AtomicU64,
}

impl LedgerSim {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(HashMap::new()),
            commit_delay: Duration::ZERO,
            next_tx: AtomicU64::new(1),
        }
    }

    /// Pause between commit phases
    pub fn with_commit_delay(mut self, delay: Duration) -> Self {
        self.commit_delay = delay;
        self
    }

    /// Seed a world-state entry
    pub fn with_entry(self, key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.state.write().insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.state.read().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.state.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().is_empty()
    }

    async fn phase(&self, sink: &CommitSink, name: &str) -> Result<(), CallStatus> {
        if !self.commit_delay.is_zero() {
            tokio::time::sleep(self.commit_delay).await;
        }
        sink.event(CommitEvent::new(name))
            .await
            .map_err(|_| CallStatus::new(StatusCode::Cancelled, "submitter stopped listening"))
    }
}

impl Default for LedgerSim {
    fn default() -> Self {
        Self::new()
    }
}

fn require_payload(bytes: &[u8], what: &str) -> Result<(), CallStatus> {
    if bytes.is_empty() {
        return Err(CallStatus::new(
            StatusCode::InvalidArgument,
            format!("empty {}", what),
        ));
    }
    Ok(())
}

/// Parse the `key=value` write carried by a transaction envelope
fn parse_write(envelope: &[u8]) -> Result<(String, Vec<u8>), CallStatus> {
    let body = envelope.strip_prefix(ENDORSED_PREFIX).unwrap_or(envelope);
    let text = std::str::from_utf8(body).map_err(|_| {
        CallStatus::new(StatusCode::InvalidArgument, "transaction is not valid UTF-8")
    })?;
    let (key, value) = text.split_once('=').ok_or_else(|| {
        CallStatus::new(StatusCode::InvalidArgument, "transaction must be key=value")
    })?;
    if key.is_empty() {
        return Err(CallStatus::new(StatusCode::InvalidArgument, "empty key"));
    }
    Ok((key.to_string(), value.as_bytes().to_vec()))
}

#[async_trait]
impl GatewayService for LedgerSim {
    async fn evaluate(&self, proposal: SignedProposal) -> Result<EvaluateResponse, CallStatus> {
        require_payload(&proposal.proposal_bytes, "proposal")?;

        let key = String::from_utf8_lossy(&proposal.proposal_bytes);
        let value = self
            .get(&key)
            .unwrap_or_else(|| proposal.proposal_bytes.clone());
        debug!("Evaluated '{}' ({} bytes)", key, value.len());
        Ok(EvaluateResponse::new(value))
    }

    async fn endorse(&self, proposal: SignedProposal) -> Result<EndorsedTransaction, CallStatus> {
        require_payload(&proposal.proposal_bytes, "proposal")?;

        let mut payload = ENDORSED_PREFIX.to_vec();
        payload.extend_from_slice(&proposal.proposal_bytes);
        Ok(EndorsedTransaction::new(payload))
    }

    async fn submit(
        &self,
        transaction: PreparedTransaction,
        sink: &CommitSink,
    ) -> Result<(), CallStatus> {
        require_payload(&transaction.envelope, "transaction")?;
        let (key, value) = parse_write(&transaction.envelope)?;
        let tx_id = transaction
            .transaction_id
            .clone()
            .unwrap_or_else(|| format!("tx-{}", self.next_tx.fetch_add(1, Ordering::Relaxed)));

        self.phase(sink, COMMIT_PHASES[0]).await?;
        sink.status(CallStatus::ok().with_metadata("transaction_id", tx_id.as_str()))
            .await
            .map_err(|_| CallStatus::new(StatusCode::Cancelled, "submitter stopped listening"))?;
        self.phase(sink, COMMIT_PHASES[1]).await?;

        self.state.write().insert(key.clone(), value);
        info!("Committed {} (key '{}')", tx_id, key);

        self.phase(sink, COMMIT_PHASES[2]).await
    }
}
