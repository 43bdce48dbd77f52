//! Proposal and transaction message types

use serde::{Deserialize, Serialize};

/// A signed transaction proposal, produced by the upper layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedProposal {
    /// Serialized proposal
    pub proposal_bytes: Vec<u8>,
    /// Signature over `proposal_bytes`
    pub signature: Vec<u8>,
}

impl SignedProposal {
    pub fn new(proposal_bytes: impl Into<Vec<u8>>, signature: impl Into<Vec<u8>>) -> Self {
        Self {
            proposal_bytes: proposal_bytes.into(),
            signature: signature.into(),
        }
    }
}

/// Response to an evaluate call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluateResponse {
    /// Result value returned by the network
    pub value: Vec<u8>,
}

impl EvaluateResponse {
    pub fn new(value: impl Into<Vec<u8>>) -> Self {
        Self {
            value: value.into(),
        }
    }
}

/// Response to an endorse call
///
/// Handed unmodified to a later submit by the upper layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndorsedTransaction {
    /// Endorsed transaction envelope
    pub payload: Vec<u8>,
}

impl EndorsedTransaction {
    pub fn new(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            payload: payload.into(),
        }
    }
}

/// A transaction ready to be submitted for commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreparedTransaction {
    /// Transaction identifier, if the upper layer assigned one
    pub transaction_id: Option<String>,
    /// Signed transaction envelope
    pub envelope: Vec<u8>,
}

impl PreparedTransaction {
    pub fn new(envelope: impl Into<Vec<u8>>) -> Self {
        Self {
            transaction_id: None,
            envelope: envelope.into(),
        }
    }

    pub fn with_transaction_id(mut self, transaction_id: impl Into<String>) -> Self {
        self.transaction_id = Some(transaction_id.into());
        self
    }
}

impl From<EndorsedTransaction> for PreparedTransaction {
    fn from(endorsed: EndorsedTransaction) -> Self {
        Self::new(endorsed.payload)
    }
}
