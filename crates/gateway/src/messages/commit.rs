//! Commit stream message types

use super::status::CallStatus;
use serde::{Deserialize, Serialize};

/// Progress message emitted while a submitted transaction is being committed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitEvent {
    pub value: Vec<u8>,
}

impl CommitEvent {
    pub fn new(value: impl Into<Vec<u8>>) -> Self {
        Self {
            value: value.into(),
        }
    }

    /// Event value as text, replacing invalid UTF-8 sequences
    pub fn value_lossy(&self) -> String {
        String::from_utf8_lossy(&self.value).into_owned()
    }
}

/// One item of a submit stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubmitSignal {
    /// Commit progress, delivered in the order the endpoint produced it
    Event(CommitEvent),
    /// Status metadata; never settles the call
    Status(CallStatus),
    /// Normal end of stream
    End,
}

impl SubmitSignal {
    pub fn event(value: impl Into<Vec<u8>>) -> Self {
        Self::Event(CommitEvent::new(value))
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::End)
    }
}
