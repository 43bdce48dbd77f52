//! Network handle
//!
//! The extension point for the transaction-building layer. A handle borrows
//! its [`Gateway`], so it cannot outlive the connection and never owns it.

use crate::connection::Gateway;

/// A named ledger network reached through a gateway connection
#[derive(Debug, Clone)]
pub struct Network<'a> {
    name: String,
    gateway: &'a Gateway,
}

impl<'a> Network<'a> {
    pub(crate) fn new(name: impl Into<String>, gateway: &'a Gateway) -> Self {
        Self {
            name: name.into(),
            gateway,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The connection this handle is bound to
    pub fn gateway(&self) -> &'a Gateway {
        self.gateway
    }
}
