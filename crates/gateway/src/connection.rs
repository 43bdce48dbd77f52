//! Gateway connection and its builder

use crate::bridge::{self, CommitObserver};
use crate::config::GatewayClientConfig;
use crate::error::{ConfigError, GatewayError};
use crate::messages::{EndorsedTransaction, PreparedTransaction, SignedProposal};
use crate::network::Network;
use crate::signer::Signer;
use crate::transport::tcp::TcpConnector;
use crate::transport::{
    CallOptions, GatewayTransport, TransportConfig, TransportConnector, TransportCredentials,
};
use log::info;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Connection state as seen from the outside
///
/// A builder that has not connected yet is `Unopened`; a [`Gateway`] is
/// `Opened` until its transport reports the channel unusable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Unopened,
    Opened,
    Failed,
}

/// Validated connection settings, immutable once the connection is open
#[derive(Clone)]
pub struct ConnectionConfig {
    endpoint: String,
    signer: Arc<dyn Signer>,
}

impl ConnectionConfig {
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn signer(&self) -> &Arc<dyn Signer> {
        &self.signer
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

/// Create a new connection builder
pub fn create_builder() -> GatewayBuilder {
    GatewayBuilder::default()
}

/// Staged configuration for a [`Gateway`]
///
/// No I/O happens until `connect`/`connect_with`.
#[derive(Default)]
pub struct GatewayBuilder {
    url: String,
    signer: Option<Arc<dyn Signer>>,
    credentials: TransportCredentials,
    transport_config: TransportConfig,
    default_deadline: Option<Duration>,
}

impl GatewayBuilder {
    /// Seed a builder from a client config file; the signer still has to be set
    pub fn from_config(config: &GatewayClientConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            url: config.endpoint.clone(),
            signer: None,
            credentials: config.credentials()?,
            transport_config: config.transport.clone(),
            default_deadline: config.default_deadline(),
        })
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn signer(mut self, signer: impl Signer + 'static) -> Self {
        self.signer = Some(Arc::new(signer));
        self
    }

    /// Use a signer that is shared with other components
    pub fn shared_signer(mut self, signer: Arc<dyn Signer>) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn credentials(mut self, credentials: TransportCredentials) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn transport_config(mut self, config: TransportConfig) -> Self {
        self.transport_config = config;
        self
    }

    /// Deadline applied to calls that do not carry their own
    pub fn default_deadline(mut self, deadline: Duration) -> Self {
        self.default_deadline = Some(deadline);
        self
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::Unopened
    }

    /// Check required fields without connecting
    pub fn validate(&self) -> Result<ConnectionConfig, GatewayError> {
        if self.url.is_empty() {
            return Err(GatewayError::Configuration(
                "endpoint URL not set".to_string(),
            ));
        }
        let signer = self
            .signer
            .clone()
            .ok_or_else(|| GatewayError::Configuration("signer not set".to_string()))?;

        Ok(ConnectionConfig {
            endpoint: self.url.clone(),
            signer,
        })
    }

    /// Validate and open a TCP connection to the endpoint
    pub async fn connect(self) -> Result<Gateway, GatewayError> {
        self.connect_with(&TcpConnector).await
    }

    /// Validate and open the transport through `connector`
    pub async fn connect_with<C>(self, connector: &C) -> Result<Gateway, GatewayError>
    where
        C: TransportConnector,
    {
        let config = self.validate()?;
        let transport = connector
            .open(&config.endpoint, &self.credentials, &self.transport_config)
            .await?;

        info!(
            "Gateway connection opened to {} ({} credentials)",
            config.endpoint,
            self.credentials.kind()
        );

        Ok(Gateway {
            config,
            transport: Box::new(transport),
            default_options: CallOptions {
                deadline: self.default_deadline,
            },
        })
    }
}

/// An open connection to a gateway endpoint
///
/// Owns its transport. Calls may run concurrently; a failed call leaves the
/// connection usable unless the transport reports the channel itself is
/// gone, in which case every later call fails with the same error. Dropping
/// the gateway closes the channel.
pub struct Gateway {
    config: ConnectionConfig,
    transport: Box<dyn GatewayTransport>,
    default_options: CallOptions,
}

impl Gateway {
    pub fn builder() -> GatewayBuilder {
        create_builder()
    }

    pub fn endpoint(&self) -> &str {
        self.config.endpoint()
    }

    pub fn signer(&self) -> &Arc<dyn Signer> {
        self.config.signer()
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        if self.transport.is_active() {
            ConnectionState::Opened
        } else {
            ConnectionState::Failed
        }
    }

    /// Evaluate a proposal, returning the result value as text
    pub async fn evaluate(&self, proposal: SignedProposal) -> Result<String, GatewayError> {
        self.evaluate_with(proposal, CallOptions::default()).await
    }

    pub async fn evaluate_with(
        &self,
        proposal: SignedProposal,
        options: CallOptions,
    ) -> Result<String, GatewayError> {
        let options = self.resolve(options);
        bridge::evaluate(self.transport.as_ref(), proposal, &options).await
    }

    /// Collect endorsements; the result is handed unmodified to `submit`
    pub async fn endorse(
        &self,
        proposal: SignedProposal,
    ) -> Result<EndorsedTransaction, GatewayError> {
        self.endorse_with(proposal, CallOptions::default()).await
    }

    pub async fn endorse_with(
        &self,
        proposal: SignedProposal,
        options: CallOptions,
    ) -> Result<EndorsedTransaction, GatewayError> {
        let options = self.resolve(options);
        bridge::endorse(self.transport.as_ref(), proposal, &options).await
    }

    /// Submit a transaction; resolves once the endpoint ends the commit stream
    pub async fn submit<O>(
        &self,
        transaction: impl Into<PreparedTransaction>,
        observer: &mut O,
    ) -> Result<(), GatewayError>
    where
        O: CommitObserver + ?Sized,
    {
        self.submit_with(transaction, CallOptions::default(), observer)
            .await
    }

    pub async fn submit_with<O>(
        &self,
        transaction: impl Into<PreparedTransaction>,
        options: CallOptions,
        observer: &mut O,
    ) -> Result<(), GatewayError>
    where
        O: CommitObserver + ?Sized,
    {
        let options = self.resolve(options);
        bridge::submit(
            self.transport.as_ref(),
            transaction.into(),
            &options,
            observer,
        )
        .await
    }

    /// Handle for a named network, bound to this connection
    pub fn get_network(&self, name: impl Into<String>) -> Network<'_> {
        Network::new(name, self)
    }

    fn resolve(&self, options: CallOptions) -> CallOptions {
        CallOptions {
            deadline: options.deadline.or(self.default_options.deadline),
        }
    }
}

impl fmt::Debug for Gateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gateway")
            .field("endpoint", &self.config.endpoint)
            .field("state", &self.state())
            .field("default_options", &self.default_options)
            .finish_non_exhaustive()
    }
}
