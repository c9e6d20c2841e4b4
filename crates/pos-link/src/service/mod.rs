//! # POS Link Service
//!
//! Application service implementing [`PaymentTerminalApi`]. Wires the
//! connection manager, the dispatcher and the per-connection read loop
//! around a [`TerminalConnector`].
//!
//! ## Flow
//!
//! ```text
//! send_payment_request ──► prepare (amount, stan_id, sign, encode)
//!                      ──► ensure_connected ──► spawn read loop (new connections)
//!                      ──► write_line ── error ──► teardown, LinkError::Io
//!
//! read loop ──► InboundOutcome ──► broadcast ──► InboundEvents subscribers
//! ```

mod connection;
mod dispatcher;
mod observer;

use crate::config::{ConfigError, LinkConfig};
use crate::domain::entities::{ConnectionState, InboundOutcome, PaymentOrder};
use crate::domain::errors::LinkError;
use crate::ports::inbound::PaymentTerminalApi;
use crate::ports::outbound::TerminalConnector;
use connection::{ConnectionManager, Established};
use observer::Observer;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tracing::{info, warn};

/// Subscription to inbound outcomes.
///
/// Outcomes published before the subscription was taken are not replayed.
pub struct InboundEvents {
    receiver: broadcast::Receiver<InboundOutcome>,
}

impl InboundEvents {
    /// Next outcome, or `None` once the service is gone.
    ///
    /// A subscriber that falls behind skips the outcomes it missed.
    pub async fn recv(&mut self) -> Option<InboundOutcome> {
        loop {
            match self.receiver.recv().await {
                Ok(outcome) => return Some(outcome),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "inbound subscriber lagged, outcomes dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Consume as a `Stream`, dropping lag notifications.
    pub fn into_stream(self) -> impl Stream<Item = InboundOutcome> + Send {
        BroadcastStream::new(self.receiver).filter_map(|item| item.ok())
    }
}

/// The POS terminal link.
pub struct PosLinkService<C: TerminalConnector> {
    config: LinkConfig,
    connector: C,
    manager: Arc<ConnectionManager>,
    events: broadcast::Sender<InboundOutcome>,
}

impl<C: TerminalConnector> PosLinkService<C> {
    /// Create a service; nothing connects until the first send.
    ///
    /// # Errors
    /// Returns `ConfigError::Invalid` when `config` does not validate.
    pub fn new(config: LinkConfig, connector: C) -> Result<Self, ConfigError> {
        config.validate()?;
        let (events, _) = broadcast::channel(config.event_capacity);
        Ok(Self {
            config,
            connector,
            manager: Arc::new(ConnectionManager::new()),
            events,
        })
    }

    /// Active configuration.
    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// Receiver that observes every connection state change.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.manager.watch_state()
    }

    fn start_reader(&self, established: &mut Established, terminal_public_key: &str) {
        if let Some(reader) = established.reader.take() {
            Observer {
                manager: Arc::clone(&self.manager),
                connection_id: established.handle.id,
                shutdown: established.handle.shutdown.clone(),
                terminal_public_key: terminal_public_key.to_string(),
                events: self.events.clone(),
                read_idle_timeout: self.config.read_idle_timeout,
            }
            .spawn(reader);
        }
    }
}

#[async_trait::async_trait]
impl<C: TerminalConnector> PaymentTerminalApi for PosLinkService<C> {
    async fn send_payment_request(&self, order: PaymentOrder) -> Result<String, LinkError> {
        let terminal_public_key = order.terminal_public_key.clone();
        let prepared = dispatcher::prepare(order, self.config.client_private_key.as_deref())?;

        let mut established = self
            .manager
            .ensure_connected(&self.connector, &self.config.endpoint)
            .await?;
        self.start_reader(&mut established, &terminal_public_key);

        let handle = established.handle;
        if let Err(e) = dispatcher::write_line(&handle, &prepared.line).await {
            warn!(connection_id = handle.id, error = %e, "payment request write failed");
            self.manager.teardown(handle.id).await;
            return Err(LinkError::from(e));
        }

        info!(
            connection_id = handle.id,
            stan_id = %prepared.request.stan_id,
            amount = prepared.request.amount,
            "payment request sent"
        );
        Ok(prepared.request.stan_id)
    }

    fn subscribe(&self) -> InboundEvents {
        InboundEvents {
            receiver: self.events.subscribe(),
        }
    }

    fn state(&self) -> ConnectionState {
        self.manager.state()
    }

    async fn disconnect(&self) {
        self.manager.disconnect().await;
    }
}

impl<C: TerminalConnector> Drop for PosLinkService<C> {
    fn drop(&mut self) {
        self.manager.close_now();
    }
}
