//! # Connection Manager
//!
//! Owns the single terminal connection slot. Connects lazily on behalf of the
//! first sender, hands out writer handles to later senders, and tears the
//! connection down on I/O failure or explicit disconnect.
//!
//! ## Teardown Safety
//!
//! Every connection gets a fresh id and its own `watch` shutdown channel.
//! [`ConnectionManager::teardown`] only acts when the slot still holds that id,
//! so a reader finishing late cannot close a newer connection.

use crate::config::TerminalEndpoint;
use crate::domain::entities::ConnectionState;
use crate::domain::errors::LinkError;
use crate::ports::outbound::{TerminalConnector, TerminalReader, TerminalWriter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

/// Live connection held in the slot.
struct ActiveConnection {
    id: u64,
    writer: Arc<Mutex<TerminalWriter>>,
    shutdown: watch::Sender<bool>,
}

impl ActiveConnection {
    fn handle(&self) -> ConnectionHandle {
        ConnectionHandle {
            id: self.id,
            writer: Arc::clone(&self.writer),
            shutdown: self.shutdown.subscribe(),
        }
    }

    fn close(self) {
        // Receivers also observe the sender being dropped.
        let _ = self.shutdown.send(true);
    }
}

/// What a sender needs to write on the current connection.
#[derive(Clone)]
pub(crate) struct ConnectionHandle {
    pub(crate) id: u64,
    pub(crate) writer: Arc<Mutex<TerminalWriter>>,
    pub(crate) shutdown: watch::Receiver<bool>,
}

/// A connection opened by [`ConnectionManager::ensure_connected`].
pub(crate) struct Established {
    pub(crate) handle: ConnectionHandle,
    /// Read half, present only when this call opened the connection.
    pub(crate) reader: Option<TerminalReader>,
}

pub(crate) struct ConnectionManager {
    slot: Mutex<Option<ActiveConnection>>,
    state: watch::Sender<ConnectionState>,
    next_id: AtomicU64,
}

impl ConnectionManager {
    pub(crate) fn new() -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            slot: Mutex::new(None),
            state,
            next_id: AtomicU64::new(1),
        }
    }

    pub(crate) fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub(crate) fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Reuse the open connection or open a new one.
    ///
    /// The slot lock is held across the connect so concurrent senders wait
    /// for a single attempt instead of racing their own. A `disconnect` issued
    /// meanwhile also waits, then closes the connection this call opened.
    /// A failed attempt publishes `Failed` and settles on `Disconnected`.
    pub(crate) async fn ensure_connected<C>(
        &self,
        connector: &C,
        endpoint: &TerminalEndpoint,
    ) -> Result<Established, LinkError>
    where
        C: TerminalConnector + ?Sized,
    {
        let mut slot = self.slot.lock().await;
        if let Some(active) = slot.as_ref() {
            return Ok(Established {
                handle: active.handle(),
                reader: None,
            });
        }

        self.state.send_replace(ConnectionState::Connecting);
        debug!(%endpoint, "connecting to terminal");

        let (reader, writer) = match connector.connect(endpoint).await {
            Ok(halves) => halves,
            Err(e) => {
                warn!(%endpoint, error = %e, "terminal connect failed");
                self.state.send_replace(ConnectionState::Failed);
                self.state.send_replace(ConnectionState::Disconnected);
                return Err(LinkError::Connect {
                    endpoint: endpoint.to_string(),
                    reason: e.to_string(),
                });
            }
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (shutdown, _) = watch::channel(false);
        let active = ActiveConnection {
            id,
            writer: Arc::new(Mutex::new(writer)),
            shutdown,
        };
        let handle = active.handle();
        *slot = Some(active);
        self.state.send_replace(ConnectionState::Connected);
        info!(%endpoint, connection_id = id, "connected to terminal");

        Ok(Established {
            handle,
            reader: Some(reader),
        })
    }

    /// Close connection `id` if it is still the current one.
    ///
    /// Returns `false` when the slot already moved on.
    pub(crate) async fn teardown(&self, id: u64) -> bool {
        let mut slot = self.slot.lock().await;
        if slot.as_ref().map(|active| active.id) != Some(id) {
            return false;
        }
        if let Some(active) = slot.take() {
            active.close();
        }
        self.state.send_replace(ConnectionState::Disconnected);
        info!(connection_id = id, "terminal connection torn down");
        true
    }

    /// Close whatever is open. Safe to call repeatedly.
    ///
    /// Waits for an in-flight connect to finish rather than aborting it.
    pub(crate) async fn disconnect(&self) {
        let mut slot = self.slot.lock().await;
        if let Some(active) = slot.take() {
            info!(connection_id = active.id, "disconnecting from terminal");
            active.close();
        }
        self.state.send_replace(ConnectionState::Disconnected);
    }

    /// Non-blocking close used from `Drop`; skipped if the slot is busy.
    pub(crate) fn close_now(&self) {
        if let Ok(mut slot) = self.slot.try_lock() {
            if let Some(active) = slot.take() {
                active.close();
                self.state.send_replace(ConnectionState::Disconnected);
            }
        }
    }
}
