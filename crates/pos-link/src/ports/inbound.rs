//! # Inbound Ports (Driving Ports / API)
//!
//! The surface a collaborator (UI, CLI) drives: send an order, watch the
//! connection, consume verified or rejected terminal events.

use crate::domain::entities::{ConnectionState, PaymentOrder};
use crate::domain::errors::LinkError;
use crate::service::InboundEvents;

/// Primary POS terminal link API.
///
/// Implementations must be thread-safe (`Send + Sync`).
#[async_trait::async_trait]
pub trait PaymentTerminalApi: Send + Sync {
    /// Sign and send a payment request, connecting first if needed.
    ///
    /// Returns the generated transaction id (`stan_id`) used to correlate
    /// the terminal's answer.
    ///
    /// # Errors
    /// * `LinkError::InvalidRequest` - amount is not plain decimal digits
    /// * `LinkError::KeyFormat` / `LinkError::Sign` - client key unusable;
    ///   the connection is not touched
    /// * `LinkError::Connect` - terminal unreachable; left disconnected
    /// * `LinkError::Io` - write failed; the connection was torn down
    async fn send_payment_request(&self, order: PaymentOrder) -> Result<String, LinkError>;

    /// Subscribe to inbound outcomes published from now on.
    fn subscribe(&self) -> InboundEvents;

    /// Current connection state.
    fn state(&self) -> ConnectionState;

    /// Close the connection if one is open. Idempotent.
    async fn disconnect(&self);
}
