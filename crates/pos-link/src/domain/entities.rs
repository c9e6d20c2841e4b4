//! # Domain Entities
//!
//! Messages exchanged with the terminal and the outcomes surfaced to callers.
//! Field names match the wire names so the codec can derive them directly.

use super::errors::LinkError;
use super::template::CanonicalTemplate;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// `type` of the outgoing request envelope (also its `entity_type`).
pub const PAYMENT_REQUEST: &str = "payment_request";
/// `type` of a failed-payment event.
pub const PAYMENT_FAILED: &str = "payment_failed";
/// `type` of a successful-payment event.
pub const PAYMENT_SUCCESS: &str = "payment_success";

// =============================================================================
// Outgoing
// =============================================================================

/// What the caller asks the terminal to charge.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PaymentOrder {
    /// Amount as entered (decimal digits)
    pub amount: String,
    /// Opaque merchant payload echoed back by the terminal
    pub payload: String,
    /// Terminal public key used to verify the events this connection receives
    pub terminal_public_key: String,
}

impl PaymentOrder {
    /// Create a new order.
    pub fn new(
        amount: impl Into<String>,
        payload: impl Into<String>,
        terminal_public_key: impl Into<String>,
    ) -> Self {
        Self {
            amount: amount.into(),
            payload: payload.into(),
            terminal_public_key: terminal_public_key.into(),
        }
    }

    /// Parse the amount. Only plain decimal digits are accepted, since the
    /// value is written as a bare JSON number and signed as text.
    pub fn parse_amount(&self) -> Result<u64, LinkError> {
        let amount = self.amount.trim();
        if amount.is_empty() || !amount.bytes().all(|b| b.is_ascii_digit()) {
            return Err(LinkError::InvalidRequest(format!(
                "amount must be decimal digits, got {:?}",
                self.amount
            )));
        }
        amount
            .parse()
            .map_err(|_| LinkError::InvalidRequest(format!("amount {} out of range", amount)))
    }
}

/// A signed payment request, ready to be written.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub amount: u64,
    pub stan_id: String,
    pub payload: String,
    /// Base64 DER signature over [`PaymentRequest::signing_template`]
    pub sign: String,
}

impl PaymentRequest {
    /// `#amount,stan_id,payload#`
    pub fn signing_template(&self) -> CanonicalTemplate {
        request_template(self.amount, &self.stan_id, &self.payload)
    }
}

pub(crate) fn request_template(amount: u64, stan_id: &str, payload: &str) -> CanonicalTemplate {
    CanonicalTemplate::build([amount.to_string().as_str(), stan_id, payload])
}

// =============================================================================
// Inbound
// =============================================================================

/// `payment_failed` event data.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentFailed {
    pub error: String,
    pub stan_id: String,
    /// Optional on the wire; absent and `null` both mean empty
    #[serde(default, deserialize_with = "null_as_empty")]
    pub payload: String,
    pub sign: String,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// `payment_success` event data.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentSucceeded {
    pub amount: i64,
    /// Retrieval reference number
    pub rrn: String,
    pub serial: String,
    pub trace: String,
    /// Masked card number
    pub card_number: String,
    pub datetime: String,
    pub stan_id: String,
    pub payload: String,
    pub sign: String,
}

/// An event received from the terminal, not yet trusted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InboundEvent {
    Failure(PaymentFailed),
    Success(PaymentSucceeded),
}

impl InboundEvent {
    /// Wire `type` of this event.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Failure(_) => PAYMENT_FAILED,
            Self::Success(_) => PAYMENT_SUCCESS,
        }
    }

    /// Transaction id echoed by the terminal.
    pub fn stan_id(&self) -> &str {
        match self {
            Self::Failure(e) => &e.stan_id,
            Self::Success(e) => &e.stan_id,
        }
    }

    /// Base64 signature carried by the event.
    pub fn sign(&self) -> &str {
        match self {
            Self::Failure(e) => &e.sign,
            Self::Success(e) => &e.sign,
        }
    }

    /// Template the terminal signed; field order is fixed per event type.
    pub fn signing_template(&self) -> CanonicalTemplate {
        match self {
            Self::Failure(e) => CanonicalTemplate::build([
                e.error.as_str(),
                e.stan_id.as_str(),
                e.payload.as_str(),
            ]),
            Self::Success(e) => CanonicalTemplate::build([
                e.amount.to_string().as_str(),
                e.rrn.as_str(),
                e.serial.as_str(),
                e.trace.as_str(),
                e.card_number.as_str(),
                e.datetime.as_str(),
                e.stan_id.as_str(),
                e.payload.as_str(),
            ]),
        }
    }
}

/// What the inbound event loop reports for each line or lifecycle change.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InboundOutcome {
    /// Signature validated; the event can be trusted
    Verified(InboundEvent),
    /// Recognised event whose signature did not validate (or could not be checked)
    Rejected {
        event_type: String,
        stan_id: String,
        error: LinkError,
    },
    /// Line was not a valid envelope; the loop carries on
    Malformed(LinkError),
    /// The read loop ended; `None` for a clean close or local disconnect
    Terminated { error: Option<LinkError> },
}

impl InboundOutcome {
    /// Transaction id the outcome refers to, when known.
    pub fn stan_id(&self) -> Option<&str> {
        match self {
            Self::Verified(event) => Some(event.stan_id()),
            Self::Rejected { stan_id, .. } => Some(stan_id),
            Self::Malformed(_) | Self::Terminated { .. } => None,
        }
    }
}

// =============================================================================
// Connection
// =============================================================================

/// Connection lifecycle as seen by callers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// A connect attempt just failed; published right before `Disconnected`
    Failed,
}

impl ConnectionState {
    /// True only while a socket is held open.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}
