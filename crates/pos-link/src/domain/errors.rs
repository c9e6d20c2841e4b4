//! # Link Errors
//!
//! Every failure the link can report. Outcomes carrying these are broadcast
//! to subscribers, so the type is `Clone` and holds only owned strings.

use pos_crypto::CryptoError;
use thiserror::Error;

/// Errors that can occur on the terminal link.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LinkError {
    /// The TCP connect to the terminal failed (no retry is attempted)
    #[error("Cannot connect to terminal at {endpoint}: {reason}")]
    Connect { endpoint: String, reason: String },

    /// Read or write failed on an established connection (connection torn down)
    #[error("Terminal I/O failed: {0}")]
    Io(String),

    /// Key text could not be decoded into a P-256 key
    #[error("Invalid key material: {0}")]
    KeyFormat(String),

    /// The signing operation failed
    #[error("Signing failed: {0}")]
    Sign(String),

    /// Signature bytes are not base64, DER or fixed-width r||s
    #[error("Malformed signature: {0}")]
    SignatureFormat(String),

    /// A well-formed signature did not validate against the event's template
    #[error("Signature verification failed for {event_type} (stan_id {stan_id})")]
    Verification { event_type: String, stan_id: String },

    /// Malformed JSON or a missing required field on an inbound line
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Request rejected before anything was signed or sent
    #[error("Invalid payment request: {0}")]
    InvalidRequest(String),
}

impl LinkError {
    /// Whether the error came from the transport rather than the content.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Connect { .. } | Self::Io(_))
    }
}

impl From<CryptoError> for LinkError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::KeyFormat(msg) => Self::KeyFormat(msg),
            CryptoError::SigningFailed(msg) => Self::Sign(msg),
            CryptoError::SignatureFormat(msg) => Self::SignatureFormat(msg),
        }
    }
}

impl From<std::io::Error> for LinkError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl From<serde_json::Error> for LinkError {
    fn from(e: serde_json::Error) -> Self {
        Self::Protocol(e.to_string())
    }
}
