//! Crypto error types.

use thiserror::Error;

/// Cryptographic operation errors.
///
/// A signature that is well formed but does not validate is not an error:
/// `verify` reports it as `Ok(false)`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CryptoError {
    /// Key text is not base64, or does not describe a P-256 key
    #[error("Invalid key encoding: {0}")]
    KeyFormat(String),

    /// The signing operation itself failed
    #[error("Signing failed: {0}")]
    SigningFailed(String),

    /// Signature bytes are neither DER nor fixed-width r||s
    #[error("Invalid signature format: {0}")]
    SignatureFormat(String),
}
