//! # POS Crypto - Terminal Link Signatures
//!
//! ## Components
//!
//! | Module | Algorithm | Use Case |
//! |--------|-----------|----------|
//! | `ecdsa` | ECDSA P-256 / SHA-256 | Signing requests, verifying terminal events |
//! | `keys` | PKCS#8, SEC1, SPKI (PEM or bare base64) | Loading key material from text |
//!
//! ## Security Properties
//!
//! - **P-256 (prime256v1)**: the curve the terminal vendor issues keys on
//! - **RFC 6979**: deterministic nonces, no RNG dependency when signing
//! - **DER signatures**: the ASN.1 form the terminal produces and expects
//! - Decoded private key bytes are zeroized after parsing

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod ecdsa;
pub mod errors;
pub mod keys;

// Re-exports
pub use ecdsa::{sign, verify};
pub use errors::CryptoError;
pub use keys::{load_private_key, load_public_key, EcPrivateKey, EcPublicKey};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
