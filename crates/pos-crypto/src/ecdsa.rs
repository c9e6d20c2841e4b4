//! # ECDSA Signatures (P-256 / SHA-256)
//!
//! Signing and verification over raw message bytes. The message is hashed
//! with SHA-256 inside the signature scheme; callers pass the exact bytes
//! that were (or will be) signed.
//!
//! ## Security Properties
//!
//! - RFC 6979 deterministic nonces (no RNG dependency for signing)
//! - DER output, accepted by the terminal's `SHA256withECDSA` verifier
//! - A well-formed signature that fails verification is `Ok(false)`,
//!   distinct from malformed signature bytes

use crate::{CryptoError, EcPrivateKey, EcPublicKey};
use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::Signature;

/// Width of a fixed-size `r || s` signature.
const FIXED_SIGNATURE_LEN: usize = 64;

/// Sign `message`, returning an ASN.1 DER signature.
pub fn sign(key: &EcPrivateKey, message: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let signature: Signature = key
        .signing_key()
        .try_sign(message)
        .map_err(|e| CryptoError::SigningFailed(e.to_string()))?;

    Ok(signature.to_der().as_bytes().to_vec())
}

/// Verify `signature` over `message`.
///
/// Accepts DER signatures, and fixed-width 64-byte `r || s` signatures.
pub fn verify(key: &EcPublicKey, signature: &[u8], message: &[u8]) -> Result<bool, CryptoError> {
    let signature = parse_signature(signature)?;
    Ok(key.verifying_key().verify(message, &signature).is_ok())
}

fn parse_signature(bytes: &[u8]) -> Result<Signature, CryptoError> {
    Signature::from_der(bytes)
        .or_else(|der_error| {
            if bytes.len() == FIXED_SIGNATURE_LEN {
                Signature::from_slice(bytes)
            } else {
                Err(der_error)
            }
        })
        .map_err(|e| CryptoError::SignatureFormat(e.to_string()))
}
