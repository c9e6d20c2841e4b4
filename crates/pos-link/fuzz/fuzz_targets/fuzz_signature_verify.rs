//! Fuzz target for signature verification.
//!
//! Arbitrary signature bytes against a fixed key and arbitrary message must
//! yield `Ok(false)` or a `SignatureFormat` error, never a panic, and the
//! answer must be stable across calls.
//!
//! ## Running
//!
//! ```bash
//! cd crates/pos-link
//! cargo +nightly fuzz run fuzz_signature_verify
//! ```

#![no_main]

use libfuzzer_sys::fuzz_target;
use pos_crypto::{load_public_key, verify, CryptoError};

const TERMINAL_PUBLIC_KEY: &str = "MFkwEwYHKoZIzj0CAQYIKoZIzj0DAQcDQgAESp/k7Yo8VfRbxhlks0LmvbS1yEPzF/e1+hvxFkGrKNLHquJZJpC5AA+HbVqbVGlAnv5cXX4g5ZnLd2HavNMEag==";

/// Fuzz input structure for verification.
#[derive(Debug, arbitrary::Arbitrary)]
struct FuzzInput {
    /// Bytes presented as the signature (DER or fixed-width)
    signature: Vec<u8>,
    /// Canonical template bytes
    message: Vec<u8>,
}

fuzz_target!(|input: FuzzInput| {
    let Ok(key) = load_public_key(TERMINAL_PUBLIC_KEY) else {
        return;
    };

    let first = verify(&key, &input.signature, &input.message);
    let second = verify(&key, &input.signature, &input.message);
    assert_eq!(first, second);

    match first {
        Ok(_) | Err(CryptoError::SignatureFormat(_)) => {}
        Err(other) => panic!("unexpected verification error: {:?}", other),
    }
});
