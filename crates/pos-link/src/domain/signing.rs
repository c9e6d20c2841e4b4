//! # Request Signing and Event Verification
//!
//! Glue between the canonical templates and the signature engine. Keys are
//! loaded from their text form on every call and dropped afterwards.

use super::entities::{request_template, InboundEvent, PaymentRequest};
use super::errors::LinkError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

/// Sign `(amount, stan_id, payload)` with the client private key.
pub fn sign_request(
    amount: u64,
    stan_id: String,
    payload: String,
    private_key: &str,
) -> Result<PaymentRequest, LinkError> {
    let key = pos_crypto::load_private_key(private_key)?;
    let template = request_template(amount, &stan_id, &payload);
    let signature = pos_crypto::sign(&key, template.as_bytes())?;

    Ok(PaymentRequest {
        amount,
        stan_id,
        payload,
        sign: STANDARD.encode(signature),
    })
}

/// Check the event's signature against its own template.
///
/// Key and signature decoding failures keep their own error kinds; only a
/// well-formed signature that does not validate is `Verification`.
pub fn verify_event(event: &InboundEvent, terminal_public_key: &str) -> Result<(), LinkError> {
    let key = pos_crypto::load_public_key(terminal_public_key)?;
    let signature = STANDARD
        .decode(event.sign().trim())
        .map_err(|e| LinkError::SignatureFormat(format!("sign is not base64: {}", e)))?;
    let template = event.signing_template();

    if pos_crypto::verify(&key, &signature, template.as_bytes())? {
        Ok(())
    } else {
        Err(LinkError::Verification {
            event_type: event.event_type().to_string(),
            stan_id: event.stan_id().to_string(),
        })
    }
}
