//! # Line Codec
//!
//! One JSON envelope per line, `\n` terminated, no length prefix:
//!
//! ```text
//! {"type":"payment_request","data":{"amount":2000,"stan_id":"..","payload":"..","sign":"..","entity_type":"payment_request"}}
//! {"type":"payment_failed","data":{"error":"..","stan_id":"..","payload":"..","sign":".."}}
//! {"type":"payment_success","data":{"amount":2000,"rrn":"..","serial":"..","trace":"..","card_number":"..","datetime":"..","stan_id":"..","payload":"..","sign":".."}}
//! ```

use crate::domain::entities::{
    InboundEvent, PaymentFailed, PaymentRequest, PaymentSucceeded, PAYMENT_FAILED,
    PAYMENT_REQUEST, PAYMENT_SUCCESS,
};
use crate::domain::errors::LinkError;
use serde::{Deserialize, Serialize};

#[derive(Serialize)]
struct OutgoingEnvelope<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    data: OutgoingData<'a>,
}

#[derive(Serialize)]
struct OutgoingData<'a> {
    amount: u64,
    stan_id: &'a str,
    payload: &'a str,
    sign: &'a str,
    entity_type: &'static str,
}

#[derive(Deserialize)]
struct IncomingEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: serde_json::Value,
}

/// Result of decoding one inbound line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedLine {
    /// A recognised event, signature not yet checked
    Event(InboundEvent),
    /// Envelope with a `type` this client does not handle
    Ignored(String),
}

/// Encode a signed request as a single `\n`-terminated line.
pub fn encode_request(request: &PaymentRequest) -> Result<String, LinkError> {
    let envelope = OutgoingEnvelope {
        kind: PAYMENT_REQUEST,
        data: OutgoingData {
            amount: request.amount,
            stan_id: &request.stan_id,
            payload: &request.payload,
            sign: &request.sign,
            entity_type: PAYMENT_REQUEST,
        },
    };

    let mut line = serde_json::to_string(&envelope)?;
    line.push('\n');
    Ok(line)
}

/// Decode one inbound line (without its terminator).
pub fn decode_line(line: &str) -> Result<DecodedLine, LinkError> {
    let envelope: IncomingEnvelope = serde_json::from_str(line.trim())?;

    let event = match envelope.kind.as_str() {
        PAYMENT_FAILED => InboundEvent::Failure(decode_data::<PaymentFailed>(
            PAYMENT_FAILED,
            envelope.data,
        )?),
        PAYMENT_SUCCESS => InboundEvent::Success(decode_data::<PaymentSucceeded>(
            PAYMENT_SUCCESS,
            envelope.data,
        )?),
        _ => return Ok(DecodedLine::Ignored(envelope.kind)),
    };

    Ok(DecodedLine::Event(event))
}

fn decode_data<T: serde::de::DeserializeOwned>(
    kind: &str,
    data: serde_json::Value,
) -> Result<T, LinkError> {
    serde_json::from_value(data).map_err(|e| LinkError::Protocol(format!("{} data: {}", kind, e)))
}
