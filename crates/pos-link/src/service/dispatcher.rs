//! # Message Dispatcher
//!
//! Builds the signed request line and writes it on the shared write half.
//! Everything that can fail without touching the socket (amount, key,
//! signing, encoding) runs in [`prepare`] before any connect happens.

use crate::adapters::codec;
use crate::domain::entities::{PaymentOrder, PaymentRequest};
use crate::domain::errors::LinkError;
use crate::domain::signing;
use crate::service::connection::ConnectionHandle;
use std::io;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// A request ready to go on the wire.
#[derive(Debug)]
pub(crate) struct PreparedRequest {
    pub(crate) request: PaymentRequest,
    pub(crate) line: String,
}

/// Validate the order, generate a `stan_id`, sign and encode.
pub(crate) fn prepare(
    order: PaymentOrder,
    client_private_key: Option<&str>,
) -> Result<PreparedRequest, LinkError> {
    let amount = order.parse_amount()?;
    let private_key = client_private_key
        .ok_or_else(|| LinkError::KeyFormat("no client private key configured".to_string()))?;

    let stan_id = Uuid::new_v4().to_string();
    let request = signing::sign_request(amount, stan_id, order.payload, private_key)?;
    let line = codec::encode_request(&request)?;

    Ok(PreparedRequest { request, line })
}

/// Write one line and flush, giving up as soon as the connection is shut down.
pub(crate) async fn write_line(handle: &ConnectionHandle, line: &str) -> io::Result<()> {
    let mut shutdown = handle.shutdown.clone();

    let mut writer = tokio::select! {
        guard = handle.writer.lock() => guard,
        _ = shutdown.changed() => return Err(aborted()),
    };

    tokio::select! {
        result = async {
            writer.write_all(line.as_bytes()).await?;
            writer.flush().await
        } => result,
        _ = shutdown.changed() => Err(aborted()),
    }
}

fn aborted() -> io::Error {
    io::Error::new(io::ErrorKind::ConnectionAborted, "connection closed during write")
}
