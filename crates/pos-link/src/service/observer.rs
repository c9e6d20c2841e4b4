//! # Inbound Event Loop
//!
//! One task per connection, sole owner of the read half. Each non-blank line
//! is decoded, verified against the terminal public key and published as an
//! [`InboundOutcome`]. Bad lines, including ones longer than
//! [`MAX_LINE_BYTES`], are reported and skipped; only EOF, a read error, the
//! idle timeout or a shutdown signal end the loop.

use crate::adapters::codec::{self, DecodedLine};
use crate::domain::entities::InboundOutcome;
use crate::domain::errors::LinkError;
use crate::domain::signing;
use crate::ports::outbound::TerminalReader;
use crate::service::connection::ConnectionManager;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Longest line accepted from the terminal, newline included.
pub(crate) const MAX_LINE_BYTES: usize = 64 * 1024;

/// Result of one [`read_line`] call.
#[derive(Debug, PartialEq, Eq)]
enum LineRead {
    Line,
    /// Line was over the cap and has been discarded through its `\n`.
    Oversized,
    Eof,
}

/// Everything the read task needs besides the reader itself.
pub(crate) struct Observer {
    pub(crate) manager: Arc<ConnectionManager>,
    pub(crate) connection_id: u64,
    pub(crate) shutdown: watch::Receiver<bool>,
    pub(crate) terminal_public_key: String,
    pub(crate) events: broadcast::Sender<InboundOutcome>,
    pub(crate) read_idle_timeout: Option<Duration>,
}

impl Observer {
    pub(crate) fn spawn(self, reader: TerminalReader) -> JoinHandle<()> {
        tokio::spawn(self.run(reader))
    }

    async fn run(mut self, reader: TerminalReader) {
        let connection_id = self.connection_id;
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        debug!(connection_id, "read loop started");

        let error = loop {
            buf.clear();
            let read = tokio::select! {
                _ = self.shutdown.changed() => {
                    debug!(connection_id, "read loop stopped by disconnect");
                    break None;
                }
                read = read_line(&mut reader, &mut buf, self.read_idle_timeout) => read,
            };

            match read {
                Ok(LineRead::Eof) => {
                    info!(connection_id, "terminal closed the connection");
                    break None;
                }
                Ok(LineRead::Line) => {
                    if let Some(outcome) = classify_line(&buf, &self.terminal_public_key) {
                        self.publish(outcome);
                    }
                }
                Ok(LineRead::Oversized) => {
                    warn!(
                        connection_id,
                        limit = MAX_LINE_BYTES,
                        "terminal line too long, discarded"
                    );
                    self.publish(InboundOutcome::Malformed(LinkError::Protocol(format!(
                        "line exceeds {} bytes",
                        MAX_LINE_BYTES
                    ))));
                }
                Err(e) => {
                    warn!(connection_id, error = %e, "terminal read failed");
                    break Some(LinkError::from(e));
                }
            }
        };

        self.manager.teardown(connection_id).await;
        self.publish(InboundOutcome::Terminated { error });
    }

    fn publish(&self, outcome: InboundOutcome) {
        // No subscribers is fine; outcomes are not queued for late joiners.
        let _ = self.events.send(outcome);
    }
}

/// Read up to and including the next `\n` into `buf`.
async fn read_line<R>(
    reader: &mut R,
    buf: &mut Vec<u8>,
    idle_timeout: Option<Duration>,
) -> io::Result<LineRead>
where
    R: AsyncBufRead + Unpin,
{
    match idle_timeout {
        Some(limit) => tokio::time::timeout(limit, read_capped(reader, buf))
            .await
            .map_err(|_| {
                io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("no data from terminal for {:?}", limit),
                )
            })?,
        None => read_capped(reader, buf).await,
    }
}

async fn read_capped<R>(reader: &mut R, buf: &mut Vec<u8>) -> io::Result<LineRead>
where
    R: AsyncBufRead + Unpin,
{
    let n = (&mut *reader)
        .take(MAX_LINE_BYTES as u64)
        .read_until(b'\n', buf)
        .await?;
    if n == 0 {
        return Ok(LineRead::Eof);
    }
    // A short read without `\n` is the last line before EOF.
    if buf.last() == Some(&b'\n') || n < MAX_LINE_BYTES {
        return Ok(LineRead::Line);
    }

    buf.clear();
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            break;
        }
        let newline = available.iter().position(|&b| b == b'\n');
        let len = available.len();
        match newline {
            Some(at) => {
                reader.consume(at + 1);
                break;
            }
            None => reader.consume(len),
        }
    }
    Ok(LineRead::Oversized)
}

/// Turn one raw line into the outcome to publish, if any.
///
/// Blank lines and unhandled event types produce nothing.
pub(crate) fn classify_line(raw: &[u8], terminal_public_key: &str) -> Option<InboundOutcome> {
    let line = match std::str::from_utf8(raw) {
        Ok(line) => line.trim(),
        Err(e) => {
            warn!(error = %e, "terminal sent a line that is not UTF-8");
            return Some(InboundOutcome::Malformed(LinkError::Protocol(format!(
                "line is not UTF-8: {}",
                e
            ))));
        }
    };
    if line.is_empty() {
        return None;
    }

    let event = match codec::decode_line(line) {
        Ok(DecodedLine::Event(event)) => event,
        Ok(DecodedLine::Ignored(kind)) => {
            debug!(kind = %kind, "ignoring unhandled event type");
            return None;
        }
        Err(error) => {
            warn!(%error, "malformed line from terminal");
            return Some(InboundOutcome::Malformed(error));
        }
    };

    match signing::verify_event(&event, terminal_public_key) {
        Ok(()) => {
            info!(
                event_type = event.event_type(),
                stan_id = event.stan_id(),
                "terminal event verified"
            );
            Some(InboundOutcome::Verified(event))
        }
        Err(error) => {
            warn!(
                event_type = event.event_type(),
                stan_id = event.stan_id(),
                %error,
                "terminal event rejected"
            );
            Some(InboundOutcome::Rejected {
                event_type: event.event_type().to_string(),
                stan_id: event.stan_id().to_string(),
                error,
            })
        }
    }
}
