//! # Outbound Ports (Driven Ports / SPI)
//!
//! The transport this link needs: something that opens a byte stream to the
//! terminal and hands back independent read and write halves.

use crate::config::TerminalEndpoint;
use tokio::io::{AsyncRead, AsyncWrite};

/// Read half of a terminal connection, owned by the inbound event loop.
pub type TerminalReader = Box<dyn AsyncRead + Send + Unpin>;

/// Write half of a terminal connection, shared by senders under a lock.
pub type TerminalWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Opens connections to the terminal.
///
/// Implementations apply their own socket options; they must not retry.
#[async_trait::async_trait]
pub trait TerminalConnector: Send + Sync {
    /// Open one connection.
    ///
    /// # Errors
    /// Any I/O error from the connect attempt, returned as is.
    async fn connect(
        &self,
        endpoint: &TerminalEndpoint,
    ) -> std::io::Result<(TerminalReader, TerminalWriter)>;
}
