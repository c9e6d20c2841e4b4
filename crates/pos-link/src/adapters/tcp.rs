//! # TCP Terminal Connector
//!
//! Opens the loopback TCP connection to the terminal process and splits it
//! into owned halves. Keep-alive and `TCP_NODELAY` follow [`LinkConfig`];
//! no socket read timeout is set here (the inbound loop owns that policy).

use crate::config::{LinkConfig, TerminalEndpoint};
use crate::ports::outbound::{TerminalConnector, TerminalReader, TerminalWriter};
use std::io;
use std::net::SocketAddr;
use tokio::net::{lookup_host, TcpSocket, TcpStream};
use tracing::debug;

/// Real TCP transport.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    keep_alive: bool,
    nodelay: bool,
}

impl TcpConnector {
    /// Create with explicit socket options.
    pub fn new(keep_alive: bool, nodelay: bool) -> Self {
        Self {
            keep_alive,
            nodelay,
        }
    }

    /// Create with the socket options from `config`.
    pub fn from_config(config: &LinkConfig) -> Self {
        Self::new(config.keep_alive, config.nodelay)
    }

    async fn connect_addr(&self, addr: SocketAddr) -> io::Result<TcpStream> {
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.set_keepalive(self.keep_alive)?;

        let stream = socket.connect(addr).await?;
        stream.set_nodelay(self.nodelay)?;
        Ok(stream)
    }
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self::from_config(&LinkConfig::default())
    }
}

#[async_trait::async_trait]
impl TerminalConnector for TcpConnector {
    async fn connect(
        &self,
        endpoint: &TerminalEndpoint,
    ) -> io::Result<(TerminalReader, TerminalWriter)> {
        let mut last_error = None;

        for addr in lookup_host((endpoint.host.as_str(), endpoint.port)).await? {
            match self.connect_addr(addr).await {
                Ok(stream) => {
                    debug!(%addr, keep_alive = self.keep_alive, "TCP connection established");
                    let (reader, writer) = stream.into_split();
                    return Ok((Box::new(reader), Box::new(writer)));
                }
                Err(e) => {
                    debug!(%addr, error = %e, "TCP connect attempt failed");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                format!("{} resolved to no addresses", endpoint),
            )
        }))
    }
}
