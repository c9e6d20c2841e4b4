//! # Adapters Module
//!
//! Infrastructure adapters: the TCP transport implementing the outbound
//! port, and the JSON line codec.

pub mod codec;
pub mod tcp;

pub use codec::{decode_line, encode_request, DecodedLine};
pub use tcp::TcpConnector;
