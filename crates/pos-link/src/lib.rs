//! # POS Terminal Link
//!
//! Client side of the signed link between a point-of-sale app and the payment
//! terminal process listening on `127.0.0.1:2448`.
//!
//! ## Architecture
//!
//! This crate follows hexagonal architecture:
//! - **Domain Layer** (`domain/`): canonical templates, messages, signing and
//!   verification, no I/O
//! - **Ports Layer** (`ports/`): `PaymentTerminalApi` (driving) and
//!   `TerminalConnector` (driven)
//! - **Adapters Layer** (`adapters/`): TCP transport and the JSON line codec
//! - **Service Layer** (`service/`): connection lifecycle, dispatch and the
//!   inbound event loop
//!
//! ## Wire Protocol
//!
//! One JSON envelope per `\n`-terminated line. Every message carries a base64
//! ECDSA P-256/SHA-256 signature over its canonical template
//! `#field1,field2,...#`.
//!
//! ## Security Notes
//!
//! - Inbound events are only trusted once `InboundOutcome::Verified`
//! - Requests are signed before the socket is touched; a key problem never
//!   opens or closes a connection
//! - Private keys and signatures are never logged

pub mod adapters;
pub mod config;
pub mod domain;
pub mod ports;
pub mod service;

// Re-export public API
pub use adapters::TcpConnector;
pub use config::{ConfigError, LinkConfig, TerminalEndpoint, DEFAULT_HOST, DEFAULT_PORT};
pub use domain::entities::{
    ConnectionState, InboundEvent, InboundOutcome, PaymentFailed, PaymentOrder, PaymentRequest,
    PaymentSucceeded,
};
pub use domain::errors::LinkError;
pub use domain::template::CanonicalTemplate;
pub use ports::inbound::PaymentTerminalApi;
pub use ports::outbound::TerminalConnector;
pub use service::{InboundEvents, PosLinkService};

/// Service over the real TCP transport.
pub type TcpPosLink = PosLinkService<TcpConnector>;

impl TcpPosLink {
    /// Build the TCP connector from `config` and wrap it in a service.
    pub fn over_tcp(config: LinkConfig) -> Result<Self, ConfigError> {
        let connector = TcpConnector::from_config(&config);
        PosLinkService::new(config, connector)
    }
}
