//! # Ports Layer
//!
//! Trait definitions for the hexagonal architecture.
//! - **Inbound (Driving)**: API that collaborators use
//! - **Outbound (Driven)**: the transport this link needs

pub mod inbound;
pub mod outbound;
