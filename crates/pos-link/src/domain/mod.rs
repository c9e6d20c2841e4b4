//! # Domain Layer
//!
//! Pure protocol logic with no I/O dependencies: templates, messages,
//! signing and verification.

pub mod entities;
pub mod errors;
pub mod signing;
pub mod template;
