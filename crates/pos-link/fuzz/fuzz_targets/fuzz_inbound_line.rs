//! Fuzz target for the inbound line decoder.
//!
//! Whatever the terminal (or anything else on the loopback port) writes,
//! decoding must return a value or a `Protocol` error, never panic.
//!
//! ## Running
//!
//! ```bash
//! cd crates/pos-link
//! cargo +nightly fuzz run fuzz_inbound_line
//! ```

#![no_main]

use libfuzzer_sys::fuzz_target;
use pos_link::adapters::codec::{decode_line, DecodedLine};
use pos_link::LinkError;

fuzz_target!(|data: &[u8]| {
    let Ok(line) = std::str::from_utf8(data) else {
        return;
    };

    match decode_line(line) {
        Ok(DecodedLine::Event(event)) => {
            // Template building is infallible and excludes the signature.
            let template = event.signing_template();
            assert!(template.as_str().starts_with('#'));
            assert!(template.as_str().ends_with('#'));
        }
        Ok(DecodedLine::Ignored(_)) => {}
        Err(LinkError::Protocol(_)) => {}
        Err(other) => panic!("decoder produced a non-protocol error: {:?}", other),
    }
});
