//! # Canonical Signing Template
//!
//! The exact byte sequence both sides sign and verify: the ordered fields
//! joined by `,` and wrapped in `#`, e.g. `#2000,<stan_id>,id=1#`.
//!
//! Fields are not escaped. A field containing `,` or `#` still yields the
//! same bytes on both sides, so signatures validate, but the template can no
//! longer be split back into its fields unambiguously.

use std::fmt;

const SENTINEL: char = '#';
const SEPARATOR: char = ',';

/// Immutable canonical template built from an ordered field list.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CanonicalTemplate(String);

impl CanonicalTemplate {
    /// Build `#f1,f2,...,fn#` from `fields`, in order.
    pub fn build<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut template = String::new();
        template.push(SENTINEL);
        for (i, field) in fields.into_iter().enumerate() {
            if i > 0 {
                template.push(SEPARATOR);
            }
            template.push_str(field.as_ref());
        }
        template.push(SENTINEL);
        Self(template)
    }

    /// UTF-8 bytes fed to the signature engine.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// Template text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CanonicalTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
