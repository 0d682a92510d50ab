//! Storage key codec.
//!
//! Keys are path-like strings joining report-id, run-id and artifact name.
//! Two separator characters exist in the wild: `/` (current) and `.`
//! (written by old deployments). Only `/` is ever written; both are
//! recognized when splitting, including mixed within one key.

use crate::config::{LEGACY_KEY_SEPARATOR, WRITE_KEY_SEPARATOR};

/// Join key components with the canonical write separator.
///
/// Components must not themselves contain a separator; that is the
/// caller's responsibility (no escaping is performed).
pub fn join_key<I, S>(parts: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = String::new();
    for part in parts {
        if !out.is_empty() {
            out.push(WRITE_KEY_SEPARATOR);
        }
        out.push_str(part.as_ref());
    }
    out
}

/// Split a key on either historical separator.
pub fn split_key(key: &str) -> Vec<&str> {
    key.split([WRITE_KEY_SEPARATOR, LEGACY_KEY_SEPARATOR])
        .collect()
}
