//! Content addressing.

use std::fmt::Write;

use sha2::{Digest, Sha256};

/// SHA-256 of the module body, lowercase hex.
///
/// The hash is computed over the raw source text, so any byte change
/// (including whitespace) invalidates a client's cached copy.
#[must_use]
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let digest = hasher.finalize();

    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(out, "{byte:02x}");
    }
    out
}
