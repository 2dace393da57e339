//! Content fingerprinting.
//!
//! The fingerprint is a SHA-256 over the title and body, separated by a unit
//! separator so that moving text between the two fields changes the hash.

use sha2::{Digest, Sha256};

const FIELD_SEPARATOR: u8 = 0x1f;

/// Deterministic hex fingerprint of `(title, body)`
pub fn content_fingerprint(title: &str, body: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(title.as_bytes());
    hasher.update([FIELD_SEPARATOR]);
    hasher.update(body.as_bytes());
    hex::encode(hasher.finalize())
}
