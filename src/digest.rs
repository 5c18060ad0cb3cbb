//! SHA-256 digest over ordered secret inputs
//!
//! Inputs are hashed straight from their byte buffers and zeroized in place
//! afterwards. This only covers the buffers handed to [`digest`]: a copy made
//! earlier (a `clone()`, a reallocation while the string was being built, a
//! value still held by the caller elsewhere) stays in memory until it is
//! overwritten by the allocator. Callers that care should build secrets in a
//! single buffer and hand that buffer over.

use sha2::{Digest, Sha256};
use zeroize::Zeroize;

/// Length of every digest in hex characters
pub const DIGEST_HEX_LEN: usize = 64;

/// Hash `parts` in order and return lowercase hex. Every part is zeroized
/// before returning.
pub fn digest(parts: &mut [String]) -> String {
    let mut hasher = Sha256::new();
    for part in parts.iter() {
        hasher.update(part.as_bytes());
    }
    let result = hex::encode(hasher.finalize());

    for part in parts.iter_mut() {
        part.zeroize();
    }

    result
}

/// Hash byte slices in order without taking ownership of them
pub fn digest_bytes(parts: &[&[u8]]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hex::encode(hasher.finalize())
}
