//! Exact content digests.
//!
//! A BLAKE3 digest of the raw blob tells byte-identical copies apart from
//! images that are only perceptually alike.

use serde::{Deserialize, Serialize};
use std::fmt;

/// BLAKE3 digest of a blob's bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentDigest(pub [u8; 32]);

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&blake3::Hash::from(self.0).to_hex())
    }
}

/// Compute the cryptographic digest of a blob using the Blake3 algorithm
pub fn compute_digest(bytes: &[u8]) -> ContentDigest {
    ContentDigest(*blake3::hash(bytes).as_bytes())
}
