//! Turning blobs into fingerprints: archive expansion, decoding,
//! normalization and perceptual hashing.

pub mod cryptographic;
pub mod decoder;
pub mod formats;
pub mod perceptual;
pub mod resample;
pub mod timeout_utils;

pub use cryptographic::{compute_digest, ContentDigest};
pub use decoder::{decode, DecodeOptions, Decoder, PixelGrid, GRID_SIZE};
pub use formats::archive::{expand_archives, ArchiveLimits, ExpandedEntry};
pub use perceptual::{hash, Fingerprint, HashAlgorithm, FINGERPRINT_BITS};
pub use timeout_utils::TimedExecutor;

use crate::error::Result;
use crate::types::InputBlob;

/// Result of fingerprinting a single blob
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageHashResult {
    /// Perceptual hash of the normalized image
    pub perceptual: Fingerprint,
    /// Blake3 digest of the raw bytes
    pub digest: ContentDigest,
}

/// Decode a blob and compute both of its hashes
pub fn fingerprint_blob(
    decoder: &Decoder,
    blob: &InputBlob,
    algorithm: HashAlgorithm,
) -> Result<ImageHashResult> {
    let grid = decoder.decode(blob)?;
    Ok(ImageHashResult {
        perceptual: hash(&grid, algorithm),
        digest: compute_digest(&blob.bytes),
    })
}
