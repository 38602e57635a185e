//! Core engine for finding duplicate photos.
//!
//! This library provides the components behind a duplicate scan:
//! - Decoding blobs (and zip archives of them) into normalized pixel grids
//! - Perceptual fingerprints compared by Hamming distance
//! - Similarity indexes answering threshold queries
//! - Union-find clustering into duplicate sets
//! - Scan sessions with progress, cancellation and per-file failures

// -- Internal Modules --
mod error;

// -- Public Re-exports --
pub use config::*;
pub use deduplication::{ClusterBuilder, ClusterKind, DuplicateCluster, FingerprintEntry};
pub use error::{Error, FailureKind, Result};
pub use index::{IndexKind, SimilarityIndex};
pub use processing::{Fingerprint, HashAlgorithm};
pub use scan::{
    ProgressEvent, ProgressStream, ScanResults, ScanService, SessionId, SessionStatus,
};
pub use types::*;

// -- Public Modules --
pub mod config;
pub mod deduplication;
pub mod discovery;
pub mod index;
pub mod logging;
pub mod processing;
pub mod scan;
pub mod types;
