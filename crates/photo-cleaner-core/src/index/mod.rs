//! Similarity indexes over fingerprints.
//!
//! Both implementations answer the same question, "which stored ids are
//! within `max_distance` bits of this fingerprint", with identical results.
//! [`LinearIndex`] compares against every entry and is the right choice up
//! to a few thousand images. [`BucketedIndex`] partitions fingerprints into
//! segment buckets so a query only verifies candidates that share a nearby
//! segment with it.

mod bucketed;
mod linear;

pub use bucketed::BucketedIndex;
pub use linear::LinearIndex;

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::Result;
use crate::processing::Fingerprint;
use crate::types::ImageId;

/// Which index implementation backs a scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexKind {
    Linear,
    Bucketed,
}

impl std::str::FromStr for IndexKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "linear" => Ok(IndexKind::Linear),
            "bucketed" => Ok(IndexKind::Bucketed),
            other => Err(crate::Error::Configuration(format!(
                "unknown index kind '{}'",
                other
            ))),
        }
    }
}

/// A stored id found by a query, with its distance from the query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Neighbor {
    pub id: ImageId,
    pub distance: u32,
}

/// Fingerprint store supporting incremental inserts and threshold queries
pub trait SimilarityIndex: Send {
    /// Store a fingerprint. Inserting an id twice is an `IndexFault`.
    fn insert(&mut self, fingerprint: Fingerprint, id: ImageId) -> Result<()>;

    /// All stored entries within `max_distance`, in insertion order
    fn neighbors(&self, fingerprint: &Fingerprint, max_distance: u32) -> Vec<Neighbor>;

    /// Number of stored entries
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ids of all stored entries within `max_distance`, in insertion order
    fn query_within_threshold(&self, fingerprint: &Fingerprint, max_distance: u32) -> Vec<ImageId> {
        self.neighbors(fingerprint, max_distance)
            .into_iter()
            .map(|n| n.id)
            .collect()
    }
}

/// Build the index selected by the configuration
pub fn build_index(config: &Config) -> Box<dyn SimilarityIndex> {
    match config.index_kind {
        IndexKind::Linear => Box::new(LinearIndex::new()),
        IndexKind::Bucketed => Box::new(BucketedIndex::new(config.index_segments)),
    }
}
