//! Grouping fingerprints into duplicate clusters.
//!
//! Clusters are the connected components of the "within threshold" graph,
//! tracked with a union-find over insertion positions. The incremental
//! [`Clusterer`] is what a scan drives one file at a time;
//! [`ClusterBuilder`] runs the same procedure over a finished batch.

mod union_find;

pub use union_find::UnionFind;

use std::collections::HashMap;

use log::debug;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::index::{LinearIndex, Neighbor, SimilarityIndex};
use crate::processing::{ContentDigest, Fingerprint, FINGERPRINT_BITS};
use crate::types::ImageId;

/// A fingerprinted image as seen by the cluster builder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FingerprintEntry {
    pub id: ImageId,
    pub fingerprint: Fingerprint,
    pub byte_size: u64,
    pub digest: Option<ContentDigest>,
}

impl FingerprintEntry {
    pub fn new(id: ImageId, fingerprint: Fingerprint, byte_size: u64) -> Self {
        Self {
            id,
            fingerprint,
            byte_size,
            digest: None,
        }
    }

    pub fn with_digest(mut self, digest: ContentDigest) -> Self {
        self.digest = Some(digest);
        self
    }
}

/// Whether a cluster holds byte-identical files or only look-alikes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClusterKind {
    Exact,
    Similar,
}

/// A set of at least two images connected under the similarity threshold
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateCluster {
    /// Member ids, ascending
    pub members: Vec<ImageId>,

    /// Member a "keep" action should default to: the largest file, the
    /// smallest id among equally large ones
    pub representative: ImageId,

    /// Largest Hamming distance between any two members
    pub max_pairwise_distance: u32,

    pub kind: ClusterKind,
}

impl DuplicateCluster {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, id: ImageId) -> bool {
        self.members.contains(&id)
    }

    /// Similarity of the least similar pair, in [0, 1]
    pub fn confidence(&self) -> f64 {
        1.0 - self.max_pairwise_distance as f64 / FINGERPRINT_BITS as f64
    }
}

/// Incremental clusterer: query, insert, then union with every match
pub struct Clusterer {
    index: Box<dyn SimilarityIndex>,
    threshold: u32,
    entries: Vec<FingerprintEntry>,
    positions: HashMap<ImageId, usize>,
    sets: UnionFind,
}

impl Clusterer {
    pub fn new(index: Box<dyn SimilarityIndex>, threshold: u32) -> Self {
        Self {
            index,
            threshold,
            entries: Vec::new(),
            positions: HashMap::new(),
            sets: UnionFind::new(),
        }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Add one fingerprint and link it to every stored match.
    ///
    /// Returns the matches found. An `IndexFault` leaves the clusterer
    /// unusable: the index and the union-find may disagree afterwards.
    pub fn add(&mut self, entry: FingerprintEntry) -> Result<Vec<Neighbor>> {
        let matches = self.index.neighbors(&entry.fingerprint, self.threshold);
        self.index.insert(entry.fingerprint, entry.id)?;

        let position = self.sets.push();
        self.entries.push(entry);
        self.positions.insert(entry.id, position);

        for neighbor in &matches {
            let other = *self.positions.get(&neighbor.id).ok_or_else(|| {
                Error::IndexFault(format!(
                    "index returned {} which was never added",
                    neighbor.id
                ))
            })?;
            self.sets.union(position, other);
        }

        if !matches.is_empty() {
            debug!("{} linked to {} earlier image(s)", entry.id, matches.len());
        }
        Ok(matches)
    }

    /// Current clusters of two or more members.
    ///
    /// Members are sorted by id and clusters by their smallest id, so the
    /// output does not depend on the order fingerprints were added in.
    pub fn clusters(&mut self) -> Vec<DuplicateCluster> {
        let entries = &self.entries;
        let mut groups: Vec<Vec<usize>> = self
            .sets
            .groups()
            .into_iter()
            .filter(|group| group.len() >= 2)
            .map(|mut group| {
                group.sort_by_key(|&p| entries[p].id);
                group
            })
            .collect();
        groups.sort_by_key(|group| entries[group[0]].id);

        groups
            .par_iter()
            .map(|group| summarize(entries, group))
            .collect()
    }
}

/// Summarize one group whose positions are sorted by id
fn summarize(entries: &[FingerprintEntry], group: &[usize]) -> DuplicateCluster {
    let members: Vec<ImageId> = group.iter().map(|&p| entries[p].id).collect();

    // Largest file wins; on a tie the smallest id, which comes first
    let mut best = group[0];
    for &p in &group[1..] {
        if entries[p].byte_size > entries[best].byte_size {
            best = p;
        }
    }

    let mut max_pairwise_distance = 0;
    for (i, &a) in group.iter().enumerate() {
        for &b in &group[i + 1..] {
            let d = entries[a].fingerprint.distance(&entries[b].fingerprint);
            max_pairwise_distance = max_pairwise_distance.max(d);
        }
    }

    let first_digest = entries[group[0]].digest;
    let exact = first_digest.is_some() && group.iter().all(|&p| entries[p].digest == first_digest);

    DuplicateCluster {
        members,
        representative: entries[best].id,
        max_pairwise_distance,
        kind: if exact {
            ClusterKind::Exact
        } else {
            ClusterKind::Similar
        },
    }
}

/// Batch clustering over a complete set of fingerprints
pub struct ClusterBuilder {
    threshold: u32,
}

impl ClusterBuilder {
    pub fn new(threshold: u32) -> Self {
        Self { threshold }
    }

    /// Cluster `entries`; the result is the same for any order of `entries`
    pub fn build(&self, entries: &[FingerprintEntry]) -> Result<Vec<DuplicateCluster>> {
        let mut clusterer = Clusterer::new(Box::new(LinearIndex::new()), self.threshold);
        for entry in entries {
            clusterer.add(*entry)?;
        }
        Ok(clusterer.clusters())
    }
}
