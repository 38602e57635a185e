use std::collections::HashSet;

use super::{Neighbor, SimilarityIndex};
use crate::error::{Error, Result};
use crate::processing::Fingerprint;
use crate::types::ImageId;

/// Naive index: every query scans every entry
#[derive(Debug, Default)]
pub struct LinearIndex {
    entries: Vec<(Fingerprint, ImageId)>,
    ids: HashSet<ImageId>,
}

impl LinearIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SimilarityIndex for LinearIndex {
    fn insert(&mut self, fingerprint: Fingerprint, id: ImageId) -> Result<()> {
        if !self.ids.insert(id) {
            return Err(Error::IndexFault(format!("{} inserted twice", id)));
        }
        self.entries.push((fingerprint, id));
        Ok(())
    }

    fn neighbors(&self, fingerprint: &Fingerprint, max_distance: u32) -> Vec<Neighbor> {
        self.entries
            .iter()
            .filter_map(|(fp, id)| {
                let distance = fp.distance(fingerprint);
                (distance <= max_distance).then_some(Neighbor { id: *id, distance })
            })
            .collect()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}
