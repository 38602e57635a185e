//! Multi-index hashing.
//!
//! The 64-bit fingerprint is cut into `segments` equal chunks and every
//! entry is filed under each of its chunk values. If two fingerprints are
//! within `d` bits, at least one chunk pair differs by no more than
//! `d / segments` bits (pigeonhole), so looking up each query chunk and its
//! neighbours within that radius finds every true match. Candidates are
//! verified with the full distance, so results are exact.

use std::collections::{HashMap, HashSet};

use log::trace;

use super::{Neighbor, SimilarityIndex};
use crate::error::{Error, Result};
use crate::processing::{Fingerprint, FINGERPRINT_BITS};
use crate::types::ImageId;

#[derive(Debug)]
pub struct BucketedIndex {
    segments: u32,
    segment_bits: u32,
    entries: Vec<(Fingerprint, ImageId)>,
    ids: HashSet<ImageId>,
    /// Per segment: chunk value -> positions in `entries`
    buckets: Vec<HashMap<u64, Vec<usize>>>,
}

impl BucketedIndex {
    /// `segments` must divide 64; `Config::validate` enforces this
    pub fn new(segments: u32) -> Self {
        let segments = segments.clamp(1, FINGERPRINT_BITS);
        debug_assert_eq!(FINGERPRINT_BITS % segments, 0);
        Self {
            segments,
            segment_bits: FINGERPRINT_BITS / segments,
            entries: Vec::new(),
            ids: HashSet::new(),
            buckets: vec![HashMap::new(); segments as usize],
        }
    }

    fn chunk(&self, fingerprint: &Fingerprint, segment: u32) -> u64 {
        let mask = if self.segment_bits == 64 {
            u64::MAX
        } else {
            (1u64 << self.segment_bits) - 1
        };
        (fingerprint.0 >> (segment * self.segment_bits)) & mask
    }

    fn scan_all(&self, fingerprint: &Fingerprint, max_distance: u32) -> Vec<Neighbor> {
        self.entries
            .iter()
            .filter_map(|(fp, id)| {
                let distance = fp.distance(fingerprint);
                (distance <= max_distance).then_some(Neighbor { id: *id, distance })
            })
            .collect()
    }
}

/// Number of values within `radius` bits of a `bits`-wide value, saturating
fn ball_size(bits: u32, radius: u32) -> u64 {
    let mut total: u64 = 0;
    let mut choose: u64 = 1;
    for k in 0..=radius.min(bits) {
        total = total.saturating_add(choose);
        choose = choose.saturating_mul((bits - k) as u64) / (k as u64 + 1);
    }
    total
}

/// All masks of `bits` width with at most `radius` bits set
fn flip_masks(bits: u32, radius: u32) -> Vec<u64> {
    fn extend(start: u32, bits: u32, left: u32, current: u64, out: &mut Vec<u64>) {
        out.push(current);
        if left == 0 {
            return;
        }
        for bit in start..bits {
            extend(bit + 1, bits, left - 1, current | (1u64 << bit), out);
        }
    }

    let mut masks = Vec::new();
    extend(0, bits, radius.min(bits), 0, &mut masks);
    masks
}

impl SimilarityIndex for BucketedIndex {
    fn insert(&mut self, fingerprint: Fingerprint, id: ImageId) -> Result<()> {
        if !self.ids.insert(id) {
            return Err(Error::IndexFault(format!("{} inserted twice", id)));
        }

        let position = self.entries.len();
        self.entries.push((fingerprint, id));
        for segment in 0..self.segments {
            let key = self.chunk(&fingerprint, segment);
            self.buckets[segment as usize]
                .entry(key)
                .or_default()
                .push(position);
        }
        Ok(())
    }

    fn neighbors(&self, fingerprint: &Fingerprint, max_distance: u32) -> Vec<Neighbor> {
        let radius = max_distance / self.segments;
        let lookups = ball_size(self.segment_bits, radius).saturating_mul(self.segments as u64);

        // Bucket lookups would cost more than looking at everything
        if lookups >= self.entries.len() as u64 {
            return self.scan_all(fingerprint, max_distance);
        }

        let masks = flip_masks(self.segment_bits, radius);
        let mut candidates = HashSet::new();
        for segment in 0..self.segments {
            let key = self.chunk(fingerprint, segment);
            let buckets = &self.buckets[segment as usize];
            for mask in &masks {
                if let Some(positions) = buckets.get(&(key ^ mask)) {
                    candidates.extend(positions.iter().copied());
                }
            }
        }
        trace!("{} candidates for {} lookups", candidates.len(), lookups);

        let mut positions: Vec<usize> = candidates.into_iter().collect();
        positions.sort_unstable();

        positions
            .into_iter()
            .filter_map(|position| {
                let (fp, id) = &self.entries[position];
                let distance = fp.distance(fingerprint);
                (distance <= max_distance).then_some(Neighbor { id: *id, distance })
            })
            .collect()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}
