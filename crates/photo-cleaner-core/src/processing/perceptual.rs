//! # Perceptual Hashing Module
//!
//! Reduces a normalized [`PixelGrid`] to a 64-bit [`Fingerprint`]. Visually
//! similar images (recompressed, resized, lightly colour-corrected) land a
//! few bits apart; unrelated images sit around 32 bits apart.
//!
//! Three members of the classic hash family are offered:
//!
//! 1. pHash: DCT-based, the most robust to recompression and resizing (default)
//! 2. dHash: horizontal gradient signs, cheap and good at near-identical copies
//! 3. aHash: brightness above the mean, fastest and least discriminating
//!
//! ## Hamming Distance Interpretation
//!
//! - 0-4: Same image, possibly re-encoded or resized
//! - 5-10: Near duplicates (crops, colour changes, heavy compression)
//! - >12: Different images
//!
//! ## Determinism
//!
//! The grid itself is computed with exact area averaging. The pHash DCT runs
//! in `f64`; the median threshold only depends on the ordering of the
//! coefficients, so last-bit differences across platforms can only flip a
//! bit whose coefficient equals the median to within ~1e-9.

use std::fmt;
use std::str::FromStr;

use rustdct::{Dct2, DctPlanner};
use serde::{Deserialize, Serialize};

use super::decoder::{PixelGrid, GRID_SIZE};
use super::resample::resample_plane;
use crate::error::Error;

/// Number of bits in a fingerprint
pub const FINGERPRINT_BITS: u32 = 64;

/// Side of the low-frequency DCT block kept by pHash
const PHASH_BLOCK: usize = 8;

/// A perceptual hash represented as a 64-bit value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(pub u64);

impl Fingerprint {
    /// Calculate the Hamming distance between two fingerprints
    pub fn distance(&self, other: &Fingerprint) -> u32 {
        (self.0 ^ other.0).count_ones()
    }

    /// Check if two images are perceptually similar based on a threshold
    pub fn is_similar(&self, other: &Fingerprint, threshold: u32) -> bool {
        self.distance(other) <= threshold
    }

    /// Similarity score in [0, 1]: 1.0 for identical fingerprints
    pub fn similarity(&self, other: &Fingerprint) -> f64 {
        1.0 - self.distance(other) as f64 / FINGERPRINT_BITS as f64
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl FromStr for Fingerprint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        u64::from_str_radix(s.trim(), 16)
            .map(Fingerprint)
            .map_err(|e| Error::CorruptData(format!("invalid fingerprint '{}': {}", s, e)))
    }
}

/// Hash family used to fingerprint images
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HashAlgorithm {
    Phash,
    Dhash,
    Ahash,
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HashAlgorithm::Phash => "phash",
            HashAlgorithm::Dhash => "dhash",
            HashAlgorithm::Ahash => "ahash",
        };
        f.write_str(name)
    }
}

impl FromStr for HashAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "phash" => Ok(HashAlgorithm::Phash),
            "dhash" => Ok(HashAlgorithm::Dhash),
            "ahash" => Ok(HashAlgorithm::Ahash),
            other => Err(Error::Configuration(format!(
                "unknown hash algorithm '{}'",
                other
            ))),
        }
    }
}

/// Fingerprint a normalized grid with the chosen algorithm
pub fn hash(grid: &PixelGrid, algorithm: HashAlgorithm) -> Fingerprint {
    match algorithm {
        HashAlgorithm::Phash => phash(grid),
        HashAlgorithm::Dhash => dhash(grid),
        HashAlgorithm::Ahash => ahash(grid),
    }
}

/// DCT-based hash: signs of the low-frequency block relative to its median
pub fn phash(grid: &PixelGrid) -> Fingerprint {
    let n = GRID_SIZE;
    let mut planner = DctPlanner::<f64>::new();
    let dct = planner.plan_dct2(n);

    let mut coeffs = grid.pixels().to_vec();

    // Rows
    for row in coeffs.chunks_mut(n) {
        dct.process_dct2(row);
    }

    // Columns
    let mut column = vec![0.0f64; n];
    for x in 0..n {
        for y in 0..n {
            column[y] = coeffs[y * n + x];
        }
        dct.process_dct2(&mut column);
        for y in 0..n {
            coeffs[y * n + x] = column[y];
        }
    }

    let mut block = [0.0f64; PHASH_BLOCK * PHASH_BLOCK];
    for y in 0..PHASH_BLOCK {
        for x in 0..PHASH_BLOCK {
            block[y * PHASH_BLOCK + x] = coeffs[y * n + x];
        }
    }

    let median = median(&block);
    bits_from(&block, |v| v > median)
}

/// Gradient hash: whether each pixel is brighter than its right neighbour
pub fn dhash(grid: &PixelGrid) -> Fingerprint {
    let small = resample_plane(grid.pixels(), GRID_SIZE, GRID_SIZE, 9, 8);

    let mut hash: u64 = 0;
    for y in 0..8 {
        for x in 0..8 {
            if small[y * 9 + x] > small[y * 9 + x + 1] {
                hash |= 1u64 << (y * 8 + x);
            }
        }
    }
    Fingerprint(hash)
}

/// Average hash: whether each pixel of an 8x8 reduction is above the mean
pub fn ahash(grid: &PixelGrid) -> Fingerprint {
    let small = resample_plane(grid.pixels(), GRID_SIZE, GRID_SIZE, 8, 8);
    let mean = small.iter().sum::<f64>() / small.len() as f64;
    bits_from(&small, |v| v > mean)
}

fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Pack up to 64 predicate results, bit `i` for value `i`
fn bits_from(values: &[f64], predicate: impl Fn(f64) -> bool) -> Fingerprint {
    let hash = values
        .iter()
        .enumerate()
        .filter(|&(_, &v)| predicate(v))
        .fold(0u64, |acc, (i, _)| acc | (1u64 << i));
    Fingerprint(hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_from(f: impl Fn(usize, usize) -> f64) -> PixelGrid {
        let mut pixels = Vec::with_capacity(GRID_SIZE * GRID_SIZE);
        for y in 0..GRID_SIZE {
            for x in 0..GRID_SIZE {
                pixels.push(f(x, y));
            }
        }
        PixelGrid::from_luma(pixels).unwrap()
    }

    fn textured(x: usize, y: usize) -> f64 {
        let (fx, fy) = (x as f64, y as f64);
        128.0 + 60.0 * (fx * 0.31).sin() * (fy * 0.17).cos() + 40.0 * ((fx + 2.0 * fy) * 0.11).sin()
    }

    #[test]
    fn test_distance_and_similarity() {
        let a = Fingerprint(0b1011);
        let b = Fingerprint(0b0001);
        assert_eq!(a.distance(&b), 2);
        assert!(a.is_similar(&b, 2));
        assert!(!a.is_similar(&b, 1));
        assert_eq!(a.similarity(&a), 1.0);
        assert_eq!(Fingerprint(0).similarity(&Fingerprint(u64::MAX)), 0.0);
    }

    #[test]
    fn test_fingerprint_hex_round_trip() {
        let fp = Fingerprint(0x00ff_10aa_0000_0001);
        assert_eq!(fp.to_string(), "00ff10aa00000001");
        assert_eq!("00ff10aa00000001".parse::<Fingerprint>().unwrap(), fp);
        assert!("not hex".parse::<Fingerprint>().is_err());
    }

    #[test]
    fn test_algorithm_names() {
        for alg in [HashAlgorithm::Phash, HashAlgorithm::Dhash, HashAlgorithm::Ahash] {
            assert_eq!(alg.to_string().parse::<HashAlgorithm>().unwrap(), alg);
        }
        assert!("md5".parse::<HashAlgorithm>().is_err());
    }

    #[test]
    fn test_hash_is_deterministic() {
        let grid = grid_from(textured);
        for alg in [HashAlgorithm::Phash, HashAlgorithm::Dhash, HashAlgorithm::Ahash] {
            assert_eq!(hash(&grid, alg), hash(&grid.clone(), alg));
        }
    }

    #[test]
    fn test_phash_tolerates_brightness_shift() {
        let grid = grid_from(textured);
        let brighter = grid_from(|x, y| textured(x, y) + 12.0);
        // A uniform offset only moves the DC coefficient
        assert!(phash(&grid).distance(&phash(&brighter)) <= 1);
    }

    #[test]
    fn test_phash_separates_inverted_image() {
        let grid = grid_from(textured);
        let inverted = grid_from(|x, y| 255.0 - textured(x, y));
        assert!(phash(&grid).distance(&phash(&inverted)) > 40);
    }

    #[test]
    fn test_dhash_horizontal_ramp() {
        // Brightness falls left to right: every comparison is "brighter"
        let falling = grid_from(|x, _| 255.0 - x as f64 * 8.0);
        assert_eq!(dhash(&falling), Fingerprint(u64::MAX));

        let rising = grid_from(|x, _| x as f64 * 8.0);
        assert_eq!(dhash(&rising), Fingerprint(0));
    }

    #[test]
    fn test_ahash_half_split() {
        let grid = grid_from(|_, y| if y < GRID_SIZE / 2 { 0.0 } else { 200.0 });
        // Bottom four rows set
        assert_eq!(ahash(&grid), Fingerprint(0xffff_ffff_0000_0000));
    }
}
