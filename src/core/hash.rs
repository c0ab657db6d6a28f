// Fingerprint extraction.
//
// A fingerprint is 192 bits held in three words:
// word 0 is the DCT perceptual hash of the 32x32 raster, words 1 and 2 are
// the horizontal and vertical difference hashes of the 8x8 raster.
// Bit `r * 8 + c` of each word corresponds to cell `(r, c)`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

use super::dct::Dct;
use super::image::{COARSE_SIZE, FINE_SIZE, Raster, Rasters};

/// Side of the low-frequency block the perceptual hash reads.
const LOW_FREQ: usize = 8;
/// DC threshold for bit 0 of the perceptual hash (mid-gray).
const DC_THRESHOLD: f32 = 127.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint([u64; 3]);

impl Fingerprint {
    pub const BITS: usize = 192;

    pub const fn new(words: [u64; 3]) -> Self {
        Self(words)
    }

    pub fn from_rasters(rasters: &Rasters) -> Self {
        let (horizontal, vertical) = difference_hashes(&rasters.coarse);
        Self([perceptual_hash(&rasters.fine), horizontal, vertical])
    }

    pub fn words(&self) -> &[u64; 3] {
        &self.0
    }

    pub fn perceptual(&self) -> u64 {
        self.0[0]
    }

    pub fn horizontal(&self) -> u64 {
        self.0[1]
    }

    pub fn vertical(&self) -> u64 {
        self.0[2]
    }

    /// Bit `index` of the concatenated 192-bit code.
    pub fn bit(&self, index: usize) -> bool {
        (self.0[index / 64] >> (index % 64)) & 1 == 1
    }

    /// Copy with bit `index` inverted.
    pub fn with_bit_flipped(mut self, index: usize) -> Self {
        self.0[index / 64] ^= 1 << (index % 64);
        self
    }

    pub fn hamming_distance(&self, other: &Fingerprint) -> u32 {
        self.0
            .iter()
            .zip(&other.0)
            .map(|(a, b)| (a ^ b).count_ones())
            .sum()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x} {:016x} {:016x}", self.0[0], self.0[1], self.0[2])
    }
}

/// One successfully fingerprinted image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerprintRecord {
    pub name: String,
    pub fingerprint: Fingerprint,
}

impl FingerprintRecord {
    pub fn new(name: impl Into<String>, fingerprint: Fingerprint) -> Self {
        Self {
            name: name.into(),
            fingerprint,
        }
    }
}

fn dct32() -> &'static Dct {
    static DCT: OnceLock<Dct> = OnceLock::new();
    DCT.get_or_init(|| Dct::new(FINE_SIZE))
}

/// 64-bit DCT hash of a 32x32 raster.
///
/// Every cell of the top-left 8x8 coefficient block except `(0, 0)` is
/// compared against the mean of those 63 coefficients. Bit 0 instead records
/// whether the DC term reaches mid-gray.
pub fn perceptual_hash(raster: &Raster<FINE_SIZE>) -> u64 {
    let mut coefs: Vec<f32> = raster.iter().flatten().map(|&p| p as f32).collect();
    dct32().forward_2d(&mut coefs);
    let coef = |r: usize, c: usize| coefs[r * FINE_SIZE + c];

    let low_freq = || {
        (0..LOW_FREQ)
            .flat_map(|r| (0..LOW_FREQ).map(move |c| (r, c)))
            .filter(|&(r, c)| (r, c) != (0, 0))
    };

    let average = low_freq().map(|(r, c)| coef(r, c)).sum::<f32>() / 63.0;

    let mut hash = low_freq()
        .filter(|&(r, c)| coef(r, c) >= average)
        .fold(0u64, |acc, (r, c)| acc | 1 << (r * LOW_FREQ + c));
    if coef(0, 0) >= DC_THRESHOLD {
        hash |= 1;
    }
    hash
}

/// Horizontal and vertical 64-bit difference hashes of an 8x8 raster.
///
/// A bit is set when a pixel is brighter than its right (resp. lower)
/// neighbour; the last column and row compare against the first.
pub fn difference_hashes(raster: &Raster<COARSE_SIZE>) -> (u64, u64) {
    let n = COARSE_SIZE;
    let mut horizontal = 0u64;
    let mut vertical = 0u64;
    for r in 0..n {
        for c in 0..n {
            let bit = r * n + c;
            let pixel = raster[r][c];
            if pixel > raster[r][(c + 1) % n] {
                horizontal |= 1 << bit;
            }
            if pixel > raster[(r + 1) % n][c] {
                vertical |= 1 << bit;
            }
        }
    }
    (horizontal, vertical)
}
