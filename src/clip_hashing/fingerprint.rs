use std::{fmt, str::FromStr};

use bitvec::prelude::*;
use image::{imageops::FilterType, GrayImage};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::dct_3d::Dct3d;
use crate::definitions::{DCT_SIZE, HASH_BITS, HASH_WORDS};

const HEX_LEN: usize = HASH_WORDS * 16;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FingerprintError {
    #[error("No frames to fingerprint")]
    NoFrames,

    #[error("Frame has zero width or height")]
    EmptyFrame,

    #[error("Malformed fingerprint {0:?}")]
    Malformed(String),
}

/// A perceptual hash of a clip. Visually similar clips have fingerprints that differ in
/// few bits.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Fingerprint {
    hash: [u64; HASH_WORDS],
}

impl Fingerprint {
    /// Fingerprint a clip from frames sampled evenly across it, of any (consistent or not)
    /// resolution. Each frame is averaged down to a DCT_SIZE x DCT_SIZE luminance grid.
    /// Clips that yield fewer than DCT_SIZE frames have their last frame repeated.
    pub fn from_frames(frames: &[GrayImage]) -> Result<Self, FingerprintError> {
        let last_frame = frames.last().ok_or(FingerprintError::NoFrames)?;
        if frames.iter().any(|f| f.width() == 0 || f.height() == 0) {
            return Err(FingerprintError::EmptyFrame);
        }

        let grids = frames
            .iter()
            .chain(std::iter::repeat(last_frame))
            .take(DCT_SIZE as usize)
            .map(|frame| image::imageops::resize(frame, DCT_SIZE, DCT_SIZE, FilterType::Triangle));

        let dct = Dct3d::from_images(grids).ok_or(FingerprintError::NoFrames)?;

        // Pack the raw bits of the hash into a bit vector.
        let mut bitarr: BitArray<[u64; HASH_WORDS], Lsb0> = BitArray::ZERO;
        for (mut bitarr_val, hash_bit) in bitarr.iter_mut().zip(dct.hash_bits()) {
            *bitarr_val = hash_bit;
        }

        Ok(Self {
            hash: bitarr.into_inner(),
        })
    }

    /// The number of bits that differ between two fingerprints.
    #[must_use]
    pub fn hamming_distance(&self, other: &Self) -> u32 {
        self.hash
            .iter()
            .zip(other.hash.iter())
            .map(|(x, y)| (x ^ y).count_ones())
            .sum()
    }

    /// Fixed-width lowercase hex, most significant word last.
    pub fn to_hex(&self) -> String {
        self.hash.iter().map(|word| format!("{word:016x}")).collect()
    }

    pub fn from_hex(s: &str) -> Result<Self, FingerprintError> {
        let malformed = || FingerprintError::Malformed(s.chars().take(80).collect());

        let s = s.trim();
        if s.len() != HEX_LEN || !s.is_ascii() {
            return Err(malformed());
        }

        let mut hash = [0u64; HASH_WORDS];
        for (word, chunk) in hash.iter_mut().zip(s.as_bytes().chunks(16)) {
            let chunk = std::str::from_utf8(chunk).map_err(|_| malformed())?;
            *word = u64::from_str_radix(chunk, 16).map_err(|_| malformed())?;
        }

        // bits beyond HASH_BITS are never set by hashing, so a set one means corruption.
        let bits = BitSlice::<u64, Lsb0>::from_slice(&hash);
        if bits[HASH_BITS as usize..].any() {
            return Err(malformed());
        }

        Ok(Self { hash })
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.to_hex())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for Fingerprint {
    type Err = FingerprintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl From<Fingerprint> for String {
    fn from(fingerprint: Fingerprint) -> Self {
        fingerprint.to_hex()
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = FingerprintError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::from_hex(&s)
    }
}
