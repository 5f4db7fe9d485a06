use image::{GenericImageView, Luma};
use ndarray::{prelude::*, s};

use super::raw_dct_ops::dct_3d;
use crate::definitions::{DCT_SIZE, HASH_SIZE};

/// Frequency-domain view of DCT_SIZE stacked DCT_SIZE x DCT_SIZE luminance grids,
/// indexed `[frame, y, x]`.
pub struct Dct3d(Array3<f64>);

const DCT_PATT: [usize; 3] = [DCT_SIZE as usize, DCT_SIZE as usize, DCT_SIZE as usize];
const HASH_PATT: [usize; 3] = [HASH_SIZE as usize, HASH_SIZE as usize, HASH_SIZE as usize];

impl Dct3d {
    /// Returns None unless exactly DCT_SIZE frames of DCT_SIZE x DCT_SIZE are supplied
    /// (extra frames are ignored).
    pub fn from_images<I, V>(src_frames: I) -> Option<Self>
    where
        I: IntoIterator<Item = V>,
        V: GenericImageView<Pixel = Luma<u8>>,
    {
        let mut frames_matrix = Array3::<f64>::zeros(DCT_PATT);

        let mut frame_counter = 0;
        for (frame_idx, frame) in src_frames.into_iter().enumerate().take(DCT_SIZE as usize) {
            if frame.dimensions() != (DCT_SIZE, DCT_SIZE) {
                return None;
            }

            for (x, y, pix) in frame.pixels() {
                frames_matrix[[frame_idx, y as usize, x as usize]] = pix.to_centered_f64();
            }
            frame_counter += 1;
        }

        (frame_counter == DCT_SIZE).then(|| Self(dct_3d(&frames_matrix)))
    }

    /// The signs of the lowest HASH_SIZE^3 frequency bins, in row-major order.
    pub fn hash_bits(&self) -> impl Iterator<Item = bool> + '_ {
        self.0
            .slice(s![..HASH_PATT[0], ..HASH_PATT[1], ..HASH_PATT[2]])
            .into_iter()
            .map(|x| *x > 0.0)
    }
}

trait LumaPixExt {
    fn to_centered_f64(&self) -> f64;
}

impl LumaPixExt for Luma<u8> {
    fn to_centered_f64(&self) -> f64 {
        let Self([luma]) = self;
        f64::from(*luma) - 128.0
    }
}
