/// The default number of accepted clips at which a run stops.
pub const DEFAULT_TARGET_CLIP_COUNT: usize = 100;

/// The default length of every clip in the dataset.
///
/// Unit: Seconds
pub const DEFAULT_CLIP_DURATION: f64 = 5.0;

/// Videos shorter than this are rejected before any frames are decoded.
///
/// Unit: Seconds
pub const DEFAULT_MIN_CLIP_DURATION: f64 = 3.0;

/// The default watermark confidence (0-100) at or above which a video is rejected.
/// Lower values reject more aggressively.
pub const DEFAULT_WATERMARK_THRESHOLD: u8 = 60;

/// The default number of frames sampled across a video for watermark detection.
pub const DEFAULT_WATERMARK_SAMPLE_FRAMES: u32 = 8;

/// Static regions cannot be told apart from moving ones with fewer frames than this.
pub const MIN_WATERMARK_SAMPLE_FRAMES: u32 = 3;

/// Frames sampled for watermark detection are scaled to this resolution (width, height).
pub const WATERMARK_FRAME_SIZE: (u32, u32) = (320, 180);

/// The default minimum Hamming distance between two accepted clips. Two fingerprints closer
/// than this are near-duplicates. Out of [`HASH_BITS`] bits, two unrelated clips differ in
/// roughly half.
pub const DEFAULT_HAMMING_THRESHOLD: u32 = 32;

//Number of frames (and the width/height of each frame) that the 3d DCT is performed on.
//This generates a cube of DCT_SIZE^3 coefficients, of which the HASH_SIZE^3 lowest
//frequency bins are kept.
pub const DCT_SIZE: u32 = 16;

pub const HASH_SIZE: u32 = 6;

pub const HASH_BITS: u32 = HASH_SIZE.pow(3);

//fingerprints are stored in u64 words so that their hex form does not depend on the platform.
pub const HASH_WORDS: usize = HASH_BITS.div_ceil(u64::BITS) as usize;

/// Frames sampled for fingerprinting are decoded at this size before being averaged down to
/// a DCT_SIZE x DCT_SIZE luminance grid.
pub const FINGERPRINT_FRAME_SIZE: u32 = 64;
