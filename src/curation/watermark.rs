use image::{GrayImage, ImageBuffer, Luma};
use log::debug;

use crate::{
    definitions::{MIN_WATERMARK_SAMPLE_FRAMES, WATERMARK_FRAME_SIZE},
    FrameRequest, MediaBackend, MediaError, RawVideoFile,
};

type GrayImageU16 = ImageBuffer<Luma<u16>, Vec<u16>>;

//tweakable. Candidate regions are this fraction of the frame's width and height.
const CORNER_FRACTION: f32 = 0.2;

//Below this mean absolute deviation (in luma levels) the whole picture is considered still,
//and nothing can be said about overlays.
const MIN_SCENE_MOTION: f32 = 3.0;

//tweakable to ignore small differences (recording noise, compression noise etc)
const PIXEL_NOISE_FLOOR: f32 = 4.0;

//Sobel magnitude at which a pixel of the time-averaged frame counts as an edge.
const EDGE_MAGNITUDE: u16 = 96;

//Fraction of edge pixels in a region at which its edge score saturates. Text and logos
//easily exceed this, flat or blurred backgrounds do not.
const EDGE_DENSITY_SATURATION: f32 = 0.12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Region {
    x0: u32,
    y0: u32,
    x1: u32,
    y1: u32,
}

impl Region {
    fn area(&self) -> usize {
        ((self.x1 - self.x0) * (self.y1 - self.y0)) as usize
    }

    fn pixel_indices(self, frame_width: u32) -> impl Iterator<Item = (u32, u32, usize)> {
        (self.y0..self.y1).flat_map(move |y| {
            (self.x0..self.x1).map(move |x| (x, y, (y * frame_width + x) as usize))
        })
    }
}

// The four corners plus the centre of the bottom edge, where channel logos, platform
// handles and burned-in captions usually sit.
fn candidate_regions(width: u32, height: u32) -> [Region; 5] {
    let rw = ((width as f32 * CORNER_FRACTION) as u32).max(1);
    let rh = ((height as f32 * CORNER_FRACTION) as u32).max(1);
    let band_x0 = (width as f32 * 0.3) as u32;
    let band_x1 = ((width as f32 * 0.7) as u32).max(band_x0 + 1).min(width);

    [
        Region { x0: 0, y0: 0, x1: rw, y1: rh },
        Region { x0: width - rw, y0: 0, x1: width, y1: rh },
        Region { x0: 0, y0: height - rh, x1: rw, y1: height },
        Region { x0: width - rw, y0: height - rh, x1: width, y1: height },
        Region { x0: band_x0, y0: height - rh, x1: band_x1, y1: height },
    ]
}

/// Estimates whether a video carries a burned-in overlay such as a channel logo.
///
/// An overlay stays put while the picture behind it moves, and it is sharp. So for every
/// candidate region, the detector compares how much that region changes across the sampled
/// frames to how much the whole picture changes, and measures the density of strong edges
/// in the time-averaged frame. A region that is both still and busy with edges scores
/// high. The video's confidence is the best region score, on a scale of 0 to 100.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatermarkDetector {
    threshold: u8,
    sample_frames: u32,
}

impl WatermarkDetector {
    pub fn new(threshold: u8, sample_frames: u32) -> Self {
        Self {
            threshold,
            sample_frames: sample_frames.max(MIN_WATERMARK_SAMPLE_FRAMES),
        }
    }

    pub fn threshold(&self) -> u8 {
        self.threshold
    }

    pub fn is_rejected(&self, confidence: u8) -> bool {
        confidence >= self.threshold
    }

    /// The frames to inspect: evenly spaced over the whole video.
    pub fn frame_request(&self, video: &RawVideoFile) -> FrameRequest {
        FrameRequest {
            start: 0.0,
            span: video.actual_duration,
            count: self.sample_frames,
            width: WATERMARK_FRAME_SIZE.0,
            height: WATERMARK_FRAME_SIZE.1,
        }
    }

    /// Sample the video and return its overlay confidence.
    pub fn inspect(
        &self,
        media: &dyn MediaBackend,
        video: &RawVideoFile,
    ) -> Result<u8, MediaError> {
        let frames = media.sample_frames(&video.file_path, &self.frame_request(video))?;
        if frames.len() < MIN_WATERMARK_SAMPLE_FRAMES as usize {
            return Err(MediaError::Failed(format!(
                "only {} frames could be sampled for watermark detection",
                frames.len()
            )));
        }

        let confidence = overlay_confidence(&frames).ok_or_else(|| {
            MediaError::Failed("sampled frames have inconsistent or empty dimensions".to_string())
        })?;

        debug!(
            target: "watermark",
            "{}: overlay confidence {confidence}", video.file_path.display()
        );
        Ok(confidence)
    }
}

/// Overlay confidence (0-100) of a sequence of frames, or None if they cannot be compared.
pub(crate) fn overlay_confidence(frames: &[GrayImage]) -> Option<u8> {
    let first = frames.first()?;
    let (width, height) = first.dimensions();
    if width == 0 || height == 0 || frames.iter().any(|f| f.dimensions() != (width, height)) {
        return None;
    }

    let num_pixels = (width * height) as usize;
    let num_frames = frames.len() as f32;

    let mut mean = vec![0f32; num_pixels];
    for frame in frames {
        for (m, p) in mean.iter_mut().zip(frame.as_raw()) {
            *m += f32::from(*p);
        }
    }
    mean.iter_mut().for_each(|m| *m /= num_frames);

    let mut deviation = vec![0f32; num_pixels];
    for frame in frames {
        for ((d, m), p) in deviation.iter_mut().zip(&mean).zip(frame.as_raw()) {
            let diff = (f32::from(*p) - m).abs();
            if diff >= PIXEL_NOISE_FLOOR {
                *d += diff;
            }
        }
    }
    deviation.iter_mut().for_each(|d| *d /= num_frames);

    let global_motion = deviation.iter().sum::<f32>() / num_pixels as f32;
    if global_motion < MIN_SCENE_MOTION {
        return Some(0);
    }

    let mean_frame = GrayImage::from_raw(
        width,
        height,
        mean.iter().map(|m| m.round().clamp(0.0, 255.0) as u8).collect(),
    )?;
    let edges: GrayImageU16 = imageproc::gradients::sobel_gradients(&mean_frame);

    let best_score = candidate_regions(width, height)
        .into_iter()
        .map(|region| region_score(region, width, &deviation, &edges, global_motion))
        .fold(0f32, f32::max);

    Some((best_score * 100.0).round().clamp(0.0, 100.0) as u8)
}

fn region_score(
    region: Region,
    frame_width: u32,
    deviation: &[f32],
    edges: &GrayImageU16,
    global_motion: f32,
) -> f32 {
    let area = region.area() as f32;

    let mut motion = 0f32;
    let mut edge_pixels = 0usize;
    for (x, y, idx) in region.pixel_indices(frame_width) {
        motion += deviation[idx];
        if edges.get_pixel(x, y)[0] >= EDGE_MAGNITUDE {
            edge_pixels += 1;
        }
    }
    motion /= area;

    let staticness = (1.0 - motion / global_motion).clamp(0.0, 1.0);
    let edge_score = (edge_pixels as f32 / area / EDGE_DENSITY_SATURATION).min(1.0);

    staticness * edge_score
}
