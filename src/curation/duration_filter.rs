use crate::RawVideoFile;

/// Rejects videos too short to yield a usable clip.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DurationFilter {
    min_duration: f64,
}

impl DurationFilter {
    pub fn new(min_duration: f64) -> Self {
        Self { min_duration }
    }

    pub fn accepts(&self, video: &RawVideoFile) -> bool {
        video.actual_duration >= self.min_duration
    }
}
