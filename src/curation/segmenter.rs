use std::path::{Path, PathBuf};

use log::warn;

use crate::{video::sanitize_file_stem, MediaBackend, MediaError, RawVideoFile, SegmentedClip};

/// Cuts a video into back-to-back clips of one fixed length.
#[derive(Debug, Clone, PartialEq)]
pub struct ClipSegmenter {
    clip_duration: f64,
    work_dir: PathBuf,
}

impl ClipSegmenter {
    /// Clips are written to `work_dir` until they are accepted or discarded.
    pub fn new(clip_duration: f64, work_dir: impl AsRef<Path>) -> Self {
        Self {
            clip_duration,
            work_dir: work_dir.as_ref().to_path_buf(),
        }
    }

    pub fn clip_duration(&self) -> f64 {
        self.clip_duration
    }

    /// Start offsets of every whole clip that fits in `actual_duration` seconds.
    pub fn plan(&self, actual_duration: f64) -> Vec<f64> {
        if !(self.clip_duration > 0.0 && actual_duration.is_finite()) {
            return vec![];
        }

        let num_clips = (actual_duration / self.clip_duration).floor().max(0.0) as u32;
        (0..num_clips)
            .map(|idx| f64::from(idx) * self.clip_duration)
            .collect()
    }

    pub fn clip_path(&self, video: &RawVideoFile, sequence_index: u32) -> PathBuf {
        let stem = sanitize_file_stem(&video.candidate_id);
        self.work_dir
            .join(format!("{stem}_clip{sequence_index:03}.mp4"))
    }

    /// Cut every planned clip, in order. A failed cut ends the video: the clips cut before
    /// it are returned along with the error.
    pub fn segment(
        &self,
        media: &dyn MediaBackend,
        video: &RawVideoFile,
    ) -> (Vec<SegmentedClip>, Option<MediaError>) {
        let mut clips = vec![];

        if let Err(e) = std::fs::create_dir_all(&self.work_dir) {
            let msg = format!("cannot create {}: {e}", self.work_dir.display());
            return (clips, Some(MediaError::Failed(msg)));
        }

        for (idx, start_offset) in self.plan(video.actual_duration).into_iter().enumerate() {
            let sequence_index = idx as u32;
            let file_path = self.clip_path(video, sequence_index);

            if let Err(e) = media.cut_clip(
                &video.file_path,
                &file_path,
                start_offset,
                self.clip_duration,
            ) {
                warn!(
                    target: "segmenter",
                    "{}: cutting clip {} at {:.1}s failed: {}",
                    video.candidate_id, sequence_index, start_offset, e
                );
                // don't leave a partial output behind
                let _ = std::fs::remove_file(&file_path);
                return (clips, Some(e));
            }

            clips.push(SegmentedClip {
                sequence_index,
                start_offset,
                duration: self.clip_duration,
                file_path,
            });
        }

        (clips, None)
    }
}
