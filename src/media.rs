use std::{path::Path, time::Duration};

use ffmpeg_cmdline_utils::{cut_segment, FfmpegError, FrameSamplerBuilder, SegmentEncoding};
use image::GrayImage;
use thiserror::Error;

use crate::ProcessingCfg;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MediaError {
    /// The media tooling itself is unusable. No other video will fare better.
    #[error("{0}")]
    ToolMissing(String),

    #[error("{0}")]
    Failed(String),
}

impl From<FfmpegError> for MediaError {
    fn from(e: FfmpegError) -> Self {
        if e.is_tool_missing() {
            Self::ToolMissing(e.to_string())
        } else {
            Self::Failed(e.to_string())
        }
    }
}

/// Which frames to decode from a video: `count` frames evenly spaced over
/// `start .. start + span` seconds, scaled to `width` x `height`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameRequest {
    pub start: f64,
    pub span: f64,
    pub count: u32,
    pub width: u32,
    pub height: u32,
}

/// Decoding and encoding operations the pipeline needs from a media toolkit.
pub trait MediaBackend: Send + Sync {
    /// Decode grayscale frames. May return fewer than `request.count` frames if the video
    /// ends early, but never zero.
    fn sample_frames(&self, path: &Path, request: &FrameRequest)
        -> Result<Vec<GrayImage>, MediaError>;

    /// Write `start .. start + duration` seconds of `src` to `dst`.
    fn cut_clip(&self, src: &Path, dst: &Path, start: f64, duration: f64)
        -> Result<(), MediaError>;
}

/// [`MediaBackend`] implemented by calling the ffmpeg command line tools.
#[derive(Debug, Clone)]
pub struct FfmpegMedia {
    encoding: SegmentEncoding,
    decode_timeout_secs: u64,
}

impl FfmpegMedia {
    pub fn new(encoding: SegmentEncoding, decode_timeout_secs: u64) -> Self {
        Self {
            encoding,
            decode_timeout_secs,
        }
    }

    pub fn from_cfg(cfg: &ProcessingCfg) -> Self {
        let encoding = SegmentEncoding {
            video_codec: cfg.video_codec.clone(),
            crf: cfg.crf,
            keep_audio: cfg.keep_audio,
            timeout_secs: cfg.ffmpeg_timeout_secs,
        };
        Self::new(encoding, cfg.ffmpeg_timeout_secs)
    }
}

impl MediaBackend for FfmpegMedia {
    fn sample_frames(
        &self,
        path: &Path,
        request: &FrameRequest,
    ) -> Result<Vec<GrayImage>, MediaError> {
        let frames = FrameSamplerBuilder::new(path, request.count)
            .window(
                Duration::from_secs_f64(request.start.max(0.0)),
                Duration::from_secs_f64(request.span.max(0.0)),
            )
            .scale(request.width, request.height)
            .timeout_secs(self.decode_timeout_secs)
            .spawn_gray()?
            .collect::<Vec<_>>();

        if frames.is_empty() {
            return Err(MediaError::Failed(format!(
                "ffmpeg decoded no frames from {}",
                path.display()
            )));
        }

        Ok(frames)
    }

    fn cut_clip(
        &self,
        src: &Path,
        dst: &Path,
        start: f64,
        duration: f64,
    ) -> Result<(), MediaError> {
        cut_segment(
            src,
            dst,
            Duration::from_secs_f64(start.max(0.0)),
            Duration::from_secs_f64(duration.max(0.0)),
            &self.encoding,
        )?;

        // ffmpeg exits successfully on some inputs without writing anything.
        match std::fs::metadata(dst) {
            Ok(meta) if meta.len() > 0 => Ok(()),
            _ => Err(MediaError::Failed(format!(
                "ffmpeg produced no output for {}",
                dst.display()
            ))),
        }
    }
}

#[cfg(test)]
mod test {
    use ffmpeg_cmdline_utils::FfmpegTool;

    use super::*;

    #[test]
    fn test_missing_tool_is_distinguished() {
        let missing = MediaError::from(FfmpegError::ToolNotFound(FfmpegTool::Ffmpeg));
        assert!(matches!(missing, MediaError::ToolMissing(_)));

        let internal = MediaError::from(FfmpegError::FfmpegInternal(
            FfmpegTool::Ffmpeg,
            "moov atom not found".to_string(),
        ));
        assert!(matches!(internal, MediaError::Failed(msg) if msg.contains("moov atom")));
    }

    #[test]
    fn test_encoding_follows_cfg() {
        let cfg = ProcessingCfg {
            video_codec: "libx265".to_string(),
            crf: 28,
            ..ProcessingCfg::default()
        };
        let media = FfmpegMedia::from_cfg(&cfg);
        assert_eq!(media.encoding.video_codec, "libx265");
        assert_eq!(media.encoding.crf, 28);
        assert!(!media.encoding.keep_audio);
    }
}
