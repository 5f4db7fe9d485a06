//! Wrappers around the ffmpeg and ffprobe command line tools.
//!
//! * [`VideoInfo`] probes a file for its duration and resolution.
//! * [`FrameSamplerBuilder`] decodes a number of evenly spaced grayscale frames from a
//!   window of a video, streaming them out of ffmpeg's stdout.
//! * [`cut_segment`] re-encodes a fixed-length span of a video into a new file.
//!
//! ffmpeg and ffprobe must be installed and visible on the command line.
//! [`check_ffmpeg_tools`] reports which of them is missing.

mod ffmpeg_error_kind;
mod ffmpeg_ops;
mod ffmpeg_stats;

pub use ffmpeg_error_kind::*;
pub use ffmpeg_ops::*;
pub use ffmpeg_stats::*;
