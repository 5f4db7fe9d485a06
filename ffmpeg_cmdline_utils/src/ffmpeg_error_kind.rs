use thiserror::Error;

use crate::*;

/// Various causes of failure for ffmpeg/ffprobe functions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FfmpegError {
    /// The command was not found. Make sure ffmpeg is installed and can be found on the command line.
    #[error("{0} not found. Make sure it is installed and visible on the command line")]
    ToolNotFound(FfmpegTool),

    /// Io error occurred while executing the command
    #[error("{0} IO error: {1}")]
    Io(FfmpegTool, String),

    /// The command returned a nonzero exit code. Because ffmpeg sometimes prints long error strings
    /// to stderr, the resulting string contains the first few hundred characters of the error message.
    #[error("Internal {0} failure: {1}")]
    FfmpegInternal(FfmpegTool, String),

    /// The command did not finish within the allotted time and was killed.
    #[error("{0} did not finish within {1} seconds")]
    TimedOut(FfmpegTool, u64),

    /// Failed to interpret ffprobe output as a utf8-string.
    #[error("utf8 parsing/conversion failure")]
    Utf8Conversion,

    /// Either the X or Y dimension of the decoded frames was zero.
    /// Note: This sometimes occurs when attempting to decode frames from an audio file.
    #[error("Video has an invalid resolution")]
    InvalidResolution,

    /// Failed to obtain video information.
    #[error("Failed to get video properties: {0}")]
    Info(#[from] VideoInfoError),
}

impl FfmpegError {
    /// True when the failure was caused by ffmpeg/ffprobe being absent rather than by the
    /// file being processed.
    pub fn is_tool_missing(&self) -> bool {
        matches!(self, Self::ToolNotFound(_))
    }
}
