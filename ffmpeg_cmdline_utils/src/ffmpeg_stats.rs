use std::{path::Path, time::Duration};

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::*;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VideoInfoError {
    #[error("Error parsing stats: {0}")]
    JsonError(String),
    #[error("Error parsing stats: {0}")]
    ParseIntError(String),
    #[error("Error parsing stats: {0}")]
    ParseFloatError(String),
    #[error("Unexpected video rotation: {0}")]
    UnexpectedRotation(i64),
    #[error("No video stream found")]
    NoVideoStream,
}

impl From<serde_json::Error> for VideoInfoError {
    fn from(e: serde_json::Error) -> Self {
        //limit maximum number of characters
        let error_string = format!("{e}").chars().take(500).collect::<String>();
        VideoInfoError::JsonError(error_string)
    }
}

impl From<std::num::ParseIntError> for VideoInfoError {
    fn from(e: std::num::ParseIntError) -> Self {
        VideoInfoError::ParseIntError(format!("{e}"))
    }
}

impl From<std::num::ParseFloatError> for VideoInfoError {
    fn from(e: std::num::ParseFloatError) -> Self {
        VideoInfoError::ParseFloatError(format!("{e}"))
    }
}

// The subset of `ffprobe -show_format -show_streams -print_format json` that we read.
#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    format: ProbeFormat,
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Default, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
    size: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    #[serde(default)]
    codec_type: String,
    width: Option<u32>,
    height: Option<u32>,
    duration: Option<String>,
    #[serde(default)]
    side_data_list: Vec<Value>,
}

impl ProbeStream {
    // When the metadata declares a rotation, ffmpeg autorotates decoded frames but the
    // reported (width, height) are still the unrotated ones.
    fn is_quarter_turn(&self) -> Result<bool, VideoInfoError> {
        let rotation = self
            .side_data_list
            .iter()
            .find_map(|side_data| side_data.get("rotation"))
            .map(|rotation| match rotation {
                Value::Number(val) => Ok(val.as_i64().unwrap_or(0)),
                Value::String(val) => val.trim().parse::<i64>().map_err(VideoInfoError::from),
                _ => Ok(0),
            })
            .transpose()?
            .unwrap_or(0);

        match rotation.rem_euclid(360) {
            0 | 180 => Ok(false),
            90 | 270 => Ok(true),
            _ => Err(VideoInfoError::UnexpectedRotation(rotation)),
        }
    }
}

/// Some of the video metadata that can be obtained by using ffprobe.
#[derive(PartialEq, Eq, Clone, Debug, Default)]
pub struct VideoInfo {
    duration: Duration,
    file_size: u64,
    resolution: (u32, u32),
}

impl VideoInfo {
    /// Use ffprobe to get the duration and resolution of a video. If the video contains multiple
    /// video streams then the resolution of the first one is returned.
    ///
    /// # errors
    /// * The file cannot be read or is not recognized as a video by ffprobe
    /// * The output from ffprobe could not be parsed as JSON
    /// * The file has no video stream.
    pub fn new<P>(src_path: P) -> Result<Self, FfmpegError>
    where
        P: AsRef<Path>,
    {
        let stats_string = get_video_stats(&src_path)?;
        Ok(Self::from_ffprobe_json(&stats_string)?)
    }

    /// Parse the json printed by `ffprobe -show_format -show_streams -print_format json`.
    pub fn from_ffprobe_json(stats: &str) -> Result<Self, VideoInfoError> {
        let parsed: ProbeOutput = serde_json::from_str(stats)?;

        let video = parsed
            .streams
            .iter()
            .find(|s| s.codec_type == "video")
            .ok_or(VideoInfoError::NoVideoStream)?;

        // container duration is the most reliable, but some formats only carry it per stream.
        let duration_secs = match parsed.format.duration.as_ref().or(video.duration.as_ref()) {
            Some(d) => d.trim().parse::<f64>()?.max(0.0),
            None => 0.0,
        };

        let file_size = match &parsed.format.size {
            Some(s) => s.trim().parse::<u64>()?,
            None => 0,
        };

        let (width, height) = (video.width.unwrap_or(0), video.height.unwrap_or(0));
        let resolution = if video.is_quarter_turn()? {
            (height, width)
        } else {
            (width, height)
        };

        Ok(VideoInfo {
            duration: Duration::from_secs_f64(duration_secs),
            file_size,
            resolution,
        })
    }

    /// The duration of the video
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// The size of the video in bytes
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// The resolution of the video in pixels, in the orientation the video is intended to be viewed.
    pub fn resolution(&self) -> (u32, u32) {
        self.resolution
    }
}
