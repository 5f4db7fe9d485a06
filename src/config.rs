use std::path::{Path, PathBuf};

use log::warn;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::definitions::*;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Error reading config file {path}: {src}")]
    ConfigFileIo { src: std::io::Error, path: PathBuf },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Everything a collection run needs to know, loaded from a YAML file.
///
/// Every section except `keywords` has defaults, so the smallest useful config is
/// ```yaml
/// keywords: ["city at night", "forest drone shot"]
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorCfg {
    pub target_clip_count: usize,
    pub keywords: Vec<String>,
    /// Source names, in the order they are searched. See [`crate::SourceKind`].
    pub active_scrapers: Vec<String>,
    pub paths: PathsCfg,
    pub processing: ProcessingCfg,
    pub dedup: DedupCfg,
    pub scraper: ScraperCfg,
    pub rapidapi: RapidApiCfg,
    pub local: LocalSourceCfg,
}

impl Default for CollectorCfg {
    fn default() -> Self {
        Self {
            target_clip_count: DEFAULT_TARGET_CLIP_COUNT,
            keywords: vec![],
            active_scrapers: vec!["youtube".to_string()],
            paths: PathsCfg::default(),
            processing: ProcessingCfg::default(),
            dedup: DedupCfg::default(),
            scraper: ScraperCfg::default(),
            rapidapi: RapidApiCfg::default(),
            local: LocalSourceCfg::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsCfg {
    pub raw_videos_dir: PathBuf,
    pub dataset_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub hashes_file: PathBuf,
    pub index_file: PathBuf,
    pub report_file: PathBuf,
    /// When set, the dataset directory is packed into this .tar.gz at the end of a run.
    pub archive_file: Option<PathBuf>,
}

impl Default for PathsCfg {
    fn default() -> Self {
        Self {
            raw_videos_dir: PathBuf::from("raw_videos"),
            dataset_dir: PathBuf::from("dataset"),
            logs_dir: PathBuf::from("logs"),
            hashes_file: PathBuf::from("dataset_meta/hashes.txt"),
            index_file: PathBuf::from("dataset_meta/index.jsonl"),
            report_file: PathBuf::from("dataset_meta/report.md"),
            archive_file: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingCfg {
    /// Seconds
    pub clip_duration: f64,
    /// Seconds
    pub min_clip_duration: f64,
    pub detect_watermarks: bool,
    /// 0-100
    pub watermark_threshold: u8,
    pub watermark_sample_frames: u32,
    pub retain_raw_videos: bool,
    pub video_codec: String,
    pub crf: u8,
    pub keep_audio: bool,
    pub ffmpeg_timeout_secs: u64,
}

impl Default for ProcessingCfg {
    fn default() -> Self {
        Self {
            clip_duration: DEFAULT_CLIP_DURATION,
            min_clip_duration: DEFAULT_MIN_CLIP_DURATION,
            detect_watermarks: true,
            watermark_threshold: DEFAULT_WATERMARK_THRESHOLD,
            watermark_sample_frames: DEFAULT_WATERMARK_SAMPLE_FRAMES,
            retain_raw_videos: false,
            video_codec: "libx264".to_string(),
            crf: 23,
            keep_audio: false,
            ffmpeg_timeout_secs: 600,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupCfg {
    pub hamming_threshold: u32,
}

impl Default for DedupCfg {
    fn default() -> Self {
        Self {
            hamming_threshold: DEFAULT_HAMMING_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScraperCfg {
    /// yt-dlp search prefix, e.g `ytsearch20` searches the first 20 results.
    pub search_prefix: String,
    pub download_limit_per_keyword: usize,
    /// Candidates declaring a longer duration than this (seconds) are skipped before download.
    pub max_video_duration: f64,
    pub download_timeout_secs: u64,
    /// yt-dlp format selector.
    pub video_format: String,
}

impl Default for ScraperCfg {
    fn default() -> Self {
        Self {
            search_prefix: "ytsearch20".to_string(),
            download_limit_per_keyword: 10,
            max_video_duration: 600.0,
            download_timeout_secs: 900,
            video_format: "bestvideo[height<=720][ext=mp4]+bestaudio[ext=m4a]/best[height<=720][ext=mp4]/best".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RapidApiCfg {
    pub key: String,
    pub host: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalSourceCfg {
    /// Videos for a keyword are read from `root/<keyword_tag>/`.
    pub root: PathBuf,
}

impl Default for LocalSourceCfg {
    fn default() -> Self {
        Self {
            root: PathBuf::from("local_videos"),
        }
    }
}

impl CollectorCfg {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let mut cfg: Self = serde_yaml::from_str(yaml)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|src| ConfigError::ConfigFileIo {
            src,
            path: path.to_path_buf(),
        })?;
        Self::from_yaml_str(&yaml)
    }

    /// Reject values that would make a run meaningless. Values that are merely too small
    /// to work well are raised instead.
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        use ConfigError::Invalid;

        if self.target_clip_count == 0 {
            return Err(Invalid("target_clip_count must be at least 1".to_string()));
        }

        self.keywords.retain(|k| !k.trim().is_empty());
        if self.keywords.is_empty() {
            return Err(Invalid("at least one keyword is required".to_string()));
        }

        let clip_duration = self.processing.clip_duration;
        if !(clip_duration.is_finite() && clip_duration > 0.0) {
            return Err(Invalid(format!(
                "processing.clip_duration must be positive, got {clip_duration}"
            )));
        }

        if !self.processing.min_clip_duration.is_finite() || self.processing.min_clip_duration < 0.0
        {
            return Err(Invalid(
                "processing.min_clip_duration must not be negative".to_string(),
            ));
        }

        if self.processing.watermark_threshold > 100 {
            return Err(Invalid(format!(
                "processing.watermark_threshold must be between 0 and 100, got {}",
                self.processing.watermark_threshold
            )));
        }

        if self.processing.watermark_sample_frames < MIN_WATERMARK_SAMPLE_FRAMES {
            warn!(
                target: "config",
                "watermark_sample_frames raised from {} to {}",
                self.processing.watermark_sample_frames, MIN_WATERMARK_SAMPLE_FRAMES
            );
            self.processing.watermark_sample_frames = MIN_WATERMARK_SAMPLE_FRAMES;
        }

        if self.dedup.hamming_threshold > HASH_BITS {
            return Err(Invalid(format!(
                "dedup.hamming_threshold must not exceed {HASH_BITS}"
            )));
        }

        Ok(())
    }
}
