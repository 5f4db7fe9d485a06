use thiserror::Error;

use crate::{ConfigError, DatasetError, HashStoreError};

/// Failures that interrupt part or all of a collection run.
///
/// Only [`Error::FatalEnvironment`], [`Error::HashStore`] and [`Error::Dataset`] end a run.
/// The others are recovered from by skipping the source, candidate or video concerned.
/// Rejections (too short, watermarked, duplicate) are outcomes rather than errors and are
/// counted in the [`crate::RunReport`] instead.
#[derive(Error, Debug)]
pub enum Error {
    /// A source could not be searched for a keyword.
    #[error("Source {source_name} unavailable for keyword {keyword:?}: {reason}")]
    SourceUnavailable {
        source_name: String,
        keyword: String,
        reason: String,
    },

    /// A single candidate could not be downloaded.
    #[error("Failed to download {candidate_id}: {reason}")]
    DownloadFailure {
        candidate_id: String,
        reason: String,
    },

    /// Frame sampling, cutting or fingerprinting failed for a downloaded video.
    #[error("Failed to process {video_id}: {reason}")]
    ProcessingFailure { video_id: String, reason: String },

    /// A required external tool is missing. Nothing further can be collected.
    #[error("{0}")]
    FatalEnvironment(String),

    #[error(transparent)]
    HashStore(#[from] HashStoreError),

    #[error(transparent)]
    Dataset(#[from] DatasetError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl Error {
    /// True for errors that must end the run rather than skip a single item.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::FatalEnvironment(_) | Self::HashStore(_) | Self::Dataset(_) | Self::Config(_)
        )
    }
}
