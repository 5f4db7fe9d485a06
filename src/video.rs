use std::path::PathBuf;

use crate::Fingerprint;

/// A video returned by a search, not yet downloaded.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateVideo {
    pub id: String,
    pub source_name: String,
    pub url: String,
    /// Seconds, as advertised by the source. Not every source knows it before download.
    pub declared_duration: Option<f64>,
}

/// A downloaded video. The file belongs to whoever holds this value and is deleted once
/// the video has been processed.
#[derive(Debug, Clone, PartialEq)]
pub struct RawVideoFile {
    pub candidate_id: String,
    pub file_path: PathBuf,
    /// Seconds, as measured from the file itself.
    pub actual_duration: f64,
}

/// A clip that has been cut from a raw video but not yet fingerprinted or accepted.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentedClip {
    pub sequence_index: u32,
    /// Seconds
    pub start_offset: f64,
    /// Seconds
    pub duration: f64,
    pub file_path: PathBuf,
}

/// An accepted clip.
#[derive(Debug, Clone, PartialEq)]
pub struct Clip {
    pub source_video_id: String,
    pub keyword: String,
    pub sequence_index: u32,
    pub start_offset: f64,
    pub duration: f64,
    pub file_path: PathBuf,
    pub fingerprint: Fingerprint,
}

/// A keyword in a form usable as a single directory or file name component.
pub fn keyword_tag(keyword: &str) -> String {
    keyword
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .replace(['/', '\\'], "-")
}

/// An id with everything but ASCII alphanumerics, `-` and `_` replaced, for use in file names.
pub(crate) fn sanitize_file_stem(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
