#![allow(clippy::let_and_return)]
#![allow(clippy::len_without_is_empty)]
#![warn(clippy::cast_lossless)]
#![warn(clippy::print_stdout)]
#![warn(clippy::print_stderr)]
#![warn(clippy::todo)]
#![warn(clippy::dbg_macro)]
#![warn(clippy::unimplemented)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::panic)]
#![allow(clippy::doc_markdown)]

//! # Overview
//! `clip_collector` builds a dataset of short, unique, watermark-free video clips. Given a
//! list of keywords and a target number of clips, it searches video platforms, downloads
//! candidates, and cuts them into fixed-length clips until the target is reached or every
//! source has run dry.
//!
//! # Pipeline
//! Each candidate video passes through the same stages, in order:
//!
//! 1. **Download** via a [`SourceProvider`] (yt-dlp, a RapidAPI feed, or a local directory).
//! 2. **Duration filter**: videos shorter than the minimum clip length are dropped.
//! 3. **Watermark gate**: a handful of frames are sampled and the corners and bottom band
//!    of the picture are checked for static, high-contrast overlays.
//! 4. **Segmentation** into back-to-back clips of exactly `clip_duration` seconds.
//! 5. **Deduplication**: every clip is fingerprinted with a 3D DCT perceptual hash and
//!    rejected if it lies within a Hamming distance threshold of any clip already
//!    collected, including clips collected by earlier runs.
//! 6. **Indexing**: the clip is moved into the dataset directory and a row is appended to
//!    the index.
//!
//! The [`CollectionController`] only checks the stop condition between videos, so the
//! final count may overshoot the target by the size of one video's batch.
//!
//! # Prerequisites
//! ffmpeg and ffprobe must be installed and visible on the command line. The youtube
//! source additionally requires yt-dlp.
//!
//! # Resuming
//! The hash store, the index and the dataset directory are all append-only during a run
//! and reconciled at startup, so an interrupted run can simply be restarted.

mod clip_hashing;
mod config;
mod controller;
mod curation;
mod dataset;
mod definitions;
mod error;
mod media;
mod sources;
mod video;

pub use clip_hashing::{
    DedupVerdict, FileHashStore, Fingerprint, FingerprintError, HashStore, HashStoreError,
    PerceptualHashIndex,
};
pub use config::*;
pub use controller::{
    CollectionController, ControllerState, PipelineStages, RunOutcome, RunState,
};
pub use curation::{ClipSegmenter, DurationFilter, WatermarkDetector};
pub use dataset::{
    archive_dataset, DatasetError, DatasetIndexer, DatasetRecord, FailureCounts, Reconciliation,
    RejectionReason, RunReport,
};
pub use definitions::*;
pub use error::Error;
pub use media::{FfmpegMedia, FrameRequest, MediaBackend, MediaError};
pub use sources::{
    build_sources, LocalDirSource, SearchResults, SourceError, SourceKind, SourceProvider,
    TikTokSource, YoutubeSource,
};
pub use video::{keyword_tag, CandidateVideo, Clip, RawVideoFile, SegmentedClip};
