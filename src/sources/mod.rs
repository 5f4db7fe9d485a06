use std::{fmt, str::FromStr};

use log::warn;
use thiserror::Error;

use crate::{video::sanitize_file_stem, CandidateVideo, CollectorCfg, RawVideoFile};

mod local_dir;
mod tiktok;
mod youtube;

pub use local_dir::LocalDirSource;
pub use tiktok::TikTokSource;
pub use youtube::YoutubeSource;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// The source cannot be searched right now (network, API key, quota...).
    #[error("{0}")]
    Unavailable(String),

    /// One candidate could not be fetched.
    #[error("{0}")]
    Download(String),

    /// A program the source depends on is not installed.
    #[error("{0}")]
    ToolMissing(String),
}

/// Lazily produced search results. Errors part-way through end the stream for that keyword.
pub type SearchResults<'a> = Box<dyn Iterator<Item = Result<CandidateVideo, SourceError>> + 'a>;

/// A platform that videos can be searched for and downloaded from.
pub trait SourceProvider {
    /// Short, stable name. Used in file names and in the dataset index.
    fn name(&self) -> &str;

    /// Start a search. Results are finite and are produced as they are consumed; a search
    /// cannot be restarted.
    fn search(&self, keyword: &str) -> Result<SearchResults<'_>, SourceError>;

    /// Fetch a candidate's media into a file owned by the caller.
    fn download(&self, candidate: &CandidateVideo) -> Result<RawVideoFile, SourceError>;
}

/// The sources that can be named in `active_scrapers`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    Youtube,
    TikTok,
    Local,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Youtube => "youtube",
            Self::TikTok => "tiktok",
            Self::Local => "local",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "youtube" => Ok(Self::Youtube),
            "tiktok" => Ok(Self::TikTok),
            "local" => Ok(Self::Local),
            other => Err(format!("unknown source {other:?}")),
        }
    }
}

/// Instantiate every source named in `active_scrapers`, in order. Unknown names are
/// skipped. Fails if a source's required program is missing.
pub fn build_sources(cfg: &CollectorCfg) -> Result<Vec<Box<dyn SourceProvider>>, SourceError> {
    let mut sources: Vec<Box<dyn SourceProvider>> = vec![];

    for name in &cfg.active_scrapers {
        let kind = match name.parse::<SourceKind>() {
            Ok(kind) => kind,
            Err(e) => {
                warn!(target: "sources", "{e}. Skipping.");
                continue;
            }
        };

        if sources.iter().any(|s| s.name() == kind.as_str()) {
            warn!(target: "sources", "source {kind} listed twice. Skipping.");
            continue;
        }

        let source: Box<dyn SourceProvider> = match kind {
            SourceKind::Youtube => {
                let youtube = YoutubeSource::new(&cfg.scraper, &cfg.paths.raw_videos_dir);
                youtube.check_available()?;
                Box::new(youtube)
            }
            SourceKind::TikTok => Box::new(TikTokSource::new(
                &cfg.rapidapi,
                &cfg.scraper,
                &cfg.paths.raw_videos_dir,
            )),
            SourceKind::Local => Box::new(LocalDirSource::new(
                &cfg.local.root,
                &cfg.paths.raw_videos_dir,
                cfg.scraper.download_limit_per_keyword,
            )),
        };
        sources.push(source);
    }

    Ok(sources)
}

// shared by the sources that name downloaded files after a platform id.
fn file_stem_for(source_name: &str, id: &str) -> String {
    format!("{source_name}_{}", sanitize_file_stem(id))
}
