use std::path::{Path, PathBuf};

use ffmpeg_cmdline_utils::VideoInfo;
use log::{debug, warn};
use walkdir::WalkDir;

use super::{file_stem_for, SearchResults, SourceError, SourceProvider};
use crate::{keyword_tag, CandidateVideo, RawVideoFile};

const SOURCE_NAME: &str = "local";
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mkv", "webm", "mov", "avi", "m4v"];

/// Treats a directory of already-downloaded videos as a source. Videos for a keyword are
/// read from `<root>/<keyword tag>/`, in file name order.
#[derive(Debug, Clone)]
pub struct LocalDirSource {
    root: PathBuf,
    raw_videos_dir: PathBuf,
    limit_per_keyword: usize,
}

impl LocalDirSource {
    pub fn new(
        root: impl AsRef<Path>,
        raw_videos_dir: impl AsRef<Path>,
        limit_per_keyword: usize,
    ) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            raw_videos_dir: raw_videos_dir.as_ref().to_path_buf(),
            limit_per_keyword,
        }
    }

    pub fn keyword_dir(&self, keyword: &str) -> PathBuf {
        self.root.join(keyword_tag(keyword))
    }
}

fn is_video_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| VIDEO_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

impl SourceProvider for LocalDirSource {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    fn search(&self, keyword: &str) -> Result<SearchResults<'_>, SourceError> {
        let dir = self.keyword_dir(keyword);
        if !dir.is_dir() {
            return Err(SourceError::Unavailable(format!(
                "{} is not a directory",
                dir.display()
            )));
        }

        let walk = WalkDir::new(&dir).sort_by_file_name().into_iter();
        let candidates = walk
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!(target: "local_source", "{e}");
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file() && is_video_file(entry.path()))
            .map(move |entry| {
                let path = entry.into_path();
                let id = path
                    .strip_prefix(&dir)
                    .unwrap_or(path.as_path())
                    .to_string_lossy()
                    .replace(['/', '\\'], "_");

                Ok(CandidateVideo {
                    id,
                    source_name: SOURCE_NAME.to_string(),
                    url: path.to_string_lossy().into_owned(),
                    declared_duration: None,
                })
            })
            .take(self.limit_per_keyword);

        Ok(Box::new(candidates))
    }

    fn download(&self, candidate: &CandidateVideo) -> Result<RawVideoFile, SourceError> {
        let src = Path::new(&candidate.url);
        let ext = src
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("mp4")
            .to_ascii_lowercase();

        std::fs::create_dir_all(&self.raw_videos_dir).map_err(|e| {
            SourceError::Download(format!(
                "cannot create {}: {e}",
                self.raw_videos_dir.display()
            ))
        })?;

        let dst = self
            .raw_videos_dir
            .join(format!("{}.{ext}", file_stem_for(SOURCE_NAME, &candidate.id)));

        debug!(target: "local_source", "copying {} to {}", src.display(), dst.display());
        std::fs::copy(src, &dst)
            .map_err(|e| SourceError::Download(format!("cannot copy {}: {e}", src.display())))?;

        match VideoInfo::new(&dst) {
            Ok(info) => Ok(RawVideoFile {
                candidate_id: candidate.id.clone(),
                file_path: dst,
                actual_duration: info.duration().as_secs_f64(),
            }),
            Err(e) => {
                let _ = std::fs::remove_file(&dst);
                if e.is_tool_missing() {
                    Err(SourceError::ToolMissing(e.to_string()))
                } else {
                    Err(SourceError::Download(format!("{} is unreadable: {e}", src.display())))
                }
            }
        }
    }
}
