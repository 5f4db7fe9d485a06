use std::{
    io::{BufRead, BufReader, Lines, Read},
    path::{Path, PathBuf},
    process::{Child, ChildStdout, Command, Stdio},
    time::Duration,
};

use ffmpeg_cmdline_utils::VideoInfo;
use log::{debug, trace, warn};
use serde::Deserialize;
use wait_timeout::ChildExt;

use super::{file_stem_for, SearchResults, SourceError, SourceProvider};
use crate::{CandidateVideo, RawVideoFile, ScraperCfg};

const SOURCE_NAME: &str = "youtube";

/// Searches and downloads through the `yt-dlp` program.
#[derive(Debug, Clone)]
pub struct YoutubeSource {
    program: PathBuf,
    search_prefix: String,
    limit_per_keyword: usize,
    max_video_duration: f64,
    download_timeout_secs: u64,
    video_format: String,
    raw_videos_dir: PathBuf,
}

// One line of `yt-dlp --flat-playlist --dump-json` output.
#[derive(Deserialize, Debug)]
struct YtEntry {
    id: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    webpage_url: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
}

impl YoutubeSource {
    pub fn new(cfg: &ScraperCfg, raw_videos_dir: impl AsRef<Path>) -> Self {
        Self {
            program: PathBuf::from("yt-dlp"),
            search_prefix: cfg.search_prefix.clone(),
            limit_per_keyword: cfg.download_limit_per_keyword,
            max_video_duration: cfg.max_video_duration,
            download_timeout_secs: cfg.download_timeout_secs,
            video_format: cfg.video_format.clone(),
            raw_videos_dir: raw_videos_dir.as_ref().to_path_buf(),
        }
    }

    /// Use a different yt-dlp executable.
    pub fn with_program(mut self, program: impl AsRef<Path>) -> Self {
        self.program = program.as_ref().to_path_buf();
        self
    }

    fn command(&self) -> Command {
        Command::new(&self.program)
    }

    fn tool_missing(&self) -> SourceError {
        SourceError::ToolMissing(format!(
            "{} is not installed or not in PATH",
            self.program.display()
        ))
    }

    /// Check that yt-dlp can be run at all.
    pub fn check_available(&self) -> Result<(), SourceError> {
        let status = self
            .command()
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|_| self.tool_missing())?;

        if status.success() {
            Ok(())
        } else {
            Err(SourceError::ToolMissing(format!(
                "{} --version exited with {status}",
                self.program.display()
            )))
        }
    }

    fn raw_path(&self, id: &str) -> PathBuf {
        self.raw_videos_dir
            .join(format!("{}.mp4", file_stem_for(SOURCE_NAME, id)))
    }

    fn run_download(&self, url: &str, dst: &Path) -> Result<(), SourceError> {
        let mut child = self
            .command()
            .arg("-f")
            .arg(&self.video_format)
            .args(["--merge-output-format", "mp4"])
            .args(["--no-playlist", "--quiet", "--no-progress", "--no-warnings"])
            .arg("-o")
            .arg(dst)
            .arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => self.tool_missing(),
                _ => SourceError::Download(format!("failed to start yt-dlp: {e}")),
            })?;

        let stderr_thread = child.stderr.take().map(|mut stderr| {
            std::thread::spawn(move || {
                let mut msg = String::new();
                let _ = stderr.read_to_string(&mut msg);
                msg
            })
        });

        let timeout = Duration::from_secs(self.download_timeout_secs);
        let status = match child.wait_timeout(timeout) {
            Ok(Some(status)) => status,
            Ok(None) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(SourceError::Download(format!(
                    "download timed out after {}s",
                    self.download_timeout_secs
                )));
            }
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(SourceError::Download(e.to_string()));
            }
        };

        let stderr = stderr_thread
            .and_then(|t| t.join().ok())
            .unwrap_or_default();

        if status.success() {
            Ok(())
        } else {
            Err(SourceError::Download(format!(
                "yt-dlp exited with {status}: {}",
                stderr.trim()
            )))
        }
    }
}

impl SourceProvider for YoutubeSource {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    fn search(&self, keyword: &str) -> Result<SearchResults<'_>, SourceError> {
        let query = format!("{}:{}", self.search_prefix, keyword);
        debug!(target: "youtube", "searching {query:?}");

        let mut child = self
            .command()
            .args(["--flat-playlist", "--dump-json", "--no-warnings"])
            .arg(&query)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => self.tool_missing(),
                _ => SourceError::Unavailable(format!("failed to start yt-dlp: {e}")),
            })?;

        let Some(stdout) = child.stdout.take() else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(SourceError::Unavailable(
                "could not read yt-dlp output".to_string(),
            ));
        };

        Ok(Box::new(YtSearchIter {
            child,
            lines: BufReader::new(stdout).lines(),
            query,
            limit: self.limit_per_keyword,
            max_duration: self.max_video_duration,
            lines_seen: 0,
            yielded: 0,
            finished: false,
        }))
    }

    fn download(&self, candidate: &CandidateVideo) -> Result<RawVideoFile, SourceError> {
        std::fs::create_dir_all(&self.raw_videos_dir).map_err(|e| {
            SourceError::Download(format!(
                "cannot create {}: {e}",
                self.raw_videos_dir.display()
            ))
        })?;

        let dst = self.raw_path(&candidate.id);
        let already_present = std::fs::metadata(&dst).is_ok_and(|m| m.len() > 0);
        if already_present {
            debug!(target: "youtube", "reusing {}", dst.display());
        } else if let Err(e) = self.run_download(&candidate.url, &dst) {
            let _ = std::fs::remove_file(&dst);
            return Err(e);
        }

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
                    Err(SourceError::Download(format!("downloaded file is unreadable: {e}")))
                }
            }
        }
    }
}

// Streams candidates out of a running yt-dlp search. The child is reaped when the stream
// ends or is dropped.
struct YtSearchIter {
    child: Child,
    lines: Lines<BufReader<ChildStdout>>,
    query: String,
    limit: usize,
    max_duration: f64,
    lines_seen: usize,
    yielded: usize,
    finished: bool,
}

impl YtSearchIter {
    fn candidate_from_line(&self, line: &str) -> Option<CandidateVideo> {
        let entry = match serde_json::from_str::<YtEntry>(line) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(target: "youtube", "{}: unparseable search result: {e}", self.query);
                return None;
            }
        };

        match entry.duration {
            Some(d) if d > 0.0 && d <= self.max_duration => (),
            duration => {
                trace!(target: "youtube", "skipping {} (duration {duration:?})", entry.id);
                return None;
            }
        }

        let url = entry
            .webpage_url
            .or(entry.url)
            .unwrap_or_else(|| format!("https://www.youtube.com/watch?v={}", entry.id));

        Some(CandidateVideo {
            id: entry.id,
            source_name: SOURCE_NAME.to_string(),
            url,
            declared_duration: entry.duration,
        })
    }

    fn finish(&mut self) -> Option<Result<CandidateVideo, SourceError>> {
        self.finished = true;
        let status = match self.child.wait() {
            Ok(status) => status,
            Err(e) => return Some(Err(SourceError::Unavailable(e.to_string()))),
        };

        // A failed search that still produced results just ends early.
        if !status.success() && self.lines_seen == 0 {
            return Some(Err(SourceError::Unavailable(format!(
                "yt-dlp search {:?} exited with {status}",
                self.query
            ))));
        }
        None
    }
}

impl Iterator for YtSearchIter {
    type Item = Result<CandidateVideo, SourceError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        if self.yielded >= self.limit {
            self.finished = true;
            let _ = self.child.kill();
            let _ = self.child.wait();
            return None;
        }

        loop {
            match self.lines.next() {
                Some(Ok(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    self.lines_seen += 1;
                    if let Some(candidate) = self.candidate_from_line(&line) {
                        self.yielded += 1;
                        return Some(Ok(candidate));
                    }
                }
                Some(Err(e)) => {
                    let _ = self.child.kill();
                    let _ = self.finish();
                    return Some(Err(SourceError::Unavailable(e.to_string())));
                }
                None => return self.finish(),
            }
        }
    }
}

impl Drop for YtSearchIter {
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}
