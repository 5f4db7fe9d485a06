use std::{collections::BTreeMap, fmt, path::Path};

use itertools::Itertools;

use super::DatasetError;
use crate::RunOutcome;

/// Why a video or clip was turned away. These are outcomes, not failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RejectionReason {
    /// The video was shorter than the minimum clip length. Counted per video.
    Duration,
    /// The video carried an overlay. Counted per video.
    Watermark,
    /// The clip was a near-duplicate of a collected clip. Counted per clip.
    Duplicate,
}

impl RejectionReason {
    pub const ALL: [Self; 3] = [Self::Duration, Self::Watermark, Self::Duplicate];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Duration => "too short",
            Self::Watermark => "watermarked",
            Self::Duplicate => "duplicate",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FailureCounts {
    /// (source, keyword) pairs that could not be searched.
    pub source_unavailable: usize,
    pub download: usize,
    pub processing: usize,
}

/// Summary of one collection run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    /// None until the run has finished.
    pub outcome: Option<RunOutcome>,
    pub target_count: usize,
    /// Clips in the dataset at the start of the run.
    pub seeded_count: usize,
    pub accepted_this_run: usize,
    /// Clips accepted this run, per keyword.
    pub per_keyword: BTreeMap<String, usize>,
    pub rejections: BTreeMap<RejectionReason, usize>,
    pub failures: FailureCounts,
    pub videos_downloaded: usize,
    /// Seconds
    pub clip_duration: f64,
}

impl RunReport {
    pub fn new(target_count: usize, seeded_count: usize, clip_duration: f64) -> Self {
        Self {
            outcome: None,
            target_count,
            seeded_count,
            accepted_this_run: 0,
            per_keyword: BTreeMap::new(),
            rejections: BTreeMap::new(),
            failures: FailureCounts::default(),
            videos_downloaded: 0,
            clip_duration,
        }
    }

    pub fn accepted_total(&self) -> usize {
        self.seeded_count + self.accepted_this_run
    }

    /// How many clips short of the target the dataset is. Zero once the target is met.
    pub fn shortfall(&self) -> usize {
        self.target_count.saturating_sub(self.accepted_total())
    }

    pub fn record_accepted(&mut self, keyword: &str) {
        self.accepted_this_run += 1;
        *self.per_keyword.entry(keyword.to_string()).or_default() += 1;
    }

    pub fn record_rejection(&mut self, reason: RejectionReason) {
        *self.rejections.entry(reason).or_default() += 1;
    }

    pub fn rejections(&self, reason: RejectionReason) -> usize {
        self.rejections.get(&reason).copied().unwrap_or(0)
    }

    pub fn to_markdown(&self) -> String {
        self.to_string()
    }

    pub fn write_markdown(&self, path: impl AsRef<Path>) -> Result<(), DatasetError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|src| DatasetError::DatasetIo {
                src,
                path: parent.to_path_buf(),
            })?;
        }
        std::fs::write(path, self.to_markdown()).map_err(|src| DatasetError::DatasetIo {
            src,
            path: path.to_path_buf(),
        })
    }
}

/// Renders the run report as markdown.
impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let outcome = match self.outcome {
            Some(RunOutcome::Done) => "DONE (target reached)",
            Some(RunOutcome::Exhausted) => "EXHAUSTED (every source and keyword tried)",
            None => "incomplete",
        };

        writeln!(f, "# Clip collection report\n")?;
        writeln!(f, "- Outcome: {outcome}")?;
        writeln!(f, "- Target: {} clips", self.target_count)?;
        writeln!(
            f,
            "- Collected: {} clips ({} this run, {} before)",
            self.accepted_total(),
            self.accepted_this_run,
            self.seeded_count
        )?;
        writeln!(
            f,
            "- Footage: {:.1} s in {:.1} s clips",
            self.accepted_total() as f64 * self.clip_duration,
            self.clip_duration
        )?;
        if self.shortfall() > 0 {
            writeln!(f, "- Shortfall: {} clips", self.shortfall())?;
        }
        writeln!(f, "- Videos downloaded: {}", self.videos_downloaded)?;

        writeln!(f, "\n## Accepted this run\n")?;
        if self.per_keyword.is_empty() {
            writeln!(f, "None")?;
        } else {
            let rows = self
                .per_keyword
                .iter()
                .map(|(keyword, count)| format!("| {keyword} | {count} |"))
                .join("\n");
            writeln!(f, "| Keyword | Clips |\n|---|---|\n{rows}")?;
        }

        writeln!(f, "\n## Rejections\n")?;
        let rows = RejectionReason::ALL
            .iter()
            .map(|reason| format!("| {} | {} |", reason.label(), self.rejections(*reason)))
            .join("\n");
        writeln!(f, "| Reason | Count |\n|---|---|\n{rows}")?;

        writeln!(f, "\n## Failures\n")?;
        writeln!(
            f,
            "| Kind | Count |\n|---|---|\n| source unavailable | {} |\n| download | {} |\n| processing | {} |",
            self.failures.source_unavailable, self.failures.download, self.failures.processing
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_counts_and_shortfall() {
        let mut report = RunReport::new(10, 3, 5.0);
        report.record_accepted("rain");
        report.record_accepted("rain");
        report.record_accepted("desert");
        report.record_rejection(RejectionReason::Duplicate);
        report.record_rejection(RejectionReason::Duplicate);
        report.record_rejection(RejectionReason::Watermark);

        assert_eq!(report.accepted_total(), 6);
        assert_eq!(report.shortfall(), 4);
        assert_eq!(report.rejections(RejectionReason::Duplicate), 2);
        assert_eq!(report.rejections(RejectionReason::Duration), 0);
        assert_eq!(report.per_keyword["rain"], 2);

        report.accepted_this_run = 20;
        assert_eq!(report.shortfall(), 0);
    }

    #[test]
    fn test_markdown() {
        let mut report = RunReport::new(4, 0, 5.0);
        report.outcome = Some(RunOutcome::Exhausted);
        report.record_accepted("city at night");
        report.record_rejection(RejectionReason::Duration);
        report.failures.download = 2;

        let md = report.to_markdown();
        assert!(md.contains("- Outcome: EXHAUSTED"));
        assert!(md.contains("- Shortfall: 3 clips"));
        assert!(md.contains("| city at night | 1 |"));
        assert!(md.contains("| too short | 1 |"));
        assert!(md.contains("| duplicate | 0 |"));
        assert!(md.contains("| download | 2 |"));
        assert!(md.contains("| processing | 0 |"));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meta").join("report.md");
        report.write_markdown(&path).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), md);
    }
}
