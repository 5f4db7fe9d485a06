use std::path::PathBuf;

use clip_collector::CollectorCfg;

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ReportVerbosity {
    Quiet,
    Default,
    Verbose,
}

/// Command line settings. Everything except `config_path` and `verbosity` overrides a
/// value from the config file.
#[derive(Debug, Clone, PartialEq)]
pub struct AppCfg {
    pub config_path: PathBuf,
    pub target_clip_count: Option<usize>,
    /// When non-empty, replaces the keyword list entirely.
    pub keywords: Vec<String>,
    pub no_watermark_check: bool,
    /// Count toward the target from zero rather than from the clips already collected.
    pub fresh_count: bool,
    pub archive_file: Option<PathBuf>,
    pub verbosity: ReportVerbosity,
}

impl AppCfg {
    pub fn apply_overrides(&self, collector_cfg: &mut CollectorCfg) {
        if let Some(target) = self.target_clip_count {
            collector_cfg.target_clip_count = target;
        }

        if !self.keywords.is_empty() {
            collector_cfg.keywords = self.keywords.clone();
        }

        if self.no_watermark_check {
            collector_cfg.processing.detect_watermarks = false;
        }

        if let Some(archive_file) = &self.archive_file {
            collector_cfg.paths.archive_file = Some(archive_file.clone());
        }
    }
}
