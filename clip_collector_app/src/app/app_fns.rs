use std::{error::Error, fs::OpenOptions, path::Path};

use clip_collector::{
    archive_dataset, build_sources, CollectionController, CollectorCfg, DatasetIndexer,
    FfmpegMedia, FileHashStore, PerceptualHashIndex, PipelineStages, RejectionReason,
    RunReport, SourceError,
};
use eyre::WrapErr;
use itertools::Itertools;

use crate::app::*;

pub fn run_app() -> i32 {
    let cfg = arg_parse::parse_args();

    //logging is configured from the collector config, so config errors can only go to stderr.
    let collector_cfg = match load_collector_cfg(&cfg) {
        Ok(collector_cfg) => collector_cfg,
        Err(e) => print_error_and_quit(e),
    };

    if let Err(e) = configure_logs(cfg.verbosity, &collector_cfg.paths.logs_dir) {
        print_error_and_quit(e);
    }

    match run_app_inner(&cfg, &collector_cfg) {
        Ok(report) => {
            print_summary(&report);
            0
        }
        Err(fatal_error) => {
            print_fatal_err(fatal_error, cfg.verbosity);
            1
        }
    }
}

fn load_collector_cfg(cfg: &AppCfg) -> eyre::Result<CollectorCfg> {
    let mut collector_cfg = CollectorCfg::from_yaml_file(&cfg.config_path)
        .map_err(AppError::from)
        .wrap_err_with(|| format!("Failed to load {}", cfg.config_path.display()))?;

    //overrides are validated again, e.g --target 0 is no more meaningful than target_clip_count: 0
    cfg.apply_overrides(&mut collector_cfg);
    collector_cfg.validate().map_err(AppError::from)?;

    Ok(collector_cfg)
}

fn run_app_inner(cfg: &AppCfg, collector_cfg: &CollectorCfg) -> eyre::Result<RunReport> {
    ffmpeg_cmdline_utils::check_ffmpeg_tools().map_err(|e| {
        AppError::from(clip_collector::Error::FatalEnvironment(e.to_string()))
    })?;

    let sources = build_sources(collector_cfg).map_err(source_err)?;
    if sources.is_empty() {
        return Err(eyre::Report::msg(format!(
            "None of the configured sources are usable: {:?}",
            collector_cfg.active_scrapers
        )));
    }
    info!(
        target: "app",
        "Collecting {} clips for {} keywords from: {}",
        collector_cfg.target_clip_count,
        collector_cfg.keywords.len(),
        sources.iter().map(|s| s.name()).join(", ")
    );

    let paths = &collector_cfg.paths;
    create_dir(&paths.raw_videos_dir)?;

    let hash_store = FileHashStore::new(&paths.hashes_file);
    let index = PerceptualHashIndex::load(Box::new(hash_store), collector_cfg.dedup.hamming_threshold)
        .map_err(AppError::from)?;
    let indexer = DatasetIndexer::open(&paths.dataset_dir, &paths.index_file).map_err(AppError::from)?;

    let reconciliation = indexer.reconciliation();
    if reconciliation.dropped_rows > 0 || reconciliation.deleted_orphans > 0 {
        warn!(
            target: "app",
            "Reconciled dataset: dropped {} index rows with missing clips, deleted {} unindexed clips",
            reconciliation.dropped_rows, reconciliation.deleted_orphans
        );
    }

    let media = FfmpegMedia::from_cfg(&collector_cfg.processing);
    let stages = PipelineStages::from_cfg(collector_cfg, Box::new(media));

    let mut controller = CollectionController::new(
        collector_cfg.keywords.clone(),
        collector_cfg.target_clip_count,
        stages,
        index,
        indexer,
    );
    if cfg.fresh_count {
        controller = controller.with_seeded_count(0);
    }

    let run_result = controller.run(&sources);

    //write whatever was collected, even when the run was cut short.
    let report = match &run_result {
        Ok(report) => report.clone(),
        Err(_) => controller.report().clone(),
    };
    if let Err(e) = report.write_markdown(&paths.report_file) {
        warn!(target: "app", "Failed to write report: {e}");
    }

    run_result.map_err(AppError::from)?;

    if let Some(archive_file) = &paths.archive_file {
        info!(target: "app", "Archiving {} to {}", paths.dataset_dir.display(), archive_file.display());
        archive_dataset(&paths.dataset_dir, archive_file).map_err(AppError::from)?;
    }

    if !collector_cfg.processing.retain_raw_videos {
        remove_if_empty(&paths.raw_videos_dir);
    }

    Ok(report)
}

fn source_err(e: SourceError) -> AppError {
    let msg = e.to_string();
    match e {
        SourceError::ToolMissing(_) => clip_collector::Error::FatalEnvironment(msg).into(),
        SourceError::Unavailable(_) | SourceError::Download(_) => {
            clip_collector::Error::FatalEnvironment(format!("Failed to set up source: {msg}"))
                .into()
        }
    }
}

fn create_dir(path: &Path) -> Result<(), AppError> {
    std::fs::create_dir_all(path).map_err(|src| AppError::CreateDirError {
        src,
        path: path.to_path_buf(),
    })
}

// Removes the segmenter's scratch directory, then the raw video directory itself. Either
// removal fails harmlessly if a file was left behind.
fn remove_if_empty(raw_videos_dir: &Path) {
    let _ = std::fs::remove_dir(raw_videos_dir.join("clips"));
    match std::fs::remove_dir(raw_videos_dir) {
        Ok(()) => debug!(target: "app", "Removed {}", raw_videos_dir.display()),
        Err(e) => debug!(target: "app", "Keeping {}: {e}", raw_videos_dir.display()),
    }
}

fn print_summary(report: &RunReport) {
    let outcome = match report.outcome {
        Some(outcome) => clip_collector::ControllerState::from(outcome).to_string(),
        None => "incomplete".to_string(),
    };

    info!(
        target: "app",
        "{}: {} clips in dataset ({} new), target {}",
        outcome,
        report.accepted_total(),
        report.accepted_this_run,
        report.target_count
    );

    if report.shortfall() > 0 {
        warn!(target: "app", "Fell {} clips short of the target", report.shortfall());
    }

    let rejections = RejectionReason::ALL
        .iter()
        .map(|reason| format!("{} {}", report.rejections(*reason), reason.label()))
        .join(", ");
    info!(target: "app", "Rejected: {rejections}");
}

fn print_fatal_err(fatal_err: eyre::Report, verbosity: ReportVerbosity) {
    error!(target: "app-errorlog", "{}", fatal_err);

    if verbosity == ReportVerbosity::Verbose {
        let mut source: Option<&(dyn Error + 'static)> = fatal_err.source();
        while let Some(e) = source {
            error!(target: "app-errorlog", "    caused by: {}", e);
            source = e.source();
        }
    }
}

pub fn configure_logs(verbosity: ReportVerbosity, logs_dir: &Path) -> eyre::Result<()> {
    use simplelog::*;

    let min_loglevel = match verbosity {
        ReportVerbosity::Quiet => LevelFilter::Warn,
        ReportVerbosity::Default => LevelFilter::Info,
        ReportVerbosity::Verbose => LevelFilter::Trace,
    };

    //the log file always gets at least the info messages, whatever the terminal shows.
    let file_loglevel = min_loglevel.max(LevelFilter::Info);

    create_dir(logs_dir)?;
    let log_path = logs_dir.join("run.log");
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .wrap_err_with(|| format!("Failed to open log file {}", log_path.display()))?;

    let term_cfg = ConfigBuilder::new().build();
    let mut file_cfg = ConfigBuilder::new();
    file_cfg.set_target_level(LevelFilter::Error);
    file_cfg.set_time_format_rfc3339();

    CombinedLogger::init(vec![
        TermLogger::new(
            min_loglevel,
            term_cfg,
            TerminalMode::Stderr,
            ColorChoice::Auto,
        ),
        WriteLogger::new(file_loglevel, file_cfg.build(), log_file),
    ])
    .wrap_err("Failed to initialize logging")?;

    Ok(())
}
