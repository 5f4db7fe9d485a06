use std::{ffi::OsString, path::PathBuf};

use clap::{value_parser, ArgAction::*};

use crate::app::*;

// inputs
const CONFIG_FILE: &str = "Config file";
const TARGET: &str = "Target clip count";
const KEYWORDS: &str = "Keywords";

// pipeline
const NO_WATERMARK_CHECK: &str = "No watermark check";
const FRESH_COUNT: &str = "Fresh count";

// outputs
const ARCHIVE_FILE: &str = "Archive file";

//Verbosity
const VERBOSITY_QUIET: &str = "Quiet";
const VERBOSITY_VERBOSE: &str = "Verbose";

const DISPLAY_ORDERING: [&str; 8] = [
    //
    //inputs
    CONFIG_FILE,
    TARGET,
    KEYWORDS,
    //
    //pipeline
    NO_WATERMARK_CHECK,
    FRESH_COUNT,
    //
    //outputs
    ARCHIVE_FILE,
    //
    //verbosity
    VERBOSITY_QUIET,
    VERBOSITY_VERBOSE,
];

fn build_app() -> clap::Command {
    let get_ordering = |arg_name: &str| -> usize {
        match DISPLAY_ORDERING.iter().position(|x| *x == arg_name) {
            Some(idx) => idx,
            None => {
                panic!("argument not assigned a display order: {arg_name:?}");
            }
        }
    };

    //args are not added through method chaining because rustfmt struggles with very long expressions.
    let mut clap_app = clap::Command::new("Clip collector")
        .version(clap::crate_version!())
        .about("Collect a dataset of unique, watermark-free video clips");

    clap_app = clap_app.arg(
        clap::Arg::new(CONFIG_FILE)
            .long("config")
            .value_parser(value_parser!(PathBuf))
            .num_args(1)
            .default_value("config.yaml")
            .help("Path to the YAML configuration file")
            .display_order(get_ordering(CONFIG_FILE)),
    );

    clap_app = clap_app.arg(
        clap::Arg::new(TARGET)
            .long("target")
            .value_parser(value_parser!(usize))
            .num_args(1)
            .help("Number of clips to collect. Overrides target_clip_count from the config file")
            .display_order(get_ordering(TARGET)),
    );

    clap_app = clap_app.arg(
        clap::Arg::new(KEYWORDS)
            .long("keyword")
            .value_parser(value_parser!(String))
            .num_args(1)
            .action(Append)
            .help("A search keyword. May be given more than once. When present, replaces the keywords from the config file")
            .display_order(get_ordering(KEYWORDS)),
    );

    clap_app = clap_app.arg(
        clap::Arg::new(NO_WATERMARK_CHECK)
            .long("no-watermark-check")
            .num_args(0)
            .action(SetTrue)
            .help("Accept videos without checking them for watermarks")
            .display_order(get_ordering(NO_WATERMARK_CHECK)),
    );

    clap_app = clap_app.arg(
        clap::Arg::new(FRESH_COUNT)
            .long("fresh-count")
            .num_args(0)
            .action(SetTrue)
            .help("Collect the target number of new clips, ignoring clips already in the dataset. Existing clips are still used for deduplication")
            .display_order(get_ordering(FRESH_COUNT)),
    );

    clap_app = clap_app.arg(
        clap::Arg::new(ARCHIVE_FILE)
            .long("archive")
            .value_parser(value_parser!(PathBuf))
            .num_args(1)
            .help("Pack the dataset directory into this .tar.gz file when the run ends")
            .display_order(get_ordering(ARCHIVE_FILE)),
    );

    clap_app = clap_app.arg(
        clap::Arg::new(VERBOSITY_QUIET)
            .long("quiet")
            .conflicts_with(VERBOSITY_VERBOSE)
            .num_args(0)
            .action(SetTrue)
            .help("Only print warnings and errors")
            .display_order(get_ordering(VERBOSITY_QUIET)),
    );

    clap_app = clap_app.arg(
        clap::Arg::new(VERBOSITY_VERBOSE)
            .long("verbose")
            .num_args(0)
            .action(SetTrue)
            .help("Print progress for every video and clip, and the causes of a fatal error")
            .display_order(get_ordering(VERBOSITY_VERBOSE)),
    );

    clap_app
}

pub fn parse_args() -> AppCfg {
    parse_args_from(std::env::args_os())
}

fn parse_args_from<I, T>(itr: I) -> AppCfg
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let args = build_app().get_matches_from(itr);

    let verbosity = if args.get_flag(VERBOSITY_QUIET) {
        ReportVerbosity::Quiet
    } else if args.get_flag(VERBOSITY_VERBOSE) {
        ReportVerbosity::Verbose
    } else {
        ReportVerbosity::Default
    };

    let keywords = match args.get_many::<String>(KEYWORDS) {
        Some(keywords) => keywords.cloned().collect(),
        None => vec![],
    };

    AppCfg {
        config_path: args
            .get_one::<PathBuf>(CONFIG_FILE)
            .cloned()
            .unwrap_or_else(|| PathBuf::from("config.yaml")),
        target_clip_count: args.get_one::<usize>(TARGET).copied(),
        keywords,
        no_watermark_check: args.get_flag(NO_WATERMARK_CHECK),
        fresh_count: args.get_flag(FRESH_COUNT),
        archive_file: args.get_one::<PathBuf>(ARCHIVE_FILE).cloned(),
        verbosity,
    }
}
