use std::fmt;

mod collection_controller;
mod run_state;

pub use collection_controller::{CollectionController, PipelineStages};
pub use run_state::RunState;

/// Where the controller is in the pipeline. `Done` and `Exhausted` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControllerState {
    Searching,
    Downloading,
    Filtering,
    Segmenting,
    Deduping,
    Indexing,
    Done,
    Exhausted,
}

impl ControllerState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Exhausted)
    }
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Searching => "SEARCHING",
            Self::Downloading => "DOWNLOADING",
            Self::Filtering => "FILTERING",
            Self::Segmenting => "SEGMENTING",
            Self::Deduping => "DEDUPING",
            Self::Indexing => "INDEXING",
            Self::Done => "DONE",
            Self::Exhausted => "EXHAUSTED",
        };
        f.write_str(name)
    }
}

/// How a run that did not fail ended. Both are successful.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunOutcome {
    /// The target count was reached.
    Done,
    /// Every keyword of every source ran out of candidates first.
    Exhausted,
}

impl From<RunOutcome> for ControllerState {
    fn from(outcome: RunOutcome) -> Self {
        match outcome {
            RunOutcome::Done => Self::Done,
            RunOutcome::Exhausted => Self::Exhausted,
        }
    }
}
