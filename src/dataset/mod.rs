use std::path::PathBuf;

use thiserror::Error;

mod archive;
mod index_store;
mod report;

pub use archive::archive_dataset;
pub use index_store::{DatasetIndexer, DatasetRecord, Reconciliation};
pub use report::{FailureCounts, RejectionReason, RunReport};

#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("Dataset io error at {path}: {src}")]
    DatasetIo { src: std::io::Error, path: PathBuf },

    #[error("Failed to serialize index row: {0}")]
    Serialization(String),

    #[error("Refusing to write the archive {0} inside the dataset it archives")]
    InvalidArchivePath(PathBuf),
}
