use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    CollectionError(#[from] clip_collector::Error),

    #[error("Configuration error: {0}")]
    ConfigError(#[from] clip_collector::ConfigError),

    #[error("Hash store error: {0}")]
    HashStoreError(#[from] clip_collector::HashStoreError),

    #[error("Dataset error: {0}")]
    DatasetError(#[from] clip_collector::DatasetError),

    #[error("Failed to create directory {path}: {src}")]
    CreateDirError {
        src: std::io::Error,
        path: std::path::PathBuf,
    },
}

pub fn print_error_and_quit(e: eyre::Report) -> ! {
    #[allow(clippy::print_stderr)]
    let () = eprintln!("{:?}", e);
    std::process::exit(1);
}
