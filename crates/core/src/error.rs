use std::path::PathBuf;

use thiserror::Error;

/// Failures surfaced by the import pipeline. Batch-level failures are folded
/// into the run result as log lines; only setup problems propagate as values
/// of this type.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("staging path {path} is not a directory", path = .0.display())]
    InvalidInputPath(PathBuf),

    #[error("no valid files found in the staging area")]
    NoValidFiles,

    /// Reserved for file kinds without a batch handler. Unreachable while
    /// every [`crate::FileKind`] variant is handled in dispatch.
    #[error("no import handler for file kind {0}")]
    UnsupportedFileKind(String),

    #[error("failed to extract {archive}: {reason}", archive = .archive.display())]
    ExtractionFailure { archive: PathBuf, reason: String },

    #[error("ingestor configuration rejected: {0}")]
    IngestorConfiguration(String),

    #[error("ingestion failed for {input_dir}: {reason}", input_dir = .input_dir.display())]
    Ingestion { input_dir: PathBuf, reason: String },

    #[error("evidence registry error: {0}")]
    Registry(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
