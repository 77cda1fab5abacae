//! Error types for the ingestion stage

use std::path::PathBuf;
use thiserror::Error;

/// Failures raised while loading enrolment sources.
///
/// `NoSourcesLoaded` is fatal for a run. The other variants are reported per
/// source and cause only that source to be skipped.
#[derive(Debug, Error)]
pub enum IngestionError {
    #[error("no input source could be loaded ({attempted} attempted)")]
    NoSourcesLoaded { attempted: usize },

    #[error("source {} not found (also searched the fallback directory)", path.display())]
    SourceNotFound { path: PathBuf },

    #[error("source {} is missing required column '{column}'", path.display())]
    MissingColumn { path: PathBuf, column: String },
}
