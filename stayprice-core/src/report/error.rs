use std::path::PathBuf;

use thiserror::Error;

pub type ReportResult<T> = Result<T, ReportError>;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("io error on {path}: {source}")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("report has neither a `hotel_name` nor a `hotels` key")]
    UnknownShape,
    #[error("report contains no searches")]
    Empty,
    #[error("unknown availability value: {0}")]
    UnknownAvailability(String),
}
