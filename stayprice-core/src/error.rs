use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io { source: io::Error, path: PathBuf },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        source: toml::de::Error,
        path: PathBuf,
    },
    #[error("missing required variable {0}")]
    MissingVariable(String),
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: String, reason: String },
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum InputError {
    #[error("failed to read hotel list {path}: {source}")]
    Io { source: io::Error, path: PathBuf },
    #[error("hotel list {path} contains no hotel names")]
    Empty { path: PathBuf },
}
