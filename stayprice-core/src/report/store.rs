use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use chrono::NaiveDateTime;
use regex::Regex;
use tokio::fs;
use tracing::info;

use super::error::{ReportError, ReportResult};
use super::models::BatchReport;

fn strip_regex() -> &'static Regex {
    static STRIP: OnceLock<Regex> = OnceLock::new();
    STRIP.get_or_init(|| Regex::new(r"[^\w\s-]").expect("valid regex"))
}

fn separator_regex() -> &'static Regex {
    static SEPARATORS: OnceLock<Regex> = OnceLock::new();
    SEPARATORS.get_or_init(|| Regex::new(r"[-\s]+").expect("valid regex"))
}

/// Lowercase, filesystem-safe form of a hotel name.
pub fn clean_filename(text: &str) -> String {
    let stripped = strip_regex().replace_all(text.trim(), "");
    separator_regex()
        .replace_all(&stripped, "_")
        .to_lowercase()
}

pub fn report_file_name(hotel_name: Option<&str>, at: NaiveDateTime) -> String {
    let stamp = at.format("%Y%m%d_%H%M%S");
    match hotel_name {
        Some(name) => format!("{}_{stamp}.json", clean_filename(name)),
        None => format!("hotel_prices_{stamp}.json"),
    }
}

/// Writes new reports into the output directory.
#[derive(Debug, Clone)]
pub struct ReportStore {
    directory: PathBuf,
}

impl ReportStore {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub async fn save_new(&self, report: &BatchReport, at: NaiveDateTime) -> ReportResult<PathBuf> {
        fs::create_dir_all(&self.directory)
            .await
            .map_err(|source| ReportError::Io {
                source,
                path: self.directory.clone(),
            })?;
        let hotel_name = match report {
            BatchReport::Single(single) => Some(single.hotel_name.as_str()),
            BatchReport::Multi(_) => None,
        };
        let path = self.directory.join(report_file_name(hotel_name, at));
        write_report(&path, report).await?;
        info!(path = %path.display(), searches = report.total_searches(), "report saved");
        Ok(path)
    }
}

pub async fn load_report(path: impl AsRef<Path>) -> ReportResult<BatchReport> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .await
        .map_err(|source| ReportError::Io {
            source,
            path: path.to_path_buf(),
        })?;
    let value: serde_json::Value = serde_json::from_str(&content)?;
    BatchReport::from_value(value)
}

/// Pretty-prints the report, replacing `path` only once the full document is on disk.
pub async fn write_report(path: impl AsRef<Path>, report: &BatchReport) -> ReportResult<()> {
    let path = path.as_ref();
    let json = serde_json::to_string_pretty(report)?;
    let staging = path.with_extension("json.tmp");
    let io_err = |source, path: &Path| ReportError::Io {
        source,
        path: path.to_path_buf(),
    };
    fs::write(&staging, json)
        .await
        .map_err(|source| io_err(source, &staging))?;
    fs::rename(&staging, path)
        .await
        .map_err(|source| io_err(source, path))?;
    Ok(())
}
