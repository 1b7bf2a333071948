use std::path::{Path, PathBuf};
use std::rc::Rc;

use chrono::Local;
use clap::{Args, Parser, ValueEnum};
use serde::Serialize;
use stayprice_core::browser::{
    BatchLoop, BatchPlan, BrowserError, BrowserLauncher, RemoteSessionFactory, SessionFactory,
};
use stayprice_core::report::{
    failed_searches, load_report, merge_retry_results, write_report, Availability, BatchReport,
    FailedSearch, ReportBuilder, ReportError, ReportStore, RetryPlan, SearchOutcome,
};
use stayprice_core::{
    load_hotel_names, load_scraper_config, stay_window_from_today, ConfigError, InputError,
    RemoteEndpoint, ScraperConfig,
};
use thiserror::Error;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

pub type Result<T> = std::result::Result<T, AppError>;

pub const DEFAULT_CONFIG: &str = "configs/scraper.toml";

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("hotel list error: {0}")]
    Input(#[from] InputError),
    #[error("report error: {0}")]
    Report(#[from] ReportError),
    #[error("browser error: {0}")]
    Browser(#[from] BrowserError),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Nightly hotel price scraper", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub mode: ModeArgs,
    /// Scraper configuration file; built-in defaults apply when absent
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Length of the rolling date window in days
    #[arg(long)]
    pub days: Option<u32>,
    /// Directory for new reports
    #[arg(long)]
    pub output_dir: Option<PathBuf>,
    /// Output format of the final summary
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    /// Debug-level logging
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Args, Debug, Clone)]
#[group(required = true, multiple = false)]
pub struct ModeArgs {
    /// Scrape a single hotel by name
    #[arg(long, value_name = "NAME")]
    pub hotel: Option<String>,
    /// Scrape every hotel listed in a file, one per line
    #[arg(long, value_name = "PATH")]
    pub file: Option<PathBuf>,
    /// Re-run the failed searches of an existing report
    #[arg(long, value_name = "PATH")]
    pub retry: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Mode {
    Hotel(String),
    File(PathBuf),
    Retry(PathBuf),
}

impl ModeArgs {
    pub fn mode(&self) -> Option<Mode> {
        if let Some(hotel) = &self.hotel {
            Some(Mode::Hotel(hotel.clone()))
        } else if let Some(path) = &self.file {
            Some(Mode::File(path.clone()))
        } else {
            self.retry.clone().map(Mode::Retry)
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// `RUST_LOG` wins unless `--verbose` is given.
pub fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

pub async fn run(cli: Cli) -> Result<()> {
    dotenvy::dotenv().ok();
    let mut config = load_config(cli.config.as_deref())?;
    if let Some(days) = cli.days {
        config.dates.window_days = days;
    }
    if let Some(dir) = &cli.output_dir {
        config.output.directory = dir.display().to_string();
    }

    match cli.mode.mode() {
        Some(Mode::Hotel(name)) => {
            let summary = scrape(&config, vec![name.trim().to_string()]).await?;
            render(&summary, cli.format)
        }
        Some(Mode::File(path)) => {
            let hotels = load_hotel_names(&path)?;
            let summary = scrape(&config, hotels).await?;
            render(&summary, cli.format)
        }
        Some(Mode::Retry(path)) => retry(&config, &path, cli.format).await,
        None => Ok(()),
    }
}

fn load_config(path: Option<&Path>) -> Result<ScraperConfig> {
    match path {
        Some(path) => Ok(load_scraper_config(path)?),
        None if Path::new(DEFAULT_CONFIG).exists() => Ok(load_scraper_config(DEFAULT_CONFIG)?),
        None => Ok(ScraperConfig::default()),
    }
}

fn session_factory(config: &ScraperConfig) -> Result<Rc<dyn SessionFactory>> {
    let endpoint = RemoteEndpoint::from_lookup(|key| std::env::var(key).ok())?;
    let launcher = BrowserLauncher::new(&endpoint, config)?;
    Ok(Rc::new(RemoteSessionFactory::new(launcher)))
}

/// Runs the plan until it completes or Ctrl-C arrives; the held session is
/// released either way. Returns whether the run was interrupted.
async fn execute(batch: &mut BatchLoop, plan: &BatchPlan) -> bool {
    let interrupted = tokio::select! {
        _ = batch.run(plan) => false,
        _ = interrupt() => {
            warn!("interrupted, saving what was collected so far");
            true
        }
    };
    batch.shutdown().await;
    interrupted
}

async fn interrupt() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "cannot listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

async fn scrape(config: &ScraperConfig, hotels: Vec<String>) -> Result<ScrapeSummary> {
    let dates = stay_window_from_today(config.dates.window_days);
    let plan = BatchPlan::uniform(&hotels, &dates);
    info!(
        hotels = hotels.len(),
        dates = dates.len(),
        searches = plan.total_searches(),
        "starting scrape"
    );

    let mut batch = BatchLoop::from_config(config, session_factory(config)?)?;
    let interrupted = execute(&mut batch, &plan).await;
    let outcomes = batch.take_outcomes();

    let generated_at = Local::now().naive_local();
    let mut builder = ReportBuilder::new(generated_at);
    builder.extend(&outcomes);
    let report = match builder.build() {
        Ok(report) => report,
        Err(ReportError::Empty) => {
            warn!("no searches completed, nothing to save");
            return Ok(ScrapeSummary::empty(hotels.len(), interrupted));
        }
        Err(err) => return Err(err.into()),
    };
    let store = ReportStore::new(&config.output.directory);
    let path = store.save_new(&report, generated_at).await?;
    Ok(ScrapeSummary::from_report(&report, Some(path), interrupted))
}

async fn retry(config: &ScraperConfig, path: &Path, format: OutputFormat) -> Result<()> {
    let mut report = load_report(path).await?;
    let failed = failed_searches(&report);
    let listing = FailedListing::new(path, &failed);
    render(&listing, format)?;
    if failed.is_empty() {
        return Ok(());
    }

    let plan = RetryPlan::from_failed(&failed);
    let batch_plan = BatchPlan::from_retry(&plan);
    let mut batch = BatchLoop::from_config(config, session_factory(config)?)?;
    let interrupted = execute(&mut batch, &batch_plan).await;
    let outcomes = batch.take_outcomes();

    let merged = merge_retry_results(&mut report, &outcomes, Local::now().naive_local());
    write_report(path, &report).await?;
    info!(path = %path.display(), updated = merged.updated, "report rewritten");

    let summary = RetrySummary::new(&outcomes, plan.skipped.len(), path, interrupted);
    render(&summary, format)
}

fn render<T>(value: &T, format: OutputFormat) -> Result<()>
where
    T: Serialize + DisplayFallback,
{
    match format {
        OutputFormat::Text => {
            println!("{}", value.display());
            Ok(())
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{}", json);
            Ok(())
        }
    }
}

trait DisplayFallback {
    fn display(&self) -> String;
}

#[derive(Debug, Serialize)]
pub struct HotelLine {
    pub hotel_name: String,
    pub successful: usize,
    pub total: usize,
    pub success_rate: f64,
}

#[derive(Debug, Serialize)]
pub struct ScrapeSummary {
    pub hotels_processed: usize,
    pub total_searches: usize,
    pub successful: usize,
    pub not_available: usize,
    pub errors: usize,
    pub success_rate: f64,
    pub hotels: Vec<HotelLine>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_path: Option<String>,
    pub interrupted: bool,
}

impl ScrapeSummary {
    fn empty(hotels_processed: usize, interrupted: bool) -> Self {
        Self {
            hotels_processed,
            total_searches: 0,
            successful: 0,
            not_available: 0,
            errors: 0,
            success_rate: 0.0,
            hotels: Vec::new(),
            report_path: None,
            interrupted,
        }
    }

    pub fn from_report(report: &BatchReport, path: Option<PathBuf>, interrupted: bool) -> Self {
        let summaries = match report {
            BatchReport::Single(single) => vec![(single.hotel_name.as_str(), &single.summary)],
            BatchReport::Multi(multi) => multi
                .hotels
                .iter()
                .map(|hotel| (hotel.hotel_name.as_str(), &hotel.summary))
                .collect(),
        };
        let metadata = report.metadata();
        Self {
            hotels_processed: summaries.len(),
            total_searches: metadata.total_searches,
            successful: metadata.total_successful,
            not_available: summaries.iter().map(|(_, s)| s.not_available).sum(),
            errors: summaries.iter().map(|(_, s)| s.errors).sum(),
            success_rate: metadata.overall_success_rate,
            hotels: summaries
                .iter()
                .map(|(name, summary)| HotelLine {
                    hotel_name: name.to_string(),
                    successful: summary.successful_prices,
                    total: summary.total_searches,
                    success_rate: summary.success_rate,
                })
                .collect(),
            report_path: path.map(|p| p.display().to_string()),
            interrupted,
        }
    }
}

impl DisplayFallback for ScrapeSummary {
    fn display(&self) -> String {
        let mut lines = vec![
            "Scrape summary".to_string(),
            format!("  Hotels processed: {}", self.hotels_processed),
            format!("  Total searches: {}", self.total_searches),
            format!("  Successful prices: {}", self.successful),
            format!("  Not available: {}", self.not_available),
            format!("  Errors: {}", self.errors),
            format!("  Success rate: {:.1}%", self.success_rate),
        ];
        if !self.hotels.is_empty() {
            lines.push("Per hotel:".to_string());
            for hotel in &self.hotels {
                lines.push(format!(
                    "  - {}: {}/{} ({:.1}%)",
                    hotel.hotel_name, hotel.successful, hotel.total, hotel.success_rate
                ));
            }
        }
        match &self.report_path {
            Some(path) => lines.push(format!("Report: {path}")),
            None => lines.push("Report: not written".to_string()),
        }
        if self.interrupted {
            lines.push("Run was interrupted; the report is partial".to_string());
        }
        lines.join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct FailedEntry {
    pub hotel_name: String,
    pub checkin_date: String,
    pub checkout_date: String,
    pub availability: Availability,
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct FailedListing {
    pub report_path: String,
    pub failed: Vec<FailedEntry>,
}

impl FailedListing {
    pub fn new(path: &Path, failed: &[FailedSearch]) -> Self {
        Self {
            report_path: path.display().to_string(),
            failed: failed
                .iter()
                .map(|search| FailedEntry {
                    hotel_name: search.hotel_name.clone(),
                    checkin_date: search.checkin_date.clone(),
                    checkout_date: search.checkout_date.clone(),
                    availability: search.previous_availability,
                    error: search.previous_error.clone(),
                })
                .collect(),
        }
    }
}

impl DisplayFallback for FailedListing {
    fn display(&self) -> String {
        if self.failed.is_empty() {
            return format!("No failed searches in {}", self.report_path);
        }
        let mut lines = vec![format!(
            "{} failed searches in {}:",
            self.failed.len(),
            self.report_path
        )];
        for entry in &self.failed {
            lines.push(format!(
                "  - {} | {} → {} | {} | {}",
                entry.hotel_name,
                entry.checkin_date,
                entry.checkout_date,
                entry.availability,
                entry.error.as_deref().unwrap_or("-")
            ));
        }
        lines.join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct RetrySummary {
    pub attempted: usize,
    pub successful: usize,
    pub still_failed: usize,
    pub skipped: usize,
    pub retry_success_rate: f64,
    pub report_path: String,
    pub interrupted: bool,
}

impl RetrySummary {
    pub fn new(outcomes: &[SearchOutcome], skipped: usize, path: &Path, interrupted: bool) -> Self {
        let attempted = outcomes.len();
        let successful = outcomes
            .iter()
            .filter(|outcome| outcome.price.is_some())
            .count();
        Self {
            attempted,
            successful,
            still_failed: attempted - successful,
            skipped,
            retry_success_rate: stayprice_core::report::success_rate(successful, attempted),
            report_path: path.display().to_string(),
            interrupted,
        }
    }
}

impl DisplayFallback for RetrySummary {
    fn display(&self) -> String {
        let mut lines = vec![
            "Retry summary".to_string(),
            format!("  Retried: {}", self.attempted),
            format!("  Successful: {}", self.successful),
            format!("  Still failed: {}", self.still_failed),
            format!("  Retry success rate: {:.1}%", self.retry_success_rate),
            format!("Updated report: {}", self.report_path),
        ];
        if self.skipped > 0 {
            lines.push(format!("  Skipped (unreadable dates): {}", self.skipped));
        }
        if self.interrupted {
            lines.push("Run was interrupted; unfinished searches keep their old result".to_string());
        }
        lines.join("\n")
    }
}
