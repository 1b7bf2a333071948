pub mod browser;
pub mod config;
pub mod dates;
pub mod error;
pub mod hotels;
pub mod report;

pub use config::{
    load_scraper_config, RemoteEndpoint, ScraperConfig, UndeterminedPolicy, ENV_HOST,
    ENV_PASSWORD, ENV_PORT, ENV_USERNAME,
};
pub use dates::{stay_window, stay_window_from_today, DatePair};
pub use error::{ConfigError, InputError, Result};
pub use hotels::{load_hotel_names, parse_hotel_names};
pub use report::{
    failed_searches, load_report, merge_retry_results, write_report, Availability, BatchReport,
    FailedSearch, MergeStats, ReportBuilder, ReportError, ReportStore, RetryPlan, SearchOutcome,
    SearchRecord, Summary,
};
