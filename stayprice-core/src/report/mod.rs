pub mod builder;
pub mod error;
pub mod models;
pub mod retry;
pub mod store;

pub use builder::{is_successful, parse_price_amount, success_rate, ReportBuilder};
pub use error::{ReportError, ReportResult};
pub use models::{
    Availability, BatchReport, HotelReport, MultiHotelReport, ReportMetadata, SearchKey,
    SearchOutcome, SearchRecord, SingleHotelReport, Summary,
};
pub use retry::{
    failed_searches, merge_retry_results, FailedSearch, MergeStats, RetryGroup, RetryPlan,
};
pub use store::{clean_filename, load_report, report_file_name, write_report, ReportStore};
