mod automation;
mod batch_loop;
mod driver;
mod error;
mod error_handler;
mod metrics;
mod retry;
mod searcher;
mod selectors;
mod session;

pub use automation::{BrowserLauncher, RemoteBrowserSession, RemoteSessionFactory};
pub use batch_loop::{BatchConfig, BatchLoop, BatchPlan, BatchStats, HotelJob};
pub use driver::{dismiss_interstitial, set_text, ElementRef, PageDriver, SessionFactory};
pub use error::{BrowserError, BrowserResult};
pub use error_handler::{BrowserErrorCategory, ErrorCategorizer};
pub use metrics::SessionMetrics;
pub use retry::{RetryExhausted, RetryOutcome, RetryPolicy};
pub use searcher::{
    match_autocomplete, AvailabilityVerdict, HotelSearcher, MatchKind, SearchSettings, SearchStep,
};
pub use selectors::{PriceExtractor, PriceRule, PriceSource, PriceStrategy};
pub use session::{SessionManager, SessionSettings, SessionState};
