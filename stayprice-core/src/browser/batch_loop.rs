use std::rc::Rc;
use std::time::Duration;

use rand::Rng;
use serde::Serialize;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::config::{PacingSection, ScraperConfig};
use crate::dates::DatePair;
use crate::error::ConfigError;
use crate::report::{Availability, RetryPlan, SearchOutcome};

use super::driver::SessionFactory;
use super::error_handler::ErrorCategorizer;
use super::metrics::SessionMetrics;
use super::retry::RetryPolicy;
use super::searcher::HotelSearcher;
use super::session::{SessionManager, SessionSettings};

#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub search_delay: Duration,
    pub hotel_delay: Duration,
    pub jitter_ms: u64,
}

impl BatchConfig {
    pub fn from_config(pacing: &PacingSection) -> Self {
        Self {
            search_delay: Duration::from_secs(pacing.search_delay_seconds),
            hotel_delay: Duration::from_secs(pacing.hotel_delay_seconds),
            jitter_ms: pacing.jitter_ms,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HotelJob {
    pub hotel_name: String,
    pub dates: Vec<DatePair>,
}

/// Hotels in run order, each with the stays to search.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchPlan {
    pub jobs: Vec<HotelJob>,
}

impl BatchPlan {
    /// Every hotel against the same date window.
    pub fn uniform(hotels: &[String], dates: &[DatePair]) -> Self {
        Self {
            jobs: hotels
                .iter()
                .map(|hotel| HotelJob {
                    hotel_name: hotel.clone(),
                    dates: dates.to_vec(),
                })
                .collect(),
        }
    }

    pub fn from_retry(plan: &RetryPlan) -> Self {
        Self {
            jobs: plan
                .groups
                .iter()
                .map(|group| HotelJob {
                    hotel_name: group.hotel_name.clone(),
                    dates: group.dates.clone(),
                })
                .collect(),
        }
    }

    pub fn total_searches(&self) -> usize {
        self.jobs.iter().map(|job| job.dates.len()).sum()
    }
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct BatchStats {
    pub hotels_processed: usize,
    pub searches_planned: usize,
    pub outcomes_recorded: usize,
    pub connection_retries: usize,
    pub session_errors: usize,
    pub total_wait_ms: u64,
    pub duration_secs: u64,
    pub sessions: SessionMetrics,
}

enum UnitResult {
    Done(SearchOutcome),
    SessionUnavailable(String),
}

/// Walks hotels then dates, one session at a time, collecting outcomes.
pub struct BatchLoop {
    sessions: SessionManager,
    searcher: HotelSearcher,
    config: BatchConfig,
    pacer: Pacer,
    outcomes: Vec<SearchOutcome>,
    stats: BatchStats,
}

impl BatchLoop {
    pub fn new(sessions: SessionManager, searcher: HotelSearcher, config: BatchConfig) -> Self {
        let pacer = Pacer::new(config.jitter_ms);
        Self {
            sessions,
            searcher,
            config,
            pacer,
            outcomes: Vec::new(),
            stats: BatchStats::default(),
        }
    }

    pub fn from_config(
        config: &ScraperConfig,
        factory: Rc<dyn SessionFactory>,
    ) -> Result<Self, ConfigError> {
        let sessions = SessionManager::new(
            factory,
            RetryPolicy::from_config(&config.session),
            ErrorCategorizer::from_config(&config.session),
            SessionSettings::from_config(config)?,
        );
        Ok(Self::new(
            sessions,
            HotelSearcher::from_config(config),
            BatchConfig::from_config(&config.pacing),
        ))
    }

    pub fn outcomes(&self) -> &[SearchOutcome] {
        &self.outcomes
    }

    /// Outcomes collected so far, including those of an interrupted run.
    pub fn take_outcomes(&mut self) -> Vec<SearchOutcome> {
        std::mem::take(&mut self.outcomes)
    }

    pub fn stats(&self) -> &BatchStats {
        &self.stats
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Runs every job of the plan. Failures are recorded as outcomes; the
    /// loop itself never fails.
    pub async fn run(&mut self, plan: &BatchPlan) -> BatchStats {
        let start = Instant::now();
        self.stats.searches_planned += plan.total_searches();
        info!(
            hotels = plan.jobs.len(),
            searches = plan.total_searches(),
            "batch started"
        );

        for (idx, job) in plan.jobs.iter().enumerate() {
            if idx > 0 {
                let waited = self.pacer.wait(self.config.hotel_delay).await;
                self.stats.total_wait_ms += waited;
                debug!(delay_ms = waited, hotel = %job.hotel_name, "pausing before next hotel");
            }
            self.run_hotel(job).await;
            self.stats.hotels_processed += 1;
        }

        self.stats.duration_secs += start.elapsed().as_secs();
        self.stats.sessions = self.sessions.metrics().clone();
        info!(
            hotels = self.stats.hotels_processed,
            outcomes = self.stats.outcomes_recorded,
            session_errors = self.stats.session_errors,
            connection_retries = self.stats.connection_retries,
            duration = self.stats.duration_secs,
            "batch finished"
        );
        self.stats.clone()
    }

    /// Releases whatever session is still held, e.g. after an interrupted run.
    pub async fn shutdown(&mut self) {
        self.sessions.release().await;
        self.stats.sessions = self.sessions.metrics().clone();
    }

    async fn run_hotel(&mut self, job: &HotelJob) {
        info!(hotel = %job.hotel_name, dates = job.dates.len(), "processing hotel");
        for (idx, dates) in job.dates.iter().enumerate() {
            if idx > 0 {
                let waited = self.pacer.wait(self.config.search_delay).await;
                self.stats.total_wait_ms += waited;
            }
            match self.run_unit(&job.hotel_name, *dates).await {
                UnitResult::Done(outcome) => self.record(outcome),
                UnitResult::SessionUnavailable(message) => {
                    warn!(
                        hotel = %job.hotel_name,
                        remaining = job.dates.len() - idx,
                        error = %message,
                        "no browser session, skipping remaining dates"
                    );
                    for remaining in &job.dates[idx..] {
                        self.stats.session_errors += 1;
                        self.record(SearchOutcome::failed(
                            &job.hotel_name,
                            *remaining,
                            Availability::SessionError,
                            format!("Session creation failed: {message}"),
                        ));
                    }
                    break;
                }
            }
        }
        self.sessions.release().await;
    }

    /// One (hotel, stay) search with a single retry on a fresh session after
    /// a lost connection.
    async fn run_unit(&mut self, hotel: &str, dates: DatePair) -> UnitResult {
        let mut retried = false;
        loop {
            if let Err(err) = self.sessions.ensure_ready().await {
                return UnitResult::SessionUnavailable(err.to_string());
            }
            let Some(driver) = self.sessions.driver() else {
                return UnitResult::SessionUnavailable("session not ready".to_string());
            };
            let result = self.searcher.search(driver, hotel, dates).await;
            self.sessions.record_search();

            let err = match result {
                Ok(outcome) => return UnitResult::Done(outcome),
                Err(err) => err,
            };
            if !self.sessions.categorizer().is_connection_loss(&err) {
                warn!(hotel, checkin = %dates.checkin, error = %err, "search raised an error");
                return UnitResult::Done(SearchOutcome::failed(
                    hotel,
                    dates,
                    Availability::Error,
                    format!("Exception: {err}"),
                ));
            }

            warn!(hotel, checkin = %dates.checkin, retried, error = %err, "connection lost mid-search");
            self.sessions.record_connection_loss();
            self.sessions.discard().await;
            if retried {
                self.stats.session_errors += 1;
                return UnitResult::Done(SearchOutcome::failed(
                    hotel,
                    dates,
                    Availability::SessionError,
                    format!("Connection lost: {err}"),
                ));
            }
            retried = true;
            self.stats.connection_retries += 1;
        }
    }

    fn record(&mut self, outcome: SearchOutcome) {
        debug!(
            hotel = %outcome.hotel_name,
            checkin = %outcome.checkin,
            availability = %outcome.availability,
            "outcome recorded"
        );
        self.stats.outcomes_recorded += 1;
        self.outcomes.push(outcome);
    }
}

/// Fixed delays with optional random jitter.
struct Pacer {
    jitter_ms: u64,
}

impl Pacer {
    fn new(jitter_ms: u64) -> Self {
        Self { jitter_ms }
    }

    async fn wait(&mut self, base: Duration) -> u64 {
        let mut delay = base.as_millis() as u64;
        if self.jitter_ms > 0 {
            delay += rand::thread_rng().gen_range(0..=self.jitter_ms);
        }
        if delay == 0 {
            return 0;
        }
        sleep(Duration::from_millis(delay)).await;
        delay
    }
}
