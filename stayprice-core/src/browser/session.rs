use std::rc::Rc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::ScraperConfig;
use crate::error::ConfigError;

use super::driver::{dismiss_interstitial, PageDriver, SessionFactory};
use super::error::{BrowserError, BrowserResult};
use super::error_handler::ErrorCategorizer;
use super::metrics::SessionMetrics;
use super::retry::RetryPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Absent,
    Acquiring,
    Ready,
    Discarded,
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub landing_url: String,
    pub page_load_timeout: Duration,
    pub landing_settle: Duration,
    pub restart_delay: Duration,
    /// Searches served by one session before it is rotated; 0 disables rotation.
    pub rotate_after: usize,
    pub interstitial_selectors: Vec<String>,
}

impl SessionSettings {
    pub fn from_config(config: &ScraperConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            landing_url: config.site.landing_url()?,
            page_load_timeout: config.session.page_load_timeout(),
            landing_settle: Duration::from_secs(config.session.landing_settle_seconds),
            restart_delay: Duration::from_secs(config.session.restart_delay_seconds),
            rotate_after: config.session.max_searches_per_session,
            interstitial_selectors: config.selectors.interstitial_dismiss.clone(),
        })
    }
}

/// Owns the single remote browser session used by a batch.
pub struct SessionManager {
    factory: Rc<dyn SessionFactory>,
    retry: RetryPolicy,
    categorizer: ErrorCategorizer,
    settings: SessionSettings,
    session: Option<Box<dyn PageDriver>>,
    state: SessionState,
    searches_in_session: usize,
    metrics: SessionMetrics,
}

impl SessionManager {
    pub fn new(
        factory: Rc<dyn SessionFactory>,
        retry: RetryPolicy,
        categorizer: ErrorCategorizer,
        settings: SessionSettings,
    ) -> Self {
        Self {
            factory,
            retry,
            categorizer,
            settings,
            session: None,
            state: SessionState::Absent,
            searches_in_session: 0,
            metrics: SessionMetrics::default(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn metrics(&self) -> &SessionMetrics {
        &self.metrics
    }

    pub fn categorizer(&self) -> &ErrorCategorizer {
        &self.categorizer
    }

    pub fn searches_in_session(&self) -> usize {
        self.searches_in_session
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session.as_deref().map(|driver| driver.session_id())
    }

    /// The ready session, if any.
    pub fn driver(&mut self) -> Option<&mut (dyn PageDriver + 'static)> {
        match self.state {
            SessionState::Ready => self.session.as_deref_mut(),
            _ => None,
        }
    }

    /// Creates a session and brings it to the landing page, retrying creation
    /// with backoff.
    pub async fn acquire(&mut self) -> BrowserResult<()> {
        if self.session.is_some() {
            self.release().await;
        }
        self.state = SessionState::Acquiring;
        let factory = Rc::clone(&self.factory);
        let settings = &self.settings;
        let outcome = self
            .retry
            .run("session acquisition", &mut self.metrics, |attempt| {
                let factory = Rc::clone(&factory);
                async move {
                    debug!(attempt = attempt + 1, "creating remote browser session");
                    let mut driver = factory.create().await?;
                    match prepare_landing(driver.as_mut(), settings).await {
                        Ok(()) => Ok(driver),
                        Err(err) => {
                            if let Err(close_err) = driver.close().await {
                                debug!(error = %close_err, "failed to close half-open session");
                            }
                            Err(err)
                        }
                    }
                }
            })
            .await;

        match outcome {
            Ok(outcome) => {
                self.metrics.record_session_created();
                info!(
                    session = %outcome.result.session_id(),
                    attempts = outcome.attempts,
                    "remote browser session ready"
                );
                self.session = Some(outcome.result);
                self.state = SessionState::Ready;
                self.searches_in_session = 0;
                Ok(())
            }
            Err(exhausted) => {
                self.state = SessionState::Absent;
                Err(BrowserError::SessionCreation {
                    attempts: exhausted.attempts,
                    message: exhausted.last_error.to_string(),
                })
            }
        }
    }

    /// Reads the current URL; any failure discards the session.
    pub async fn health_check(&mut self) -> bool {
        let Some(driver) = self.driver() else {
            return false;
        };
        let session = driver.session_id().to_string();
        let probe = driver.current_url().await;
        match probe {
            Ok(url) => {
                debug!(session = %session, url = %url, "session healthy");
                true
            }
            Err(err) if self.categorizer.is_connection_loss(&err) => {
                warn!(session = %session, error = %err, "connection lost during health check");
                self.metrics.record_connection_loss();
                self.discard().await;
                false
            }
            Err(err) => {
                warn!(session = %session, error = %err, "health check failed, replacing session");
                self.discard().await;
                false
            }
        }
    }

    pub fn rotation_due(&self) -> bool {
        self.state == SessionState::Ready
            && self.settings.rotate_after > 0
            && self.searches_in_session >= self.settings.rotate_after
    }

    /// Tears the current session down and starts a new one after the restart delay.
    pub async fn rotate(&mut self) -> BrowserResult<()> {
        info!(
            session = self.session_id().unwrap_or("-"),
            searches = self.searches_in_session,
            "rotating browser session"
        );
        self.metrics.record_rotation();
        self.release().await;
        self.pause_before_restart().await;
        self.acquire().await
    }

    /// Guarantees a healthy, ready session, acquiring or rotating as required.
    pub async fn ensure_ready(&mut self) -> BrowserResult<()> {
        if self.rotation_due() {
            return self.rotate().await;
        }
        match self.state {
            SessionState::Ready => {
                if self.health_check().await {
                    return Ok(());
                }
                self.pause_before_restart().await;
                self.acquire().await
            }
            SessionState::Discarded => {
                self.pause_before_restart().await;
                self.acquire().await
            }
            SessionState::Absent | SessionState::Acquiring => self.acquire().await,
        }
    }

    /// Drops a session that can no longer be trusted; it is never reused.
    pub async fn discard(&mut self) {
        if let Some(mut driver) = self.session.take() {
            debug!(session = %driver.session_id(), "discarding browser session");
            if let Err(err) = driver.close().await {
                debug!(error = %err, "close failed on discarded session");
            }
        }
        self.state = SessionState::Discarded;
        self.searches_in_session = 0;
    }

    pub fn record_connection_loss(&mut self) {
        self.metrics.record_connection_loss();
    }

    /// Best-effort teardown; close failures are logged and swallowed.
    pub async fn release(&mut self) {
        if let Some(mut driver) = self.session.take() {
            let session = driver.session_id().to_string();
            match driver.close().await {
                Ok(()) => info!(session = %session, "browser session released"),
                Err(err) => warn!(session = %session, error = %err, "failed to close browser session"),
            }
        }
        self.state = SessionState::Absent;
        self.searches_in_session = 0;
    }

    pub fn record_search(&mut self) {
        self.searches_in_session += 1;
        self.metrics.record_search();
    }

    async fn pause_before_restart(&self) {
        if !self.settings.restart_delay.is_zero() {
            sleep(self.settings.restart_delay).await;
        }
    }
}

async fn prepare_landing(
    driver: &mut dyn PageDriver,
    settings: &SessionSettings,
) -> BrowserResult<()> {
    driver.navigate(&settings.landing_url).await?;
    if !driver
        .wait_for_load_complete(settings.page_load_timeout)
        .await?
    {
        return Err(BrowserError::Timeout(format!(
            "landing page {} to finish loading",
            settings.landing_url
        )));
    }
    if !settings.landing_settle.is_zero() {
        sleep(settings.landing_settle).await;
    }
    dismiss_interstitial(driver, &settings.interstitial_selectors).await;
    Ok(())
}
