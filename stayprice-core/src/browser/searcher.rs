use std::fmt;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::{ScraperConfig, SelectorSection, UndeterminedPolicy};
use crate::dates::DatePair;
use crate::report::{Availability, SearchOutcome};

use super::driver::{dismiss_interstitial, set_text, ElementRef, PageDriver};
use super::error::{BrowserError, BrowserResult};
use super::error_handler::ErrorCategorizer;
use super::selectors::PriceExtractor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchStep {
    ResolveHotel,
    SelectDates,
    Submit,
    CheckAvailability,
    ExtractPrice,
}

impl SearchStep {
    fn failure(&self) -> (Availability, &'static str) {
        match self {
            SearchStep::ResolveHotel => (Availability::SearchFailed, "Hotel search failed"),
            SearchStep::SelectDates => {
                (Availability::DateSelectionFailed, "Date selection failed")
            }
            SearchStep::Submit => (Availability::SearchExecutionFailed, "Search execution failed"),
            SearchStep::CheckAvailability => {
                (Availability::Error, "Could not determine availability")
            }
            SearchStep::ExtractPrice => {
                (Availability::PriceExtractionFailed, "Price extraction failed")
            }
        }
    }
}

impl fmt::Display for SearchStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SearchStep::ResolveHotel => "resolve_hotel",
            SearchStep::SelectDates => "select_dates",
            SearchStep::Submit => "submit",
            SearchStep::CheckAvailability => "check_availability",
            SearchStep::ExtractPrice => "extract_price",
        };
        f.write_str(label)
    }
}

/// Why a step stopped: a recoverable page problem, or a dead connection.
#[derive(Debug)]
enum StepError {
    Failed(String),
    Fatal(BrowserError),
}

type StepResult<T> = Result<T, StepError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AvailabilityVerdict {
    Available,
    Unavailable(String),
    /// No signal could be evaluated at all.
    Undetermined(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Exact,
    Partial,
}

/// Picks the autocomplete entry for `hotel`: an exact label match wins, then
/// the first case-insensitive containment in either direction.
pub fn match_autocomplete(hotel: &str, labels: &[String]) -> Option<(usize, MatchKind)> {
    let wanted = hotel.trim();
    if let Some(idx) = labels.iter().position(|label| label == wanted) {
        return Some((idx, MatchKind::Exact));
    }
    let wanted = wanted.to_lowercase();
    labels
        .iter()
        .position(|label| {
            let label = label.to_lowercase();
            !label.is_empty() && (label.contains(&wanted) || wanted.contains(&label))
        })
        .map(|idx| (idx, MatchKind::Partial))
}

#[derive(Debug, Clone)]
pub struct SearchSettings {
    pub selectors: SelectorSection,
    pub element_timeout: Duration,
    pub autocomplete_settle: Duration,
    pub picker_settle: Duration,
    pub results_settle: Duration,
    pub unavailable_phrases: Vec<String>,
    pub undetermined: UndeterminedPolicy,
}

impl SearchSettings {
    pub fn from_config(config: &ScraperConfig) -> Self {
        Self {
            selectors: config.selectors.clone(),
            element_timeout: config.session.element_timeout(),
            autocomplete_settle: Duration::from_millis(config.pacing.autocomplete_settle_ms),
            picker_settle: Duration::from_millis(config.pacing.picker_settle_ms),
            results_settle: Duration::from_secs(config.pacing.results_settle_seconds),
            unavailable_phrases: config
                .availability
                .unavailable_phrases
                .iter()
                .map(|phrase| phrase.to_lowercase())
                .collect(),
            undetermined: config.availability.undetermined,
        }
    }
}

/// Runs the resolve, date, submit, availability and price steps for one search.
pub struct HotelSearcher {
    settings: SearchSettings,
    prices: PriceExtractor,
    categorizer: ErrorCategorizer,
}

impl HotelSearcher {
    pub fn new(
        settings: SearchSettings,
        prices: PriceExtractor,
        categorizer: ErrorCategorizer,
    ) -> Self {
        Self {
            settings,
            prices,
            categorizer,
        }
    }

    pub fn from_config(config: &ScraperConfig) -> Self {
        Self::new(
            SearchSettings::from_config(config),
            PriceExtractor::from_config(&config.price),
            ErrorCategorizer::from_config(&config.session),
        )
    }

    /// Classifies one search. Only a lost connection is returned as an error;
    /// every other problem becomes a failed outcome.
    pub async fn search(
        &self,
        driver: &mut dyn PageDriver,
        hotel: &str,
        dates: DatePair,
    ) -> BrowserResult<SearchOutcome> {
        driver.forget_elements();
        match self.run_steps(driver, hotel, dates).await {
            Ok(outcome) => Ok(outcome),
            Err((_, StepError::Fatal(err))) => Err(err),
            Err((step, StepError::Failed(detail))) => {
                let (availability, message) = step.failure();
                warn!(
                    hotel,
                    checkin = %dates.checkin,
                    step = %step,
                    detail = %detail,
                    "search step failed"
                );
                Ok(SearchOutcome::failed(hotel, dates, availability, message))
            }
        }
    }

    async fn run_steps(
        &self,
        driver: &mut dyn PageDriver,
        hotel: &str,
        dates: DatePair,
    ) -> Result<SearchOutcome, (SearchStep, StepError)> {
        let at = |step: SearchStep| move |err: StepError| (step, err);

        self.resolve_hotel(driver, hotel)
            .await
            .map_err(at(SearchStep::ResolveHotel))?;
        self.select_dates(driver, dates)
            .await
            .map_err(at(SearchStep::SelectDates))?;
        self.submit(driver).await.map_err(at(SearchStep::Submit))?;

        let verdict = self
            .check_availability(driver)
            .await
            .map_err(at(SearchStep::CheckAvailability))?;
        match verdict {
            AvailabilityVerdict::Unavailable(reason) => {
                info!(hotel, checkin = %dates.checkin, reason = %reason, "not available");
                return Ok(SearchOutcome::not_available(hotel, dates));
            }
            AvailabilityVerdict::Undetermined(reason) => match self.settings.undetermined {
                UndeterminedPolicy::AssumeAvailable => {
                    debug!(hotel, reason = %reason, "availability undetermined, assuming available");
                }
                UndeterminedPolicy::RecordError => {
                    return Err((SearchStep::CheckAvailability, StepError::Failed(reason)));
                }
            },
            AvailabilityVerdict::Available => {}
        }

        let price = self
            .prices
            .extract(driver)
            .await
            .map_err(|err| (SearchStep::ExtractPrice, self.classify(err)))?;
        match price {
            Some(price) => {
                info!(hotel, checkin = %dates.checkin, price = %price, "price found");
                Ok(SearchOutcome::available(hotel, dates, price))
            }
            None => Err((
                SearchStep::ExtractPrice,
                StepError::Failed("no strategy matched a price".to_string()),
            )),
        }
    }

    async fn resolve_hotel(&self, driver: &mut dyn PageDriver, hotel: &str) -> StepResult<()> {
        let selectors = &self.settings.selectors;
        dismiss_interstitial(driver, &selectors.interstitial_dismiss).await;

        let input = driver
            .locate(&selectors.search_input, self.settings.element_timeout)
            .await
            .map_err(|err| self.classify(err))?;
        set_text(driver, input, hotel)
            .await
            .map_err(|err| self.classify(err))?;

        driver
            .locate(&selectors.autocomplete_list, self.settings.element_timeout)
            .await
            .map_err(|err| self.classify(err))?;
        if !self.settings.autocomplete_settle.is_zero() {
            sleep(self.settings.autocomplete_settle).await;
        }
        // The list re-renders while suggestions stream in.
        let list = driver
            .locate(&selectors.autocomplete_list, Duration::ZERO)
            .await
            .map_err(|err| self.classify(err))?;
        let options = driver
            .locate_all_within(list, &selectors.autocomplete_option)
            .await
            .map_err(|err| self.classify(err))?;

        let mut entries: Vec<(ElementRef, String)> = Vec::with_capacity(options.len());
        for option in options {
            match self.option_label(driver, option).await {
                Ok(label) => entries.push((option, label)),
                Err(StepError::Failed(detail)) => {
                    debug!(detail = %detail, "skipping unreadable autocomplete option");
                }
                Err(fatal) => return Err(fatal),
            }
        }
        let labels: Vec<String> = entries.iter().map(|(_, label)| label.clone()).collect();
        let Some((idx, kind)) = match_autocomplete(hotel, &labels) else {
            return Err(StepError::Failed(format!(
                "no autocomplete match among {} options: {:?}",
                labels.len(),
                labels
            )));
        };
        debug!(hotel, matched = %labels[idx], kind = ?kind, "autocomplete match");

        let button = driver
            .locate_within(entries[idx].0, &selectors.autocomplete_button)
            .await
            .map_err(|err| self.classify(err))?;
        driver.click(button).await.map_err(|err| self.classify(err))
    }

    async fn option_label(
        &self,
        driver: &mut dyn PageDriver,
        option: ElementRef,
    ) -> StepResult<String> {
        let container = driver
            .locate_within(option, &self.settings.selectors.autocomplete_label)
            .await
            .map_err(|err| self.classify(err))?;
        let text = driver
            .read_text(container)
            .await
            .map_err(|err| self.classify(err))?;
        text.lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(str::to_string)
            .ok_or_else(|| StepError::Failed("empty autocomplete label".to_string()))
    }

    async fn select_dates(&self, driver: &mut dyn PageDriver, dates: DatePair) -> StepResult<()> {
        let selectors = &self.settings.selectors;
        if !self.picker_open(driver).await? {
            let toggle = driver
                .locate(&selectors.date_picker_toggle, self.settings.element_timeout)
                .await
                .map_err(|err| self.classify(err))?;
            driver.click(toggle).await.map_err(|err| self.classify(err))?;
        }
        if !self.settings.picker_settle.is_zero() {
            sleep(self.settings.picker_settle).await;
        }

        for date in [dates.checkin, dates.checkout] {
            let cell = driver
                .locate(&selectors.calendar_cell_for(date), self.settings.element_timeout)
                .await
                .map_err(|err| self.classify(err))?;
            driver.click(cell).await.map_err(|err| self.classify(err))?;
        }
        Ok(())
    }

    async fn picker_open(&self, driver: &mut dyn PageDriver) -> StepResult<bool> {
        let calendars = driver
            .locate_all(&self.settings.selectors.date_picker_calendar)
            .await
            .map_err(|err| self.classify(err))?;
        let Some(calendar) = calendars.first().copied() else {
            return Ok(false);
        };
        match driver.is_visible(calendar).await {
            Ok(visible) => Ok(visible),
            Err(err) => match self.classify(err) {
                StepError::Failed(_) => Ok(false),
                fatal => Err(fatal),
            },
        }
    }

    async fn submit(&self, driver: &mut dyn PageDriver) -> StepResult<()> {
        let button = driver
            .locate(
                &self.settings.selectors.submit_button,
                self.settings.element_timeout,
            )
            .await
            .map_err(|err| self.classify(err))?;
        driver.click(button).await.map_err(|err| self.classify(err))?;
        // Results render asynchronously without a navigation event.
        if !self.settings.results_settle.is_zero() {
            sleep(self.settings.results_settle).await;
        }
        Ok(())
    }

    /// Sold-out flag on the first result card, then the unavailability
    /// message, then the alternative-dates carousel.
    async fn check_availability(
        &self,
        driver: &mut dyn PageDriver,
    ) -> StepResult<AvailabilityVerdict> {
        match self.availability_signals(driver).await {
            Ok(verdict) => Ok(verdict),
            Err(StepError::Failed(detail)) => Ok(AvailabilityVerdict::Undetermined(detail)),
            Err(fatal) => Err(fatal),
        }
    }

    async fn availability_signals(
        &self,
        driver: &mut dyn PageDriver,
    ) -> StepResult<AvailabilityVerdict> {
        let selectors = &self.settings.selectors;
        let cards = driver
            .locate_all(&selectors.property_card)
            .await
            .map_err(|err| self.classify(err))?;
        let Some(card) = cards.first().copied() else {
            return Ok(AvailabilityVerdict::Undetermined(
                "no result card on page".to_string(),
            ));
        };
        let sold_out = driver
            .read_attribute(card, &selectors.sold_out_attribute)
            .await
            .map_err(|err| self.classify(err))?;
        if sold_out.as_deref().map(str::trim) == Some(selectors.sold_out_value.as_str()) {
            return Ok(AvailabilityVerdict::Unavailable(
                "result card marked sold out".to_string(),
            ));
        }

        if let Some(message) = self
            .first_text(driver, &selectors.unavailable_message)
            .await?
        {
            let lowered = message.to_lowercase();
            if self
                .settings
                .unavailable_phrases
                .iter()
                .any(|phrase| lowered.contains(phrase))
            {
                return Ok(AvailabilityVerdict::Unavailable(message));
            }
        }

        let carousel = driver
            .locate_all(&selectors.alternate_dates)
            .await
            .map_err(|err| self.classify(err))?;
        if !carousel.is_empty() {
            return Ok(AvailabilityVerdict::Unavailable(
                "alternative dates suggested".to_string(),
            ));
        }
        Ok(AvailabilityVerdict::Available)
    }

    async fn first_text(
        &self,
        driver: &mut dyn PageDriver,
        selector: &str,
    ) -> StepResult<Option<String>> {
        let found = driver
            .locate_all(selector)
            .await
            .map_err(|err| self.classify(err))?;
        let Some(element) = found.first().copied() else {
            return Ok(None);
        };
        match driver.read_text(element).await {
            Ok(text) => Ok(Some(text)),
            Err(err) => match self.classify(err) {
                StepError::Failed(_) => Ok(None),
                fatal => Err(fatal),
            },
        }
    }

    fn classify(&self, err: BrowserError) -> StepError {
        if self.categorizer.is_connection_loss(&err) {
            StepError::Fatal(err)
        } else {
            StepError::Failed(err.to_string())
        }
    }
}
