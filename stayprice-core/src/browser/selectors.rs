use tracing::{debug, trace};

use crate::config::PriceSection;

use super::driver::PageDriver;
use super::error::BrowserResult;

/// Where a strategy looks for candidate price text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PriceSource {
    Selector(String),
    /// Every text node on the page carrying the currency marker.
    TextScan,
}

/// Acceptance test applied to candidate text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PriceRule {
    CurrencyWithDigit,
    /// Like `CurrencyWithDigit`, rejecting teaser prices ("from", "per night").
    ExcludingTeasers,
}

#[derive(Debug, Clone)]
pub struct PriceStrategy {
    pub source: PriceSource,
    pub rule: PriceRule,
}

/// Ordered price strategies evaluated first-match-wins.
#[derive(Debug, Clone)]
pub struct PriceExtractor {
    strategies: Vec<PriceStrategy>,
    currency_marker: String,
    teaser_markers: Vec<String>,
}

impl PriceExtractor {
    pub fn new(
        strategies: Vec<PriceStrategy>,
        currency_marker: impl Into<String>,
        teaser_markers: Vec<String>,
    ) -> Self {
        Self {
            strategies,
            currency_marker: currency_marker.into(),
            teaser_markers: teaser_markers
                .into_iter()
                .map(|marker| marker.to_lowercase())
                .collect(),
        }
    }

    pub fn from_config(config: &PriceSection) -> Self {
        let mut strategies: Vec<PriceStrategy> = config
            .selectors
            .iter()
            .map(|selector| PriceStrategy {
                source: PriceSource::Selector(selector.clone()),
                rule: PriceRule::CurrencyWithDigit,
            })
            .collect();
        if config.text_scan {
            strategies.push(PriceStrategy {
                source: PriceSource::TextScan,
                rule: PriceRule::ExcludingTeasers,
            });
        }
        Self::new(
            strategies,
            config.currency_marker.clone(),
            config.teaser_markers.clone(),
        )
    }

    pub fn strategies(&self) -> &[PriceStrategy] {
        &self.strategies
    }

    pub fn accepts(&self, rule: &PriceRule, text: &str) -> bool {
        let priced =
            text.contains(&self.currency_marker) && text.chars().any(|c| c.is_ascii_digit());
        match rule {
            PriceRule::CurrencyWithDigit => priced,
            PriceRule::ExcludingTeasers => {
                let lowered = text.to_lowercase();
                priced
                    && !self
                        .teaser_markers
                        .iter()
                        .any(|marker| lowered.contains(marker))
            }
        }
    }

    /// First accepted price text on the page. Missing or stale elements only
    /// skip the strategy; any other driver failure is returned.
    pub async fn extract(&self, driver: &mut dyn PageDriver) -> BrowserResult<Option<String>> {
        for (idx, strategy) in self.strategies.iter().enumerate() {
            let candidates = match self.candidates(driver, &strategy.source).await {
                Ok(candidates) => candidates,
                Err(err) if err.is_element_error() => {
                    trace!(strategy = idx, error = %err, "price strategy found nothing");
                    continue;
                }
                Err(err) => return Err(err),
            };
            if let Some(text) = candidates
                .into_iter()
                .map(|text| text.trim().to_string())
                .find(|text| self.accepts(&strategy.rule, text))
            {
                debug!(strategy = idx, source = ?strategy.source, price = %text, "price extracted");
                return Ok(Some(text));
            }
        }
        Ok(None)
    }

    async fn candidates(
        &self,
        driver: &mut dyn PageDriver,
        source: &PriceSource,
    ) -> BrowserResult<Vec<String>> {
        match source {
            PriceSource::Selector(selector) => {
                let mut texts = Vec::new();
                for element in driver.locate_all(selector).await? {
                    match driver.read_text(element).await {
                        Ok(text) => texts.push(text),
                        Err(err) if err.is_element_error() => continue,
                        Err(err) => return Err(err),
                    }
                }
                Ok(texts)
            }
            PriceSource::TextScan => driver.texts_containing(&self.currency_marker).await,
        }
    }
}
