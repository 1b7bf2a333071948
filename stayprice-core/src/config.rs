use std::path::Path;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use url::Url;

use crate::error::{ConfigError, Result};

pub const ENV_USERNAME: &str = "REMOTE_BROWSER_USERNAME";
pub const ENV_PASSWORD: &str = "REMOTE_BROWSER_PASSWORD";
pub const ENV_HOST: &str = "REMOTE_BROWSER_HOST";
pub const ENV_PORT: &str = "REMOTE_BROWSER_PORT";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct ScraperConfig {
    pub site: SiteSection,
    pub remote: RemoteSection,
    pub session: SessionSection,
    pub pacing: PacingSection,
    pub dates: DatesSection,
    pub selectors: SelectorSection,
    pub price: PriceSection,
    pub availability: AvailabilitySection,
    pub output: OutputSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SiteSection {
    pub base_url: String,
    pub country: String,
    pub currency: String,
    pub language: Option<String>,
}

impl Default for SiteSection {
    fn default() -> Self {
        Self {
            base_url: "https://www.booking.com/".to_string(),
            country: "co".to_string(),
            currency: "COP".to_string(),
            language: Some("es-CO".to_string()),
        }
    }
}

impl SiteSection {
    /// Landing page with the country and currency pinned through query parameters.
    pub fn landing_url(&self) -> Result<String> {
        let mut url = Url::parse(&self.base_url).map_err(|err| ConfigError::Invalid {
            key: "site.base_url".to_string(),
            reason: err.to_string(),
        })?;
        url.query_pairs_mut()
            .append_pair("cc1", &self.country)
            .append_pair("selected_currency", &self.currency);
        Ok(url.into())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RemoteSection {
    pub scheme: String,
    pub request_timeout_seconds: u64,
}

impl Default for RemoteSection {
    fn default() -> Self {
        Self {
            scheme: "wss".to_string(),
            request_timeout_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    pub max_attempts: usize,
    pub retry_backoff_seconds: u64,
    pub jitter_seconds: u64,
    pub max_searches_per_session: usize,
    pub restart_delay_seconds: u64,
    pub page_load_timeout_seconds: u64,
    pub landing_settle_seconds: u64,
    pub element_timeout_seconds: u64,
    pub connection_loss_signatures: Vec<String>,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_backoff_seconds: 10,
            jitter_seconds: 0,
            max_searches_per_session: 6,
            restart_delay_seconds: 5,
            page_load_timeout_seconds: 30,
            landing_settle_seconds: 5,
            element_timeout_seconds: 15,
            connection_loss_signatures: vec![
                "WebSocket".to_string(),
                "cdp_ws_error".to_string(),
                "connection closed".to_string(),
            ],
        }
    }
}

impl SessionSection {
    pub fn element_timeout(&self) -> Duration {
        Duration::from_secs(self.element_timeout_seconds)
    }

    pub fn page_load_timeout(&self) -> Duration {
        Duration::from_secs(self.page_load_timeout_seconds)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PacingSection {
    pub search_delay_seconds: u64,
    pub hotel_delay_seconds: u64,
    pub results_settle_seconds: u64,
    pub autocomplete_settle_ms: u64,
    pub picker_settle_ms: u64,
    pub jitter_ms: u64,
}

impl Default for PacingSection {
    fn default() -> Self {
        Self {
            search_delay_seconds: 3,
            hotel_delay_seconds: 10,
            results_settle_seconds: 10,
            autocomplete_settle_ms: 2000,
            picker_settle_ms: 1000,
            jitter_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatesSection {
    pub window_days: u32,
}

impl Default for DatesSection {
    fn default() -> Self {
        Self { window_days: 30 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SelectorSection {
    pub interstitial_dismiss: Vec<String>,
    pub search_input: String,
    pub autocomplete_list: String,
    pub autocomplete_option: String,
    pub autocomplete_label: String,
    pub autocomplete_button: String,
    pub date_picker_toggle: String,
    pub date_picker_calendar: String,
    /// Calendar cell selector; `{date}` is replaced by the ISO date.
    pub calendar_cell: String,
    pub submit_button: String,
    pub property_card: String,
    pub sold_out_attribute: String,
    pub sold_out_value: String,
    pub unavailable_message: String,
    pub alternate_dates: String,
}

impl Default for SelectorSection {
    fn default() -> Self {
        Self {
            interstitial_dismiss: vec!["button[aria-label='Dismiss sign-in info.']".to_string()],
            search_input: "input[name='ss']".to_string(),
            autocomplete_list: "ul[role='group']".to_string(),
            autocomplete_option: "li[role='option']".to_string(),
            autocomplete_label: "[data-testid='autocomplete-result']".to_string(),
            autocomplete_button: "div[role='button']".to_string(),
            date_picker_toggle: "[data-testid='searchbox-dates-container']".to_string(),
            date_picker_calendar: "[data-testid='searchbox-datepicker-calendar']".to_string(),
            calendar_cell: "span[data-date='{date}']".to_string(),
            submit_button: "button[type='submit']".to_string(),
            property_card: "[data-testid='property-card']".to_string(),
            sold_out_attribute: "data-soldout".to_string(),
            sold_out_value: "1".to_string(),
            unavailable_message: "p.b99b6ef58f.c8075b5e6a".to_string(),
            alternate_dates: "[data-testid='next-available-dates-carousel']".to_string(),
        }
    }
}

impl SelectorSection {
    pub fn calendar_cell_for(&self, date: chrono::NaiveDate) -> String {
        self.calendar_cell
            .replace("{date}", &date.format("%Y-%m-%d").to_string())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PriceSection {
    pub currency_marker: String,
    pub selectors: Vec<String>,
    pub text_scan: bool,
    pub teaser_markers: Vec<String>,
}

impl Default for PriceSection {
    fn default() -> Self {
        Self {
            currency_marker: "COP".to_string(),
            selectors: vec![
                "span[data-testid='price-and-discounted-price']".to_string(),
                "[data-testid='price-and-discounted-price']".to_string(),
                ".prco-valign-middle-helper".to_string(),
                "[data-testid='price']".to_string(),
                ".bui-price-display__value".to_string(),
                ".prco-text-nowrap-helper".to_string(),
                "span[aria-label*='COP']".to_string(),
                ".bui-price-display__value .sr-only".to_string(),
                "[data-testid='price-availability-row'] span".to_string(),
            ],
            text_scan: true,
            teaser_markers: vec!["from".to_string(), "night".to_string()],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UndeterminedPolicy {
    /// Attempt price extraction when no unavailability signal could be evaluated.
    #[default]
    AssumeAvailable,
    /// Record the search as an error instead of guessing.
    RecordError,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AvailabilitySection {
    pub unavailable_phrases: Vec<String>,
    pub undetermined: UndeterminedPolicy,
}

impl Default for AvailabilitySection {
    fn default() -> Self {
        Self {
            unavailable_phrases: vec!["no availability".to_string()],
            undetermined: UndeterminedPolicy::AssumeAvailable,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputSection {
    pub directory: String,
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            directory: "outputs".to_string(),
        }
    }
}

/// Credentials and address of the remote browser provider.
#[derive(Clone, PartialEq, Eq)]
pub struct RemoteEndpoint {
    pub username: String,
    pub password: String,
    pub host: String,
    pub port: u16,
}

impl std::fmt::Debug for RemoteEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteEndpoint")
            .field("username", &self.username)
            .field("password", &"***")
            .field("host", &self.host)
            .field("port", &self.port)
            .finish()
    }
}

impl RemoteEndpoint {
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let fetch = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .ok_or_else(|| ConfigError::MissingVariable(key.to_string()))
        };
        let username = fetch(ENV_USERNAME)?;
        let password = fetch(ENV_PASSWORD)?;
        let host = fetch(ENV_HOST)?;
        let raw_port = fetch(ENV_PORT)?;
        let port = raw_port.parse::<u16>().map_err(|err| ConfigError::Invalid {
            key: ENV_PORT.to_string(),
            reason: err.to_string(),
        })?;
        Ok(Self {
            username,
            password,
            host,
            port,
        })
    }

    pub fn url(&self, scheme: &str) -> Result<String> {
        let mut url = Url::parse(&format!("{scheme}://{}:{}", self.host, self.port)).map_err(
            |err| ConfigError::Invalid {
                key: ENV_HOST.to_string(),
                reason: err.to_string(),
            },
        )?;
        let invalid = |key: &str| ConfigError::Invalid {
            key: key.to_string(),
            reason: "cannot be embedded in endpoint url".to_string(),
        };
        url.set_username(&self.username)
            .map_err(|_| invalid(ENV_USERNAME))?;
        url.set_password(Some(&self.password))
            .map_err(|_| invalid(ENV_PASSWORD))?;
        Ok(url.into())
    }
}

pub fn load_scraper_config<P: AsRef<Path>>(path: P) -> Result<ScraperConfig> {
    load_toml(path)
}

fn load_toml<T, P>(path: P) -> Result<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        source,
        path: path.to_path_buf(),
    })
}
