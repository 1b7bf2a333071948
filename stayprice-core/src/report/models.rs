use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::dates::DatePair;

use super::error::ReportError;

pub const DATE_FORMAT: &str = "%Y-%m-%d";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

pub fn parse_date_pair(checkin: &str, checkout: &str) -> Result<DatePair, chrono::ParseError> {
    Ok(DatePair {
        checkin: NaiveDate::parse_from_str(checkin.trim(), DATE_FORMAT)?,
        checkout: NaiveDate::parse_from_str(checkout.trim(), DATE_FORMAT)?,
    })
}

pub fn format_timestamp(at: NaiveDateTime) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Availability {
    Available,
    NotAvailable,
    SearchFailed,
    DateSelectionFailed,
    SearchExecutionFailed,
    PriceExtractionFailed,
    SessionError,
    Error,
}

impl Availability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Availability::Available => "Available",
            Availability::NotAvailable => "Not available",
            Availability::SearchFailed => "Search failed",
            Availability::DateSelectionFailed => "Date selection failed",
            Availability::SearchExecutionFailed => "Search execution failed",
            Availability::PriceExtractionFailed => "Price extraction failed",
            Availability::SessionError => "Session error",
            Availability::Error => "Error",
        }
    }

    /// Failure states that warrant a retry even when no error text was recorded.
    pub fn is_retryable_failure(&self) -> bool {
        matches!(
            self,
            Availability::SearchFailed
                | Availability::DateSelectionFailed
                | Availability::PriceExtractionFailed
                | Availability::Error
        )
    }
}

impl fmt::Display for Availability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Availability {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Available" => Ok(Availability::Available),
            "Not available" => Ok(Availability::NotAvailable),
            "Search failed" => Ok(Availability::SearchFailed),
            "Date selection failed" => Ok(Availability::DateSelectionFailed),
            "Search execution failed" => Ok(Availability::SearchExecutionFailed),
            "Price extraction failed" => Ok(Availability::PriceExtractionFailed),
            "Session error" => Ok(Availability::SessionError),
            "Error" => Ok(Availability::Error),
            other => Err(ReportError::UnknownAvailability(other.to_string())),
        }
    }
}

impl TryFrom<String> for Availability {
    type Error = ReportError;

    fn try_from(value: String) -> Result<Self, ReportError> {
        value.parse()
    }
}

impl From<Availability> for String {
    fn from(value: Availability) -> Self {
        value.as_str().to_string()
    }
}

/// Result of one (hotel, check-in, check-out) search.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOutcome {
    pub hotel_name: String,
    pub checkin: NaiveDate,
    pub checkout: NaiveDate,
    pub price: Option<String>,
    pub availability: Availability,
    pub error: Option<String>,
}

impl SearchOutcome {
    pub fn available(hotel_name: &str, dates: DatePair, price: String) -> Self {
        Self::new(hotel_name, dates, Some(price), Availability::Available, None)
    }

    pub fn not_available(hotel_name: &str, dates: DatePair) -> Self {
        Self::new(hotel_name, dates, None, Availability::NotAvailable, None)
    }

    pub fn failed(
        hotel_name: &str,
        dates: DatePair,
        availability: Availability,
        error: impl Into<String>,
    ) -> Self {
        Self::new(hotel_name, dates, None, availability, Some(error.into()))
    }

    fn new(
        hotel_name: &str,
        dates: DatePair,
        price: Option<String>,
        availability: Availability,
        error: Option<String>,
    ) -> Self {
        Self {
            hotel_name: hotel_name.to_string(),
            checkin: dates.checkin,
            checkout: dates.checkout,
            price,
            availability,
            error,
        }
    }

    pub fn dates(&self) -> DatePair {
        DatePair {
            checkin: self.checkin,
            checkout: self.checkout,
        }
    }

    pub fn key(&self) -> SearchKey {
        SearchKey {
            hotel_name: self.hotel_name.clone(),
            checkin: self.checkin,
            checkout: self.checkout,
        }
    }

    pub fn to_record(&self, at: NaiveDateTime) -> SearchRecord {
        let checkin_date = self.checkin.format(DATE_FORMAT).to_string();
        let checkout_date = self.checkout.format(DATE_FORMAT).to_string();
        SearchRecord {
            date_range: format!("{checkin_date} → {checkout_date}"),
            checkin_date,
            checkout_date,
            price: self.price.clone(),
            availability: self.availability,
            error: self.error.clone(),
            timestamp: format_timestamp(at),
        }
    }
}

/// Identity of a search across a report and its retries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SearchKey {
    pub hotel_name: String,
    pub checkin: NaiveDate,
    pub checkout: NaiveDate,
}

/// Persisted form of a search; dates stay textual so a damaged entry never
/// prevents the rest of the report from loading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRecord {
    pub checkin_date: String,
    pub checkout_date: String,
    #[serde(default)]
    pub date_range: String,
    pub price: Option<String>,
    pub availability: Availability,
    pub error: Option<String>,
    #[serde(default)]
    pub timestamp: String,
}

impl SearchRecord {
    pub fn is_failed(&self) -> bool {
        self.error.is_some()
            || (self.price.is_none() && self.availability.is_retryable_failure())
    }

    pub fn dates(&self) -> Result<DatePair, chrono::ParseError> {
        parse_date_pair(&self.checkin_date, &self.checkout_date)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Summary {
    pub total_searches: usize,
    pub successful_prices: usize,
    pub not_available: usize,
    pub errors: usize,
    pub success_rate: f64,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub avg_price: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HotelReport {
    pub hotel_name: String,
    pub searches: Vec<SearchRecord>,
    pub summary: Summary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub scrape_timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hotel_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_hotels: Option<usize>,
    pub total_searches: usize,
    pub total_successful: usize,
    pub overall_success_rate: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SingleHotelReport {
    pub metadata: ReportMetadata,
    pub hotel_name: String,
    pub searches: Vec<SearchRecord>,
    pub summary: Summary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiHotelReport {
    pub metadata: ReportMetadata,
    #[serde(with = "hotel_map")]
    pub hotels: Vec<HotelReport>,
}

/// A persisted batch, in either of its two shapes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum BatchReport {
    Single(SingleHotelReport),
    Multi(MultiHotelReport),
}

impl BatchReport {
    pub fn from_value(value: Value) -> Result<Self, ReportError> {
        let is_single = value.get("hotel_name").is_some();
        let is_multi = value.get("hotels").is_some();
        if is_single {
            Ok(BatchReport::Single(serde_json::from_value(value)?))
        } else if is_multi {
            Ok(BatchReport::Multi(serde_json::from_value(value)?))
        } else {
            Err(ReportError::UnknownShape)
        }
    }

    pub fn metadata(&self) -> &ReportMetadata {
        match self {
            BatchReport::Single(report) => &report.metadata,
            BatchReport::Multi(report) => &report.metadata,
        }
    }

    pub fn total_searches(&self) -> usize {
        match self {
            BatchReport::Single(report) => report.searches.len(),
            BatchReport::Multi(report) => report.hotels.iter().map(|h| h.searches.len()).sum(),
        }
    }

    /// Every (hotel name, searches) group in document order.
    pub fn hotel_searches(&self) -> Vec<(&str, &[SearchRecord])> {
        match self {
            BatchReport::Single(report) => {
                vec![(report.hotel_name.as_str(), report.searches.as_slice())]
            }
            BatchReport::Multi(report) => report
                .hotels
                .iter()
                .map(|hotel| (hotel.hotel_name.as_str(), hotel.searches.as_slice()))
                .collect(),
        }
    }
}

impl<'de> Deserialize<'de> for BatchReport {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        BatchReport::from_value(value).map_err(serde::de::Error::custom)
    }
}

/// Serializes hotels as an object keyed by hotel name, preserving order.
mod hotel_map {
    use std::fmt;

    use serde::de::{MapAccess, Visitor};
    use serde::ser::SerializeMap;
    use serde::{Deserializer, Serializer};

    use super::HotelReport;

    pub fn serialize<S>(hotels: &[HotelReport], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(hotels.len()))?;
        for hotel in hotels {
            map.serialize_entry(&hotel.hotel_name, hotel)?;
        }
        map.end()
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<HotelReport>, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct HotelsVisitor;

        impl<'de> Visitor<'de> for HotelsVisitor {
            type Value = Vec<HotelReport>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of hotel name to hotel report")
            }

            fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut hotels = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((_key, hotel)) = access.next_entry::<String, HotelReport>()? {
                    hotels.push(hotel);
                }
                Ok(hotels)
            }
        }

        deserializer.deserialize_map(HotelsVisitor)
    }
}
