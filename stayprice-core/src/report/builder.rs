use chrono::NaiveDateTime;

use super::error::{ReportError, ReportResult};
use super::models::{
    format_timestamp, Availability, BatchReport, HotelReport, MultiHotelReport, ReportMetadata,
    SearchOutcome, SearchRecord, SingleHotelReport, Summary,
};

const NOT_AVAILABLE_MARKER: &str = "not available";

/// Digits of a price string read as one integer: `"COP 350,000"` and
/// `"COP\u{a0}350.000"` are both 350000.
pub fn parse_price_amount(price: &str) -> Option<f64> {
    let digits: String = price.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse::<f64>().ok()
}

pub fn is_successful(record: &SearchRecord) -> bool {
    record
        .price
        .as_deref()
        .map(|price| !price.trim().is_empty() && !price.to_lowercase().contains(NOT_AVAILABLE_MARKER))
        .unwrap_or(false)
}

impl Summary {
    pub fn from_records(records: &[SearchRecord]) -> Self {
        let mut summary = Summary {
            total_searches: records.len(),
            ..Summary::default()
        };
        let mut prices = Vec::new();
        for record in records {
            if is_successful(record) {
                summary.successful_prices += 1;
                if let Some(amount) = record.price.as_deref().and_then(parse_price_amount) {
                    prices.push(amount);
                }
            } else if record.availability == Availability::NotAvailable {
                summary.not_available += 1;
            } else {
                summary.errors += 1;
            }
        }
        summary.success_rate = success_rate(summary.successful_prices, summary.total_searches);
        if !prices.is_empty() {
            summary.min_price = prices.iter().copied().reduce(f64::min);
            summary.max_price = prices.iter().copied().reduce(f64::max);
            summary.avg_price = Some(prices.iter().sum::<f64>() / prices.len() as f64);
        }
        summary
    }
}

pub fn success_rate(successful: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        successful as f64 / total as f64 * 100.0
    }
}

impl HotelReport {
    pub fn new(hotel_name: impl Into<String>, searches: Vec<SearchRecord>) -> Self {
        let summary = Summary::from_records(&searches);
        Self {
            hotel_name: hotel_name.into(),
            searches,
            summary,
        }
    }

    pub fn recompute(&mut self) {
        self.summary = Summary::from_records(&self.searches);
    }
}

/// Aggregates outcomes, in order, into a persisted report.
#[derive(Debug, Clone)]
pub struct ReportBuilder {
    generated_at: NaiveDateTime,
    hotels: Vec<HotelReport>,
}

impl ReportBuilder {
    pub fn new(generated_at: NaiveDateTime) -> Self {
        Self {
            generated_at,
            hotels: Vec::new(),
        }
    }

    pub fn push(&mut self, outcome: &SearchOutcome) {
        let record = outcome.to_record(self.generated_at);
        match self
            .hotels
            .iter_mut()
            .find(|hotel| hotel.hotel_name == outcome.hotel_name)
        {
            Some(hotel) => hotel.searches.push(record),
            None => self.hotels.push(HotelReport {
                hotel_name: outcome.hotel_name.clone(),
                searches: vec![record],
                summary: Summary::default(),
            }),
        }
    }

    pub fn extend<'a, I>(&mut self, outcomes: I)
    where
        I: IntoIterator<Item = &'a SearchOutcome>,
    {
        for outcome in outcomes {
            self.push(outcome);
        }
    }

    pub fn distinct_hotels(&self) -> usize {
        self.hotels.len()
    }

    pub fn build(self) -> ReportResult<BatchReport> {
        let Self {
            generated_at,
            mut hotels,
        } = self;
        if hotels.is_empty() {
            return Err(ReportError::Empty);
        }
        for hotel in &mut hotels {
            hotel.recompute();
        }
        let scrape_timestamp = format_timestamp(generated_at);
        if hotels.len() == 1 {
            let HotelReport {
                hotel_name,
                searches,
                summary,
            } = hotels.remove(0);
            let metadata = ReportMetadata {
                scrape_timestamp,
                hotel_name: Some(hotel_name.clone()),
                total_hotels: None,
                total_searches: searches.len(),
                total_successful: summary.successful_prices,
                overall_success_rate: summary.success_rate,
                last_updated: None,
            };
            return Ok(BatchReport::Single(SingleHotelReport {
                metadata,
                hotel_name,
                searches,
                summary,
            }));
        }
        let total_searches = hotels.iter().map(|h| h.summary.total_searches).sum();
        let total_successful = hotels.iter().map(|h| h.summary.successful_prices).sum();
        let metadata = ReportMetadata {
            scrape_timestamp,
            hotel_name: None,
            total_hotels: Some(hotels.len()),
            total_searches,
            total_successful,
            overall_success_rate: success_rate(total_successful, total_searches),
            last_updated: None,
        };
        Ok(BatchReport::Multi(MultiHotelReport { metadata, hotels }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dates::{stay_window, DatePair};
    use chrono::NaiveDate;

    fn at() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 6, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn dates(n: u32) -> Vec<DatePair> {
        stay_window(NaiveDate::from_ymd_opt(2026, 6, 1).unwrap(), n)
    }

    #[test]
    fn price_amount_ignores_separators() {
        assert_eq!(parse_price_amount("COP 350,000"), Some(350000.0));
        assert_eq!(parse_price_amount("COP\u{a0}350.000"), Some(350000.0));
        assert_eq!(parse_price_amount("COP"), None);
    }

    #[test]
    fn zero_searches_have_zero_rate() {
        let summary = Summary::from_records(&[]);
        assert_eq!(summary.success_rate, 0.0);
        assert_eq!(summary.total_searches, 0);
        assert_eq!(summary.min_price, None);
    }

    #[test]
    fn recomputing_summary_is_idempotent() {
        let mut builder = ReportBuilder::new(at());
        let pairs = dates(3);
        builder.push(&SearchOutcome::available("Casa", pairs[0], "COP 90.000".into()));
        builder.push(&SearchOutcome::not_available("Casa", pairs[1]));
        builder.push(&SearchOutcome::failed(
            "Casa",
            pairs[2],
            Availability::DateSelectionFailed,
            "Date selection failed",
        ));
        let BatchReport::Single(report) = builder.build().unwrap() else {
            panic!("expected single-hotel report");
        };
        let first = Summary::from_records(&report.searches);
        let second = Summary::from_records(&report.searches);
        assert_eq!(first, second);
        assert_eq!(first, report.summary);
        assert_eq!(first.successful_prices, 1);
        assert_eq!(first.not_available, 1);
        assert_eq!(first.errors, 1);
    }

    #[test]
    fn unparsable_price_still_counts_as_success() {
        let pairs = dates(1);
        let records = vec![
            SearchOutcome::available("Casa", pairs[0], "COP n/a".into()).to_record(at()),
            SearchOutcome::available("Casa", pairs[1], "COP 200.000".into()).to_record(at()),
        ];
        let summary = Summary::from_records(&records);
        assert_eq!(summary.successful_prices, 2);
        assert_eq!(summary.success_rate, 100.0);
        assert_eq!(summary.min_price, Some(200000.0));
        assert_eq!(summary.avg_price, Some(200000.0));
    }

    #[test]
    fn not_available_marker_in_price_is_not_success() {
        let pairs = dates(0);
        let mut record =
            SearchOutcome::available("Casa", pairs[0], "Not available".into()).to_record(at());
        record.availability = Availability::Error;
        assert!(!is_successful(&record));
        assert_eq!(Summary::from_records(&[record]).errors, 1);
    }

    #[test]
    fn several_hotels_build_multi_report_in_input_order() {
        let pairs = dates(1);
        let mut builder = ReportBuilder::new(at());
        for hotel in ["Zeta Suites", "Alfa Inn"] {
            for pair in &pairs {
                builder.push(&SearchOutcome::available(hotel, *pair, "COP 100.000".into()));
            }
        }
        let BatchReport::Multi(report) = builder.build().unwrap() else {
            panic!("expected multi-hotel report");
        };
        assert_eq!(report.metadata.total_hotels, Some(2));
        assert_eq!(report.metadata.total_searches, 4);
        assert_eq!(report.metadata.overall_success_rate, 100.0);
        let names: Vec<_> = report.hotels.iter().map(|h| h.hotel_name.as_str()).collect();
        assert_eq!(names, vec!["Zeta Suites", "Alfa Inn"]);

        let json = serde_json::to_value(&BatchReport::Multi(report)).unwrap();
        assert!(json.get("hotels").unwrap().get("Alfa Inn").is_some());
        assert!(json.get("hotel_name").is_none());
    }

    #[test]
    fn empty_builder_is_an_error() {
        assert!(matches!(
            ReportBuilder::new(at()).build(),
            Err(ReportError::Empty)
        ));
    }
}
