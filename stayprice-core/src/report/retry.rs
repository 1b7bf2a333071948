use std::collections::HashMap;

use chrono::NaiveDateTime;
use tracing::{info, warn};

use crate::dates::DatePair;

use super::builder::success_rate;
use super::models::{
    format_timestamp, parse_date_pair, Availability, BatchReport, ReportMetadata, SearchKey,
    SearchOutcome, SearchRecord, Summary,
};

/// A search from a stored report that should run again.
#[derive(Debug, Clone, PartialEq)]
pub struct FailedSearch {
    pub hotel_name: String,
    pub checkin_date: String,
    pub checkout_date: String,
    pub previous_error: Option<String>,
    pub previous_availability: Availability,
}

impl FailedSearch {
    fn from_record(hotel_name: &str, record: &SearchRecord) -> Self {
        Self {
            hotel_name: hotel_name.to_string(),
            checkin_date: record.checkin_date.clone(),
            checkout_date: record.checkout_date.clone(),
            previous_error: record.error.clone(),
            previous_availability: record.availability,
        }
    }
}

pub fn failed_searches(report: &BatchReport) -> Vec<FailedSearch> {
    report
        .hotel_searches()
        .into_iter()
        .flat_map(|(hotel_name, searches)| {
            searches
                .iter()
                .filter(|record| record.is_failed())
                .map(move |record| FailedSearch::from_record(hotel_name, record))
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryGroup {
    pub hotel_name: String,
    pub dates: Vec<DatePair>,
}

/// Failed searches grouped by hotel, in the order hotels first appear.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetryPlan {
    pub groups: Vec<RetryGroup>,
    pub skipped: Vec<FailedSearch>,
}

impl RetryPlan {
    pub fn from_failed(failed: &[FailedSearch]) -> Self {
        let mut plan = RetryPlan::default();
        for search in failed {
            let parsed = parse_date_pair(&search.checkin_date, &search.checkout_date);
            let dates = match parsed {
                Ok(dates) => dates,
                Err(err) => {
                    warn!(
                        hotel = %search.hotel_name,
                        checkin = %search.checkin_date,
                        checkout = %search.checkout_date,
                        error = %err,
                        "skipping retry entry with unreadable dates"
                    );
                    plan.skipped.push(search.clone());
                    continue;
                }
            };
            match plan
                .groups
                .iter_mut()
                .find(|group| group.hotel_name == search.hotel_name)
            {
                Some(group) => group.dates.push(dates),
                None => plan.groups.push(RetryGroup {
                    hotel_name: search.hotel_name.clone(),
                    dates: vec![dates],
                }),
            }
        }
        plan
    }

    pub fn total_searches(&self) -> usize {
        self.groups.iter().map(|group| group.dates.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub updated: usize,
    pub unmatched: usize,
}

/// Writes retry outcomes over the matching entries and recomputes every
/// derived statistic. Entries without a matching outcome keep their timestamp.
pub fn merge_retry_results(
    report: &mut BatchReport,
    outcomes: &[SearchOutcome],
    at: NaiveDateTime,
) -> MergeStats {
    let lookup: HashMap<SearchKey, &SearchOutcome> =
        outcomes.iter().map(|outcome| (outcome.key(), outcome)).collect();
    let stamp = format_timestamp(at);
    let mut updated = 0usize;

    match report {
        BatchReport::Single(single) => {
            updated += merge_into(&single.hotel_name, &mut single.searches, &lookup, &stamp);
            single.summary = Summary::from_records(&single.searches);
            refresh_metadata(
                &mut single.metadata,
                single.searches.len(),
                single.summary.successful_prices,
                &stamp,
            );
        }
        BatchReport::Multi(multi) => {
            for hotel in &mut multi.hotels {
                updated += merge_into(&hotel.hotel_name, &mut hotel.searches, &lookup, &stamp);
                hotel.recompute();
            }
            let total_searches = multi.hotels.iter().map(|h| h.searches.len()).sum();
            let total_successful = multi
                .hotels
                .iter()
                .map(|h| h.summary.successful_prices)
                .sum();
            refresh_metadata(&mut multi.metadata, total_searches, total_successful, &stamp);
        }
    }

    let stats = MergeStats {
        updated,
        unmatched: outcomes.len().saturating_sub(updated),
    };
    info!(updated = stats.updated, unmatched = stats.unmatched, "retry results merged");
    stats
}

fn merge_into(
    hotel_name: &str,
    searches: &mut [SearchRecord],
    lookup: &HashMap<SearchKey, &SearchOutcome>,
    stamp: &str,
) -> usize {
    let mut updated = 0;
    for record in searches.iter_mut() {
        let Ok(dates) = record.dates() else {
            continue;
        };
        let key = SearchKey {
            hotel_name: hotel_name.to_string(),
            checkin: dates.checkin,
            checkout: dates.checkout,
        };
        if let Some(outcome) = lookup.get(&key) {
            record.price = outcome.price.clone();
            record.availability = outcome.availability;
            record.error = outcome.error.clone();
            record.timestamp = stamp.to_string();
            updated += 1;
        }
    }
    updated
}

fn refresh_metadata(
    metadata: &mut ReportMetadata,
    total_searches: usize,
    total_successful: usize,
    stamp: &str,
) {
    metadata.total_searches = total_searches;
    metadata.total_successful = total_successful;
    metadata.overall_success_rate = success_rate(total_successful, total_searches);
    metadata.last_updated = Some(stamp.to_string());
}
