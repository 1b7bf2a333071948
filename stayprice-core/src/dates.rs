use std::fmt;

use chrono::{Days, Local, NaiveDate};
use serde::{Deserialize, Serialize};

/// One-night stay searched on the booking site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DatePair {
    pub checkin: NaiveDate,
    pub checkout: NaiveDate,
}

impl DatePair {
    pub fn one_night(checkin: NaiveDate) -> Self {
        Self {
            checkin,
            checkout: next_day(checkin),
        }
    }
}

impl fmt::Display for DatePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} → {}", self.checkin, self.checkout)
    }
}

/// Pairs for every check-in from `start` through `start + window_days`, inclusive.
pub fn stay_window(start: NaiveDate, window_days: u32) -> Vec<DatePair> {
    (0..=u64::from(window_days))
        .filter_map(|offset| start.checked_add_days(Days::new(offset)))
        .map(DatePair::one_night)
        .collect()
}

/// Same as [`stay_window`], anchored at the local wall-clock date.
pub fn stay_window_from_today(window_days: u32) -> Vec<DatePair> {
    stay_window(Local::now().date_naive(), window_days)
}

fn next_day(date: NaiveDate) -> NaiveDate {
    date.succ_opt().unwrap_or(date)
}
