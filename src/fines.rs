// src/fines.rs
//! Loan policy: due dates, lateness and fines

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::config::LendingConfig;

const MILLIS_PER_DAY: i64 = 86_400_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoanPolicy {
    pub loan_period_days: i64,
    pub fine_rate_per_day: i64,
    pub max_books_per_request: usize,
}

impl Default for LoanPolicy {
    fn default() -> Self {
        Self {
            loan_period_days: 14,
            fine_rate_per_day: 1000,
            max_books_per_request: 5,
        }
    }
}

impl From<&LendingConfig> for LoanPolicy {
    fn from(config: &LendingConfig) -> Self {
        Self {
            loan_period_days: config.loan_period_days,
            fine_rate_per_day: config.fine_rate_per_day,
            max_books_per_request: config.max_books_per_request,
        }
    }
}

impl LoanPolicy {
    pub fn due_date(&self, borrow_date: DateTime<Utc>) -> DateTime<Utc> {
        borrow_date + Duration::days(self.loan_period_days)
    }

    /// `max(0, ceil((returned_on - due_date) / 1 day)) * rate`
    pub fn fine(&self, due_date: DateTime<Utc>, returned_on: DateTime<Utc>) -> i64 {
        days_late(due_date, returned_on) * self.fine_rate_per_day
    }
}

/// Started days past the due date; 0 when on time. Any lateness, however
/// small, starts a day.
pub fn days_late(due_date: DateTime<Utc>, at: DateTime<Utc>) -> i64 {
    let late = at - due_date;
    if late <= Duration::zero() {
        return 0;
    }
    let millis = late.num_milliseconds();
    ((millis + MILLIS_PER_DAY - 1) / MILLIS_PER_DAY).max(1)
}

/// Whole days left until the due date; 0 once it is reached.
pub fn days_remaining(due_date: DateTime<Utc>, at: DateTime<Utc>) -> i64 {
    let left = due_date - at;
    if left <= Duration::zero() {
        return 0;
    }
    left.num_milliseconds() / MILLIS_PER_DAY
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LatenessCategory {
    OnTime,
    LateUpToWeek,
    LateUpToMonth,
    VeryLate,
}

impl LatenessCategory {
    pub fn from_days(days_late: i64) -> Self {
        match days_late {
            d if d <= 0 => LatenessCategory::OnTime,
            1..=7 => LatenessCategory::LateUpToWeek,
            8..=30 => LatenessCategory::LateUpToMonth,
            _ => LatenessCategory::VeryLate,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            LatenessCategory::OnTime => "on time",
            LatenessCategory::LateUpToWeek => "late 1-7 days",
            LatenessCategory::LateUpToMonth => "late 1-4 weeks",
            LatenessCategory::VeryLate => "very late (>1 month)",
        }
    }
}
