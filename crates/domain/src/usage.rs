//! Monthly usage ledger record, as written by the aggregation pipeline.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// `YYYY-MM` key of the UTC calendar month containing `now`.
pub fn month_key(now: DateTime<Utc>) -> String {
    now.format("%Y-%m").to_string()
}

/// Per-identity, per-month usage counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub identifier: String,
    pub month_key: String,
    #[serde(default)]
    pub total_tokens: u64,
    /// Tokens accumulated on `daily_date`.  Stale once the UTC date moves on.
    #[serde(default)]
    pub daily_tokens: u64,
    #[serde(default)]
    pub daily_date: Option<NaiveDate>,
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub cache_tokens: u64,
    /// Estimated spend in USD.
    #[serde(default)]
    pub estimated_cost: Decimal,
}

impl UsageRecord {
    /// Zero-valued record for an identity with no usage this month.
    pub fn empty(identifier: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            identifier: identifier.into(),
            month_key: month_key(now),
            total_tokens: 0,
            daily_tokens: 0,
            daily_date: Some(now.date_naive()),
            input_tokens: 0,
            output_tokens: 0,
            cache_tokens: 0,
            estimated_cost: Decimal::ZERO,
        }
    }

    /// Daily tokens as they count on `today`: zero when the counter was last
    /// accumulated on another date.
    pub fn daily_tokens_on(&self, today: NaiveDate) -> u64 {
        if self.daily_date == Some(today) {
            self.daily_tokens
        } else {
            0
        }
    }
}
