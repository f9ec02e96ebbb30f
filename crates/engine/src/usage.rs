//! Current-month usage, normalized for "now".

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use qg_domain::{month_key, StoreResult, UsageRecord};
use qg_store::UsageStore;

use crate::bounded::bounded;

/// Reads an identity's usage for the month containing `now`.
///
/// Daily rollover is lazy: a record whose `daily_date` is not today reports
/// zero daily tokens.  Only the returned copy is adjusted; the store is
/// never written.
pub struct UsageReader {
    store: Arc<dyn UsageStore>,
    timeout: Duration,
}

impl UsageReader {
    pub fn new(store: Arc<dyn UsageStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    pub async fn read(&self, identifier: &str, now: DateTime<Utc>) -> StoreResult<UsageRecord> {
        let month = month_key(now);
        let stored = bounded("usage.get", self.timeout, self.store.get(identifier, &month)).await?;

        Ok(match stored {
            None => UsageRecord::empty(identifier, now),
            Some(mut record) => {
                record.daily_tokens = record.daily_tokens_on(now.date_naive());
                record
            }
        })
    }
}
