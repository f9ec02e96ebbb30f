//! Unblock-grant lookup.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use qg_domain::{StoreResult, UnblockStatus};
use qg_store::OverrideStore;

use crate::bounded::bounded;

pub struct OverrideChecker {
    store: Arc<dyn OverrideStore>,
    timeout: Duration,
}

impl OverrideChecker {
    pub fn new(store: Arc<dyn OverrideStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Whether `identifier` holds a grant that is still active at `now`.
    /// Lapsed grants are reported as `expired` and otherwise ignored.
    pub async fn status(&self, identifier: &str, now: DateTime<Utc>) -> StoreResult<UnblockStatus> {
        let grant = bounded("override.get", self.timeout, self.store.get(identifier)).await?;
        let status = UnblockStatus::evaluate(grant.as_ref(), now);
        if status.expired == Some(true) {
            tracing::debug!(identifier, "unblock grant has expired");
        }
        Ok(status)
    }
}
