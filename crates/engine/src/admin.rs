//! Policy administration: validated CRUD over the policy store.
//!
//! Unlike the decision path these operations fail closed: validation
//! problems, conflicts, and store errors (timeouts included) are returned
//! to the caller as typed [`Error`]s.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use qg_domain::{
    Error, NewPolicy, PolicyKey, PolicyScope, PolicyUpdate, QuotaPolicy, Result, StoreError,
};
use qg_store::PolicyStore;

use crate::bounded::bounded;

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub struct PolicyAdmin {
    store: Arc<dyn PolicyStore>,
    timeout: Duration,
    clock: Clock,
}

impl PolicyAdmin {
    pub fn new(store: Arc<dyn PolicyStore>, timeout: Duration) -> Self {
        Self {
            store,
            timeout,
            clock: Arc::new(Utc::now),
        }
    }

    /// Replace the wall clock used for `created_at` / `updated_at`.
    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Create a policy.  Unspecified warning thresholds are derived from the
    /// monthly limit; Default-scope identifiers are normalized.
    pub async fn create(&self, new: NewPolicy) -> Result<QuotaPolicy> {
        new.validate()?;
        let policy = QuotaPolicy::from_new(new, (self.clock)());
        let key = policy.key();

        let inserted = bounded(
            "policy.put_if_absent",
            self.timeout,
            self.store.put_if_absent(policy.clone()),
        )
        .await?;
        if !inserted {
            return Err(Error::PolicyAlreadyExists(key));
        }

        tracing::info!(
            policy = %key,
            monthly_limit = policy.monthly_token_limit,
            mode = %policy.enforcement_mode,
            "quota policy created"
        );
        Ok(policy)
    }

    pub async fn get(&self, scope: PolicyScope, identifier: &str) -> Result<Option<QuotaPolicy>> {
        let key = PolicyKey::new(scope, identifier);
        Ok(bounded("policy.get", self.timeout, self.store.get(&key)).await?)
    }

    /// Apply a partial update and return the stored result.  An update that
    /// would leave the stored thresholds out of order is a validation error.
    pub async fn update(
        &self,
        scope: PolicyScope,
        identifier: &str,
        update: PolicyUpdate,
    ) -> Result<QuotaPolicy> {
        update.validate()?;
        let key = PolicyKey::new(scope, identifier);
        let patch = update.into_patch((self.clock)());

        let updated = bounded(
            "policy.update_if_exists",
            self.timeout,
            self.store.update_if_exists(&key, &patch),
        )
        .await
        .map_err(|e| match e {
            StoreError::Rejected(msg) => Error::Validation(msg),
            e => Error::Store(e),
        })?
        .ok_or_else(|| Error::PolicyNotFound(key.clone()))?;

        tracing::info!(policy = %key, "quota policy updated");
        Ok(updated)
    }

    /// Returns whether a policy existed and was removed.
    pub async fn delete(&self, scope: PolicyScope, identifier: &str) -> Result<bool> {
        let key = PolicyKey::new(scope, identifier);
        let removed = bounded("policy.delete", self.timeout, self.store.delete(&key)).await?;
        if removed {
            tracing::info!(policy = %key, "quota policy deleted");
        } else {
            tracing::debug!(policy = %key, "delete of missing quota policy");
        }
        Ok(removed)
    }

    /// All stored policies, optionally restricted to one scope, ordered by
    /// scope then identifier.
    pub async fn list(&self, scope: Option<PolicyScope>) -> Result<Vec<QuotaPolicy>> {
        let mut policies = bounded("policy.query", self.timeout, self.store.query(scope)).await?;
        policies.sort_by(|a, b| {
            a.scope
                .cmp(&b.scope)
                .then_with(|| a.identifier.cmp(&b.identifier))
        });
        Ok(policies)
    }
}
