//! Process-local stores backed by lock-protected maps.
//!
//! Every store carries a [`Faults`] switchboard so callers can simulate an
//! unreachable or slow backend without a real one.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;

use qg_domain::{
    PolicyKey, PolicyPatch, PolicyScope, QuotaPolicy, StoreError, StoreResult, UnblockOverride,
    UsageRecord,
};

use crate::{OverrideStore, PolicyStore, UsageStore};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Fault injection
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Simulated backend failure modes.
#[derive(Debug, Default)]
pub struct Faults {
    unavailable: AtomicBool,
    latency_ms: AtomicU64,
}

impl Faults {
    /// Make every subsequent call fail with [`StoreError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Delay every subsequent call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    async fn enter(&self, store: &str) -> StoreResult<()> {
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(format!("{store} store is offline")));
        }
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Policies
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Default)]
pub struct MemoryPolicyStore {
    policies: RwLock<HashMap<PolicyKey, QuotaPolicy>>,
    faults: Faults,
}

impl MemoryPolicyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed or replace a policy, bypassing conditional-write checks.
    pub fn insert(&self, policy: QuotaPolicy) {
        self.policies.write().insert(policy.key(), policy);
    }

    pub fn faults(&self) -> &Faults {
        &self.faults
    }
}

#[async_trait]
impl PolicyStore for MemoryPolicyStore {
    async fn get(&self, key: &PolicyKey) -> StoreResult<Option<QuotaPolicy>> {
        self.faults.enter("policy").await?;
        Ok(self.policies.read().get(key).cloned())
    }

    async fn put_if_absent(&self, policy: QuotaPolicy) -> StoreResult<bool> {
        self.faults.enter("policy").await?;
        let mut policies = self.policies.write();
        let key = policy.key();
        if policies.contains_key(&key) {
            return Ok(false);
        }
        policies.insert(key, policy);
        Ok(true)
    }

    async fn update_if_exists(
        &self,
        key: &PolicyKey,
        patch: &PolicyPatch,
    ) -> StoreResult<Option<QuotaPolicy>> {
        self.faults.enter("policy").await?;
        let mut policies = self.policies.write();
        match policies.get_mut(key) {
            Some(policy) => {
                patch.apply(policy)?;
                Ok(Some(policy.clone()))
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, key: &PolicyKey) -> StoreResult<bool> {
        self.faults.enter("policy").await?;
        Ok(self.policies.write().remove(key).is_some())
    }

    async fn query(&self, scope: Option<PolicyScope>) -> StoreResult<Vec<QuotaPolicy>> {
        self.faults.enter("policy").await?;
        Ok(self
            .policies
            .read()
            .values()
            .filter(|p| scope.map_or(true, |s| p.scope == s))
            .cloned()
            .collect())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Usage
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Default)]
pub struct MemoryUsageStore {
    /// Keyed by `(identifier, month_key)`.
    records: RwLock<HashMap<(String, String), UsageRecord>>,
    faults: Faults,
}

impl MemoryUsageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stand-in for the aggregation pipeline: seed or replace a record.
    pub fn put(&self, record: UsageRecord) {
        let key = (record.identifier.clone(), record.month_key.clone());
        self.records.write().insert(key, record);
    }

    pub fn faults(&self) -> &Faults {
        &self.faults
    }
}

#[async_trait]
impl UsageStore for MemoryUsageStore {
    async fn get(&self, identifier: &str, month_key: &str) -> StoreResult<Option<UsageRecord>> {
        self.faults.enter("usage").await?;
        Ok(self
            .records
            .read()
            .get(&(identifier.to_string(), month_key.to_string()))
            .cloned())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Overrides
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Default)]
pub struct MemoryOverrideStore {
    grants: RwLock<HashMap<String, UnblockOverride>>,
    faults: Faults,
}

impl MemoryOverrideStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a grant, replacing any previous one for the same identity.
    pub fn put(&self, grant: UnblockOverride) {
        self.grants.write().insert(grant.identifier.clone(), grant);
    }

    pub fn faults(&self) -> &Faults {
        &self.faults
    }
}

#[async_trait]
impl OverrideStore for MemoryOverrideStore {
    async fn get(&self, identifier: &str) -> StoreResult<Option<UnblockOverride>> {
        self.faults.enter("override").await?;
        Ok(self.grants.read().get(identifier).cloned())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
