//! `qg-store`: storage contracts for QuotaGate and two implementations.
//!
//! The decision engine and policy administration only ever see the three
//! traits below.  Backends:
//!
//! | Backend  | Types                 | Best for                          |
//! |----------|-----------------------|-----------------------------------|
//! | `memory` | [`MemoryPolicyStore`] etc. | Tests, embedding, simulations |
//! | `file`   | [`FilePolicyStore`] etc.   | CLI, single-host deployments  |
//!
//! Use [`open`] to build the set selected by `[store].backend`.

pub mod file;
pub mod memory;

pub use file::{FileOverrideStore, FilePolicyStore, FileUsageStore};
pub use memory::{MemoryOverrideStore, MemoryPolicyStore, MemoryUsageStore};

use std::sync::Arc;

use async_trait::async_trait;
use qg_domain::config::{StoreBackend, StoreConfig};
use qg_domain::{
    PolicyKey, PolicyPatch, PolicyScope, QuotaPolicy, StoreResult, UnblockOverride, UsageRecord,
};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Contracts
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Keyed policy documents, one per `(scope, identifier)`.
///
/// Writes are conditional so that concurrent administrators cannot silently
/// overwrite each other.
#[async_trait]
pub trait PolicyStore: Send + Sync {
    async fn get(&self, key: &PolicyKey) -> StoreResult<Option<QuotaPolicy>>;

    /// Insert only when no record exists for the policy's key.
    /// Returns `false` when one already did.
    async fn put_if_absent(&self, policy: QuotaPolicy) -> StoreResult<bool>;

    /// Apply `patch` only when a record exists.  Returns the updated record.
    async fn update_if_exists(
        &self,
        key: &PolicyKey,
        patch: &PolicyPatch,
    ) -> StoreResult<Option<QuotaPolicy>>;

    /// Returns whether a record existed and was removed.
    async fn delete(&self, key: &PolicyKey) -> StoreResult<bool>;

    async fn query(&self, scope: Option<PolicyScope>) -> StoreResult<Vec<QuotaPolicy>>;
}

/// Per-identity monthly usage counters.  Read-only from QuotaGate's side.
#[async_trait]
pub trait UsageStore: Send + Sync {
    async fn get(&self, identifier: &str, month_key: &str) -> StoreResult<Option<UsageRecord>>;
}

/// Per-identity unblock grants.  Read-only from QuotaGate's side.
#[async_trait]
pub trait OverrideStore: Send + Sync {
    async fn get(&self, identifier: &str) -> StoreResult<Option<UnblockOverride>>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Store set
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The three backends a QuotaGate instance reads from.
#[derive(Clone)]
pub struct Stores {
    pub policies: Arc<dyn PolicyStore>,
    pub usage: Arc<dyn UsageStore>,
    pub overrides: Arc<dyn OverrideStore>,
}

/// Build the store set selected by `config.backend`.
pub fn open(config: &StoreConfig) -> StoreResult<Stores> {
    let stores = match config.backend {
        StoreBackend::Memory => Stores {
            policies: Arc::new(MemoryPolicyStore::new()),
            usage: Arc::new(MemoryUsageStore::new()),
            overrides: Arc::new(MemoryOverrideStore::new()),
        },
        StoreBackend::File => Stores {
            policies: Arc::new(FilePolicyStore::open(&config.state_path)?),
            usage: Arc::new(FileUsageStore::new(&config.state_path)),
            overrides: Arc::new(FileOverrideStore::new(&config.state_path)),
        },
    };
    tracing::debug!(backend = ?config.backend, "stores opened");
    Ok(stores)
}
