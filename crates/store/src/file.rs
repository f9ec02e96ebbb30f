//! JSON-file stores rooted at `[store].state_path`.
//!
//! - `policies.json`: owned by QuotaGate; rewritten on every administrative
//!   change under an exclusive lock on `policies.lock`, so several processes
//!   may share one state directory.
//! - `usage.json`, `overrides.json`: owned by external writers; re-read on
//!   every lookup so their updates are seen immediately.

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use fs2::FileExt;
use serde::de::DeserializeOwned;

use qg_domain::{
    PolicyKey, PolicyPatch, PolicyScope, QuotaPolicy, StoreError, StoreResult, UnblockOverride,
    UsageRecord,
};

use crate::{OverrideStore, PolicyStore, UsageStore};

const POLICIES_FILE: &str = "policies.json";
const POLICIES_LOCK: &str = "policies.lock";
const USAGE_FILE: &str = "usage.json";
const OVERRIDES_FILE: &str = "overrides.json";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Policies
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

type PolicyMap = HashMap<PolicyKey, QuotaPolicy>;

/// Policy store persisted as a JSON array in `policies.json`.
///
/// Nothing is cached: reads parse the file, and each write re-reads it while
/// holding an exclusive OS lock on `policies.lock`, applies its check, and
/// replaces the file via temp file + rename.  Conditional writes are
/// therefore atomic across every store (and process) sharing the directory,
/// and readers never observe a half-written file.
pub struct FilePolicyStore {
    path: PathBuf,
    lock_path: PathBuf,
}

impl FilePolicyStore {
    /// Open `state_path/policies.json`, which may not exist yet.  An existing
    /// file must parse.
    pub fn open(state_path: &Path) -> StoreResult<Self> {
        let path = state_path.join(POLICIES_FILE);
        let policies = load_policies(&path)?;
        tracing::info!(
            policies = policies.len(),
            path = %path.display(),
            "policy store loaded"
        );

        Ok(Self {
            path,
            lock_path: state_path.join(POLICIES_LOCK),
        })
    }

    async fn load(&self) -> StoreResult<Vec<QuotaPolicy>> {
        read_array(&self.path).await
    }

    /// Run `op` against the current on-disk policies while holding the
    /// exclusive lock.  `op` returns its result and whether the map changed;
    /// a changed map is written back before the lock is released.
    ///
    /// The work runs on the blocking pool and completes even when the caller
    /// stops waiting for it, so a timed-out write still lands whole.
    async fn transact<T, F>(&self, op: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut PolicyMap) -> StoreResult<(T, bool)> + Send + 'static,
    {
        let path = self.path.clone();
        let lock_path = self.lock_path.clone();
        tokio::task::spawn_blocking(move || -> StoreResult<T> {
            if let Some(parent) = lock_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let lock = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(&lock_path)?;
            // Lock is released when `lock` is dropped.
            FileExt::lock_exclusive(&lock)?;

            let mut policies = load_policies(&path)?;
            let (out, changed) = op(&mut policies)?;
            if changed {
                save_policies(&path, &policies)?;
            }
            Ok(out)
        })
        .await
        .map_err(|e| StoreError::Backend(format!("policy write task failed: {e}")))?
    }
}

fn load_policies(path: &Path) -> StoreResult<PolicyMap> {
    let policies: Vec<QuotaPolicy> = match std::fs::read_to_string(path) {
        Ok(raw) => serde_json::from_str(&raw)?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
        Err(e) => return Err(e.into()),
    };
    Ok(policies.into_iter().map(|p| (p.key(), p)).collect())
}

fn save_policies(path: &Path, policies: &PolicyMap) -> StoreResult<()> {
    let mut docs: Vec<&QuotaPolicy> = policies.values().collect();
    docs.sort_by(|a, b| (a.scope, &a.identifier).cmp(&(b.scope, &b.identifier)));
    let json = serde_json::to_string_pretty(&docs)?;

    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[async_trait]
impl PolicyStore for FilePolicyStore {
    async fn get(&self, key: &PolicyKey) -> StoreResult<Option<QuotaPolicy>> {
        Ok(self.load().await?.into_iter().find(|p| p.key() == *key))
    }

    async fn put_if_absent(&self, policy: QuotaPolicy) -> StoreResult<bool> {
        self.transact(move |policies| {
            let key = policy.key();
            if policies.contains_key(&key) {
                return Ok((false, false));
            }
            policies.insert(key, policy);
            Ok((true, true))
        })
        .await
    }

    async fn update_if_exists(
        &self,
        key: &PolicyKey,
        patch: &PolicyPatch,
    ) -> StoreResult<Option<QuotaPolicy>> {
        let key = key.clone();
        let patch = patch.clone();
        self.transact(move |policies| match policies.get_mut(&key) {
            Some(policy) => {
                patch.apply(policy)?;
                Ok((Some(policy.clone()), true))
            }
            None => Ok((None, false)),
        })
        .await
    }

    async fn delete(&self, key: &PolicyKey) -> StoreResult<bool> {
        let key = key.clone();
        self.transact(move |policies| {
            let removed = policies.remove(&key).is_some();
            Ok((removed, removed))
        })
        .await
    }

    async fn query(&self, scope: Option<PolicyScope>) -> StoreResult<Vec<QuotaPolicy>> {
        Ok(self
            .load()
            .await?
            .into_iter()
            .filter(|p| scope.map_or(true, |s| p.scope == s))
            .collect())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Externally written documents
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Read a JSON array, treating a missing file as empty.
async fn read_array<T: DeserializeOwned>(path: &Path) -> StoreResult<Vec<T>> {
    match tokio::fs::read_to_string(path).await {
        Ok(raw) => Ok(serde_json::from_str(&raw)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

/// Usage ledger read from `usage.json` (array of usage records).
pub struct FileUsageStore {
    path: PathBuf,
}

impl FileUsageStore {
    pub fn new(state_path: &Path) -> Self {
        Self {
            path: state_path.join(USAGE_FILE),
        }
    }
}

#[async_trait]
impl UsageStore for FileUsageStore {
    async fn get(&self, identifier: &str, month_key: &str) -> StoreResult<Option<UsageRecord>> {
        let records: Vec<UsageRecord> = read_array(&self.path).await?;
        Ok(records
            .into_iter()
            .find(|r| r.identifier == identifier && r.month_key == month_key))
    }
}

/// Unblock grants read from `overrides.json` (array of grants).
pub struct FileOverrideStore {
    path: PathBuf,
}

impl FileOverrideStore {
    pub fn new(state_path: &Path) -> Self {
        Self {
            path: state_path.join(OVERRIDES_FILE),
        }
    }
}

#[async_trait]
impl OverrideStore for FileOverrideStore {
    /// With several grants for one identity, the latest-expiring one counts.
    async fn get(&self, identifier: &str) -> StoreResult<Option<UnblockOverride>> {
        let grants: Vec<UnblockOverride> = read_array(&self.path).await?;
        Ok(grants
            .into_iter()
            .filter(|g| g.identifier == identifier)
            .max_by_key(|g| g.expires_at))
    }
}
