//! Effective-policy resolution across User, Group, and Default scopes.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::try_join_all;

use qg_domain::{PolicyKey, QuotaPolicy, StoreResult};
use qg_store::PolicyStore;

use crate::bounded::bounded;

/// Picks the single policy governing an identity.
///
/// Precedence, first match wins:
/// 1. the identity's own enabled User policy;
/// 2. the most restrictive enabled Group policy among its groups (lowest
///    `monthly_token_limit`, ties to the lexicographically smallest group);
/// 3. the enabled Default policy;
/// 4. nothing, meaning the identity is unlimited.
pub struct PolicyResolver {
    store: Arc<dyn PolicyStore>,
    timeout: Duration,
}

impl PolicyResolver {
    pub fn new(store: Arc<dyn PolicyStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    pub async fn resolve(
        &self,
        identifier: &str,
        groups: &[String],
    ) -> StoreResult<Option<QuotaPolicy>> {
        if let Some(policy) = self.enabled(PolicyKey::user(identifier)).await? {
            tracing::debug!(identifier, "resolved user policy");
            return Ok(Some(policy));
        }

        let mut names: Vec<&str> = groups
            .iter()
            .map(|g| g.trim())
            .filter(|g| !g.is_empty())
            .collect();
        names.sort_unstable();
        names.dedup();

        if !names.is_empty() {
            let lookups = names.iter().map(|g| self.enabled(PolicyKey::group(*g)));
            let strictest = try_join_all(lookups)
                .await?
                .into_iter()
                .flatten()
                .min_by(|a, b| {
                    a.monthly_token_limit
                        .cmp(&b.monthly_token_limit)
                        .then_with(|| a.identifier.cmp(&b.identifier))
                });
            if let Some(policy) = strictest {
                tracing::debug!(identifier, group = %policy.identifier, "resolved group policy");
                return Ok(Some(policy));
            }
        }

        if let Some(policy) = self.enabled(PolicyKey::default_scope()).await? {
            tracing::debug!(identifier, "resolved default policy");
            return Ok(Some(policy));
        }

        tracing::debug!(identifier, "no policy applies");
        Ok(None)
    }

    async fn enabled(&self, key: PolicyKey) -> StoreResult<Option<QuotaPolicy>> {
        let found = bounded("policy.get", self.timeout, self.store.get(&key)).await?;
        Ok(found.filter(|p| p.enabled))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use qg_domain::{NewPolicy, PolicyScope};
    use qg_store::MemoryPolicyStore;

    fn policy(scope: PolicyScope, id: &str, monthly: u64) -> QuotaPolicy {
        QuotaPolicy::from_new(NewPolicy::new(scope, id, monthly), Utc::now())
    }

    fn disabled(scope: PolicyScope, id: &str, monthly: u64) -> QuotaPolicy {
        let mut p = policy(scope, id, monthly);
        p.enabled = false;
        p
    }

    fn resolver(store: Arc<MemoryPolicyStore>) -> PolicyResolver {
        PolicyResolver::new(store, Duration::from_millis(200))
    }

    fn groups(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn user_beats_group_and_default() {
        let store = Arc::new(MemoryPolicyStore::new());
        store.insert(policy(PolicyScope::User, "a@x.io", 5000));
        store.insert(policy(PolicyScope::Group, "eng", 10));
        store.insert(policy(PolicyScope::Default, "default", 1));

        let p = resolver(store)
            .resolve("a@x.io", &groups(&["eng"]))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(p.scope, PolicyScope::User);
        assert_eq!(p.monthly_token_limit, 5000);
    }

    #[tokio::test]
    async fn lowest_group_limit_wins() {
        let store = Arc::new(MemoryPolicyStore::new());
        store.insert(policy(PolicyScope::Group, "eng", 1000));
        store.insert(policy(PolicyScope::Group, "contractors", 500));

        let p = resolver(store)
            .resolve("a@x.io", &groups(&["eng", "contractors"]))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(p.identifier, "contractors");
        assert_eq!(p.monthly_token_limit, 500);
    }

    #[tokio::test]
    async fn group_tie_goes_to_smallest_name() {
        let store = Arc::new(MemoryPolicyStore::new());
        store.insert(policy(PolicyScope::Group, "zeta", 500));
        store.insert(policy(PolicyScope::Group, "alpha", 500));

        for order in [["zeta", "alpha"], ["alpha", "zeta"]] {
            let p = resolver(store.clone())
                .resolve("a@x.io", &groups(&order))
                .await
                .unwrap()
                .unwrap();
            assert_eq!(p.identifier, "alpha");
        }
    }

    #[tokio::test]
    async fn disabled_policies_are_skipped() {
        let store = Arc::new(MemoryPolicyStore::new());
        store.insert(disabled(PolicyScope::User, "a@x.io", 1));
        store.insert(disabled(PolicyScope::Group, "eng", 1));
        store.insert(policy(PolicyScope::Default, "default", 777));

        let p = resolver(store)
            .resolve("a@x.io", &groups(&["eng"]))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(p.scope, PolicyScope::Default);
        assert_eq!(p.monthly_token_limit, 777);
    }

    #[tokio::test]
    async fn unknown_groups_fall_through_to_default() {
        let store = Arc::new(MemoryPolicyStore::new());
        store.insert(policy(PolicyScope::Default, "default", 100));

        let p = resolver(store)
            .resolve("a@x.io", &groups(&["nobody", " ", ""]))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(p.scope, PolicyScope::Default);
    }

    #[tokio::test]
    async fn nothing_configured_is_none() {
        let store = Arc::new(MemoryPolicyStore::new());
        store.insert(disabled(PolicyScope::Default, "default", 100));
        let p = resolver(store).resolve("a@x.io", &[]).await.unwrap();
        assert!(p.is_none());
    }

    #[tokio::test]
    async fn store_failure_propagates() {
        let store = Arc::new(MemoryPolicyStore::new());
        store.faults().set_unavailable(true);
        assert!(resolver(store).resolve("a@x.io", &[]).await.is_err());
    }
}
