//! File-backed stores: persistence across reopen and externally written
//! usage/override documents.

use chrono::{DateTime, Utc};
use qg_domain::config::{StoreBackend, StoreConfig};
use qg_domain::{NewPolicy, PolicyKey, PolicyScope, PolicyUpdate, QuotaPolicy, StoreError};
use qg_store::{FileOverrideStore, FilePolicyStore, FileUsageStore, OverrideStore, PolicyStore, UsageStore};
use rust_decimal::Decimal;

fn now() -> DateTime<Utc> {
    "2026-03-14T09:00:00Z".parse().unwrap()
}

fn policy(scope: PolicyScope, id: &str, monthly: u64) -> QuotaPolicy {
    QuotaPolicy::from_new(NewPolicy::new(scope, id, monthly), now())
}

#[tokio::test]
async fn policies_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
        let store = FilePolicyStore::open(dir.path()).unwrap();
        assert!(store.put_if_absent(policy(PolicyScope::Group, "eng", 500)).await.unwrap());
        assert!(store.put_if_absent(policy(PolicyScope::Default, "default", 1000)).await.unwrap());
    }

    let store = FilePolicyStore::open(dir.path()).unwrap();
    let all = store.query(None).await.unwrap();
    assert_eq!(all.len(), 2);
    let eng = store.get(&PolicyKey::group("eng")).await.unwrap().unwrap();
    assert_eq!(eng.monthly_token_limit, 500);
}

#[tokio::test]
async fn conditional_writes_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let store = FilePolicyStore::open(dir.path()).unwrap();

    assert!(store.put_if_absent(policy(PolicyScope::User, "a@x.io", 10)).await.unwrap());
    assert!(!store.put_if_absent(policy(PolicyScope::User, "a@x.io", 99)).await.unwrap());

    let patch = PolicyUpdate {
        monthly_token_limit: Some(2000),
        ..Default::default()
    }
    .into_patch(now());
    let updated = store
        .update_if_exists(&PolicyKey::user("a@x.io"), &patch)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.monthly_token_limit, 2000);
    assert_eq!(updated.warning_threshold_80, 1600);

    let missing = store
        .update_if_exists(&PolicyKey::user("b@x.io"), &patch)
        .await
        .unwrap();
    assert!(missing.is_none());

    let reopened = FilePolicyStore::open(dir.path()).unwrap();
    let stored = reopened.get(&PolicyKey::user("a@x.io")).await.unwrap().unwrap();
    assert_eq!(stored.monthly_token_limit, 2000);

    assert!(reopened.delete(&PolicyKey::user("a@x.io")).await.unwrap());
    assert!(!reopened.delete(&PolicyKey::user("a@x.io")).await.unwrap());
    let again = FilePolicyStore::open(dir.path()).unwrap();
    assert!(again.query(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn corrupt_policy_file_fails_to_open() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("policies.json"), "{ not json").unwrap();
    let err = FilePolicyStore::open(dir.path()).err().unwrap();
    assert!(matches!(err, StoreError::Json(_)));
}

#[tokio::test]
async fn usage_file_is_reread_on_every_lookup() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileUsageStore::new(dir.path());

    assert!(store.get("a@x.io", "2026-03").await.unwrap().is_none());

    std::fs::write(
        dir.path().join("usage.json"),
        r#"[
            {"identifier":"a@x.io","month_key":"2026-03","total_tokens":1200,
             "daily_tokens":300,"daily_date":"2026-03-14","estimated_cost":"4.20"},
            {"identifier":"a@x.io","month_key":"2026-02","total_tokens":99}
        ]"#,
    )
    .unwrap();

    let rec = store.get("a@x.io", "2026-03").await.unwrap().unwrap();
    assert_eq!(rec.total_tokens, 1200);
    assert_eq!(rec.daily_tokens, 300);
    assert_eq!(rec.estimated_cost, "4.20".parse::<Decimal>().unwrap());
    assert!(store.get("b@x.io", "2026-03").await.unwrap().is_none());
}

#[tokio::test]
async fn latest_expiring_override_wins() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("overrides.json"),
        r#"[
            {"identifier":"a@x.io","expires_at":"2026-03-14T10:00:00Z",
             "granted_by":"root@x.io","granted_at":"2026-03-13T10:00:00Z"},
            {"identifier":"a@x.io","expires_at":"2026-03-20T10:00:00Z",
             "granted_by":"ops@x.io","granted_at":"2026-03-14T08:00:00Z","reason":"launch"}
        ]"#,
    )
    .unwrap();

    let store = FileOverrideStore::new(dir.path());
    let grant = store.get("a@x.io").await.unwrap().unwrap();
    assert_eq!(grant.granted_by, "ops@x.io");
    assert_eq!(grant.reason.as_deref(), Some("launch"));
    assert!(store.get("b@x.io").await.unwrap().is_none());
}

#[tokio::test]
async fn open_builds_file_backend() {
    let dir = tempfile::tempdir().unwrap();
    let config = StoreConfig {
        backend: StoreBackend::File,
        state_path: dir.path().to_path_buf(),
        timeout_ms: 100,
    };
    let stores = qg_store::open(&config).unwrap();
    assert!(stores
        .policies
        .put_if_absent(policy(PolicyScope::Group, "eng", 1))
        .await
        .unwrap());
    assert!(dir.path().join("policies.json").exists());
}

#[tokio::test]
async fn stores_sharing_a_directory_see_each_others_writes() {
    let dir = tempfile::tempdir().unwrap();
    let a = FilePolicyStore::open(dir.path()).unwrap();
    let b = FilePolicyStore::open(dir.path()).unwrap();

    assert!(a.put_if_absent(policy(PolicyScope::Group, "eng", 500)).await.unwrap());
    assert!(!b.put_if_absent(policy(PolicyScope::Group, "eng", 900)).await.unwrap());

    assert!(b.put_if_absent(policy(PolicyScope::Group, "ops", 100)).await.unwrap());
    assert!(a.put_if_absent(policy(PolicyScope::User, "a@x.io", 10)).await.unwrap());
    assert_eq!(a.query(None).await.unwrap().len(), 3);
    assert_eq!(b.query(None).await.unwrap().len(), 3);

    let patch = PolicyUpdate {
        enabled: Some(false),
        ..Default::default()
    }
    .into_patch(now());
    let updated = b
        .update_if_exists(&PolicyKey::group("eng"), &patch)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.monthly_token_limit, 500);
    assert!(!a.get(&PolicyKey::group("eng")).await.unwrap().unwrap().enabled);

    assert!(a.delete(&PolicyKey::group("ops")).await.unwrap());
    assert!(!b.delete(&PolicyKey::group("ops")).await.unwrap());
    assert!(b.get(&PolicyKey::group("ops")).await.unwrap().is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_creates_across_stores_admit_one() {
    let dir = tempfile::tempdir().unwrap();
    let stores: Vec<_> = (0..4)
        .map(|_| std::sync::Arc::new(FilePolicyStore::open(dir.path()).unwrap()))
        .collect();

    let mut handles = Vec::new();
    for (i, store) in stores.iter().cycle().take(16).enumerate() {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store
                .put_if_absent(policy(PolicyScope::User, "a@x.io", 10 + i as u64))
                .await
                .unwrap()
        }));
    }
    let mut admitted = 0;
    for handle in handles {
        if handle.await.unwrap() {
            admitted += 1;
        }
    }
    assert_eq!(admitted, 1);

    let raw = std::fs::read_to_string(dir.path().join("policies.json")).unwrap();
    let on_disk: Vec<QuotaPolicy> = serde_json::from_str(&raw).unwrap();
    assert_eq!(on_disk.len(), 1);
}

#[tokio::test]
async fn inverted_thresholds_are_not_written() {
    let dir = tempfile::tempdir().unwrap();
    let store = FilePolicyStore::open(dir.path()).unwrap();
    store.put_if_absent(policy(PolicyScope::User, "a@x.io", 1000)).await.unwrap();

    let patch = PolicyUpdate {
        warning_threshold_80: Some(950),
        ..Default::default()
    }
    .into_patch(now());
    let err = store
        .update_if_exists(&PolicyKey::user("a@x.io"), &patch)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Rejected(_)));

    let stored = store.get(&PolicyKey::user("a@x.io")).await.unwrap().unwrap();
    assert_eq!(stored.warning_threshold_80, 800);
}
