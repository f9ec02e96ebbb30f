//! Policy administration against both store backends.

use std::sync::Arc;
use std::time::Duration;

use qg_domain::{
    EnforcementMode, Error, NewPolicy, PolicyScope, PolicyUpdate, QuotaPolicy, StoreError,
};
use qg_engine::PolicyAdmin;
use qg_store::{FilePolicyStore, MemoryPolicyStore};

fn memory_admin() -> PolicyAdmin {
    PolicyAdmin::new(Arc::new(MemoryPolicyStore::new()), Duration::from_millis(200))
}

#[tokio::test]
async fn duplicate_create_is_rejected() {
    let admin = memory_admin();
    admin
        .create(NewPolicy::new(PolicyScope::Group, "eng", 1000))
        .await
        .unwrap();

    let err = admin
        .create(NewPolicy::new(PolicyScope::Group, "eng", 5))
        .await
        .unwrap_err();
    match err {
        Error::PolicyAlreadyExists(key) => assert_eq!(key.to_string(), "group:eng"),
        other => panic!("expected PolicyAlreadyExists, got {other:?}"),
    }

    let stored = admin.get(PolicyScope::Group, "eng").await.unwrap().unwrap();
    assert_eq!(stored.monthly_token_limit, 1000);
}

#[tokio::test]
async fn update_of_missing_policy_is_not_found() {
    let admin = memory_admin();
    let err = admin
        .update(
            PolicyScope::User,
            "ghost@example.com",
            PolicyUpdate {
                monthly_token_limit: Some(10),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::PolicyNotFound(_)));
}

#[tokio::test]
async fn update_rederives_thresholds_unless_supplied() {
    let admin = memory_admin();
    admin
        .create(NewPolicy::new(PolicyScope::User, "a@example.com", 1000))
        .await
        .unwrap();

    let p = admin
        .update(
            PolicyScope::User,
            "a@example.com",
            PolicyUpdate {
                monthly_token_limit: Some(2000),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!((p.warning_threshold_80, p.warning_threshold_90), (1600, 1800));

    let p = admin
        .update(
            PolicyScope::User,
            "a@example.com",
            PolicyUpdate {
                monthly_token_limit: Some(5000),
                warning_threshold_80: Some(100),
                warning_threshold_90: Some(200),
                enforcement_mode: Some(EnforcementMode::Block),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!((p.warning_threshold_80, p.warning_threshold_90), (100, 200));
    assert_eq!(p.monthly_token_limit, 5000);
    assert_eq!(p.enforcement_mode, EnforcementMode::Block);
}

#[tokio::test]
async fn validation_errors_on_update() {
    let admin = memory_admin();
    admin
        .create(NewPolicy::new(PolicyScope::User, "a@example.com", 1000))
        .await
        .unwrap();

    let err = admin
        .update(
            PolicyScope::User,
            "a@example.com",
            PolicyUpdate {
                monthly_cost_limit: Some("-1".parse().unwrap()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}

#[tokio::test]
async fn delete_reports_existence() {
    let admin = memory_admin();
    admin
        .create(NewPolicy::new(PolicyScope::Default, "", 100))
        .await
        .unwrap();

    assert!(admin.delete(PolicyScope::Default, "default").await.unwrap());
    assert!(!admin.delete(PolicyScope::Default, "default").await.unwrap());
    assert!(admin.list(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn file_backed_admin_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let timeout = Duration::from_millis(500);
    {
        let admin = PolicyAdmin::new(Arc::new(FilePolicyStore::open(dir.path()).unwrap()), timeout);
        let mut new = NewPolicy::new(PolicyScope::User, "a@example.com", 1_000_000);
        new.daily_token_limit = Some(50_000);
        new.monthly_cost_limit = Some("100.00".parse().unwrap());
        new.enforcement_mode = EnforcementMode::Block;
        admin.create(new).await.unwrap();
    }

    let admin = PolicyAdmin::new(Arc::new(FilePolicyStore::open(dir.path()).unwrap()), timeout);
    let p = admin
        .get(PolicyScope::User, "a@example.com")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(p.daily_token_limit, Some(50_000));
    assert_eq!(p.monthly_cost_limit, Some("100.00".parse().unwrap()));
    assert_eq!(p.enforcement_mode, EnforcementMode::Block);
}

#[tokio::test]
async fn concurrent_creates_admit_exactly_one() {
    let admin = Arc::new(memory_admin());
    let handles: Vec<_> = (0..16u64)
        .map(|i| {
            let admin = admin.clone();
            tokio::spawn(async move {
                admin
                    .create(NewPolicy::new(PolicyScope::Group, "eng", 100 + i))
                    .await
            })
        })
        .collect();

    let mut created = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => created += 1,
            Err(Error::PolicyAlreadyExists(_)) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }
    assert_eq!(created, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn timed_out_write_still_lands_and_is_not_undone() {
    let dir = tempfile::tempdir().unwrap();
    let seeded: Vec<QuotaPolicy> = (0..5_000)
        .map(|i| {
            QuotaPolicy::from_new(
                NewPolicy::new(PolicyScope::User, format!("u{i}@example.com"), 1000),
                chrono::Utc::now(),
            )
        })
        .collect();
    std::fs::write(
        dir.path().join("policies.json"),
        serde_json::to_string_pretty(&seeded).unwrap(),
    )
    .unwrap();

    let store = Arc::new(FilePolicyStore::open(dir.path()).unwrap());
    let impatient = PolicyAdmin::new(store.clone(), Duration::ZERO);
    let patient = PolicyAdmin::new(store, Duration::from_secs(10));

    match impatient.delete(PolicyScope::User, "u0@example.com").await {
        Ok(removed) => assert!(removed),
        Err(Error::Store(StoreError::Timeout { .. })) => {}
        Err(other) => panic!("unexpected error: {other:?}"),
    }
    patient
        .create(NewPolicy::new(PolicyScope::Group, "eng", 500))
        .await
        .unwrap();

    let mut gone = false;
    for _ in 0..200 {
        if patient.get(PolicyScope::User, "u0@example.com").await.unwrap().is_none() {
            gone = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    assert!(gone, "timed-out delete never reached the file");

    // A later write must not bring the deleted policy back.
    patient
        .create(NewPolicy::new(PolicyScope::Group, "ops", 500))
        .await
        .unwrap();
    let raw = std::fs::read_to_string(dir.path().join("policies.json")).unwrap();
    let on_disk: Vec<QuotaPolicy> = serde_json::from_str(&raw).unwrap();
    assert_eq!(on_disk.len(), 5_001);
    assert!(on_disk.iter().all(|p| p.identifier != "u0@example.com"));
    assert!(on_disk.iter().any(|p| p.identifier == "eng"));
}
