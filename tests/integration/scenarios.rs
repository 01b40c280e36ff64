use super::helpers::test_engine;
use mindforge::coordinator::{BacklogOrigin, BacklogStatus, Coordinator};
use mindforge::mastermind::Finding;
use mindforge::resource::ResourceGuard;
use mindforge::config::ResourceGuardConfig;
use std::collections::HashSet;
use std::sync::Arc;

/// S1 — an item targeting a critical component sits PENDING and is skipped
/// by the tactical loop until explicitly approved, after which one tick
/// drains it.
#[tokio::test]
async fn critical_target_requires_explicit_approval_before_tick() {
    let dir = tempfile::tempdir().unwrap();
    let guard = ResourceGuard::new(ResourceGuardConfig { cpu_percent_ceiling: 100.0, free_disk_floor_bytes: 0, guard_cooldown_secs: 0 });
    let coordinator = Coordinator::new(dir.path(), 3, HashSet::from(["core.planner".to_string()]), 0, guard);

    let id = coordinator
        .enqueue(Some("core.planner".to_string()), "replan the planner".to_string(), 0, false, BacklogOrigin::User)
        .await
        .unwrap();
    assert_eq!(coordinator.get(&id).await.unwrap().status, BacklogStatus::Pending);

    let untouched = coordinator.tick(|_| async { Ok(()) }).await.unwrap();
    assert_eq!(untouched, None, "a pending item awaiting approval must not be picked up");

    coordinator.approve(&id).await.unwrap();
    assert_eq!(coordinator.get(&id).await.unwrap().status, BacklogStatus::Approved);

    let processed = coordinator.tick(|_| async { Ok(()) }).await.unwrap();
    assert_eq!(processed, Some(id.clone()));
    assert_eq!(coordinator.get(&id).await.unwrap().status, BacklogStatus::CompletedSuccess);
}

/// S6 — a strategic campaign's findings become backlog items, and a
/// subsequent tactical tick drains the first tickable one.
#[tokio::test]
async fn strategic_campaign_feeds_the_tactical_loop() {
    let dir = tempfile::tempdir().unwrap();
    let engine = test_engine(dir.path());

    let findings = vec![
        Finding { severity: 2, target: "module_a.rs".to_string(), suggestion: "tighten error handling".to_string() },
        Finding { severity: 1, target: "module_b.rs".to_string(), suggestion: "add a missing test".to_string() },
    ];
    let audit = move || {
        let findings = findings.clone();
        async move { findings }
    };
    let blueprint = |finding: &Finding| (finding.suggestion.clone(), Some(finding.target.clone()));

    let campaign_id = engine.mastermind.run_campaign("quarterly sweep".to_string(), audit, blueprint).await.unwrap();
    let campaign = engine.mastermind.get(&campaign_id).await.unwrap();
    assert_eq!(campaign.backlog_items_spawned.len(), 2);

    let backlog = engine.coordinator.list().await;
    assert_eq!(backlog.len(), 2);
    assert!(backlog.iter().all(|item| item.status == BacklogStatus::Pending));

    let processed = engine.coordinator.tick(|_| async { Ok(()) }).await.unwrap();
    assert!(processed.is_some());
}

/// S6 continued — validating a campaign against a re-audit that no longer
/// reports one of the two original targets yields a 50% resolution score.
#[tokio::test]
async fn validating_a_campaign_scores_partial_resolution() {
    let dir = tempfile::tempdir().unwrap();
    let engine = test_engine(dir.path());

    let initial = vec![
        Finding { severity: 2, target: "module_a.rs".to_string(), suggestion: "s".to_string() },
        Finding { severity: 1, target: "module_b.rs".to_string(), suggestion: "s".to_string() },
    ];
    let audit = {
        let initial = initial.clone();
        move || async move { initial }
    };
    let campaign_id = engine
        .mastermind
        .run_campaign("sweep".to_string(), audit, |f: &Finding| (f.suggestion.clone(), Some(f.target.clone())))
        .await
        .unwrap();

    let still_open = vec![Finding { severity: 2, target: "module_a.rs".to_string(), suggestion: "s".to_string() }];
    let revalidate = move || {
        let still_open = still_open.clone();
        async move { still_open }
    };
    let score = engine.mastermind.validate(&campaign_id, revalidate).await.unwrap().unwrap();
    assert_eq!(score, 50.0);
}

/// A rejected backlog item is never selected by the tactical loop, even
/// when it targets nothing critical.
#[tokio::test]
async fn rejected_items_are_never_ticked() {
    let dir = tempfile::tempdir().unwrap();
    let coordinator = Arc::new(Coordinator::new(
        dir.path(),
        3,
        HashSet::new(),
        0,
        ResourceGuard::new(ResourceGuardConfig { cpu_percent_ceiling: 100.0, free_disk_floor_bytes: 0, guard_cooldown_secs: 0 }),
    ));
    let id = coordinator.enqueue(None, "noop".to_string(), 0, false, BacklogOrigin::User).await.unwrap();
    coordinator.reject(&id).await.unwrap();

    let result = coordinator.tick(|_| async { Ok(()) }).await.unwrap();
    assert_eq!(result, None);
}
