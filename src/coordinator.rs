//! Coordinator (C9): owns the improvement backlog, the human-in-the-loop
//! gate for critical components, and the tactical tick that drains
//! actionable backlog items into Self-Improvement Worker launches.
//!
//! Grounded on the architecture's existing task-queue-plus-gate pattern:
//! a `tokio::sync::Mutex`-guarded queue persisted through the atomic
//! `Store`, with a strict-HITL policy resolved at the spec's open
//! question — any item naming a critical component always needs
//! `approve` before `process` will touch it, with no bypass. Retry
//! policy (how many times a failing item cools down before it is
//! retired as `COMPLETED_FAILURE`) is this module's own open-question
//! resolution, recorded in DESIGN.md.

use crate::errors::{EngineError, Result};
use crate::resource::ResourceGuard;
use crate::store::Store;
use crate::tools::ImprovementRequester;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Number of failed attempts a backlog item tolerates before it is
/// retired as `CompletedFailure` instead of cycling back through
/// `Cooldown`.
const MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BacklogStatus {
    Pending,
    Approved,
    Rejected,
    InProgress,
    CompletedSuccess,
    CompletedFailure,
    Cooldown,
}

/// Where a backlog item came from — surfaced for audit trails and to let
/// the strategic loop distinguish its own campaigns from ad hoc requests.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BacklogOrigin {
    StrategicAnalysis,
    MastermindDirective,
    Audit,
    User,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BacklogItem {
    pub id: String,
    pub description: String,
    pub target: Option<String>,
    pub priority: i32,
    pub status: BacklogStatus,
    pub created_ts: i64,
    pub requires_approval: bool,
    pub attempts: u32,
    pub last_attempt_ts: Option<i64>,
    pub cooldown_until_ts: Option<i64>,
    pub origin: BacklogOrigin,
}

#[derive(Default, Serialize, Deserialize)]
struct BacklogDocument {
    items: Vec<BacklogItem>,
}

pub struct Coordinator {
    store: Store,
    backlog: Mutex<BacklogDocument>,
    critical_components: HashSet<String>,
    cooldown_secs: u64,
    resource_guard: Mutex<ResourceGuard>,
}

const BACKLOG_DOC: &str = "backlog.json";

impl Coordinator {
    pub fn new(
        data_root: impl Into<std::path::PathBuf>,
        backup_count: usize,
        critical_components: HashSet<String>,
        cooldown_secs: u64,
        resource_guard: ResourceGuard,
    ) -> Self {
        let store = Store::new(data_root.into().join("state"), backup_count);
        let backlog = store.read(BACKLOG_DOC).ok().flatten().unwrap_or_default();
        Self {
            store,
            backlog: Mutex::new(backlog),
            critical_components,
            cooldown_secs,
            resource_guard: Mutex::new(resource_guard),
        }
    }

    fn requires_approval(&self, target: &Option<String>) -> bool {
        match target {
            Some(t) => self.critical_components.iter().any(|c| t.contains(c.as_str())),
            None => false,
        }
    }

    /// Queue a new backlog item. `requires_approval` is OR'd with the
    /// critical-component check: a critical target always gates on
    /// approval regardless of what the caller asked for.
    pub async fn enqueue(
        &self,
        target: Option<String>,
        description: String,
        priority: i32,
        requires_approval: bool,
        origin: BacklogOrigin,
    ) -> Result<String> {
        let id = format!("backlog-{}", uuid::Uuid::new_v4());
        let requires_approval = requires_approval || self.requires_approval(&target);
        let item = BacklogItem {
            id: id.clone(),
            description,
            target,
            priority,
            status: BacklogStatus::Pending,
            created_ts: chrono::Utc::now().timestamp(),
            requires_approval,
            attempts: 0,
            last_attempt_ts: None,
            cooldown_until_ts: None,
            origin,
        };

        let mut backlog = self.backlog.lock().await;
        backlog.items.push(item);
        self.store.write(BACKLOG_DOC, &*backlog)?;
        info!(backlog_id = %id, requires_approval, priority, "enqueued backlog item");
        Ok(id)
    }

    pub async fn approve(&self, id: &str) -> Result<()> {
        self.set_status(id, BacklogStatus::Approved).await
    }

    pub async fn reject(&self, id: &str) -> Result<()> {
        self.set_status(id, BacklogStatus::Rejected).await
    }

    async fn set_status(&self, id: &str, status: BacklogStatus) -> Result<()> {
        let mut backlog = self.backlog.lock().await;
        let item = backlog
            .items
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or_else(|| EngineError::Internal(format!("unknown backlog item {id}")))?;
        item.status = status;
        self.store.write(BACKLOG_DOC, &*backlog)
    }

    pub async fn list(&self) -> Vec<BacklogItem> {
        self.backlog.lock().await.items.clone()
    }

    pub async fn get(&self, id: &str) -> Option<BacklogItem> {
        self.backlog.lock().await.items.iter().find(|i| i.id == id).cloned()
    }

    pub async fn get_status(&self, id: &str) -> Option<BacklogStatus> {
        self.backlog.lock().await.items.iter().find(|i| i.id == id).map(|i| i.status)
    }

    /// Eligible for tick selection: `Approved`, `Pending` without an
    /// approval gate, or `Cooldown` whose timer has lapsed — and in
    /// every case, not still serving an earlier `cooldown_until_ts`.
    fn is_eligible(item: &BacklogItem, now: i64) -> bool {
        let status_ok = matches!(item.status, BacklogStatus::Approved | BacklogStatus::Cooldown)
            || (item.status == BacklogStatus::Pending && !item.requires_approval);
        if !status_ok {
            return false;
        }
        item.cooldown_until_ts.map(|until| until <= now).unwrap_or(true)
    }

    /// The tactical tick: select the highest-priority actionable item
    /// (ties broken by oldest `created_ts` first), check the resource
    /// guard, atomically move it to `InProgress`, and hand it to `launch`
    /// (the SIW subprocess invocation). A failing `launch` does not
    /// propagate — it is recorded as `CompletedFailure`/`Cooldown` like
    /// any other outcome. Never touches a `Pending` item that
    /// `requires_approval`: the HITL gate has no bypass.
    pub async fn tick<F, Fut>(&self, launch: F) -> Result<Option<String>>
    where
        F: FnOnce(BacklogItem) -> Fut,
        Fut: std::future::Future<Output = Result<()>>,
    {
        if let Err(failure) = self.resource_guard.lock().await.check() {
            warn!(?failure, "resource guard blocked tactical tick");
            return Ok(None);
        }

        let now = chrono::Utc::now().timestamp();
        let candidate = {
            let backlog = self.backlog.lock().await;
            let mut eligible: Vec<BacklogItem> =
                backlog.items.iter().filter(|i| Self::is_eligible(i, now)).cloned().collect();
            eligible.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.created_ts.cmp(&b.created_ts)));
            eligible.into_iter().next()
        };

        let Some(item) = candidate else { return Ok(None) };
        let id = item.id.clone();
        self.set_status(&id, BacklogStatus::InProgress).await?;

        match launch(item).await {
            Ok(()) => self.record_outcome(&id, true).await?,
            Err(e) => {
                warn!(backlog_id = %id, error = %e, "siw launch reported failure");
                self.record_outcome(&id, false).await?;
            }
        }
        Ok(Some(id))
    }

    /// Settle a terminated `InProgress` item: `CompletedSuccess` on
    /// success, or `Cooldown` (with `cooldown_until_ts` pushed out) on
    /// failure — unless `MAX_ATTEMPTS` is exhausted, in which case it is
    /// retired as `CompletedFailure`.
    async fn record_outcome(&self, id: &str, success: bool) -> Result<()> {
        let mut backlog = self.backlog.lock().await;
        let item = backlog
            .items
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or_else(|| EngineError::Internal(format!("unknown backlog item {id}")))?;

        let now = chrono::Utc::now().timestamp();
        item.attempts += 1;
        item.last_attempt_ts = Some(now);

        if success {
            item.status = BacklogStatus::CompletedSuccess;
            item.cooldown_until_ts = None;
        } else if item.attempts >= MAX_ATTEMPTS {
            item.status = BacklogStatus::CompletedFailure;
            item.cooldown_until_ts = None;
        } else {
            item.status = BacklogStatus::Cooldown;
            item.cooldown_until_ts = Some(now + self.cooldown_secs as i64);
        }

        self.store.write(BACKLOG_DOC, &*backlog)
    }
}

#[async_trait]
impl ImprovementRequester for Coordinator {
    async fn request_improvement(
        &self,
        target: Option<String>,
        suggestion: String,
        priority: i32,
        requires_approval: bool,
    ) -> anyhow::Result<String> {
        Ok(self.enqueue(target, suggestion, priority, requires_approval, BacklogOrigin::StrategicAnalysis).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResourceGuardConfig;

    fn coordinator(dir: &std::path::Path, critical: &[&str]) -> Coordinator {
        Coordinator::new(
            dir,
            5,
            critical.iter().map(|s| s.to_string()).collect(),
            1800,
            ResourceGuard::new(ResourceGuardConfig { cpu_percent_ceiling: 100.0, free_disk_floor_bytes: 0, guard_cooldown_secs: 1 }),
        )
    }

    #[tokio::test]
    async fn enqueue_then_list_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = coordinator(dir.path(), &[]);
        let id = coordinator.enqueue(None, "fix the thing".into(), 0, false, BacklogOrigin::User).await.unwrap();
        let items = coordinator.list().await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, id);
        assert_eq!(items[0].attempts, 0);
        assert_eq!(items[0].cooldown_until_ts, None);
    }

    #[tokio::test]
    async fn critical_target_requires_approval() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = coordinator(dir.path(), &["auth"]);
        let id = coordinator
            .enqueue(Some("src/auth/mod.rs".into()), "touch auth module".into(), 0, false, BacklogOrigin::User)
            .await
            .unwrap();
        let item = coordinator.get(&id).await.unwrap();
        assert!(item.requires_approval);
    }

    #[tokio::test]
    async fn tick_skips_pending_item_awaiting_approval() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = coordinator(dir.path(), &["auth"]);
        coordinator.enqueue(Some("auth/mod.rs".into()), "touch auth".into(), 0, false, BacklogOrigin::User).await.unwrap();
        let launched = coordinator.tick(|_item| async { Ok(()) }).await.unwrap();
        assert!(launched.is_none());
    }

    #[tokio::test]
    async fn tick_processes_approved_item() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = coordinator(dir.path(), &["auth"]);
        let id = coordinator
            .enqueue(Some("auth/mod.rs".into()), "touch auth".into(), 0, false, BacklogOrigin::User)
            .await
            .unwrap();
        coordinator.approve(&id).await.unwrap();
        let launched = coordinator.tick(|_item| async { Ok(()) }).await.unwrap();
        assert_eq!(launched, Some(id.clone()));
        assert_eq!(coordinator.get_status(&id).await.unwrap(), BacklogStatus::CompletedSuccess);
    }

    #[tokio::test]
    async fn tick_processes_non_critical_pending_item_without_approval() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = coordinator(dir.path(), &["auth"]);
        let id = coordinator
            .enqueue(Some("docs/readme.md".into()), "tidy docs".into(), 0, false, BacklogOrigin::User)
            .await
            .unwrap();
        let launched = coordinator.tick(|_item| async { Ok(()) }).await.unwrap();
        assert_eq!(launched, Some(id));
    }

    #[tokio::test]
    async fn reject_prevents_processing() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = coordinator(dir.path(), &[]);
        let id = coordinator.enqueue(None, "noop".into(), 0, false, BacklogOrigin::User).await.unwrap();
        coordinator.reject(&id).await.unwrap();
        let launched = coordinator.tick(|_item| async { Ok(()) }).await.unwrap();
        assert!(launched.is_none());
    }

    #[tokio::test]
    async fn tick_prefers_the_highest_priority_item() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = coordinator(dir.path(), &[]);
        coordinator.enqueue(None, "low".into(), 1, false, BacklogOrigin::User).await.unwrap();
        let high = coordinator.enqueue(None, "high".into(), 10, false, BacklogOrigin::User).await.unwrap();
        let launched = coordinator.tick(|_item| async { Ok(()) }).await.unwrap();
        assert_eq!(launched, Some(high));
    }

    #[tokio::test]
    async fn failed_launch_sets_cooldown_and_is_not_reselected_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = coordinator(dir.path(), &[]);
        let id = coordinator.enqueue(None, "flaky".into(), 0, false, BacklogOrigin::User).await.unwrap();

        let launched = coordinator.tick(|_item| async { Err(EngineError::Internal("boom".into())) }).await.unwrap();
        assert_eq!(launched, Some(id.clone()));

        let item = coordinator.get(&id).await.unwrap();
        assert_eq!(item.status, BacklogStatus::Cooldown);
        assert_eq!(item.attempts, 1);
        assert!(item.cooldown_until_ts.is_some());

        let retried = coordinator.tick(|_item| async { Ok(()) }).await.unwrap();
        assert_eq!(retried, None, "item is still cooling down and must not be reselected");
    }

    #[tokio::test]
    async fn exhausting_max_attempts_retires_the_item_as_completed_failure() {
        let dir = tempfile::tempdir().unwrap();
        // cooldown of zero so the item is immediately reselectable after each failure.
        let coordinator = Coordinator::new(
            dir.path(),
            5,
            HashSet::new(),
            0,
            ResourceGuard::new(ResourceGuardConfig { cpu_percent_ceiling: 100.0, free_disk_floor_bytes: 0, guard_cooldown_secs: 1 }),
        );
        let id = coordinator.enqueue(None, "always fails".into(), 0, false, BacklogOrigin::User).await.unwrap();

        for _ in 0..MAX_ATTEMPTS {
            coordinator.tick(|_item| async { Err(EngineError::Internal("boom".into())) }).await.unwrap();
        }

        let item = coordinator.get(&id).await.unwrap();
        assert_eq!(item.status, BacklogStatus::CompletedFailure);
        assert_eq!(item.attempts, MAX_ATTEMPTS);

        let retried = coordinator.tick(|_item| async { Ok(()) }).await.unwrap();
        assert_eq!(retried, None, "a retired item must never be reselected");
    }
}
