//! Mastermind & Strategic Loop (C10): runs a campaign through four phases
//! — Audit, Blueprint, Execute, Validate — turning a directive into
//! backlog items and later scoring how many of the audit's findings got
//! resolved.
//!
//! Grounded on the coordinator's backlog-persistence pattern (one
//! `Mutex`-guarded document, written through `store::Store`), generalized
//! from a task queue to a campaign history: each campaign is appended once
//! created and mutated in place as its phases complete.

use crate::coordinator::{BacklogOrigin, Coordinator};
use crate::errors::Result;
use crate::store::Store;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Finding {
    pub severity: u8,
    pub target: String,
    pub suggestion: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Grade {
    A,
    B,
    C,
    D,
    F,
}

impl Grade {
    fn from_score(score: f64) -> Self {
        if score >= 90.0 {
            Grade::A
        } else if score >= 75.0 {
            Grade::B
        } else if score >= 60.0 {
            Grade::C
        } else if score >= 40.0 {
            Grade::D
        } else {
            Grade::F
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Campaign {
    pub id: String,
    pub directive: String,
    pub started_ts: i64,
    pub ended_ts: Option<i64>,
    pub findings_initial: Vec<Finding>,
    pub backlog_items_spawned: Vec<String>,
    pub resolution_score: Option<f64>,
    pub grade: Option<Grade>,
}

#[derive(Default, Serialize, Deserialize)]
struct CampaignDocument {
    campaigns: Vec<Campaign>,
}

const CAMPAIGN_DOC: &str = "campaigns.json";

pub struct Mastermind {
    store: Store,
    campaigns: Mutex<CampaignDocument>,
    coordinator: Arc<Coordinator>,
}

impl Mastermind {
    pub fn new(data_root: impl Into<std::path::PathBuf>, backup_count: usize, coordinator: Arc<Coordinator>) -> Self {
        let store = Store::new(data_root.into().join("state"), backup_count);
        let campaigns = store.read(CAMPAIGN_DOC).ok().flatten().unwrap_or_default();
        Self { store, campaigns: Mutex::new(campaigns), coordinator }
    }

    /// Audit + Blueprint + Execute: run `audit` to collect findings,
    /// synthesize them into backlog items via `blueprint`, and enqueue
    /// each into the coordinator without blocking on completion. Returns
    /// the new campaign's id.
    pub async fn run_campaign<A, Fut, B>(&self, directive: String, audit: A, blueprint: B) -> Result<String>
    where
        A: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Vec<Finding>>,
        B: Fn(&Finding) -> (String, Option<String>),
    {
        let findings = audit().await;
        let id = format!("campaign-{}", uuid::Uuid::new_v4());

        let mut spawned = Vec::new();
        for finding in &findings {
            let (description, target) = blueprint(finding);
            let backlog_id = self
                .coordinator
                .enqueue(target, description, finding.severity as i32, false, BacklogOrigin::MastermindDirective)
                .await?;
            spawned.push(backlog_id);
        }

        let campaign = Campaign {
            id: id.clone(),
            directive,
            started_ts: chrono::Utc::now().timestamp(),
            ended_ts: None,
            findings_initial: findings,
            backlog_items_spawned: spawned,
            resolution_score: None,
            grade: None,
        };

        let mut doc = self.campaigns.lock().await;
        doc.campaigns.push(campaign);
        self.store.write(CAMPAIGN_DOC, &*doc)?;
        info!(campaign_id = %id, "campaign started");
        Ok(id)
    }

    /// Validate: re-audit with `audit`, compute the unweighted resolution
    /// ratio `100 * resolved / initial` against the campaign's original
    /// finding count, and close the campaign out. An initial finding is
    /// "resolved" if `audit`'s fresh pass no longer reports its target.
    pub async fn validate<A, Fut>(&self, campaign_id: &str, audit: A) -> Result<Option<f64>>
    where
        A: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Vec<Finding>>,
    {
        let fresh = audit().await;
        let fresh_targets: std::collections::HashSet<&str> = fresh.iter().map(|f| f.target.as_str()).collect();

        let mut doc = self.campaigns.lock().await;
        let Some(campaign) = doc.campaigns.iter_mut().find(|c| c.id == campaign_id) else {
            return Ok(None);
        };

        if campaign.findings_initial.is_empty() {
            campaign.resolution_score = Some(100.0);
            campaign.grade = Some(Grade::A);
            campaign.ended_ts = Some(chrono::Utc::now().timestamp());
            self.store.write(CAMPAIGN_DOC, &*doc)?;
            return Ok(Some(100.0));
        }

        let resolved = campaign.findings_initial.iter().filter(|f| !fresh_targets.contains(f.target.as_str())).count();
        let score = 100.0 * resolved as f64 / campaign.findings_initial.len() as f64;
        campaign.resolution_score = Some(score);
        campaign.grade = Some(Grade::from_score(score));
        campaign.ended_ts = Some(chrono::Utc::now().timestamp());

        self.store.write(CAMPAIGN_DOC, &*doc)?;
        Ok(Some(score))
    }

    pub async fn list(&self) -> Vec<Campaign> {
        self.campaigns.lock().await.campaigns.clone()
    }

    pub async fn get(&self, id: &str) -> Option<Campaign> {
        self.campaigns.lock().await.campaigns.iter().find(|c| c.id == id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResourceGuardConfig;
    use crate::resource::ResourceGuard;
    use std::collections::HashSet;

    fn mastermind(dir: &std::path::Path) -> Mastermind {
        let coordinator = Arc::new(Coordinator::new(
            dir,
            5,
            HashSet::new(),
            1800,
            ResourceGuard::new(ResourceGuardConfig { cpu_percent_ceiling: 100.0, free_disk_floor_bytes: 0, guard_cooldown_secs: 1 }),
        ));
        Mastermind::new(dir, 5, coordinator)
    }

    fn finding(target: &str) -> Finding {
        Finding { severity: 2, target: target.to_string(), suggestion: "fix it".to_string() }
    }

    #[tokio::test]
    async fn campaign_enqueues_a_backlog_item_per_finding() {
        let dir = tempfile::tempdir().unwrap();
        let mastermind = mastermind(dir.path());
        let id = mastermind
            .run_campaign(
                "assess and evolve".to_string(),
                || async { vec![finding("a"), finding("b")] },
                |f| (format!("address {}", f.target), Some(f.target.clone())),
            )
            .await
            .unwrap();

        let campaign = mastermind.get(&id).await.unwrap();
        assert_eq!(campaign.backlog_items_spawned.len(), 2);
        assert_eq!(mastermind.coordinator.list().await.len(), 2);
    }

    #[tokio::test]
    async fn validate_computes_unweighted_resolution_ratio() {
        let dir = tempfile::tempdir().unwrap();
        let mastermind = mastermind(dir.path());
        let id = mastermind
            .run_campaign("d".to_string(), || async { vec![finding("a"), finding("b"), finding("c"), finding("d")] }, |f| {
                (f.suggestion.clone(), Some(f.target.clone()))
            })
            .await
            .unwrap();

        let score = mastermind.validate(&id, || async { vec![finding("b")] }).await.unwrap().unwrap();
        assert_eq!(score, 75.0);
        assert_eq!(mastermind.get(&id).await.unwrap().grade, Some(Grade::B));
    }

    #[tokio::test]
    async fn validate_with_no_initial_findings_grades_a() {
        let dir = tempfile::tempdir().unwrap();
        let mastermind = mastermind(dir.path());
        let id = mastermind
            .run_campaign("d".to_string(), || async { Vec::new() }, |f| (f.suggestion.clone(), Some(f.target.clone())))
            .await
            .unwrap();
        let score = mastermind.validate(&id, || async { Vec::new() }).await.unwrap().unwrap();
        assert_eq!(score, 100.0);
    }

    #[test]
    fn grade_boundaries_match_spec_thresholds() {
        assert_eq!(Grade::from_score(90.0), Grade::A);
        assert_eq!(Grade::from_score(75.0), Grade::B);
        assert_eq!(Grade::from_score(60.0), Grade::C);
        assert_eq!(Grade::from_score(40.0), Grade::D);
        assert_eq!(Grade::from_score(39.9), Grade::F);
    }
}
