//! AGInt cognitive cycle (C8): Perceive-Orient-Decide-Act, run once per
//! strategic tick. Perception gathers fresh beliefs, orientation scores
//! which decision kind the situation calls for, decision picks one by
//! EMA-learned success rate (with three hard bias overrides), and action
//! dispatches into a BDI run.
//!
//! Grounded on the architecture's existing perceive/decide/act cognitive
//! loop; the three bias rules below are a direct carry-over of the
//! corpus's "consecutive-failure escalation" pattern, generalized to the
//! three decision kinds this system actually has.

use parking_lot::Mutex;
use std::collections::HashMap;

const EMA_ALPHA: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecisionKind {
    Proceed,
    SelfRepair,
    Cooldown,
    Research,
}

#[derive(Debug, Default, Clone)]
pub struct Perception {
    pub consecutive_bdi_failures: u32,
    pub recent_gateway_errors: u32,
    pub stale_perception_secs: u64,
}

pub struct DecisionPolicy {
    scores: Mutex<HashMap<DecisionKind, f64>>,
}

impl DecisionPolicy {
    pub fn new() -> Self {
        Self { scores: Mutex::new(HashMap::new()) }
    }

    pub fn record_outcome(&self, kind: DecisionKind, succeeded: bool) {
        let observed = if succeeded { 1.0 } else { 0.0 };
        let mut scores = self.scores.lock();
        let entry = scores.entry(kind).or_insert(0.5);
        *entry = EMA_ALPHA * observed + (1.0 - EMA_ALPHA) * *entry;
    }

    fn score(&self, kind: DecisionKind) -> f64 {
        self.scores.lock().get(&kind).copied().unwrap_or(0.5)
    }

    /// Orient + Decide: apply the three hard bias rules first — repeated
    /// BDI failure, gateway instability, and stale perception each force
    /// a specific response regardless of learned scores — then fall back
    /// to the highest-scoring decision kind among the rest.
    pub fn decide(&self, perception: &Perception) -> DecisionKind {
        if perception.consecutive_bdi_failures >= 3 {
            return DecisionKind::SelfRepair;
        }
        if perception.recent_gateway_errors >= 3 {
            return DecisionKind::Cooldown;
        }
        if perception.stale_perception_secs > 3600 {
            return DecisionKind::Research;
        }

        [DecisionKind::Proceed, DecisionKind::SelfRepair, DecisionKind::Cooldown, DecisionKind::Research]
            .into_iter()
            .max_by(|a, b| self.score(*a).partial_cmp(&self.score(*b)).unwrap_or(std::cmp::Ordering::Equal))
            .unwrap_or(DecisionKind::Proceed)
    }
}

impl Default for DecisionPolicy {
    fn default() -> Self {
        Self::new()
    }
}

/// One full Perceive-Orient-Decide-Act pass. `perceive` and `act` are
/// injected so the cycle stays independent of the concrete belief store
/// and BDI executor types, matching the rest of the engine's dependency
/// shape (§9).
pub async fn run_cycle<P, A, Fut>(policy: &DecisionPolicy, perceive: P, act: A) -> DecisionKind
where
    P: FnOnce() -> Perception,
    A: FnOnce(DecisionKind) -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let perception = perceive();
    let decision = policy.decide(&perception);
    let succeeded = act(decision).await;
    policy.record_outcome(decision, succeeded);
    decision
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn three_consecutive_failures_force_self_repair() {
        let policy = DecisionPolicy::new();
        let perception = Perception { consecutive_bdi_failures: 3, ..Default::default() };
        assert_eq!(policy.decide(&perception), DecisionKind::SelfRepair);
    }

    #[test]
    fn gateway_instability_forces_cooldown() {
        let policy = DecisionPolicy::new();
        let perception = Perception { recent_gateway_errors: 3, ..Default::default() };
        assert_eq!(policy.decide(&perception), DecisionKind::Cooldown);
    }

    #[test]
    fn stale_perception_forces_research() {
        let policy = DecisionPolicy::new();
        let perception = Perception { stale_perception_secs: 4000, ..Default::default() };
        assert_eq!(policy.decide(&perception), DecisionKind::Research);
    }

    #[test]
    fn quiet_perception_defaults_to_highest_scoring_kind() {
        let policy = DecisionPolicy::new();
        policy.record_outcome(DecisionKind::Proceed, true);
        policy.record_outcome(DecisionKind::Proceed, true);
        let perception = Perception::default();
        assert_eq!(policy.decide(&perception), DecisionKind::Proceed);
    }

    #[tokio::test]
    async fn run_cycle_records_the_observed_outcome() {
        let policy = DecisionPolicy::new();
        let decision = run_cycle(&policy, Perception::default, |_kind| async { true }).await;
        assert_eq!(decision, DecisionKind::Proceed);
    }
}
