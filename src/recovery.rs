//! Failure & Recovery Framework (C11): classifies an `EngineError` into a
//! `FailureKind`, picks a `RecoveryStrategy` by EMA-tracked historical
//! success rate with ε-greedy exploration, and backs off exponentially
//! between retries of the same failure.
//!
//! Grounded on the architecture's existing error-classification +
//! exponential-backoff retry loop, generalized from a fixed dispatch
//! table to an EMA-scored `(kind, strategy) -> score` map so the engine
//! can learn which strategy actually resolves each kind of failure over
//! time rather than always trying the same one first.

use crate::errors::EngineError;
use parking_lot::Mutex;
use rand::Rng;
use std::collections::HashMap;

const EMA_ALPHA: f64 = 0.3;
const EPSILON: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    Gateway,
    Tool,
    Safety,
    Store,
    Planning,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecoveryStrategy {
    Retry,
    Skip,
    Abort,
}

const ALL_STRATEGIES: [RecoveryStrategy; 3] = [RecoveryStrategy::Retry, RecoveryStrategy::Skip, RecoveryStrategy::Abort];

pub fn classify(error: &EngineError) -> FailureKind {
    match error {
        EngineError::Gateway(_) => FailureKind::Gateway,
        EngineError::Tool(_) => FailureKind::Tool,
        EngineError::Safety(_) => FailureKind::Safety,
        EngineError::Store(_) => FailureKind::Store,
        EngineError::Planning(_) => FailureKind::Planning,
        _ => FailureKind::Other,
    }
}

/// Safety violations are never retried (§7) regardless of learned score.
fn is_forced(kind: FailureKind) -> Option<RecoveryStrategy> {
    match kind {
        FailureKind::Safety => Some(RecoveryStrategy::Abort),
        _ => None,
    }
}

pub struct RecoveryFramework {
    scores: Mutex<HashMap<(FailureKind, RecoveryStrategy), f64>>,
    attempts: Mutex<HashMap<FailureKind, u32>>,
}

impl RecoveryFramework {
    pub fn new() -> Self {
        Self { scores: Mutex::new(HashMap::new()), attempts: Mutex::new(HashMap::new()) }
    }

    /// Classify the error, then pick a strategy: with probability
    /// `EPSILON` explore a random strategy, otherwise exploit the one
    /// with the highest EMA success score (ties broken toward `Retry`).
    pub fn classify_and_select(&self, error: &EngineError) -> RecoveryStrategy {
        let kind = classify(error);
        if let Some(forced) = is_forced(kind) {
            return forced;
        }

        let mut rng = rand::rng();
        if rng.random::<f64>() < EPSILON {
            return ALL_STRATEGIES[rng.random_range(0..ALL_STRATEGIES.len())];
        }

        let scores = self.scores.lock();
        ALL_STRATEGIES
            .iter()
            .copied()
            .max_by(|a, b| {
                let sa = scores.get(&(kind, *a)).copied().unwrap_or(0.5);
                let sb = scores.get(&(kind, *b)).copied().unwrap_or(0.5);
                sa.partial_cmp(&sb).unwrap_or(std::cmp::Ordering::Equal)
            })
            .unwrap_or(RecoveryStrategy::Retry)
    }

    /// Update the EMA score for `(kind, strategy)` after observing
    /// whether it actually resolved the failure.
    pub fn record_outcome(&self, kind: FailureKind, strategy: RecoveryStrategy, succeeded: bool) {
        let observed = if succeeded { 1.0 } else { 0.0 };
        let mut scores = self.scores.lock();
        let entry = scores.entry((kind, strategy)).or_insert(0.5);
        *entry = EMA_ALPHA * observed + (1.0 - EMA_ALPHA) * *entry;
    }

    /// Exponential backoff in milliseconds for the Nth retry (0-indexed)
    /// of a given failure kind, capped at 60s.
    pub fn backoff_ms(&self, kind: FailureKind) -> u64 {
        let mut attempts = self.attempts.lock();
        let count = attempts.entry(kind).or_insert(0);
        let ms = 200u64.saturating_mul(1u64 << (*count).min(8));
        *count += 1;
        ms.min(60_000)
    }

    pub fn reset_backoff(&self, kind: FailureKind) {
        self.attempts.lock().remove(&kind);
    }
}

impl Default for RecoveryFramework {
    fn default() -> Self {
        Self::new()
    }
}
