//! Goals, Plans, and Actions (C6): the tagged-union data model BDI plans
//! against, plus the priority queue of pending goals and the plan
//! validator.
//!
//! `Action` is a tagged union per §9's design note rather than a trait
//! object — every action an agent can take is enumerable ahead of time
//! (tool call, sub-goal, wait, terminate), so matching on a closed enum
//! is both simpler and cheaper than dynamic dispatch.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Goal {
    pub id: String,
    pub description: String,
    pub priority: i32,
    pub created_ts: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Plan {
    pub goal_id: String,
    pub steps: Vec<PlanStep>,
    pub cursor: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlanStep {
    pub id: String,
    pub action: Action,
    pub depends_on: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Action {
    ToolCall { tool: String, args: serde_json::Value },
    SubGoal { description: String, priority: i32 },
    Wait { seconds: u64 },
    Terminate { reason: String },
}

impl Plan {
    pub fn is_complete(&self) -> bool {
        self.cursor >= self.steps.len()
    }

    pub fn current_step(&self) -> Option<&PlanStep> {
        self.steps.get(self.cursor)
    }

    pub fn advance(&mut self) {
        self.cursor += 1;
    }

    /// Reject plans whose step dependency graph contains a cycle, using
    /// Kahn's algorithm: repeatedly remove steps with no unsatisfied
    /// dependency; if steps remain once nothing more can be removed, a
    /// cycle exists.
    pub fn validate_acyclic(&self) -> Result<(), String> {
        let ids: HashSet<&str> = self.steps.iter().map(|s| s.id.as_str()).collect();
        let mut in_degree: HashMap<&str, usize> = self.steps.iter().map(|s| (s.id.as_str(), 0)).collect();
        let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();

        for step in &self.steps {
            for dep in &step.depends_on {
                if !ids.contains(dep.as_str()) {
                    return Err(format!("step {} depends on unknown step {}", step.id, dep));
                }
                *in_degree.get_mut(step.id.as_str()).unwrap() += 1;
                dependents.entry(dep.as_str()).or_default().push(step.id.as_str());
            }
        }

        let mut queue: Vec<&str> = in_degree.iter().filter(|(_, d)| **d == 0).map(|(id, _)| *id).collect();
        let mut visited = 0usize;

        while let Some(id) = queue.pop() {
            visited += 1;
            if let Some(deps) = dependents.get(id) {
                for dependent in deps {
                    let degree = in_degree.get_mut(dependent).unwrap();
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push(dependent);
                    }
                }
            }
        }

        if visited != self.steps.len() {
            return Err("plan contains a dependency cycle".to_string());
        }
        Ok(())
    }
}

/// Pending goals, ordered by `(priority desc, created_ts asc)` so older
/// goals at the same priority are served first.
#[derive(Default)]
pub struct GoalQueue {
    goals: Vec<Goal>,
}

impl GoalQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, goal: Goal) {
        self.goals.push(goal);
        self.goals.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.created_ts.cmp(&b.created_ts)));
    }

    pub fn pop(&mut self) -> Option<Goal> {
        if self.goals.is_empty() { None } else { Some(self.goals.remove(0)) }
    }

    pub fn len(&self) -> usize {
        self.goals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.goals.is_empty()
    }

    pub fn peek_all(&self) -> &[Goal] {
        &self.goals
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(id: &str, depends_on: &[&str]) -> PlanStep {
        PlanStep {
            id: id.to_string(),
            action: Action::Wait { seconds: 0 },
            depends_on: depends_on.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn goal_queue_orders_by_priority_then_age() {
        let mut queue = GoalQueue::new();
        queue.push(Goal { id: "a".into(), description: "".into(), priority: 1, created_ts: 10 });
        queue.push(Goal { id: "b".into(), description: "".into(), priority: 5, created_ts: 20 });
        queue.push(Goal { id: "c".into(), description: "".into(), priority: 5, created_ts: 5 });
        assert_eq!(queue.pop().unwrap().id, "c");
        assert_eq!(queue.pop().unwrap().id, "b");
        assert_eq!(queue.pop().unwrap().id, "a");
    }

    #[test]
    fn acyclic_plan_validates() {
        let plan = Plan {
            goal_id: "g".into(),
            cursor: 0,
            steps: vec![step("1", &[]), step("2", &["1"]), step("3", &["1", "2"])],
        };
        assert!(plan.validate_acyclic().is_ok());
    }

    #[test]
    fn cyclic_plan_is_rejected() {
        let plan = Plan {
            goal_id: "g".into(),
            cursor: 0,
            steps: vec![step("1", &["2"]), step("2", &["1"])],
        };
        assert!(plan.validate_acyclic().is_err());
    }

    #[test]
    fn plan_dependency_on_unknown_step_is_rejected() {
        let plan = Plan { goal_id: "g".into(), cursor: 0, steps: vec![step("1", &["ghost"])] };
        assert!(plan.validate_acyclic().is_err());
    }

    #[test]
    fn plan_advances_to_completion() {
        let mut plan = Plan { goal_id: "g".into(), cursor: 0, steps: vec![step("1", &[]), step("2", &[])] };
        assert!(!plan.is_complete());
        plan.advance();
        plan.advance();
        assert!(plan.is_complete());
        assert!(plan.current_step().is_none());
    }
}
