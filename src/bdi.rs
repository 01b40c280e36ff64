//! BDI (Belief-Desire-Intention) executor (C7): turns one `Goal` into a
//! `Plan` via the gateway, then executes it step by step against the
//! tool registry, repairing the plan on malformed LLM output or tool
//! failure before giving up.
//!
//! Grounded on the architecture's existing plan-then-execute cognitive
//! loop: a single gateway call produces a structured plan, each step
//! runs through the same tool dispatch path a direct tool call would,
//! and a bounded number of repair attempts keeps one bad LLM response
//! from wedging the loop forever.

use crate::beliefs::BeliefStore;
use crate::errors::{EngineError, Result};
use crate::llm::{ChatMessage, GenerateRequest, Generator};
use crate::plan::{Action, Goal, Plan, PlanStep};
use crate::recovery::RecoveryFramework;
use crate::tools::ToolRegistry;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Maximum number of times a malformed plan is sent back to the model
/// for repair before the goal is abandoned.
const MAX_REPAIR_ATTEMPTS: u32 = 2;

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Completed,
    Terminated { reason: String },
    Abandoned { reason: String },
}

pub struct BdiExecutor {
    agent_id: String,
    generator: Arc<dyn Generator>,
    tools: Arc<ToolRegistry>,
    beliefs: Arc<BeliefStore>,
    recovery: Arc<RecoveryFramework>,
    model: String,
    path_alias: HashMap<String, PathBuf>,
}

impl BdiExecutor {
    pub fn new(
        agent_id: String,
        generator: Arc<dyn Generator>,
        tools: Arc<ToolRegistry>,
        beliefs: Arc<BeliefStore>,
        recovery: Arc<RecoveryFramework>,
        model: String,
        path_alias: HashMap<String, PathBuf>,
    ) -> Self {
        Self { agent_id, generator, tools, beliefs, recovery, model, path_alias }
    }

    /// Plan, repair, execute: the full BDI cycle for a single goal.
    pub async fn run(&self, goal: &Goal) -> Result<Outcome> {
        let mut plan = self.plan_for(goal).await?;

        let mut repairs = 0u32;
        while let Err(reason) = plan.validate_acyclic() {
            repairs += 1;
            if repairs > MAX_REPAIR_ATTEMPTS {
                return Ok(Outcome::Abandoned { reason: format!("plan failed validation after repair: {reason}") });
            }
            warn!(goal_id = %goal.id, %reason, "plan validation failed, requesting repair");
            plan = self.repair_plan(goal, &plan, &reason).await?;
        }

        self.execute(&mut plan).await
    }

    async fn plan_for(&self, goal: &Goal) -> Result<Plan> {
        let prompt = format!(
            "Produce a JSON plan (fields: goal_id, steps: [{{id, action, depends_on}}]) to accomplish: {}",
            goal.description
        );
        let response = self
            .generator
            .generate(GenerateRequest {
                model: self.model.clone(),
                messages: vec![ChatMessage { role: "user".to_string(), content: prompt }],
                temperature: Some(0.2),
                max_tokens: None,
            })
            .await?;
        parse_plan(&response.content, &goal.id)
    }

    async fn repair_plan(&self, goal: &Goal, broken: &Plan, reason: &str) -> Result<Plan> {
        let prompt = format!(
            "The plan {} was rejected: {reason}. Produce a corrected JSON plan with the same shape for goal: {}",
            serde_json::to_string(broken).unwrap_or_default(),
            goal.description
        );
        let response = self
            .generator
            .generate(GenerateRequest {
                model: self.model.clone(),
                messages: vec![ChatMessage { role: "user".to_string(), content: prompt }],
                temperature: Some(0.0),
                max_tokens: None,
            })
            .await?;
        parse_plan(&response.content, &goal.id)
    }

    /// Execute each plan step in order, normalizing tool-call path
    /// arguments through `path_alias`, and consult the recovery
    /// framework on tool failure before deciding whether to continue.
    async fn execute(&self, plan: &mut Plan) -> Result<Outcome> {
        while let Some(step) = plan.current_step().cloned() {
            match self.execute_step(&step).await {
                Ok(StepOutcome::Continue) => plan.advance(),
                Ok(StepOutcome::Terminate { reason }) => return Ok(Outcome::Terminated { reason }),
                Err(e) => {
                    let strategy = self.recovery.classify_and_select(&e);
                    info!(step_id = %step.id, ?strategy, "bdi step failed, consulting recovery framework");
                    match strategy {
                        crate::recovery::RecoveryStrategy::Retry => continue,
                        crate::recovery::RecoveryStrategy::Skip => plan.advance(),
                        crate::recovery::RecoveryStrategy::Abort => {
                            return Ok(Outcome::Abandoned { reason: e.to_string() });
                        }
                    }
                }
            }
        }
        Ok(Outcome::Completed)
    }

    async fn execute_step(&self, step: &PlanStep) -> Result<StepOutcome> {
        match &step.action {
            Action::ToolCall { tool, args } => {
                let normalized = self.normalize_args(args.clone());
                self.tools.execute(&self.agent_id, tool, normalized).await?;
                Ok(StepOutcome::Continue)
            }
            Action::SubGoal { description, priority } => {
                self.beliefs.add(
                    "bdi",
                    &format!("subgoal.{}", step.id),
                    serde_json::json!({ "description": description, "priority": priority }),
                    1.0,
                    &self.agent_id,
                    false,
                )?;
                Ok(StepOutcome::Continue)
            }
            Action::Wait { seconds } => {
                tokio::time::sleep(std::time::Duration::from_secs(*seconds)).await;
                Ok(StepOutcome::Continue)
            }
            Action::Terminate { reason } => Ok(StepOutcome::Terminate { reason: reason.clone() }),
        }
    }

    fn normalize_args(&self, mut args: serde_json::Value) -> serde_json::Value {
        if let Some(obj) = args.as_object_mut() {
            for value in obj.values_mut() {
                if let Some(s) = value.as_str() {
                    if let Some(rest) = s.strip_prefix('$') {
                        if let Some((alias, suffix)) = rest.split_once('/') {
                            if let Some(base) = self.path_alias.get(alias) {
                                *value = serde_json::Value::String(base.join(suffix).display().to_string());
                            }
                        }
                    }
                }
            }
        }
        args
    }
}

enum StepOutcome {
    Continue,
    Terminate { reason: String },
}

fn parse_plan(content: &str, goal_id: &str) -> Result<Plan> {
    serde_json::from_str::<Plan>(content.trim())
        .map_err(|e| EngineError::Planning(format!("malformed plan JSON for goal {goal_id}: {e}")))
}
