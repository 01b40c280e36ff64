//! Privileged tools that reach outside an agent's own plan execution into
//! the Coordinator and the Self-Improvement Worker launcher. Both depend
//! only on the abstract traits in `super`, never on the concrete
//! `coordinator`/`siw` modules, to avoid a dependency cycle (§9).

use super::Tool;
use crate::tools::{ImprovementRequester, WorkerLauncher};
use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

pub struct RequestImprovement {
    requester: Arc<dyn ImprovementRequester>,
}

impl RequestImprovement {
    pub fn new(requester: Arc<dyn ImprovementRequester>) -> Self {
        Self { requester }
    }
}

#[async_trait]
impl Tool for RequestImprovement {
    fn name(&self) -> &str {
        "coordinator_request_improvement"
    }

    fn description(&self) -> &str {
        "Queue a self-improvement backlog item for human or autonomous review."
    }

    fn category(&self) -> &str {
        "privileged"
    }

    fn schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "suggestion": {"type": "string", "description": "What should change and why"},
                "target": {"type": "string", "description": "File or component path, omitted for self-targeting"},
                "priority": {"type": "integer", "default": 0, "description": "Higher runs sooner"},
                "requires_approval": {"type": "boolean", "default": false, "description": "Force the human-in-the-loop gate even for a non-critical target"}
            },
            "required": ["suggestion"]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value> {
        #[derive(Deserialize)]
        struct Args {
            suggestion: String,
            target: Option<String>,
            #[serde(default)]
            priority: i32,
            #[serde(default)]
            requires_approval: bool,
        }
        let args: Args = serde_json::from_value(args)?;
        let backlog_id = self
            .requester
            .request_improvement(args.target, args.suggestion, args.priority, args.requires_approval)
            .await?;
        Ok(serde_json::json!({ "backlog_id": backlog_id }))
    }
}

pub struct InvokeSelfImprovementWorker {
    launcher: Arc<dyn WorkerLauncher>,
}

impl InvokeSelfImprovementWorker {
    pub fn new(launcher: Arc<dyn WorkerLauncher>) -> Self {
        Self { launcher }
    }
}

#[async_trait]
impl Tool for InvokeSelfImprovementWorker {
    fn name(&self) -> &str {
        "invoke_self_improvement_worker"
    }

    fn description(&self) -> &str {
        "Launch the Self-Improvement Worker subprocess against a target (or the engine itself) and wait for its exit code."
    }

    fn category(&self) -> &str {
        "privileged"
    }

    fn schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "target": {"type": "string", "description": "File or component path, omitted for self-targeting"},
                "cycles": {"type": "integer", "default": 1, "minimum": 1}
            }
        })
    }

    async fn execute(&self, args: Value) -> Result<Value> {
        #[derive(Deserialize)]
        struct Args {
            target: Option<String>,
            #[serde(default = "default_cycles")]
            cycles: u32,
        }
        fn default_cycles() -> u32 {
            1
        }
        let args: Args = serde_json::from_value(args)?;
        let exit_code = self.launcher.launch(args.target, args.cycles).await?;
        Ok(serde_json::json!({ "exit_code": exit_code }))
    }
}
