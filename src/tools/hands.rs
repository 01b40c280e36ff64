//! The "hands" tool (§4.3, §9): the one way an agent touches the host
//! outside its own plan bookkeeping. Two modes behind one schema —
//!
//! - `direct`: an allowlisted command name plus a typed argv array,
//!   executed via `tokio::process::Command` (never a shell string),
//!   timeout-bounded, every path-shaped argument canonicalized and
//!   checked against the configured workspace root.
//! - `agentic`: a natural-language task handed to the LLM gateway, which
//!   is looped for one tool call at a time — each executed through the
//!   same direct-mode path — until it returns a `finish` call or the
//!   step cap is reached.
//!
//! Grounded on `safety::checker::CommandChecker` (already the allowlist +
//! dangerous-pattern gate this design calls for) and `llm::gateway::Generator`
//! for the loop's model calls. Replaces the old unrestricted `sh -c` shell
//! tool entirely.

use super::Tool;
use crate::errors::SafetyError;
use crate::llm::gateway::{ChatMessage, GenerateRequest, Generator};
use crate::safety::checker::CommandChecker;
use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{instrument, warn};

/// Output is capped per stream so a runaway command can't blow up the
/// transcript fed back to either the caller or the LLM-driven loop.
const MAX_OUTPUT_CHARS: usize = 10_000;

pub struct Hands {
    checker: CommandChecker,
    workspace_root: PathBuf,
    direct_timeout_secs: u64,
    max_steps: u32,
    generator: Option<Arc<dyn Generator>>,
    model: String,
}

impl Hands {
    pub fn new(
        allowed_commands: impl IntoIterator<Item = String>,
        workspace_root: PathBuf,
        allowed_paths: Vec<String>,
        denied_paths: Vec<String>,
        direct_timeout_secs: u64,
        max_steps: u32,
        generator: Option<Arc<dyn Generator>>,
        model: String,
    ) -> Self {
        let checker = CommandChecker::new(allowed_commands, workspace_root.clone(), allowed_paths, denied_paths);
        Self { checker, workspace_root, direct_timeout_secs, max_steps, generator, model }
    }

    async fn run_direct(&self, command: &str, args: Vec<String>, cwd: Option<String>, timeout_secs: Option<u64>) -> Result<Value> {
        // Unconditional workspace-containment check first: this is what
        // makes a path resolving outside the workspace root surface as a
        // security violation regardless of the allow/deny glob
        // configuration `check_direct`'s own path validation applies.
        if let Some(c) = &cwd {
            ensure_within_workspace(&self.workspace_root, c)?;
        }
        for arg in &args {
            ensure_within_workspace(&self.workspace_root, arg)?;
        }

        self.checker.check_direct(command, &args)?;

        let rendered = std::iter::once(command.to_string()).chain(args.iter().cloned()).collect::<Vec<_>>().join(" ");
        self.checker.check_shell_command(&rendered)?;

        let mut cmd = tokio::process::Command::new(command);
        cmd.args(&args);
        cmd.kill_on_drop(true);
        cmd.current_dir(cwd.as_deref().map(Path::new).unwrap_or(&self.workspace_root));

        let timeout = Duration::from_secs(timeout_secs.unwrap_or(self.direct_timeout_secs));
        let start = Instant::now();

        let (exit_code, stdout, stderr, timed_out) = match tokio::time::timeout(timeout, cmd.output()).await {
            Ok(Ok(out)) => (
                out.status.code().unwrap_or(-1),
                truncate(&String::from_utf8_lossy(&out.stdout)),
                truncate(&String::from_utf8_lossy(&out.stderr)),
                false,
            ),
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {
                warn!(%command, "direct command exceeded timeout");
                (-1, String::new(), "command timed out".to_string(), true)
            }
        };

        Ok(serde_json::json!({
            "exit_code": exit_code,
            "stdout": stdout,
            "stderr": stderr,
            "duration_ms": start.elapsed().as_millis() as u64,
            "timed_out": timed_out,
        }))
    }

    async fn run_agentic(&self, task: &str, max_steps: u32) -> Result<Value> {
        let generator = self
            .generator
            .clone()
            .ok_or_else(|| anyhow::anyhow!("hands tool has no LLM gateway configured for agentic mode"))?;

        let mut transcript = vec![
            ChatMessage {
                role: "system".to_string(),
                content: format!(
                    "You drive a sandboxed shell tool confined to {}. Allowed commands: {}. \
                     Reply with exactly one JSON object per turn: {{\"tool\": \"<command>\", \"args\": [..]}} \
                     to run a command, or {{\"tool\": \"finish\", \"result\": \"...\"}} once the task is done.",
                    self.workspace_root.display(),
                    self.checker.allowed_commands().join(", "),
                ),
            },
            ChatMessage { role: "user".to_string(), content: task.to_string() },
        ];

        for step in 1..=max_steps {
            let response = generator
                .generate(GenerateRequest {
                    model: self.model.clone(),
                    messages: transcript.clone(),
                    temperature: None,
                    max_tokens: None,
                })
                .await?;

            let call: AgenticCall = serde_json::from_str(response.content.trim())
                .map_err(|e| anyhow::anyhow!("hands tool: model did not return a tool call: {e}"))?;

            if call.tool == "finish" {
                return Ok(serde_json::json!({
                    "finished": true,
                    "result": call.result.unwrap_or_default(),
                    "steps": step,
                }));
            }

            transcript.push(ChatMessage { role: "assistant".to_string(), content: response.content });

            let outcome = self.run_direct(&call.tool, call.args.unwrap_or_default(), None, None).await;
            let observation = match outcome {
                Ok(value) => value,
                Err(e) => serde_json::json!({ "error": e.to_string() }),
            };
            transcript.push(ChatMessage { role: "user".to_string(), content: observation.to_string() });
        }

        Ok(serde_json::json!({ "finished": false, "reason": "step cap reached", "steps": max_steps }))
    }
}

#[derive(Deserialize)]
struct AgenticCall {
    tool: String,
    #[serde(default)]
    args: Option<Vec<String>>,
    #[serde(default)]
    result: Option<String>,
}

#[async_trait]
impl Tool for Hands {
    fn name(&self) -> &str {
        "hands"
    }

    fn description(&self) -> &str {
        "Act on the host: run an allowlisted command directly with an argv array, or hand a natural-language task to the LLM-driven loop. All paths are confined to the workspace root."
    }

    fn category(&self) -> &str {
        "hands"
    }

    fn schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "required": ["mode"],
            "properties": {
                "mode": {"type": "string", "enum": ["direct", "agentic"]},
                "command": {"type": "string", "description": "direct mode: the allowlisted program to run"},
                "args": {"type": "array", "items": {"type": "string"}, "default": []},
                "cwd": {"type": "string", "description": "direct mode: working directory, defaults to the workspace root"},
                "timeout_secs": {"type": "integer", "description": "direct mode: override the configured timeout"},
                "task": {"type": "string", "description": "agentic mode: the natural-language task description"},
                "max_steps": {"type": "integer", "description": "agentic mode: override the configured step cap (never raised above it)"}
            }
        })
    }

    #[instrument(level = "info", skip(self, args), fields(tool_name = self.name()))]
    async fn execute(&self, args: Value) -> Result<Value> {
        #[derive(Deserialize)]
        #[serde(tag = "mode", rename_all = "snake_case")]
        enum Args {
            Direct {
                command: String,
                #[serde(default)]
                args: Vec<String>,
                cwd: Option<String>,
                timeout_secs: Option<u64>,
            },
            Agentic {
                task: String,
                max_steps: Option<u32>,
            },
        }

        match serde_json::from_value(args)? {
            Args::Direct { command, args, cwd, timeout_secs } => self.run_direct(&command, args, cwd, timeout_secs).await,
            Args::Agentic { task, max_steps } => {
                let cap = max_steps.map(|m| m.min(self.max_steps)).unwrap_or(self.max_steps);
                self.run_agentic(&task, cap).await
            }
        }
    }
}

fn truncate(s: &str) -> String {
    s.chars().take(MAX_OUTPUT_CHARS).collect()
}

fn looks_like_path(arg: &str) -> bool {
    arg.starts_with('/') || arg.starts_with("./") || arg.starts_with("../")
}

/// A stricter, unconditional workspace-containment check than
/// `PathValidator::validate` (which only engages on a literal `..` or a
/// configured deny/allow list): canonicalizes the argument against the
/// workspace root and rejects anything that resolves outside it, even a
/// bare absolute path with no `..` segments. This is what makes the §8
/// boundary behavior — a path resolving outside the workspace root is a
/// security violation — hold for every path-shaped direct-mode argument.
fn ensure_within_workspace(workspace_root: &Path, arg: &str) -> Result<()> {
    if !looks_like_path(arg) {
        return Ok(());
    }

    let candidate = Path::new(arg);
    let joined = if candidate.is_absolute() { candidate.to_path_buf() } else { workspace_root.join(candidate) };

    let root = workspace_root.canonicalize().unwrap_or_else(|_| workspace_root.to_path_buf());
    let resolved = joined.canonicalize().unwrap_or(joined);

    if !resolved.starts_with(&root) {
        return Err(SafetyError::SecurityViolation(format!("path '{arg}' resolves outside workspace root")).into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedGenerator;

    fn hands(dir: &Path) -> Hands {
        Hands::new(
            vec!["echo".to_string(), "cat".to_string()],
            dir.to_path_buf(),
            vec!["./**".to_string()],
            vec![],
            5,
            3,
            None,
            "test-model".to_string(),
        )
    }

    fn hands_with_generator(dir: &Path, generator: Arc<dyn Generator>) -> Hands {
        Hands::new(
            vec!["echo".to_string(), "cat".to_string()],
            dir.to_path_buf(),
            vec!["./**".to_string()],
            vec![],
            5,
            3,
            Some(generator),
            "test-model".to_string(),
        )
    }

    #[test]
    fn name_and_category() {
        let dir = tempfile::tempdir().unwrap();
        let tool = hands(dir.path());
        assert_eq!(tool.name(), "hands");
        assert_eq!(tool.category(), "hands");
    }

    #[tokio::test]
    async fn direct_mode_runs_an_allowlisted_command() {
        let dir = tempfile::tempdir().unwrap();
        let tool = hands(dir.path());
        let result = tool
            .execute(serde_json::json!({"mode": "direct", "command": "echo", "args": ["hello"]}))
            .await
            .unwrap();
        assert_eq!(result["exit_code"], 0);
        assert!(result["stdout"].as_str().unwrap().contains("hello"));
    }

    #[tokio::test]
    async fn direct_mode_rejects_a_command_off_the_allowlist() {
        let dir = tempfile::tempdir().unwrap();
        let tool = hands(dir.path());
        let result = tool.execute(serde_json::json!({"mode": "direct", "command": "curl", "args": []})).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn direct_mode_rejects_a_path_argument_outside_the_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let tool = hands(dir.path());
        let result = tool.execute(serde_json::json!({"mode": "direct", "command": "cat", "args": ["/etc/passwd"]})).await;
        let err = result.unwrap_err();
        assert!(err.downcast_ref::<SafetyError>().map(|e| matches!(e, SafetyError::SecurityViolation(_))).unwrap_or(false));
    }

    #[tokio::test]
    async fn direct_mode_times_out_long_running_commands() {
        let dir = tempfile::tempdir().unwrap();
        let tool = Hands::new(
            vec!["sleep".to_string()],
            dir.path().to_path_buf(),
            vec![],
            vec![],
            1,
            3,
            None,
            "test-model".to_string(),
        );
        let result = tool.execute(serde_json::json!({"mode": "direct", "command": "sleep", "args": ["5"]})).await.unwrap();
        assert_eq!(result["timed_out"], true);
    }

    #[tokio::test]
    async fn agentic_mode_without_a_generator_errors() {
        let dir = tempfile::tempdir().unwrap();
        let tool = hands(dir.path());
        let result = tool.execute(serde_json::json!({"mode": "agentic", "task": "say hi"})).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn agentic_mode_runs_a_command_then_finishes() {
        let dir = tempfile::tempdir().unwrap();
        let generator = Arc::new(ScriptedGenerator::new([
            r#"{"tool": "echo", "args": ["hi"]}"#,
            r#"{"tool": "finish", "result": "done"}"#,
        ]));
        let tool = hands_with_generator(dir.path(), generator);
        let result = tool.execute(serde_json::json!({"mode": "agentic", "task": "greet"})).await.unwrap();
        assert_eq!(result["finished"], true);
        assert_eq!(result["result"], "done");
    }

    #[tokio::test]
    async fn agentic_mode_hits_the_step_cap_if_the_model_never_finishes() {
        let dir = tempfile::tempdir().unwrap();
        let generator = Arc::new(ScriptedGenerator::new([r#"{"tool": "echo", "args": ["again"]}"#]));
        let tool = hands_with_generator(dir.path(), generator);
        let result = tool.execute(serde_json::json!({"mode": "agentic", "task": "loop forever", "max_steps": 2})).await.unwrap();
        assert_eq!(result["finished"], false);
        assert_eq!(result["steps"], 2);
    }
}
