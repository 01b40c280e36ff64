//! Self-Improvement Worker (C5): the Analyze → Implement → Evaluate →
//! Promote-or-revert → Record cycle, run either against `self` (the
//! worker's own source) or an external target file.
//!
//! Grounded on the codebase's existing recursive-self-improvement outer
//! loop — a bounded cycle count, one iteration directory per attempt, a
//! circuit breaker that stops after a failed analyze/implement step —
//! generalized here to also accept an external target and to gate
//! promotion on syntax, self-test, and critique score rather than a
//! single benchmark number.

use crate::errors::{EngineError, Result};
use crate::llm::{ChatMessage, GenerateRequest, Generator};
use crate::store::Store;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    SelfTarget,
    External(PathBuf),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum CycleStatus {
    Promoted,
    EvaluatedNotPromoted,
    Reverted,
    FailedAnalysis,
    FailedImplementation,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Evaluation {
    pub syntax_ok: bool,
    pub self_tests_ok: Option<bool>,
    pub critique_score: f64,
    pub notes: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CycleResult {
    pub cycle_index: u32,
    pub target_path: String,
    pub improvement_goal: String,
    pub evaluation: Evaluation,
    pub diff: String,
    pub status: CycleStatus,
    pub requires_restart: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerOutput {
    pub status: &'static str,
    pub message: String,
    pub data: WorkerOutputData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerOutputData {
    pub cycles: Vec<CycleResult>,
    pub overall_status: &'static str,
}

pub struct WorkerConfig {
    pub self_test_timeout_secs: u64,
    pub critique_threshold: f64,
    pub target_byte_cap: usize,
    pub model: String,
    pub self_source_path: PathBuf,
    pub data_root: PathBuf,
    pub backup_count: usize,
}

pub struct SelfImprovementWorker {
    generator: Arc<dyn Generator>,
    config: WorkerConfig,
}

impl SelfImprovementWorker {
    pub fn new(generator: Arc<dyn Generator>, config: WorkerConfig) -> Self {
        Self { generator, config }
    }

    /// Run `cycles` iterations against `target`, stopping early only on an
    /// analyze/implement failure (a circuit breaker of one: one bad cycle
    /// ends the run rather than burning the remaining budget on a target
    /// that's already failed once).
    pub async fn run(&self, target: Target, cycles: u32) -> Result<WorkerOutput> {
        let resolved_path = self.resolve_path(&target);
        let mut results = Vec::new();

        for cycle_index in 0..cycles {
            let outcome = self.run_one_cycle(cycle_index, &target, &resolved_path).await;
            let stop_early = matches!(
                outcome.status,
                CycleStatus::FailedAnalysis | CycleStatus::FailedImplementation
            );
            self.record(&outcome)?;
            results.push(outcome);
            if stop_early {
                break;
            }
        }

        let promoted = results.iter().any(|r| r.status == CycleStatus::Promoted);
        let overall_status = if promoted { "SUCCESS" } else { "FAILURE" };
        Ok(WorkerOutput {
            status: overall_status,
            message: format!("ran {} cycle(s) against {}", results.len(), resolved_path.display()),
            data: WorkerOutputData { cycles: results, overall_status },
        })
    }

    fn resolve_path(&self, target: &Target) -> PathBuf {
        match target {
            Target::SelfTarget => self.config.self_source_path.clone(),
            Target::External(path) => path.clone(),
        }
    }

    async fn run_one_cycle(&self, cycle_index: u32, target: &Target, path: &Path) -> CycleResult {
        let target_path = path.display().to_string();

        let original = match std::fs::read_to_string(path) {
            Ok(content) => truncate(&content, self.config.target_byte_cap),
            Err(e) => {
                return failed_cycle(cycle_index, &target_path, CycleStatus::FailedAnalysis, format!("reading target: {e}"));
            }
        };

        let improvement_goal = match self.analyze(&original).await {
            Ok(goal) => goal,
            Err(e) => {
                warn!(%target_path, %e, "siw analyze step failed");
                return failed_cycle(cycle_index, &target_path, CycleStatus::FailedAnalysis, e.to_string());
            }
        };

        let candidate = match self.implement(&original, &improvement_goal).await {
            Ok(code) => code,
            Err(e) => {
                warn!(%target_path, %e, "siw implement step failed");
                return failed_cycle(cycle_index, &target_path, CycleStatus::FailedImplementation, e.to_string());
            }
        };

        let diff = similar::TextDiff::from_lines(&original, &candidate)
            .unified_diff()
            .context_radius(3)
            .header(&target_path, &target_path)
            .to_string();

        let evaluation = self.evaluate(target, &candidate).await;
        let accepted = evaluation.syntax_ok
            && evaluation.self_tests_ok.unwrap_or(true)
            && evaluation.critique_score >= self.config.critique_threshold;

        let (status, requires_restart) = if !accepted {
            (CycleStatus::EvaluatedNotPromoted, false)
        } else {
            match self.promote(target, path, &candidate) {
                Ok(requires_restart) => (CycleStatus::Promoted, requires_restart),
                Err(e) => {
                    warn!(%target_path, %e, "siw promotion failed, reverting");
                    (CycleStatus::Reverted, false)
                }
            }
        };

        CycleResult {
            cycle_index,
            target_path,
            improvement_goal,
            evaluation,
            diff,
            status,
            requires_restart,
        }
    }

    async fn analyze(&self, content: &str) -> Result<String> {
        let prompt = format!(
            "Read this source file and describe exactly one actionable improvement \
             (a single sentence, no code):\n\n{content}"
        );
        let response = self.generate(prompt).await?;
        Ok(response.trim().to_string())
    }

    async fn implement(&self, original: &str, improvement_goal: &str) -> Result<String> {
        let prompt = format!(
            "Apply this improvement to the file and return the FULL replacement file \
             contents only, with no commentary or code fences.\n\nImprovement: {improvement_goal}\n\nOriginal:\n{original}"
        );
        let response = self.generate(prompt).await?;
        let candidate = strip_code_fence(&response);
        if !looks_like_source(&candidate) {
            return Err(EngineError::Planning("implement step returned non-source output".to_string()));
        }
        Ok(candidate)
    }

    async fn generate(&self, prompt: String) -> Result<String> {
        let response = self
            .generator
            .generate(GenerateRequest {
                model: self.config.model.clone(),
                messages: vec![ChatMessage { role: "user".to_string(), content: prompt }],
                temperature: Some(0.2),
                max_tokens: None,
            })
            .await?;
        Ok(response.content)
    }

    async fn evaluate(&self, target: &Target, candidate: &str) -> Evaluation {
        let syntax_ok = looks_like_source(candidate);
        if !syntax_ok {
            return Evaluation { syntax_ok, self_tests_ok: None, critique_score: 0.0, notes: "parse check failed".to_string() };
        }

        let self_tests_ok = match target {
            Target::SelfTarget => Some(self.run_self_test().await),
            Target::External(_) => None,
        };
        if self_tests_ok == Some(false) {
            return Evaluation { syntax_ok, self_tests_ok, critique_score: 0.0, notes: "self-test failed".to_string() };
        }

        let critique_score = self.critique(candidate).await.unwrap_or(0.0);
        Evaluation { syntax_ok, self_tests_ok, critique_score, notes: String::new() }
    }

    /// Spawn the candidate under `--self-test` and await its timeout-bounded
    /// JSON status line. A worker with no self-source to re-exec (e.g. in
    /// tests) treats this as passing, since there's nothing to exercise.
    async fn run_self_test(&self) -> bool {
        let Ok(exe) = std::env::current_exe() else { return true };
        let timeout = std::time::Duration::from_secs(self.config.self_test_timeout_secs);
        let run = tokio::process::Command::new(exe).arg("--self-test").output();
        match tokio::time::timeout(timeout, run).await {
            Ok(Ok(output)) => output.status.success(),
            _ => false,
        }
    }

    async fn critique(&self, candidate: &str) -> Result<f64> {
        let prompt = format!(
            "Score this candidate change from 0.0 to 1.0 for correctness and safety. \
             Respond with only the number.\n\n{candidate}"
        );
        let response = self.generate(prompt).await?;
        response
            .trim()
            .parse::<f64>()
            .map(|v| v.clamp(0.0, 1.0))
            .map_err(|e| EngineError::Planning(format!("critique score unparseable: {e}")))
    }

    /// External target: overwrite in place through the atomic write
    /// protocol. Self target: back the current source up under
    /// `fallback_versions/` before replacing it, and report
    /// `requires_restart = true` since a running process can't hot-swap its
    /// own compiled code.
    fn promote(&self, target: &Target, path: &Path, candidate: &str) -> Result<bool> {
        match target {
            Target::External(_) => {
                let parent = path.parent().unwrap_or_else(|| Path::new("."));
                let name = path.file_name().ok_or_else(|| EngineError::Internal("target path has no file name".to_string()))?;
                let store = Store::new(parent, self.config.backup_count);
                store.write_raw(&name.to_string_lossy(), candidate.as_bytes())?;
                Ok(false)
            }
            Target::SelfTarget => {
                let fallback_dir = self.config.data_root.join("fallback_versions");
                std::fs::create_dir_all(&fallback_dir)
                    .map_err(|e| EngineError::Internal(format!("creating fallback_versions: {e}")))?;
                let ts = chrono::Utc::now().timestamp();
                let backup_path = fallback_dir.join(format!("{ts}.rs"));
                std::fs::copy(path, &backup_path).map_err(|e| EngineError::Internal(format!("backing up self source: {e}")))?;

                let tmp = path.with_extension("tmp");
                std::fs::write(&tmp, candidate).map_err(|e| EngineError::Internal(format!("writing candidate: {e}")))?;
                std::fs::rename(&tmp, path).map_err(|e| EngineError::Internal(format!("promoting candidate: {e}")))?;
                Ok(true)
            }
        }
    }

    fn record(&self, result: &CycleResult) -> Result<()> {
        let log_path = self.config.data_root.join("logs").join("sia").join("improvement_history.jsonl");
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| EngineError::Internal(format!("creating siw log dir: {e}")))?;
        }
        let line = serde_json::to_string(result)
            .map_err(|e| EngineError::Internal(format!("serializing cycle result: {e}")))?;
        use std::io::Write as _;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .map_err(|e| EngineError::Internal(format!("opening siw log: {e}")))?;
        writeln!(file, "{line}").map_err(|e| EngineError::Internal(format!("writing siw log: {e}")))?;
        info!(cycle_index = result.cycle_index, status = ?result.status, "siw cycle recorded");
        Ok(())
    }
}

fn failed_cycle(cycle_index: u32, target_path: &str, status: CycleStatus, notes: String) -> CycleResult {
    CycleResult {
        cycle_index,
        target_path: target_path.to_string(),
        improvement_goal: String::new(),
        evaluation: Evaluation { syntax_ok: false, self_tests_ok: None, critique_score: 0.0, notes },
        diff: String::new(),
        status,
        requires_restart: false,
    }
}

fn truncate(content: &str, byte_cap: usize) -> String {
    if content.len() <= byte_cap {
        content.to_string()
    } else {
        content.chars().take(byte_cap).collect()
    }
}

fn strip_code_fence(text: &str) -> String {
    let trimmed = text.trim();
    if let Some(rest) = trimmed.strip_prefix("```") {
        let rest = rest.trim_start_matches(|c: char| c.is_alphanumeric());
        let rest = rest.strip_suffix("```").unwrap_or(rest);
        return rest.trim().to_string();
    }
    trimmed.to_string()
}

/// A parse check stand-in: balanced braces/parens/brackets is a cheap,
/// dependency-free proxy for "didn't truncate mid-token," without pulling
/// in a full parser just to gate promotion.
fn looks_like_source(candidate: &str) -> bool {
    if candidate.trim().is_empty() {
        return false;
    }
    let mut depth = 0i32;
    for c in candidate.chars() {
        match c {
            '{' | '(' | '[' => depth += 1,
            '}' | ')' | ']' => depth -= 1,
            _ => {}
        }
        if depth < 0 {
            return false;
        }
    }
    depth == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::GatewayError;
    use crate::llm::GenerateResponse;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedGenerator {
        responses: Vec<String>,
        call: AtomicUsize,
    }

    #[async_trait]
    impl Generator for ScriptedGenerator {
        async fn generate(&self, _req: GenerateRequest) -> std::result::Result<GenerateResponse, GatewayError> {
            let i = self.call.fetch_add(1, Ordering::SeqCst);
            let content = self.responses.get(i % self.responses.len()).cloned().unwrap_or_default();
            Ok(GenerateResponse { content, input_tokens: 1, output_tokens: 1, cost_micros: 0 })
        }
    }

    fn worker(dir: &Path, responses: Vec<&str>) -> SelfImprovementWorker {
        SelfImprovementWorker::new(
            Arc::new(ScriptedGenerator { responses: responses.into_iter().map(String::from).collect(), call: AtomicUsize::new(0) }),
            WorkerConfig {
                self_test_timeout_secs: 5,
                critique_threshold: 0.6,
                target_byte_cap: 100_000,
                model: "test-model".to_string(),
                self_source_path: dir.join("self.rs"),
                data_root: dir.to_path_buf(),
                backup_count: 5,
            },
        )
    }

    #[test]
    fn looks_like_source_rejects_unbalanced_braces() {
        assert!(!looks_like_source("fn x() { "));
        assert!(looks_like_source("fn x() {}"));
    }

    #[test]
    fn strip_code_fence_removes_fenced_wrapper() {
        assert_eq!(strip_code_fence("```rust\nfn x() {}\n```"), "fn x() {}");
    }

    #[tokio::test]
    async fn external_target_promotes_on_high_critique_score() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("lib.rs");
        std::fs::write(&target, "fn old() {}").unwrap();

        let worker = worker(dir.path(), vec!["improve naming", "fn new() {}", "0.9"]);
        let output = worker.run(Target::External(target.clone()), 1).await.unwrap();

        assert_eq!(output.status, "SUCCESS");
        assert_eq!(output.data.cycles[0].status, CycleStatus::Promoted);
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "fn new() {}");
    }

    #[tokio::test]
    async fn low_critique_score_does_not_promote() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("lib.rs");
        std::fs::write(&target, "fn old() {}").unwrap();

        let worker = worker(dir.path(), vec!["improve naming", "fn new() {}", "0.1"]);
        let output = worker.run(Target::External(target.clone()), 1).await.unwrap();

        assert_eq!(output.status, "FAILURE");
        assert_eq!(output.data.cycles[0].status, CycleStatus::EvaluatedNotPromoted);
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "fn old() {}");
    }

    #[tokio::test]
    async fn malformed_implementation_output_stops_the_run_early() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("lib.rs");
        std::fs::write(&target, "fn old() {}").unwrap();

        let worker = worker(dir.path(), vec!["improve naming", "not valid { source"]);
        let output = worker.run(Target::External(target), 3).await.unwrap();

        assert_eq!(output.data.cycles.len(), 1);
        assert_eq!(output.data.cycles[0].status, CycleStatus::FailedImplementation);
    }

    #[tokio::test]
    async fn improvement_history_is_appended_as_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("lib.rs");
        std::fs::write(&target, "fn old() {}").unwrap();

        let worker = worker(dir.path(), vec!["improve naming", "fn new() {}", "0.9"]);
        worker.run(Target::External(target), 1).await.unwrap();

        let log = std::fs::read_to_string(dir.path().join("logs").join("sia").join("improvement_history.jsonl")).unwrap();
        assert_eq!(log.lines().count(), 1);
    }
}
