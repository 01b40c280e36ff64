//! Configuration loading for the supervising process.
//!
//! `data/config/autonomous.json` and `data/config/tools.json` are loaded
//! through this `Config` type, JSON-backed rather than TOML (the
//! persisted-state layout is normative), with the same override precedence
//! as the codebase's established config loader: defaults → file →
//! environment variable → explicit CLI flag.

use crate::errors::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

pub mod resources;

pub use resources::ResourceGuardConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub loops: LoopConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub coordinator: CoordinatorConfig,
    #[serde(default)]
    pub siw: SiwConfig,
    #[serde(default)]
    pub hands: HandsConfig,
    #[serde(default)]
    pub resources: ResourceGuardConfig,
    #[serde(default)]
    pub budget: BudgetConfig,
    #[serde(default)]
    pub workspace_root: Option<PathBuf>,
    #[serde(default)]
    pub path_alias: HashMap<String, PathBuf>,

    /// `data/` root, overridable by `<SYSTEM>_DATA_DIR`; not persisted.
    #[serde(skip, default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            loops: LoopConfig::default(),
            gateway: GatewayConfig::default(),
            coordinator: CoordinatorConfig::default(),
            siw: SiwConfig::default(),
            hands: HandsConfig::default(),
            resources: ResourceGuardConfig::default(),
            budget: BudgetConfig::default(),
            workspace_root: None,
            path_alias: HashMap::new(),
            data_dir: default_data_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopConfig {
    #[serde(default = "default_tactical_interval")]
    pub tactical_interval_secs: u64,
    #[serde(default = "default_strategic_interval")]
    pub strategic_interval_secs: u64,
    #[serde(default = "default_validate_delay")]
    pub validate_delay_secs: u64,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            tactical_interval_secs: default_tactical_interval(),
            strategic_interval_secs: default_strategic_interval(),
            validate_delay_secs: default_validate_delay(),
        }
    }
}

fn default_tactical_interval() -> u64 {
    3600
}
fn default_strategic_interval() -> u64 {
    14400
}
fn default_validate_delay() -> u64 {
    3600
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_bucket_capacity")]
    pub rate_limit_capacity: u32,
    #[serde(default = "default_bucket_refill")]
    pub rate_limit_refill_per_sec: f64,
    #[serde(default = "default_generate_timeout")]
    pub default_timeout_secs: u64,
    #[serde(default)]
    pub pricing: HashMap<String, ModelPricing>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_model(),
            api_key: None,
            rate_limit_capacity: default_bucket_capacity(),
            rate_limit_refill_per_sec: default_bucket_refill(),
            default_timeout_secs: default_generate_timeout(),
            pricing: HashMap::new(),
        }
    }
}

/// Per-million-token prices, stored as micro-currency-units (six fractional
/// digits) so cost estimation never touches floating point.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ModelPricing {
    pub input_micros_per_token: i64,
    pub output_micros_per_token: i64,
}

fn default_endpoint() -> String {
    "http://localhost:8080/v1/chat/completions".to_string()
}
fn default_model() -> String {
    "default".to_string()
}
fn default_bucket_capacity() -> u32 {
    60
}
fn default_bucket_refill() -> f64 {
    1.0
}
fn default_generate_timeout() -> u64 {
    60
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    #[serde(default)]
    pub critical_components: HashSet<String>,
    #[serde(default = "default_cooldown")]
    pub cooldown_secs: u64,
    #[serde(default = "default_backup_count")]
    pub backup_count: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            critical_components: HashSet::new(),
            cooldown_secs: default_cooldown(),
            backup_count: default_backup_count(),
        }
    }
}

fn default_cooldown() -> u64 {
    1800
}
fn default_backup_count() -> usize {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiwConfig {
    #[serde(default = "default_cycles")]
    pub cycles: u32,
    #[serde(default = "default_self_test_timeout")]
    pub self_test_timeout_secs: u64,
    #[serde(default = "default_critique_threshold")]
    pub critique_threshold: f64,
    #[serde(default = "default_byte_cap")]
    pub target_byte_cap: usize,
    #[serde(default = "default_worker_timeout")]
    pub worker_timeout_secs: u64,
}

impl Default for SiwConfig {
    fn default() -> Self {
        Self {
            cycles: default_cycles(),
            self_test_timeout_secs: default_self_test_timeout(),
            critique_threshold: default_critique_threshold(),
            target_byte_cap: default_byte_cap(),
            worker_timeout_secs: default_worker_timeout(),
        }
    }
}

fn default_cycles() -> u32 {
    1
}
fn default_self_test_timeout() -> u64 {
    30
}
fn default_critique_threshold() -> f64 {
    0.6
}
fn default_byte_cap() -> usize {
    200_000
}
fn default_worker_timeout() -> u64 {
    600
}

/// The "hands" tool's allowlist and bounds (§4.3, §9): commands a direct
/// invocation may name, the workspace-relative path globs it may touch
/// beyond the workspace root itself, and the step/time caps on both modes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandsConfig {
    #[serde(default = "default_allowed_commands")]
    pub allowed_commands: HashSet<String>,
    #[serde(default)]
    pub allowed_paths: Vec<String>,
    #[serde(default)]
    pub denied_paths: Vec<String>,
    #[serde(default = "default_direct_timeout")]
    pub direct_timeout_secs: u64,
    #[serde(default = "default_max_llm_steps")]
    pub max_llm_steps: u32,
}

impl Default for HandsConfig {
    fn default() -> Self {
        Self {
            allowed_commands: default_allowed_commands(),
            allowed_paths: Vec::new(),
            denied_paths: Vec::new(),
            direct_timeout_secs: default_direct_timeout(),
            max_llm_steps: default_max_llm_steps(),
        }
    }
}

fn default_allowed_commands() -> HashSet<String> {
    ["cargo", "git", "ls", "cat", "grep", "find"]
        .into_iter()
        .map(String::from)
        .collect()
}
fn default_direct_timeout() -> u64 {
    120
}
fn default_max_llm_steps() -> u32 {
    20
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    /// Remaining daily LLM-cost budget, in micro-currency-units (i64, six
    /// fractional digits). A strategic/tactical batch is refused when this
    /// reaches zero.
    #[serde(default = "default_daily_budget_micros")]
    pub daily_cost_budget_micros: i64,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            daily_cost_budget_micros: default_daily_budget_micros(),
        }
    }
}

fn default_daily_budget_micros() -> i64 {
    10_000_000_000 // $10,000.000000 — generous default ceiling
}

fn default_data_dir() -> PathBuf {
    std::env::var("MINDFORGE_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("data"))
}

impl Config {
    /// Load from `path` (defaults to `<config_dir>/autonomous.json`),
    /// applying environment variable overrides afterward.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_dir = std::env::var("MINDFORGE_CONFIG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("data/config"));
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| config_dir.join("autonomous.json"));

        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(&path).map_err(|e| {
                EngineError::Config(format!("reading {}: {e}", path.display()))
            })?;
            serde_json::from_str(&raw)
                .map_err(|e| EngineError::Config(format!("parsing {}: {e}", path.display())))?
        } else {
            Config::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var("MINDFORGE_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Ok(endpoint) = std::env::var("MINDFORGE_GATEWAY_ENDPOINT") {
            self.gateway.endpoint = endpoint;
        }
        if let Ok(model) = std::env::var("MINDFORGE_GATEWAY_MODEL") {
            self.gateway.model = model;
        }
        if let Ok(key) = std::env::var("MINDFORGE_API_KEY") {
            self.gateway.api_key = Some(key);
        }
        if self.workspace_root.is_none() {
            self.workspace_root = std::env::current_dir().ok();
        }
    }

    pub fn workspace_root(&self) -> PathBuf {
        self.workspace_root
            .clone()
            .unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn log_level(&self) -> String {
        std::env::var("MINDFORGE_LOG_LEVEL").unwrap_or_else(|_| "info".to_string())
    }

    pub fn log_file_enabled(&self) -> bool {
        std::env::var("MINDFORGE_LOG_FILE_ENABLED")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_rate_limit() {
        let config = Config::default();
        assert_eq!(config.gateway.rate_limit_capacity, 60);
        assert!(config.gateway.rate_limit_refill_per_sec > 0.0);
    }

    #[test]
    fn default_hands_allowlist_includes_cargo_and_git() {
        let config = Config::default();
        assert!(config.hands.allowed_commands.contains("cargo"));
        assert!(config.hands.allowed_commands.contains("git"));
        assert!(config.hands.direct_timeout_secs > 0);
        assert!(config.hands.max_llm_steps > 0);
    }

    #[test]
    fn load_missing_file_falls_back_to_defaults() {
        let config = Config::load(Some(Path::new("/nonexistent/autonomous.json"))).unwrap();
        assert_eq!(config.loops.tactical_interval_secs, 3600);
    }

    #[test]
    fn load_parses_a_written_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("autonomous.json");
        std::fs::write(
            &path,
            serde_json::json!({"loops": {"tactical_interval_secs": 42}}).to_string(),
        )
        .unwrap();
        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.loops.tactical_interval_secs, 42);
    }
}
