//! Shared scaffolding for integration tests: a scratch data directory and a
//! fully-wired `Engine` backed by a scripted (non-networked) generator.

use mindforge::cli::{AgentRegistry, Engine};
use mindforge::config::ResourceGuardConfig;
use mindforge::coordinator::Coordinator;
use mindforge::mastermind::Mastermind;
use mindforge::resource::ResourceGuard;
use mindforge::testing::ScriptedGenerator;
use mindforge::tools::{self, AccessControl, ImprovementRequester, ToolRegistry, WorkerLauncher};
use std::collections::HashSet;
use std::sync::Arc;

/// A `WorkerLauncher` that never actually spawns a subprocess — integration
/// tests exercise the tactical loop's bookkeeping, not the real SIW binary.
pub struct NoopLauncher;

#[async_trait::async_trait]
impl WorkerLauncher for NoopLauncher {
    async fn launch(&self, _target: Option<String>, _cycles: u32) -> anyhow::Result<i32> {
        Ok(0)
    }
}

/// Builds an `Engine` rooted at a fresh temp directory with no critical
/// components configured, so every backlog item is immediately tickable.
pub fn test_engine(data_root: &std::path::Path) -> Engine {
    let resource_guard = ResourceGuard::new(ResourceGuardConfig { cpu_percent_ceiling: 100.0, free_disk_floor_bytes: 0, guard_cooldown_secs: 0 });
    let coordinator = Arc::new(Coordinator::new(data_root, 3, HashSet::new(), 0, resource_guard));
    let mastermind = Arc::new(Mastermind::new(data_root, 3, coordinator.clone()));
    let agents = Arc::new(AgentRegistry::new(data_root, 3));

    let mut registry = ToolRegistry::new();
    tools::register_privileged(
        &mut registry,
        coordinator.clone() as Arc<dyn ImprovementRequester>,
        Arc::new(NoopLauncher),
        AccessControl::unrestricted(),
    );

    Engine { coordinator, mastermind, tools: Arc::new(registry), agents }
}

/// A generator that always returns the same fixed JSON-ish analysis/implementation
/// text, sufficient for exercising the SIW cycle end to end without a network call.
pub fn scripted_generator(responses: impl IntoIterator<Item = impl Into<String>>) -> Arc<ScriptedGenerator> {
    Arc::new(ScriptedGenerator::new(responses))
}
