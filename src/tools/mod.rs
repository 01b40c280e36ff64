//! Tool Registry & Interface (C3): the set of actions an agent can take,
//! name-keyed, access-controlled per caller, and independently
//! enable/disable-able.
//!
//! Kept from the original framework's tool layer almost verbatim — the
//! async `Tool` trait already models exactly what this system needs an
//! agent's "hands" to be. The concrete surface narrows to what the
//! orchestration loops actually reach: `grep_search` for the strategic
//! audit pass and the "hands" tool for everything an agent does to the
//! host directly. What's new is `AccessControl` (so a generated agent
//! can be scoped to a glob of tool names) and the two privileged tools
//! that let a running agent ask the Coordinator to queue an improvement
//! or to launch the Self-Improvement Worker, both gated behind abstract
//! traits rather than a direct dependency on those modules (§9
//! cyclic-reference design).

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

pub mod hands;
pub mod privileged;
pub mod search;

use search::GrepSearch;

/// A tool that can be executed by an agent. Registered in a
/// [`ToolRegistry`] and invoked by name during a BDI plan step.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn schema(&self) -> Value;
    async fn execute(&self, args: Value) -> Result<Value>;

    /// Grouping used by `tools list`; purely informational.
    fn category(&self) -> &str {
        "general"
    }
}

/// Which callers may invoke a tool, matched against the calling agent's
/// id by glob pattern. An empty list means unrestricted.
#[derive(Debug, Clone, Default)]
pub struct AccessControl {
    pub allowed_agents: Vec<String>,
}

impl AccessControl {
    pub fn unrestricted() -> Self {
        Self::default()
    }

    pub fn restricted_to(agents: impl IntoIterator<Item = String>) -> Self {
        Self { allowed_agents: agents.into_iter().collect() }
    }

    pub fn permits(&self, caller_id: &str) -> bool {
        if self.allowed_agents.is_empty() {
            return true;
        }
        self.allowed_agents.iter().any(|pattern| {
            glob::Pattern::new(pattern).map(|p| p.matches(caller_id)).unwrap_or(false)
        })
    }
}

struct Registration {
    tool: Box<dyn Tool>,
    access: AccessControl,
    enabled: bool,
}

/// Name-keyed registry of available tools, created with all built-in
/// tools pre-registered and unrestricted; additional tools (including
/// per-namespace privileged ones) can be added at runtime.
pub struct ToolRegistry {
    tools: HashMap<String, Registration>,
}

impl ToolRegistry {
    /// Create a new registry pre-populated with the built-in tools that
    /// need no per-deployment configuration. The "hands" tool is
    /// registered separately by the caller, which alone knows the
    /// workspace root and command allowlist (`register_hands` below).
    pub fn new() -> Self {
        let mut registry = Self { tools: HashMap::new() };
        registry.register(GrepSearch);
        registry
    }

    /// Register a tool, unrestricted and enabled, replacing any existing
    /// tool with the same name.
    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        self.register_with_access(tool, AccessControl::unrestricted());
    }

    pub fn register_with_access<T: Tool + 'static>(&mut self, tool: T, access: AccessControl) {
        self.tools.insert(
            tool.name().to_string(),
            Registration { tool: Box::new(tool), access, enabled: true },
        );
    }

    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> bool {
        match self.tools.get_mut(name) {
            Some(reg) => {
                reg.enabled = enabled;
                true
            }
            None => false,
        }
    }

    /// Look up a tool by name, returning `None` if not found or disabled.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).filter(|r| r.enabled).map(|r| r.tool.as_ref())
    }

    /// Return `(name, description, category, enabled)` for every
    /// registered tool, for the `tools list` CLI command.
    pub fn list(&self) -> Vec<(&str, &str, &str, bool)> {
        self.tools
            .values()
            .map(|r| (r.tool.name(), r.tool.description(), r.tool.category(), r.enabled))
            .collect()
    }

    /// Execute a tool by name on behalf of `caller_id`, enforcing both
    /// enablement and access control before dispatching.
    pub async fn execute(&self, caller_id: &str, name: &str, args: Value) -> crate::errors::Result<Value> {
        use crate::errors::ToolError;
        let registration = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::NotFound { id: name.to_string() })?;
        if !registration.enabled {
            return Err(ToolError::Disabled { id: name.to_string() }.into());
        }
        if !registration.access.permits(caller_id) {
            return Err(ToolError::PermissionDenied { id: name.to_string(), caller: caller_id.to_string() }.into());
        }
        registration
            .tool
            .execute(args)
            .await
            .map_err(|e| ToolError::Execution { id: name.to_string(), message: e.to_string() }.into())
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Abstraction the privileged `request_improvement` tool depends on
/// instead of importing the coordinator module directly (§9).
#[async_trait]
pub trait ImprovementRequester: Send + Sync {
    async fn request_improvement(
        &self,
        target: Option<String>,
        suggestion: String,
        priority: i32,
        requires_approval: bool,
    ) -> Result<String>;
}

/// Abstraction the privileged `invoke_self_improvement_worker` tool
/// depends on instead of importing the SIW module directly (§9).
#[async_trait]
pub trait WorkerLauncher: Send + Sync {
    async fn launch(&self, target: Option<String>, cycles: u32) -> Result<i32>;
}

/// Register the two privileged tools against live handles, scoped to
/// whichever agent ids the Coordinator grants access to.
pub fn register_privileged(
    registry: &mut ToolRegistry,
    requester: Arc<dyn ImprovementRequester>,
    launcher: Arc<dyn WorkerLauncher>,
    access: AccessControl,
) {
    registry.register_with_access(privileged::RequestImprovement::new(requester), access.clone());
    registry.register_with_access(privileged::InvokeSelfImprovementWorker::new(launcher), access);
}

/// Register the "hands" tool, scoped to whichever agent ids should be
/// allowed to touch the host. A separate entry point from
/// `register_privileged` because construction needs the workspace root
/// and command allowlist, which only the caller building the engine has.
pub fn register_hands(registry: &mut ToolRegistry, hands: hands::Hands, access: AccessControl) {
    registry.register_with_access(hands, access);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_hands() -> hands::Hands {
        hands::Hands::new(
            vec!["echo".to_string()],
            std::env::current_dir().unwrap(),
            vec!["./**".to_string()],
            vec![],
            5,
            3,
            None,
            "test-model".to_string(),
        )
    }

    #[test]
    fn new_registers_the_builtin_tools() {
        let registry = ToolRegistry::new();
        assert!(registry.get("grep_search").is_some());
    }

    #[test]
    fn get_returns_none_for_unknown_tool() {
        let registry = ToolRegistry::new();
        assert!(registry.get("nonexistent_tool").is_none());
    }

    #[test]
    fn disabled_tool_is_hidden_from_get() {
        let mut registry = ToolRegistry::new();
        registry.set_enabled("grep_search", false);
        assert!(registry.get("grep_search").is_none());
    }

    #[tokio::test]
    async fn execute_rejects_disallowed_caller() {
        let mut registry = ToolRegistry::new();
        registry.register_with_access(test_hands(), AccessControl::restricted_to(["trusted-*".to_string()]));
        let result = registry.execute("other-agent", "hands", serde_json::json!({"mode": "direct", "command": "echo", "args": ["hi"]})).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn execute_allows_matching_caller() {
        let mut registry = ToolRegistry::new();
        registry.register_with_access(test_hands(), AccessControl::restricted_to(["trusted-*".to_string()]));
        let result = registry
            .execute("trusted-1", "hands", serde_json::json!({"mode": "direct", "command": "echo", "args": ["hi"]}))
            .await;
        assert!(result.is_ok());
    }

    #[test]
    fn access_control_unrestricted_permits_anyone() {
        assert!(AccessControl::unrestricted().permits("whoever"));
    }
}
