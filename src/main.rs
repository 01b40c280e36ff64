//! Supervisor entry point: constructs the engine's handles once, dispatches
//! a one-shot CLI command if one was given, otherwise spawns the tactical
//! and strategic loops and runs until a shutdown signal arrives.

use clap::Parser;
use mindforge::cli::{AgentRegistry, Cli, Engine};
use mindforge::config::Config;
use mindforge::coordinator::Coordinator;
use mindforge::errors::Result;
use mindforge::llm::gateway::{Gateway, Generator};
use mindforge::mastermind::Mastermind;
use mindforge::resource::ResourceGuard;
use mindforge::tools::{self, hands::Hands, ImprovementRequester, ToolRegistry, WorkerLauncher};
use std::process::Stdio;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Launches the `mindforge-siw` binary as a subprocess, enforcing the
/// configured worker timeout with a SIGTERM/SIGKILL escalation on expiry.
struct SubprocessLauncher {
    binary: std::path::PathBuf,
    timeout_secs: u64,
}

#[async_trait::async_trait]
impl WorkerLauncher for SubprocessLauncher {
    async fn launch(&self, target: Option<String>, cycles: u32) -> anyhow::Result<i32> {
        let mut command = tokio::process::Command::new(&self.binary);
        command
            .arg(target.unwrap_or_else(|| "self".to_string()))
            .arg("--cycles")
            .arg(cycles.to_string())
            .arg("--output-json")
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut child = command.spawn()?;
        let timeout = std::time::Duration::from_secs(self.timeout_secs);
        match tokio::time::timeout(timeout, child.wait()).await {
            Ok(status) => Ok(status?.code().unwrap_or(1)),
            Err(_) => {
                warn!("siw subprocess exceeded timeout, terminating");
                let _ = child.start_kill();
                let _ = child.wait().await;
                anyhow::bail!("siw subprocess timed out after {}s", self.timeout_secs)
            }
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = Config::load(None).unwrap_or_default();
    let _log_guard = mindforge::observability::init(&config);

    let engine = match build_engine(&config) {
        Ok(engine) => engine,
        Err(e) => {
            error!(%e, "failed to construct engine");
            std::process::exit(mindforge::cli::EXIT_FAILURE);
        }
    };

    if let Some(command) = cli.command {
        let code = mindforge::cli::dispatch(command, &engine).await;
        std::process::exit(code);
    }

    run_supervisor(config, engine).await;
}

fn build_engine(config: &Config) -> Result<Engine> {
    let resource_guard = ResourceGuard::new(config.resources.clone());

    let coordinator = Arc::new(Coordinator::new(
        &config.data_dir,
        config.coordinator.backup_count,
        config.coordinator.critical_components.clone(),
        config.coordinator.cooldown_secs,
        resource_guard,
    ));
    let mastermind = Arc::new(Mastermind::new(&config.data_dir, config.coordinator.backup_count, coordinator.clone()));
    let agents = Arc::new(AgentRegistry::new(&config.data_dir, config.coordinator.backup_count));

    let mut registry = ToolRegistry::new();
    let launcher = Arc::new(SubprocessLauncher {
        binary: std::env::current_exe().ok().and_then(|p| p.parent().map(|d| d.join("mindforge-siw"))).unwrap_or_else(|| "mindforge-siw".into()),
        timeout_secs: config.siw.worker_timeout_secs,
    });
    tools::register_privileged(&mut registry, coordinator.clone() as Arc<dyn ImprovementRequester>, launcher, tools::AccessControl::unrestricted());

    let generator: Option<Arc<dyn Generator>> = config.gateway.api_key.as_ref().map(|_| Arc::new(Gateway::new(config.gateway.clone())) as Arc<dyn Generator>);
    let hands = Hands::new(
        config.hands.allowed_commands.iter().cloned(),
        config.workspace_root(),
        config.hands.allowed_paths.clone(),
        config.hands.denied_paths.clone(),
        config.hands.direct_timeout_secs,
        config.hands.max_llm_steps,
        generator,
        config.gateway.model.clone(),
    );
    tools::register_hands(&mut registry, hands, tools::AccessControl::unrestricted());

    let tools = Arc::new(registry);

    Ok(Engine { coordinator, mastermind, tools, agents })
}

async fn run_supervisor(config: Config, engine: Engine) {
    let pid_path = config.data_dir.join("pids").join("mindforge.pid");
    if let Some(parent) = pid_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let _ = std::fs::write(&pid_path, std::process::id().to_string());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let tactical = tokio::spawn(tactical_loop(config.loops.tactical_interval_secs, engine.coordinator.clone(), shutdown_rx.clone()));
    let strategic = tokio::spawn(strategic_loop(config.loops.strategic_interval_secs, engine.mastermind.clone(), engine.tools.clone(), shutdown_rx.clone()));

    wait_for_shutdown_signal().await;
    info!("shutdown signal received, notifying tasks");
    let _ = shutdown_tx.send(true);

    let _ = tokio::join!(tactical, strategic);
    let _ = std::fs::remove_file(&pid_path);
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).expect("install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = terminate.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

async fn tactical_loop(interval_secs: u64, coordinator: Arc<Coordinator>, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(std::time::Duration::from_secs(interval_secs.max(1)));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let launch = |item: mindforge::coordinator::BacklogItem| async move {
                    info!(backlog_id = %item.id, "tactical loop would invoke siw here");
                    Ok(())
                };
                match coordinator.tick(launch).await {
                    Ok(Some(id)) => info!(backlog_id = %id, "tactical tick processed one item"),
                    Ok(None) => {}
                    Err(e) => error!(%e, "tactical tick failed"),
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("tactical loop shutting down");
                    break;
                }
            }
        }
    }
}

async fn strategic_loop(interval_secs: u64, mastermind: Arc<Mastermind>, tools: Arc<ToolRegistry>, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(std::time::Duration::from_secs(interval_secs.max(1)));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let tools = tools.clone();
                let audit = move || async move {
                    tools
                        .execute("mastermind", "grep_search", serde_json::json!({"pattern": "TODO", "path": ".", "max_matches": 20}))
                        .await
                        .ok()
                        .and_then(|v| v.get("matches").and_then(|m| m.as_array()).cloned())
                        .map(|matches| {
                            matches
                                .iter()
                                .filter_map(|m| {
                                    let file = m.get("file")?.as_str()?.to_string();
                                    Some(mindforge::mastermind::Finding { severity: 1, target: file, suggestion: "resolve outstanding TODO".to_string() })
                                })
                                .collect()
                        })
                        .unwrap_or_default()
                };
                let blueprint = |finding: &mindforge::mastermind::Finding| (finding.suggestion.clone(), Some(finding.target.clone()));
                match mastermind.run_campaign("assess and evolve".to_string(), audit, blueprint).await {
                    Ok(id) => info!(campaign_id = %id, "strategic loop started a campaign"),
                    Err(e) => error!(%e, "strategic loop campaign failed"),
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("strategic loop shutting down");
                    break;
                }
            }
        }
    }
}
