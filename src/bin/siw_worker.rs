//! Self-Improvement Worker subprocess entry point. Invoked by the
//! coordinator (or directly for manual runs) with a target and a cycle
//! budget; emits exactly one JSON object on stdout and exits 0 iff at
//! least one cycle promoted (self) or was evaluated-accepted (external).

use clap::Parser;
use mindforge::config::Config;
use mindforge::llm::Gateway;
use mindforge::siw::{SelfImprovementWorker, Target, WorkerConfig};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "mindforge-siw")]
struct Args {
    /// "self" or a workspace-relative path.
    target: String,
    #[arg(long)]
    context: Option<String>,
    #[arg(long)]
    context_file: Option<PathBuf>,
    #[arg(long)]
    logs: Vec<PathBuf>,
    #[arg(long)]
    llm_provider: Option<String>,
    #[arg(long)]
    llm_model: Option<String>,
    #[arg(long)]
    cycles: Option<u32>,
    #[arg(long)]
    self_test_timeout: Option<u64>,
    #[arg(long)]
    critique_threshold: Option<f64>,
    #[arg(long)]
    output_json: bool,
    /// Internal: invoked by a parent SIW run to smoke-test a self-target
    /// candidate before promotion.
    #[arg(long)]
    self_test: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if args.self_test {
        println!("{}", serde_json::json!({"status": "SUCCESS"}));
        std::process::exit(0);
    }

    let mut config = Config::load(None).unwrap_or_default();
    if let Some(model) = args.llm_model.clone() {
        config.gateway.model = model;
    }
    let _guard = mindforge::observability::init(&config);

    let target = if args.target == "self" {
        Target::SelfTarget
    } else {
        Target::External(PathBuf::from(&args.target))
    };

    let worker = SelfImprovementWorker::new(
        Arc::new(Gateway::new(config.gateway.clone())),
        WorkerConfig {
            self_test_timeout_secs: args.self_test_timeout.unwrap_or(config.siw.self_test_timeout_secs),
            critique_threshold: args.critique_threshold.unwrap_or(config.siw.critique_threshold),
            target_byte_cap: config.siw.target_byte_cap,
            model: config.gateway.model.clone(),
            self_source_path: PathBuf::from("src/bin/siw_worker.rs"),
            data_root: config.data_dir.clone(),
            backup_count: config.coordinator.backup_count,
        },
    );

    let cycles = args.cycles.unwrap_or(config.siw.cycles);
    match worker.run(target, cycles).await {
        Ok(output) => {
            println!("{}", serde_json::to_string(&output).unwrap_or_default());
            std::process::exit(if output.status == "SUCCESS" { 0 } else { 1 });
        }
        Err(e) => {
            let failure = serde_json::json!({
                "status": "FAILURE",
                "message": e.to_string(),
                "data": {"cycles": [], "overall_status": "FAILURE"},
            });
            println!("{failure}");
            std::process::exit(1);
        }
    }
}
