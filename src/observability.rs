//! Global `tracing` setup for the supervising process.
//!
//! An `EnvFilter` driven by `MINDFORGE_LOG_LEVEL`, a human-readable layer to
//! stderr, and — when `MINDFORGE_LOG_FILE_ENABLED=1` — a rolling daily file
//! layer under `data/logs/` via `tracing-appender`, matching the pattern the
//! codebase's own telemetry setup already uses. The file guard must be kept
//! alive for the process lifetime or buffered lines are dropped on exit.

use crate::config::Config;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber. The returned guard must be held by the
/// caller (typically `main`) for as long as file logging should flush.
pub fn init(config: &Config) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_new(config.log_level()).unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr_layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    if config.log_file_enabled() {
        let log_dir = config.data_dir.join("logs");
        let _ = std::fs::create_dir_all(&log_dir);
        let appender = tracing_appender::rolling::daily(&log_dir, "mindforge.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);
        let file_layer = fmt::layer().json().with_writer(non_blocking);

        tracing_subscriber::registry()
            .with(filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
        Some(guard)
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(stderr_layer)
            .init();
        None
    }
}

/// Directory process traces (`data/logs/process_traces/*.jsonl`) are
/// appended to; one file per task kind, grepped by `correlation_id`.
pub fn process_trace_dir(config: &Config) -> std::path::PathBuf {
    config.data_dir.join("logs").join("process_traces")
}

/// Escape control characters so a value can't forge extra log lines
/// (log injection via embedded newlines).
pub fn sanitize_for_log(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => out.push_str(&format!("\\u{:04x}", c as u32)),
            _ => out.push(c),
        }
    }
    out
}
