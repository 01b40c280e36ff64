//! The central error type for the orchestration engine.
//!
//! Mirrors the error kind taxonomy of the engine's error-handling design:
//! input errors (never retried), transient errors (retried with backoff by
//! the recovery framework), execution errors (handled by recovery), safety
//! violations (never retried), and fatal errors (trigger shutdown). Library
//! code returns `Result<T, EngineError>`; only the CLI's `main` and the
//! top-level supervisor loops convert to `anyhow::Error` for final reporting.

use thiserror::Error;

/// The crate's top-level error type, composing each subsystem's error enum.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("safety error: {0}")]
    Safety(#[from] SafetyError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("recovery error: {0}")]
    Recovery(#[from] RecoveryError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("planning error: {0}")]
    Planning(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl EngineError {
    /// Short machine-readable kind tag used in user-facing messages
    /// (`{kind}: {description} (correlation_id={id})`).
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Gateway(_) => "Gateway",
            EngineError::Tool(_) => "Tool",
            EngineError::Safety(_) => "Safety",
            EngineError::Store(_) => "Store",
            EngineError::Recovery(_) => "Recovery",
            EngineError::Config(_) => "Config",
            EngineError::Planning(_) => "Planning",
            EngineError::Internal(_) => "Internal",
            EngineError::Other(_) => "Other",
        }
    }

    /// Render the standard user-facing failure message carrying a
    /// correlation id for trace lookup under `data/logs/process_traces/`.
    pub fn with_correlation(&self, correlation_id: uuid::Uuid) -> String {
        format!("{}: {} (correlation_id={})", self.kind(), self, correlation_id)
    }
}

/// LLM Gateway (C2) error kinds, per the generate() contract.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("generation timed out after {0}ms")]
    Timeout(u64),

    #[error("provider error: {0}")]
    ProviderError(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Tool Registry & Interface (C3) error kinds.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ToolError {
    #[error("tool '{id}' not found")]
    NotFound { id: String },

    #[error("tool '{id}' is disabled")]
    Disabled { id: String },

    #[error("caller '{caller}' is not permitted to invoke tool '{id}'")]
    PermissionDenied { id: String, caller: String },

    #[error("arguments for tool '{id}' violate its schema: {message}")]
    SchemaViolation { id: String, message: String },

    #[error("tool '{id}' failed: {message}")]
    Execution { id: String, message: String },

    #[error("tool '{id}' timed out after {seconds}s")]
    Timeout { id: String, seconds: u64 },
}

/// Safety-gate error kinds (never retried; backlog items transition to
/// REJECTED on these).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SafetyError {
    #[error("path escapes workspace root: {path}")]
    PathEscape { path: String },

    #[error("command '{command}' is not on the allowlist")]
    CommandNotAllowed { command: String },

    #[error("command blocked by pattern: {reason}")]
    DangerousCommand { reason: String },

    #[error("security violation: {0}")]
    SecurityViolation(String),
}

/// Persistent Store (C4) error kinds.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("io error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("checksum mismatch for {path}, backup recovery exhausted")]
    Corruption { path: String },

    #[error("document at {path} has schema_version {found}, expected <= {expected}")]
    IncompatibleSchema {
        path: String,
        found: u32,
        expected: u32,
    },
}

/// Failure & Recovery Framework (C11) error kinds.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RecoveryError {
    #[error("recovery exhausted for goal: {0}")]
    Exhausted(String),

    #[error("no strategy registered for failure kind {0:?}")]
    NoStrategy(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
