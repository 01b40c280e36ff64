//! Mindforge — an autonomous, self-improving agent orchestration engine.
//!
//! A supervising process runs a strategic loop (Mastermind) and a tactical
//! loop (Coordinator) over a shared belief store, tool registry, and LLM
//! gateway. Mastermind turns directives into backlog items; the Coordinator
//! drains approved items into Self-Improvement Worker subprocess runs;
//! BDI/AGInt give individual agent instances a plan-execute-recover cognitive
//! cycle of their own.
//!
//! # Quick Start
//!
//! ```ignore
//! use mindforge::config::Config;
//!
//! let config = Config::load(None)?;
//! ```

pub mod agint;
pub mod bdi;
pub mod beliefs;
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod errors;
pub mod llm;
pub mod mastermind;
pub mod plan;
pub mod observability;
pub mod recovery;
pub mod resource;
pub mod safety;
pub mod siw;
pub mod store;
pub mod testing;
pub mod tools;
