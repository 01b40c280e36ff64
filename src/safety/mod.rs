//! Safety layer: command allowlisting, path containment, and secret
//! redaction, consulted by the tool registry before any tool actually
//! runs (§4.3, §9).

pub mod checker;
pub mod path_validator;
pub mod redact;

pub use checker::CommandChecker;
pub use path_validator::PathValidator;
