//! End-to-end scenarios threading backlog, coordinator, and mastermind
//! handles together the way the supervisor process does, without spawning
//! the real `mindforge-siw` subprocess.

mod helpers;
mod scenarios;

pub use helpers::*;
