//! Resource-guard thresholds consulted before launching the SIW subprocess
//! or any strategic LLM batch (§5 resource guards).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceGuardConfig {
    #[serde(default = "default_cpu_ceiling")]
    pub cpu_percent_ceiling: f32,
    #[serde(default = "default_disk_floor_bytes")]
    pub free_disk_floor_bytes: u64,
    #[serde(default = "default_guard_cooldown")]
    pub guard_cooldown_secs: u64,
}

impl Default for ResourceGuardConfig {
    fn default() -> Self {
        Self {
            cpu_percent_ceiling: default_cpu_ceiling(),
            free_disk_floor_bytes: default_disk_floor_bytes(),
            guard_cooldown_secs: default_guard_cooldown(),
        }
    }
}

fn default_cpu_ceiling() -> f32 {
    85.0
}
fn default_disk_floor_bytes() -> u64 {
    1_000_000_000
}
fn default_guard_cooldown() -> u64 {
    300
}
