//! Resource guards consulted before the tactical/strategic loops act (§5).
//!
//! Grounded on the codebase's existing `sysinfo`-backed resource sampling:
//! CPU utilization and free disk space are read fresh on every guard check
//! rather than cached, since guard checks are infrequent (once per loop
//! tick) relative to sampling cost.

use crate::config::ResourceGuardConfig;
use sysinfo::{Disks, System};

pub struct ResourceGuard {
    config: ResourceGuardConfig,
    system: System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardFailure {
    CpuOverCeiling,
    DiskBelowFloor,
}

impl ResourceGuard {
    pub fn new(config: ResourceGuardConfig) -> Self {
        Self {
            config,
            system: System::new(),
        }
    }

    /// Returns `Ok(())` if it is safe to launch SIW or a strategic LLM
    /// batch, or the first guard that failed otherwise.
    pub fn check(&mut self) -> Result<(), GuardFailure> {
        self.system.refresh_cpu_usage();
        let cpu = self.system.global_cpu_usage();
        if cpu > self.config.cpu_percent_ceiling {
            return Err(GuardFailure::CpuOverCeiling);
        }

        let disks = Disks::new_with_refreshed_list();
        let free: u64 = disks.iter().map(|d| d.available_space()).sum();
        if free < self.config.free_disk_floor_bytes {
            return Err(GuardFailure::DiskBelowFloor);
        }

        Ok(())
    }

    pub fn cooldown_secs(&self) -> u64 {
        self.config.guard_cooldown_secs
    }
}
