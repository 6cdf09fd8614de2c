//! Local workload runtime
//!
//! The hypervisor-facing side of evacuation: stopping, starting and
//! reconfiguring workloads hosted by this member.

use async_trait::async_trait;
use fleetd_core::error::Result;
use fleetd_core::workload::ORIGIN_KEY;
use fleetd_core::{MigrationAction, Workload};
use std::collections::BTreeMap;

/// Control over workloads on the local member
#[async_trait]
pub trait WorkloadRuntime: Send + Sync {
    /// Migration capability the workload's configuration allows
    fn can_migrate(&self, workload: &Workload) -> MigrationAction;

    fn is_running(&self, workload: &Workload) -> bool;

    /// Stop a workload the way `action` asks (clean, stateful or forced)
    async fn stop(&self, workload: &Workload, action: MigrationAction) -> Result<()>;

    /// Start a workload, restoring saved state when `stateful`
    async fn start(&self, workload: &Workload, stateful: bool) -> Result<()>;

    /// Record `origin` in the workload's origin marker unless one is already
    /// set. Returns whether the marker was written.
    async fn set_origin_marker(&self, workload: &Workload, origin: &str) -> Result<bool>;

    /// Replace the workload's local configuration
    async fn update_config(
        &self,
        workload: &Workload,
        config: BTreeMap<String, String>,
    ) -> Result<()>;

    /// Drop the origin marker, keeping the rest of the local configuration
    async fn clear_origin_marker(&self, workload: &Workload) -> Result<()> {
        let mut config = workload.local_config.clone();
        if config.remove(ORIGIN_KEY).is_none() {
            return Ok(());
        }
        self.update_config(workload, config).await
    }
}
