//! Placement policy hook
//!
//! An operator-supplied policy may pick the target member for a workload
//! out of the eligible candidates.

use async_trait::async_trait;
use fleetd_core::error::Result;
use fleetd_core::{ClusterMember, Workload};
use serde::Serialize;
use std::collections::BTreeMap;

/// Why placement is being asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlacementReason {
    Evacuation,
}

/// Workload description handed to the placement policy
#[derive(Debug, Clone, Serialize)]
pub struct PlacementRequest {
    pub project: String,
    pub name: String,
    pub architecture: String,
    pub config: BTreeMap<String, String>,
    pub devices: BTreeMap<String, BTreeMap<String, String>>,
    pub profiles: Vec<String>,
    pub reason: PlacementReason,
}

impl PlacementRequest {
    /// Describe a workload being moved off an evacuating member
    pub fn evacuation(workload: &Workload) -> Self {
        Self {
            project: workload.project.clone(),
            name: workload.name.clone(),
            architecture: workload.architecture.clone(),
            config: workload.expanded_config.clone(),
            devices: workload.expanded_devices.clone(),
            profiles: workload.profiles.clone(),
            reason: PlacementReason::Evacuation,
        }
    }

    /// JSON form passed to script-based policies
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Chooses a target member for a workload
#[async_trait]
pub trait PlacementPolicy: Send + Sync {
    /// Pick one of `candidates`, or `None` to fall back to the default choice
    async fn evaluate(
        &self,
        request: &PlacementRequest,
        candidates: &[ClusterMember],
        leader_address: &str,
    ) -> Result<Option<ClusterMember>>;
}
