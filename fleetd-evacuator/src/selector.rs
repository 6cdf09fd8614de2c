//! Target selection
//!
//! Finds the member a workload should move to: eligible candidates from
//! the catalog, narrowed by the placement policy when one is installed.

use crate::placement::{PlacementPolicy, PlacementRequest};
use crate::services::ClusterInfo;
use fleetd_catalog::Catalog;
use fleetd_core::error::{FleetError, Result};
use fleetd_core::{ClusterMember, Workload};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, instrument};

/// Source and destination of one relocation
#[derive(Debug, Clone)]
pub struct Selection {
    pub source: ClusterMember,
    pub target: ClusterMember,
}

pub struct TargetSelector {
    catalog: Arc<dyn Catalog>,
    cluster: Arc<dyn ClusterInfo>,
    placement: Option<Arc<dyn PlacementPolicy>>,
    offline_threshold: Duration,
    placement_timeout: Duration,
}

impl TargetSelector {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        cluster: Arc<dyn ClusterInfo>,
        placement: Option<Arc<dyn PlacementPolicy>>,
        offline_threshold: Duration,
        placement_timeout: Duration,
    ) -> Self {
        Self {
            catalog,
            cluster,
            placement,
            offline_threshold,
            placement_timeout,
        }
    }

    /// Pick a target for `workload`, never the member it is on.
    ///
    /// Fails with `NoTargetAvailable` when no member qualifies.
    #[instrument(
        skip(self, workload),
        fields(project = %workload.project, workload = %workload.name)
    )]
    pub async fn select(&self, workload: &Workload) -> Result<Selection> {
        let source = self.catalog.member(&workload.location).await?;

        let candidates: Vec<ClusterMember> = self
            .catalog
            .candidate_members(
                std::slice::from_ref(&workload.architecture),
                workload.affinity_group(),
                self.offline_threshold,
            )
            .await?
            .into_iter()
            .filter(|m| m.name != source.name)
            .collect();

        debug!(candidates = candidates.len(), "Found candidate members");

        let mut target = None;
        if let Some(policy) = &self.placement {
            target = self.evaluate_policy(policy.as_ref(), workload, &candidates).await?;
        }

        let target = target
            .or_else(|| candidates.into_iter().next())
            .ok_or_else(|| FleetError::NoTargetAvailable {
                project: workload.project.clone(),
                name: workload.name.clone(),
            })?;

        debug!(source = %source.name, target = %target.name, "Selected target member");
        Ok(Selection { source, target })
    }

    async fn evaluate_policy(
        &self,
        policy: &dyn PlacementPolicy,
        workload: &Workload,
        candidates: &[ClusterMember],
    ) -> Result<Option<ClusterMember>> {
        let leader = self
            .cluster
            .leader_address()
            .await?
            .ok_or_else(|| FleetError::Placement("Member is not clustered".to_string()))?;

        let request = PlacementRequest::evacuation(workload);

        match timeout(
            self.placement_timeout,
            policy.evaluate(&request, candidates, &leader),
        )
        .await
        {
            Ok(Ok(target)) => Ok(target),
            Ok(Err(e)) => Err(FleetError::Placement(format!(
                "Failed instance placement for workload {:?} in project {:?}: {e}",
                workload.name, workload.project
            ))),
            Err(_) => Err(FleetError::Placement(format!(
                "Instance placement for workload {:?} in project {:?} timed out after {:?}",
                workload.name, workload.project, self.placement_timeout
            ))),
        }
    }
}
