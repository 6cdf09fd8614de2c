//! Catalog trait
//!
//! Defines the interface to the persistent catalog of cluster members and
//! workloads. Every call is its own transaction.

use async_trait::async_trait;
use fleetd_core::error::Result;
use fleetd_core::{ClusterMember, MemberState, Workload};
use std::time::Duration;

/// Transactional access to cluster members and workloads
#[async_trait]
pub trait Catalog: Send + Sync {
    /// All cluster members
    async fn members(&self) -> Result<Vec<ClusterMember>>;

    /// Look up one member by name
    async fn member(&self, name: &str) -> Result<ClusterMember>;

    /// Members currently in `state`
    async fn members_by_state(&self, state: MemberState) -> Result<Vec<ClusterMember>> {
        Ok(self
            .members()
            .await?
            .into_iter()
            .filter(|m| m.state == state)
            .collect())
    }

    /// Set a member's state if it is still `expected`.
    ///
    /// Returns `false` without writing when the stored state differs, so a
    /// caller can re-read and re-validate.
    async fn update_member_state(
        &self,
        name: &str,
        expected: MemberState,
        new: MemberState,
    ) -> Result<bool>;

    /// Members able to receive a workload, least loaded first.
    ///
    /// Only `Created` members whose heartbeat is within `offline_threshold`,
    /// that support one of `architectures` and (when given) belong to `group`.
    async fn candidate_members(
        &self,
        architectures: &[String],
        group: Option<&str>,
        offline_threshold: Duration,
    ) -> Result<Vec<ClusterMember>>;

    /// Workloads currently located on `member`
    async fn workloads_at_member(&self, member: &str) -> Result<Vec<Workload>>;

    /// Workloads whose origin marker names `origin`, wherever they are now
    async fn workloads_by_origin(&self, origin: &str) -> Result<Vec<Workload>>;

    /// Load one workload
    async fn workload(&self, project: &str, name: &str) -> Result<Workload>;
}
