//! Cross-member transport and migration
//!
//! `Transport` hands out connections to other members. `Migrator` moves one
//! workload to a target member over such a connection; the evacuator and the
//! healer plug different migrators into the same relocation flow.

use async_trait::async_trait;
use fleetd_core::error::{FleetError, Result};
use fleetd_core::{ClusterMember, Workload};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

/// A long-running remote operation
#[async_trait]
pub trait RemoteOperation: Send {
    /// Block until the operation finishes
    async fn wait(&mut self) -> Result<()>;
}

pub type OperationHandle = Box<dyn RemoteOperation>;

/// Operation that already finished when it was handed out
pub struct CompletedOperation(Option<Result<()>>);

impl CompletedOperation {
    pub fn ok() -> OperationHandle {
        Box::new(Self(Some(Ok(()))))
    }

    pub fn failed(err: FleetError) -> OperationHandle {
        Box::new(Self(Some(Err(err))))
    }
}

#[async_trait]
impl RemoteOperation for CompletedOperation {
    async fn wait(&mut self) -> Result<()> {
        self.0.take().unwrap_or(Ok(()))
    }
}

/// How a remote workload should be stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopRequest {
    pub force: bool,
    pub timeout: Option<Duration>,
}

impl StopRequest {
    pub fn clean(timeout: Duration) -> Self {
        Self {
            force: false,
            timeout: Some(timeout),
        }
    }

    pub fn forced() -> Self {
        Self {
            force: true,
            timeout: None,
        }
    }
}

/// Workload operations on a connected member
#[async_trait]
pub trait RemoteHost: Send + Sync {
    async fn is_running(&self, project: &str, name: &str) -> Result<bool>;

    async fn stop(&self, project: &str, name: &str, request: StopRequest)
        -> Result<OperationHandle>;

    async fn start(&self, project: &str, name: &str) -> Result<OperationHandle>;

    /// Move the workload to `target`, keeping it running when `live`
    async fn migrate(
        &self,
        project: &str,
        name: &str,
        target: &str,
        live: bool,
    ) -> Result<OperationHandle>;
}

/// Opens connections to other cluster members
#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&self, member: &ClusterMember) -> Result<Arc<dyn RemoteHost>>;
}

/// One workload relocation
#[derive(Debug, Clone)]
pub struct MigrationRequest {
    pub workload: Workload,
    pub source: ClusterMember,
    pub target: ClusterMember,
    /// Keep the workload running while it moves
    pub live: bool,
    /// Start the workload on the target afterwards
    pub start: bool,
}

/// What a migrator did with a workload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationOutcome {
    Moved,
    /// The migrator declined to move the workload
    LeftInPlace,
}

/// Moves a workload between members
#[async_trait]
pub trait Migrator: Send + Sync {
    async fn migrate(&self, request: &MigrationRequest) -> Result<MigrationOutcome>;
}

/// Migration through the target member's API
pub struct TransportMigrator {
    transport: Arc<dyn Transport>,
}

impl TransportMigrator {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl Migrator for TransportMigrator {
    #[instrument(skip(self, request), fields(
        project = %request.workload.project,
        workload = %request.workload.name,
        target = %request.target.name,
        live = request.live,
    ))]
    async fn migrate(&self, request: &MigrationRequest) -> Result<MigrationOutcome> {
        let workload = &request.workload;

        let host = self
            .transport
            .connect(&request.target)
            .await
            .map_err(|e| FleetError::Transport(format!("Failed to connect to target: {e}")))?;

        let mut operation = host
            .migrate(
                &workload.project,
                &workload.name,
                &request.target.name,
                request.live,
            )
            .await
            .map_err(|e| FleetError::Transport(format!("Migration API failure: {e}")))?;

        operation.wait().await.map_err(|e| {
            FleetError::Transport(format!("Failed to wait for migration to finish: {e}"))
        })?;

        // Live migrations arrive running
        if !request.start || request.live {
            return Ok(MigrationOutcome::Moved);
        }

        debug!("Starting migrated workload");
        let mut operation = host
            .start(&workload.project, &workload.name)
            .await
            .map_err(|e| FleetError::Transport(format!("Failed to start workload: {e}")))?;

        operation
            .wait()
            .await
            .map_err(|e| FleetError::Transport(format!("Failed to start workload: {e}")))?;

        Ok(MigrationOutcome::Moved)
    }
}

/// Migration used while healing a dead member.
///
/// Only workloads on remote storage can move away from a member that is no
/// longer reachable; the rest are left where they are.
pub struct HealMigrator {
    inner: TransportMigrator,
}

impl HealMigrator {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            inner: TransportMigrator::new(transport),
        }
    }
}

#[async_trait]
impl Migrator for HealMigrator {
    async fn migrate(&self, request: &MigrationRequest) -> Result<MigrationOutcome> {
        if !request.workload.has_remote_storage() {
            debug!(
                project = %request.workload.project,
                workload = %request.workload.name,
                "Workload not on remote storage, leaving in place"
            );
            return Ok(MigrationOutcome::LeftInPlace);
        }

        self.inner.migrate(request).await
    }
}
