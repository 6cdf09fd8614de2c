//! Member restoration
//!
//! Brings an evacuated member back: networks come up, workloads stopped in
//! place are restarted, and workloads evacuated elsewhere are pulled home.

use crate::config::EvacuatorConfig;
use crate::member_state::StateGuard;
use crate::services::{ClusterServices, OperationReporter, Progress};
use crate::task_group::TaskGroup;
use crate::transport::{RemoteHost, StopRequest};
use fleetd_core::error::{FleetError, Result};
use fleetd_core::{LifecycleEvent, LifecycleKind, MemberState, MigrationAction, Workload};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

/// Result of one restoration
#[derive(Debug, Default)]
pub struct RestorationReport {
    pub member: String,
    /// Local workloads started again
    pub started: Vec<String>,
    /// Workloads migrated back from other members
    pub returned: Vec<String>,
    pub duration: Duration,
}

impl RestorationReport {
    pub fn summary(&self) -> String {
        format!(
            "{} started, {} returned in {:?}",
            self.started.len(),
            self.returned.len(),
            self.duration
        )
    }
}

/// Restores evacuated cluster members
pub struct Restorer {
    config: EvacuatorConfig,
    services: ClusterServices,
}

impl Restorer {
    pub fn new(config: EvacuatorConfig, services: ClusterServices) -> Self {
        Self { config, services }
    }

    /// Restore an evacuated `member`.
    ///
    /// As with evacuation, dropping this future mid-episode skips the state
    /// revert: the member stays `Created` with some workloads still away.
    /// Evacuating it again is the way back.
    #[instrument(skip(self, op), fields(member = %member))]
    pub async fn restore(
        &self,
        member: &str,
        op: Arc<dyn OperationReporter>,
    ) -> Result<RestorationReport> {
        let start = Instant::now();
        let catalog = self.services.catalog.clone();

        let local = catalog.workloads_at_member(member).await?;
        let remote: Vec<Workload> = catalog
            .workloads_by_origin(member)
            .await?
            .into_iter()
            .filter(|w| w.location != member)
            .collect();

        let guard = StateGuard::acquire(catalog, member, MemberState::Created).await?;

        info!(
            local = local.len(),
            remote = remote.len(),
            "Restoring cluster member"
        );

        let mut report = match self.restore_workloads(member, local, remote, op.clone()).await {
            Ok(report) => report,
            Err(e) => {
                warn!(error = %e, "Restoration failed, reverting member state");
                guard.revert().await;
                return Err(FleetError::Restoration(Box::new(e)));
            }
        };

        guard.commit();

        self.services.notifier.send_lifecycle(LifecycleEvent::new(
            LifecycleKind::ClusterMemberRestored,
            member,
            op.requestor(),
        ));

        report.member = member.to_string();
        report.duration = start.elapsed();
        info!(summary = %report.summary(), "Cluster member restored");

        Ok(report)
    }

    async fn restore_workloads(
        &self,
        member: &str,
        local: Vec<Workload>,
        remote: Vec<Workload>,
        op: Arc<dyn OperationReporter>,
    ) -> Result<RestorationReport> {
        self.services
            .network
            .startup()
            .await
            .map_err(|e| FleetError::Network(format!("Failed starting networks: {e}")))?;

        let mut report = RestorationReport::default();
        let progress = Progress::new(op.clone());

        for workload in local {
            if self.start_local(&workload, &progress).await? {
                report.started.push(workload.key());
            }
        }

        let mut group = TaskGroup::new(self.config.parallelism());
        for workload in remote {
            let task = ReturnTask {
                services: self.services.clone(),
                progress: Progress::new(op.clone()),
                origin: member.to_string(),
                default_shutdown_timeout: self.config.shutdown_timeout,
            };

            group.spawn(async move {
                let key = workload.key();
                task.run(workload).await?;
                Ok(key)
            });
        }

        report.returned = group.wait().await?;
        Ok(report)
    }

    /// Start a workload stopped in place by the evacuation. Returns whether
    /// it was started.
    async fn start_local(&self, workload: &Workload, progress: &Progress) -> Result<bool> {
        let runtime = &self.services.runtime;

        // Left stopped by the operator before the evacuation
        if !workload.was_running() {
            return Ok(false);
        }

        if runtime.is_running(workload) {
            return Ok(false);
        }

        progress.report(format!(
            "Starting {:?} in project {:?}",
            workload.name, workload.project
        ));

        let stateful = runtime.can_migrate(workload) == MigrationAction::StatefulStop;
        debug!(
            project = %workload.project,
            workload = %workload.name,
            stateful,
            "Starting local workload"
        );

        runtime.start(workload, stateful).await.map_err(|e| {
            FleetError::Runtime(format!(
                "Failed to start workload {:?} in project {:?}: {e}",
                workload.name, workload.project
            ))
        })?;

        Ok(true)
    }
}

/// Migration of one workload back to its origin
struct ReturnTask {
    services: ClusterServices,
    progress: Progress,
    origin: String,
    default_shutdown_timeout: Duration,
}

impl ReturnTask {
    #[instrument(
        skip(self, workload),
        fields(project = %workload.project, workload = %workload.name, from = %workload.location)
    )]
    async fn run(self, workload: Workload) -> Result<()> {
        let live = self.services.runtime.can_migrate(&workload) == MigrationAction::LiveMigrate;

        self.progress.report(format!(
            "Migrating {:?} in project {:?} from {:?}",
            workload.name, workload.project, workload.location
        ));

        let source = self.services.catalog.member(&workload.location).await?;
        let host = self
            .services
            .transport
            .connect(&source)
            .await
            .map_err(|e| FleetError::Transport(format!("Failed to connect to source: {e}")))?;

        let running = host
            .is_running(&workload.project, &workload.name)
            .await
            .map_err(|e| FleetError::Transport(format!("Failed to get workload state: {e}")))?;

        if running && !live {
            self.progress.report(format!(
                "Stopping {:?} in project {:?}",
                workload.name, workload.project
            ));
            let shutdown_timeout = workload
                .shutdown_timeout()
                .unwrap_or(self.default_shutdown_timeout);
            stop_remote(host.as_ref(), &workload, shutdown_timeout).await?;
        }

        let mut operation = host
            .migrate(&workload.project, &workload.name, &self.origin, live)
            .await
            .map_err(|e| FleetError::Transport(format!("Migration API failure: {e}")))?;
        operation.wait().await.map_err(|e| {
            FleetError::Transport(format!("Failed to wait for migration to finish: {e}"))
        })?;

        let returned = self
            .services
            .catalog
            .workload(&workload.project, &workload.name)
            .await?;
        self.services
            .runtime
            .clear_origin_marker(&returned)
            .await
            .map_err(|e| {
                FleetError::Runtime(format!("Failed to update workload configuration: {e}"))
            })?;

        info!(live, "Workload returned to origin");

        if !running || live {
            return Ok(());
        }

        self.progress.report(format!(
            "Starting {:?} in project {:?}",
            workload.name, workload.project
        ));
        self.services
            .runtime
            .start(&returned, false)
            .await
            .map_err(|e| {
                FleetError::Runtime(format!(
                    "Failed to start workload {:?} in project {:?}: {e}",
                    workload.name, workload.project
                ))
            })
    }
}

/// Stop a workload on another member, cleanly if possible.
///
/// A clean stop that fails or outlasts `shutdown_timeout` is followed by a
/// forced stop. A workload that turns out to be stopped already is fine.
async fn stop_remote(
    host: &dyn RemoteHost,
    workload: &Workload,
    shutdown_timeout: Duration,
) -> Result<()> {
    let (project, name) = (workload.project.as_str(), workload.name.as_str());

    let mut operation = host
        .stop(project, name, StopRequest::clean(shutdown_timeout))
        .await
        .map_err(|e| FleetError::Transport(format!("Failed to stop workload: {e}")))?;

    let clean = match timeout(shutdown_timeout, operation.wait()).await {
        Ok(Ok(())) => return Ok(()),
        Ok(Err(e)) => e.to_string(),
        Err(_) => FleetError::Timeout(shutdown_timeout).to_string(),
    };

    warn!(error = %clean, "Clean stop failed, forcing workload stop");

    let mut operation = host
        .stop(project, name, StopRequest::forced())
        .await
        .map_err(|e| FleetError::Transport(format!("Failed to stop workload: {e}")))?;

    match operation.wait().await {
        Ok(()) | Err(FleetError::AlreadyStopped) => Ok(()),
        Err(e) => Err(FleetError::Transport(format!("Failed to stop workload: {e}"))),
    }
}
