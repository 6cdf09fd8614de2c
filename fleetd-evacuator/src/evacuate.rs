//! Member evacuation
//!
//! Marks a member evacuated and drains its workloads:
//! - Stop-only workloads are stopped in place
//! - Migratable workloads are moved to another member, bounded by the
//!   host-sized relocation pool
//! - Workloads with nowhere to go are left behind with a warning
//!
//! Any hard failure reverts the member state. Workloads already moved stay
//! where they are.

use crate::action::{decide, Decision};
use crate::config::EvacuatorConfig;
use crate::member_state::StateGuard;
use crate::selector::TargetSelector;
use crate::services::{ClusterServices, OperationReporter, Progress};
use crate::task_group::TaskGroup;
use crate::transport::{MigrationOutcome, MigrationRequest, Migrator, TransportMigrator};
use fleetd_core::error::{FleetError, Result};
use fleetd_core::{
    EvacuationMode, LifecycleEvent, LifecycleKind, MemberState, MigrationAction, Workload,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

/// What happened to one workload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkloadOutcome {
    Skipped,
    Stopped,
    Migrated { target: String, live: bool },
    /// No member could take the workload
    Unplaced,
    /// The migrator kept the workload on the evacuated member
    Stranded,
}

/// Result of one evacuation
#[derive(Debug, Default)]
pub struct EvacuationReport {
    pub member: String,
    /// Workload keys (`project/name`) per outcome
    pub migrated: Vec<String>,
    pub stopped: Vec<String>,
    pub skipped: Vec<String>,
    pub unplaced: Vec<String>,
    pub stranded: Vec<String>,
    pub duration: Duration,
}

impl EvacuationReport {
    fn record(&mut self, key: String, outcome: WorkloadOutcome) {
        match outcome {
            WorkloadOutcome::Skipped => self.skipped.push(key),
            WorkloadOutcome::Stopped => self.stopped.push(key),
            WorkloadOutcome::Migrated { .. } => self.migrated.push(key),
            WorkloadOutcome::Unplaced => self.unplaced.push(key),
            WorkloadOutcome::Stranded => self.stranded.push(key),
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "{} migrated, {} stopped, {} skipped, {} unplaced, {} stranded in {:?}",
            self.migrated.len(),
            self.stopped.len(),
            self.skipped.len(),
            self.unplaced.len(),
            self.stranded.len(),
            self.duration
        )
    }
}

/// Evacuates cluster members
pub struct Evacuator {
    config: EvacuatorConfig,
    services: ClusterServices,
    selector: Arc<TargetSelector>,
    migrator: Arc<dyn Migrator>,
}

impl Evacuator {
    pub fn new(config: EvacuatorConfig, services: ClusterServices) -> Self {
        let selector = Arc::new(TargetSelector::new(
            services.catalog.clone(),
            services.cluster.clone(),
            services.placement.clone(),
            config.offline_threshold,
            config.placement_timeout,
        ));
        let migrator: Arc<dyn Migrator> =
            Arc::new(TransportMigrator::new(services.transport.clone()));

        Self {
            config,
            services,
            selector,
            migrator,
        }
    }

    /// Replace the default migrator
    pub fn with_migrator(mut self, migrator: Arc<dyn Migrator>) -> Self {
        self.migrator = migrator;
        self
    }

    pub fn config(&self) -> &EvacuatorConfig {
        &self.config
    }

    pub fn services(&self) -> &ClusterServices {
        &self.services
    }

    /// Evacuate `member` using the default migrator
    pub async fn evacuate(
        &self,
        member: &str,
        mode: EvacuationMode,
        op: Arc<dyn OperationReporter>,
    ) -> Result<EvacuationReport> {
        self.evacuate_with(member, mode, self.migrator.clone(), op)
            .await
    }

    /// Evacuate `member`, moving workloads through `migrator`.
    ///
    /// The member state is reverted only when this future runs to an error.
    /// Dropping it mid-episode aborts relocations still in flight and leaves
    /// the member `Evacuated`; run [`Restorer::restore`] to bring it back.
    ///
    /// [`Restorer::restore`]: crate::Restorer::restore
    #[instrument(skip(self, migrator, op), fields(member = %member, mode = %mode))]
    pub async fn evacuate_with(
        &self,
        member: &str,
        mode: EvacuationMode,
        migrator: Arc<dyn Migrator>,
        op: Arc<dyn OperationReporter>,
    ) -> Result<EvacuationReport> {
        let start = Instant::now();
        let catalog = self.services.catalog.clone();

        let workloads = catalog.workloads_at_member(member).await?;

        let guard = StateGuard::acquire(catalog, member, MemberState::Evacuated).await?;

        info!(workloads = workloads.len(), "Evacuating cluster member");

        let mut report = match self
            .evacuate_workloads(member, mode, workloads, migrator, op.clone())
            .await
        {
            Ok(report) => report,
            Err(e) => {
                warn!(error = %e, "Evacuation failed, reverting member state");
                guard.revert().await;
                return Err(FleetError::Evacuation(Box::new(e)));
            }
        };

        self.services.network.shutdown().await;
        guard.commit();

        if mode != EvacuationMode::Heal {
            self.services.notifier.send_lifecycle(LifecycleEvent::new(
                LifecycleKind::ClusterMemberEvacuated,
                member,
                op.requestor(),
            ));
        }

        report.member = member.to_string();
        report.duration = start.elapsed();
        info!(summary = %report.summary(), "Cluster member evacuated");

        Ok(report)
    }

    async fn evacuate_workloads(
        &self,
        member: &str,
        mode: EvacuationMode,
        workloads: Vec<Workload>,
        migrator: Arc<dyn Migrator>,
        op: Arc<dyn OperationReporter>,
    ) -> Result<EvacuationReport> {
        let mut group = TaskGroup::new(self.config.parallelism());
        debug!(limit = group.limit(), "Starting workload relocation");

        for workload in workloads {
            let task = EvacuationTask {
                services: self.services.clone(),
                selector: self.selector.clone(),
                migrator: migrator.clone(),
                progress: Progress::new(op.clone()),
                mode,
                source: member.to_string(),
            };

            group.spawn(async move {
                let key = workload.key();
                let outcome = task.run(workload).await?;
                Ok((key, outcome))
            });
        }

        let mut report = EvacuationReport::default();
        for (key, outcome) in group.wait().await? {
            report.record(key, outcome);
        }

        Ok(report)
    }
}

/// Everything one workload's evacuation needs, owned so it can run on the pool
struct EvacuationTask {
    services: ClusterServices,
    selector: Arc<TargetSelector>,
    migrator: Arc<dyn Migrator>,
    progress: Progress,
    mode: EvacuationMode,
    source: String,
}

impl EvacuationTask {
    #[instrument(
        skip(self, workload),
        fields(project = %workload.project, workload = %workload.name)
    )]
    async fn run(self, workload: Workload) -> Result<WorkloadOutcome> {
        let runtime = &self.services.runtime;
        let running = runtime.is_running(&workload);
        let natural = runtime.can_migrate(&workload);

        let decision = decide(natural, self.mode, running);
        debug!(action = %natural, running, ?decision, "Evacuation decision");

        let live = match decision {
            Decision::Skip => return Ok(WorkloadOutcome::Skipped),
            Decision::Stop(action) => {
                self.stop(&workload, action).await?;
                return Ok(WorkloadOutcome::Stopped);
            }
            Decision::Migrate { stop_first, live } => {
                if stop_first {
                    self.stop(&workload, MigrationAction::Migrate).await?;
                }
                live
            }
        };

        let selection = match self.selector.select(&workload).await {
            Ok(selection) => selection,
            Err(e) if e.is_no_target() => {
                warn!("No migration target available for workload, leaving it in place");
                return Ok(WorkloadOutcome::Unplaced);
            }
            Err(e) => return Err(e),
        };

        match runtime.set_origin_marker(&workload, &self.source).await {
            Ok(true) => debug!(origin = %self.source, "Recorded evacuation origin"),
            Ok(false) => debug!("Evacuation origin already recorded"),
            Err(e) => warn!(error = %e, "Failed to record evacuation origin"),
        }

        let start = running || workload.should_auto_start();

        self.progress.report(format!(
            "Migrating {:?} in project {:?} to {:?}",
            workload.name, workload.project, selection.target.name
        ));

        let target = selection.target.name.clone();
        let request = MigrationRequest {
            workload,
            source: selection.source,
            target: selection.target,
            live,
            start,
        };

        let outcome = self.migrator.migrate(&request).await.map_err(|e| {
            FleetError::Transport(format!(
                "Failed to migrate workload {:?} in project {:?}: {e}",
                request.workload.name, request.workload.project
            ))
        })?;

        match outcome {
            MigrationOutcome::Moved => {
                info!(target = %target, live, "Workload migrated");
                Ok(WorkloadOutcome::Migrated { target, live })
            }
            MigrationOutcome::LeftInPlace => {
                debug!("Workload left on evacuated member");
                Ok(WorkloadOutcome::Stranded)
            }
        }
    }

    async fn stop(&self, workload: &Workload, action: MigrationAction) -> Result<()> {
        self.progress.report(format!(
            "Stopping {:?} in project {:?}",
            workload.name, workload.project
        ));

        self.services
            .runtime
            .stop(workload, action)
            .await
            .map_err(|e| {
                FleetError::Runtime(format!(
                    "Failed to stop workload {:?} in project {:?}: {e}",
                    workload.name, workload.project
                ))
            })
    }
}
