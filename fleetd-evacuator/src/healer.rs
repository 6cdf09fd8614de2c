//! Automatic healing
//!
//! Background task run on the cluster leader. Members whose heartbeat is
//! older than the healing threshold and whose host no longer answers on the
//! network are evacuated in heal mode: workloads on remote storage are
//! moved cold to healthy members, nothing is stopped.

use crate::config::HealingConfig;
use crate::evacuate::{EvacuationReport, Evacuator};
use crate::probe::{LivenessProbe, PingProbe};
use crate::services::{LogReporter, OperationReporter};
use crate::transport::{HealMigrator, Migrator};
use chrono::Utc;
use fleetd_core::error::{FleetError, Result};
use fleetd_core::{ClusterMember, EvacuationMode, LifecycleEvent, LifecycleKind, MemberState};
use futures::future::join_all;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, error, info, instrument, warn};

/// Healing counters
#[derive(Debug, Default, Clone)]
pub struct HealerMetrics {
    pub members_healed: u64,
    pub heal_failures: u64,
    /// Stale members skipped because their host still answered
    pub members_reachable: u64,
    pub last_pass_at: Option<Instant>,
    pub last_pass_duration_ms: u64,
    pub passes_completed: u64,
}

/// How a healing pass ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassStatus {
    /// Healing threshold is zero
    Disabled,
    NotClustered,
    /// Another member leads the cluster
    NotLeader,
    Completed,
}

#[derive(Debug)]
pub struct HealingReport {
    pub status: PassStatus,
    /// Members found dead
    pub candidates: Vec<String>,
    pub healed: Vec<String>,
}

impl HealingReport {
    fn skipped(status: PassStatus) -> Self {
        Self {
            status,
            candidates: Vec::new(),
            healed: Vec::new(),
        }
    }
}

/// Healing scheduler
pub struct Healer {
    config: HealingConfig,
    evacuator: Arc<Evacuator>,
    migrator: Arc<dyn Migrator>,
    probe: Arc<dyn LivenessProbe>,
    metrics: Arc<RwLock<HealerMetrics>>,
}

impl Healer {
    pub fn new(
        config: HealingConfig,
        evacuator: Arc<Evacuator>,
        probe: Arc<dyn LivenessProbe>,
    ) -> Self {
        let migrator: Arc<dyn Migrator> =
            Arc::new(HealMigrator::new(evacuator.services().transport.clone()));

        Self {
            config,
            evacuator,
            migrator,
            probe,
            metrics: Arc::new(RwLock::new(HealerMetrics::default())),
        }
    }

    /// Healer probing members with a single ping
    pub fn with_ping_probe(config: HealingConfig, evacuator: Arc<Evacuator>) -> Self {
        let probe = Arc::new(PingProbe::new(config.probe_timeout));
        Self::new(config, evacuator, probe)
    }

    /// Replace the heal-mode migrator
    pub fn with_migrator(mut self, migrator: Arc<dyn Migrator>) -> Self {
        self.migrator = migrator;
        self
    }

    /// Heartbeat age after which a member is considered dead
    pub fn threshold(&self) -> Duration {
        self.config
            .effective_threshold(self.evacuator.config().offline_threshold)
    }

    pub async fn metrics(&self) -> HealerMetrics {
        self.metrics.read().await.clone()
    }

    /// Start the background healing loop
    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        let healer = self;
        let check_interval = healer.config.check_interval;

        tokio::spawn(async move {
            let mut check_timer = interval(check_interval);

            info!(
                interval_secs = check_interval.as_secs(),
                healing_threshold_secs = healer.threshold().as_secs(),
                max_attempts = healer.config.max_attempts,
                "Cluster healing task started"
            );

            loop {
                check_timer.tick().await;

                let op: Arc<dyn OperationReporter> = Arc::new(LogReporter::new("cluster-heal"));
                match healer.run_healing_pass(op).await {
                    Ok(report) if !report.healed.is_empty() => {
                        info!(healed = ?report.healed, "Healing pass complete");
                    }
                    Ok(report) => debug!(status = ?report.status, "Healing pass complete"),
                    Err(e) => error!(error = %e, "Healing pass failed"),
                }
            }
        })
    }

    /// Find and heal dead members.
    ///
    /// Stops at the first member that could not be healed.
    #[instrument(skip(self, op))]
    pub async fn run_healing_pass(
        &self,
        op: Arc<dyn OperationReporter>,
    ) -> Result<HealingReport> {
        if !self.config.is_enabled() {
            return Ok(HealingReport::skipped(PassStatus::Disabled));
        }

        let cluster = &self.evacuator.services().cluster;
        let Some(leader) = cluster.leader_address().await? else {
            return Ok(HealingReport::skipped(PassStatus::NotClustered));
        };
        if leader != cluster.local_address() {
            return Ok(HealingReport::skipped(PassStatus::NotLeader));
        }

        let start = Instant::now();
        let candidates = self.heal_candidates().await?;

        let mut report = HealingReport {
            status: PassStatus::Completed,
            candidates: candidates.iter().map(|m| m.name.clone()).collect(),
            healed: Vec::new(),
        };

        if !candidates.is_empty() {
            info!(members = ?report.candidates, "Healing offline cluster members");
        }

        let mut outcome = Ok(());
        for member in &candidates {
            match self.heal_member(&member.name, op.clone()).await {
                Ok(_) => report.healed.push(member.name.clone()),
                Err(e) => {
                    outcome = Err(e);
                    break;
                }
            }
        }

        {
            let mut metrics = self.metrics.write().await;
            metrics.passes_completed += 1;
            metrics.last_pass_at = Some(start);
            metrics.last_pass_duration_ms = start.elapsed().as_millis() as u64;
        }

        outcome.map(|()| report)
    }

    /// Members offline past the healing threshold whose host doesn't answer.
    ///
    /// Evacuated members are already drained and pending members never
    /// hosted anything, so only `Created` members qualify.
    pub async fn heal_candidates(&self) -> Result<Vec<ClusterMember>> {
        let threshold = self.threshold();
        let now = Utc::now();

        let stale: Vec<ClusterMember> = self
            .evacuator
            .services()
            .catalog
            .members_by_state(MemberState::Created)
            .await?
            .into_iter()
            .filter(|m| m.is_offline(threshold, now))
            .collect();

        let probes = join_all(stale.iter().map(|m| self.probe.is_reachable(m))).await;

        let mut dead = Vec::with_capacity(stale.len());
        let mut reachable = 0;
        for (member, is_reachable) in stale.into_iter().zip(probes) {
            if is_reachable {
                info!(
                    member = %member.name,
                    address = %member.address,
                    "Cluster member is offline but responds on the network, not healing"
                );
                reachable += 1;
            } else {
                dead.push(member);
            }
        }

        if reachable > 0 {
            self.metrics.write().await.members_reachable += reachable;
        }

        Ok(dead)
    }

    /// Evacuate one dead member in heal mode, retrying up to the configured
    /// number of attempts.
    #[instrument(skip(self, op))]
    pub async fn heal_member(
        &self,
        member: &str,
        op: Arc<dyn OperationReporter>,
    ) -> Result<EvacuationReport> {
        let attempts = self.config.max_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            match self
                .evacuator
                .evacuate_with(
                    member,
                    EvacuationMode::Heal,
                    self.migrator.clone(),
                    op.clone(),
                )
                .await
            {
                Ok(report) => {
                    self.evacuator
                        .services()
                        .notifier
                        .send_lifecycle(LifecycleEvent::new(
                            LifecycleKind::ClusterMemberHealed,
                            member,
                            None,
                        ));
                    self.metrics.write().await.members_healed += 1;
                    info!(attempt, summary = %report.summary(), "Cluster member healed");
                    return Ok(report);
                }
                Err(e) => {
                    warn!(
                        attempt,
                        max_attempts = attempts,
                        error = %e,
                        "Failed to heal cluster member"
                    );
                    last_error = Some(e);
                }
            }
        }

        self.metrics.write().await.heal_failures += 1;
        error!(member = %member, "Giving up on healing cluster member");

        Err(last_error.unwrap_or_else(|| {
            FleetError::Internal(format!("No healing attempt made for {member}"))
        }))
    }
}
