//! fleetd Evacuator
//!
//! Drains cluster members for maintenance and brings them back:
//! - Evacuation (stop or migrate every workload off a member)
//! - Restoration (restart local workloads, pull evacuated ones home)
//! - Healing (leader-driven evacuation of members that stopped answering)
//!
//! Relocations run on a pool sized from the host's CPU count, and a failed
//! episode reverts the member's state.

pub mod action;
pub mod config;
pub mod evacuate;
pub mod healer;
pub mod member_state;
pub mod placement;
pub mod probe;
pub mod restore;
pub mod runtime;
pub mod selector;
pub mod services;
pub mod task_group;
pub mod transport;

// Re-export main types
pub use action::{decide, Decision};
pub use config::{ConfigError, EvacuatorConfig, HealingConfig};
pub use evacuate::{EvacuationReport, Evacuator, WorkloadOutcome};
pub use healer::{Healer, HealerMetrics, HealingReport, PassStatus};
pub use member_state::StateGuard;
pub use placement::{PlacementPolicy, PlacementReason, PlacementRequest};
pub use probe::{LivenessProbe, PingProbe, TcpProbe};
pub use restore::{RestorationReport, Restorer};
pub use runtime::WorkloadRuntime;
pub use selector::{Selection, TargetSelector};
pub use services::{
    ClusterInfo, ClusterServices, LifecycleNotifier, LogReporter, NetworkHooks,
    OperationReporter, Progress, PROGRESS_KEY,
};
pub use task_group::TaskGroup;
pub use transport::{
    CompletedOperation, HealMigrator, MigrationOutcome, MigrationRequest, Migrator,
    OperationHandle, RemoteHost, RemoteOperation, StopRequest, Transport, TransportMigrator,
};
