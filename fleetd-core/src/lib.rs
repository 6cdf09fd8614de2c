//! fleetd Core Library
//!
//! Shared types for the fleetd cluster orchestrator:
//! - Cluster members and their lifecycle state
//! - Workloads, migration actions and evacuation modes
//! - Lifecycle events
//! - Common error handling

pub mod error;
pub mod lifecycle;
pub mod member;
pub mod workload;

pub use error::{FleetError, Result};
pub use lifecycle::{LifecycleEvent, LifecycleKind};
pub use member::{ClusterMember, MemberState};
pub use workload::{EvacuationMode, MigrationAction, StorageBacking, Workload};
