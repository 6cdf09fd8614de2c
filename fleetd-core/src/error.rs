//! Error types for fleetd
//!
//! Provides a unified error type for evacuation, restoration and healing.

use crate::member::MemberState;
use thiserror::Error;

/// Result type alias for fleetd operations
pub type Result<T> = std::result::Result<T, FleetError>;

/// Unified error type for fleetd
#[derive(Error, Debug)]
pub enum FleetError {
    // ===== Member State Errors =====
    #[error("Cannot evacuate or restore a pending cluster member: {member}")]
    InvalidState { member: String },

    #[error("{}", already_in_state_message(.state))]
    AlreadyInState { member: String, state: MemberState },

    #[error("Cluster member not found: {0}")]
    MemberNotFound(String),

    // ===== Workload Errors =====
    #[error("Workload {name:?} not found in project {project:?}")]
    WorkloadNotFound { project: String, name: String },

    #[error("Workload is already stopped")]
    AlreadyStopped,

    #[error("Invalid evacuation mode: {0}")]
    InvalidMode(String),

    // ===== Placement Errors =====
    #[error("Couldn't find a cluster member for workload {name:?} in project {project:?}")]
    NoTargetAvailable { project: String, name: String },

    #[error("Placement policy error: {0}")]
    Placement(String),

    // ===== Collaborator Errors =====
    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),

    // ===== Episode Errors =====
    #[error("Failed to evacuate workloads: {0}")]
    Evacuation(#[source] Box<FleetError>),

    #[error("Failed to restore workloads: {0}")]
    Restoration(#[source] Box<FleetError>),

    // ===== Generic Errors =====
    #[error("Internal error: {0}")]
    Internal(String),
}

fn already_in_state_message(state: &MemberState) -> &'static str {
    match state {
        MemberState::Evacuated => "Cluster member is already evacuated",
        MemberState::Created => "Cluster member is already restored",
        MemberState::Pending => "Cluster member is already in requested state",
    }
}

impl FleetError {
    /// Member was pending or already in the requested state.
    ///
    /// Nothing was mutated, so the caller can fix the request and retry.
    pub fn is_state_conflict(&self) -> bool {
        matches!(
            self,
            FleetError::InvalidState { .. } | FleetError::AlreadyInState { .. }
        )
    }

    /// Soft per-workload placement failure
    pub fn is_no_target(&self) -> bool {
        matches!(self, FleetError::NoTargetAvailable { .. })
    }

    /// The innermost error, unwrapping episode-level wrappers
    pub fn root(&self) -> &FleetError {
        match self {
            FleetError::Evacuation(inner) | FleetError::Restoration(inner) => inner.root(),
            other => other,
        }
    }
}

impl From<tokio::task::JoinError> for FleetError {
    fn from(err: tokio::task::JoinError) -> Self {
        FleetError::Internal(format!("task failed to complete: {err}"))
    }
}
