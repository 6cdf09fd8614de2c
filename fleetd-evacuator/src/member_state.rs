//! Member state transitions
//!
//! Moves a member between `Created` and `Evacuated` with a conditional
//! write, and undoes the move if the episode behind it fails.

use fleetd_catalog::Catalog;
use fleetd_core::error::{FleetError, Result};
use fleetd_core::MemberState;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Times a lost conditional write is re-read and retried
const MAX_CONFLICT_RETRIES: usize = 3;

/// Validate and apply a state change. Returns the state the member left.
pub async fn transition(
    catalog: &dyn Catalog,
    member: &str,
    target: MemberState,
) -> Result<MemberState> {
    for _ in 0..MAX_CONFLICT_RETRIES {
        let current = catalog.member(member).await?;
        current.state.check_transition(member, target)?;

        if catalog
            .update_member_state(member, current.state, target)
            .await?
        {
            info!(
                member = %member,
                from = %current.state,
                to = %target,
                "Cluster member state changed"
            );
            return Ok(current.state);
        }

        debug!(member = %member, "Member state changed concurrently, re-reading");
    }

    Err(FleetError::Catalog(format!(
        "Failed to update cluster member status for {member}: concurrent modification"
    )))
}

/// A state change that is reverted unless committed.
///
/// Only the member state is rolled back. Workloads already relocated by a
/// failed episode stay where they landed.
#[must_use = "a state guard must be committed or reverted"]
pub struct StateGuard {
    catalog: Arc<dyn Catalog>,
    member: String,
    previous: MemberState,
}

impl StateGuard {
    pub async fn acquire(
        catalog: Arc<dyn Catalog>,
        member: &str,
        target: MemberState,
    ) -> Result<Self> {
        let previous = transition(catalog.as_ref(), member, target).await?;
        Ok(Self {
            catalog,
            member: member.to_string(),
            previous,
        })
    }

    pub fn previous(&self) -> MemberState {
        self.previous
    }

    pub fn commit(self) {}

    /// Put the member back in the state it held before
    pub async fn revert(self) {
        if let Err(e) = transition(self.catalog.as_ref(), &self.member, self.previous).await {
            error!(member = %self.member, error = %e, "Failed to revert cluster member state");
        }
    }
}
