//! Per-workload evacuation decision
//!
//! Combines what a workload's configuration allows, the requested mode and
//! whether the workload is running into the single thing to do with it.

use fleetd_core::{EvacuationMode, MigrationAction};

/// What to do with one workload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Leave the workload alone
    Skip,

    /// Stop the workload in place
    Stop(MigrationAction),

    /// Move the workload to another member
    Migrate {
        /// Stop the workload before moving it
        stop_first: bool,
        live: bool,
    },
}

impl Decision {
    pub fn is_migration(&self) -> bool {
        matches!(self, Decision::Migrate { .. })
    }
}

/// The action `mode` asks for, given the workload's own capability.
///
/// Healing only moves workloads that can be migrated, and always cold.
pub fn effective_action(natural: MigrationAction, mode: EvacuationMode) -> MigrationAction {
    match mode {
        EvacuationMode::Auto => natural,
        EvacuationMode::Override(action) => action,
        EvacuationMode::Heal if natural.is_migration() => MigrationAction::Migrate,
        EvacuationMode::Heal => MigrationAction::None,
    }
}

pub fn decide(natural: MigrationAction, mode: EvacuationMode, running: bool) -> Decision {
    let healing = mode == EvacuationMode::Heal;

    match effective_action(natural, mode) {
        MigrationAction::None => Decision::Skip,
        // A stopped workload has no state to carry over
        MigrationAction::LiveMigrate => Decision::Migrate {
            stop_first: false,
            live: running,
        },
        MigrationAction::Migrate => Decision::Migrate {
            stop_first: running && !healing,
            live: false,
        },
        action @ (MigrationAction::Stop
        | MigrationAction::StatefulStop
        | MigrationAction::ForceStop) => {
            if running {
                Decision::Stop(action)
            } else {
                Decision::Skip
            }
        }
    }
}
