//! Workload types
//!
//! A workload (container or virtual machine) lives on one cluster member. The
//! runtime owns it; the orchestrator only reads its configuration and touches
//! the origin marker.

use crate::error::{FleetError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Member a workload was evacuated from
pub const ORIGIN_KEY: &str = "volatile.evacuate.origin";
/// Cluster group the workload was placed in
pub const GROUP_KEY: &str = "volatile.cluster.group";
/// Power state recorded when the workload last changed state
pub const LAST_POWER_STATE_KEY: &str = "volatile.last_state.power";
pub const AUTOSTART_KEY: &str = "boot.autostart";
/// Seconds to wait for a clean shutdown before forcing it
pub const SHUTDOWN_TIMEOUT_KEY: &str = "boot.host_shutdown_timeout";

pub const POWER_STATE_RUNNING: &str = "RUNNING";

/// What to do with a workload when its member is evacuated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MigrationAction {
    /// Move while running
    LiveMigrate,
    /// Move while stopped
    Migrate,
    /// Clean stop in place
    Stop,
    /// Stop in place, keeping memory state on disk
    StatefulStop,
    /// Forced stop in place
    ForceStop,
    /// Leave the workload alone
    None,
}

impl MigrationAction {
    pub const ALL: [MigrationAction; 6] = [
        MigrationAction::LiveMigrate,
        MigrationAction::Migrate,
        MigrationAction::Stop,
        MigrationAction::StatefulStop,
        MigrationAction::ForceStop,
        MigrationAction::None,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LiveMigrate => "live-migrate",
            Self::Migrate => "migrate",
            Self::Stop => "stop",
            Self::StatefulStop => "stateful-stop",
            Self::ForceStop => "force-stop",
            Self::None => "none",
        }
    }

    pub fn is_migration(&self) -> bool {
        matches!(self, Self::LiveMigrate | Self::Migrate)
    }
}

impl fmt::Display for MigrationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MigrationAction {
    type Err = FleetError;

    fn from_str(s: &str) -> Result<Self> {
        MigrationAction::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| FleetError::InvalidMode(s.to_string()))
    }
}

/// How an evacuation episode treats its workloads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvacuationMode {
    /// Use each workload's own migration capability
    #[default]
    Auto,
    /// Source member is dead: cold migration only, everything else is left alone
    Heal,
    /// Force one action for every workload
    Override(MigrationAction),
}

impl fmt::Display for EvacuationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Heal => write!(f, "heal"),
            Self::Override(action) => write!(f, "{}", action),
        }
    }
}

impl FromStr for EvacuationMode {
    type Err = FleetError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "" | "auto" => Ok(Self::Auto),
            "heal" => Ok(Self::Heal),
            other => other.parse().map(Self::Override),
        }
    }
}

/// Kind of storage backing a workload's root disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBacking {
    /// Shared storage reachable from every member (ceph, lvmcluster, ...)
    Remote,
    /// Disks local to the hosting member
    Local,
}

/// Workload record as stored in the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workload {
    pub project: String,
    pub name: String,
    /// Member currently hosting the workload
    pub location: String,
    pub architecture: String,
    /// Workload-local configuration, including volatile keys
    pub local_config: BTreeMap<String, String>,
    /// Configuration with profiles applied
    pub expanded_config: BTreeMap<String, String>,
    pub expanded_devices: BTreeMap<String, BTreeMap<String, String>>,
    pub profiles: Vec<String>,
    /// `None` when the workload has no storage pool
    pub storage: Option<StorageBacking>,
}

impl Workload {
    pub fn new(
        project: impl Into<String>,
        name: impl Into<String>,
        location: impl Into<String>,
    ) -> Self {
        Self {
            project: project.into(),
            name: name.into(),
            location: location.into(),
            architecture: "x86_64".to_string(),
            local_config: BTreeMap::new(),
            expanded_config: BTreeMap::new(),
            expanded_devices: BTreeMap::new(),
            profiles: vec!["default".to_string()],
            storage: Some(StorageBacking::Remote),
        }
    }

    /// Set a key in both the local and the expanded configuration
    pub fn with_config(mut self, key: &str, value: &str) -> Self {
        self.local_config.insert(key.to_string(), value.to_string());
        self.expanded_config
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_architecture(mut self, architecture: &str) -> Self {
        self.architecture = architecture.to_string();
        self
    }

    pub fn with_storage(mut self, storage: Option<StorageBacking>) -> Self {
        self.storage = storage;
        self
    }

    /// `project/name`, used as a stable key
    pub fn key(&self) -> String {
        format!("{}/{}", self.project, self.name)
    }

    /// Member this workload was evacuated from, if any
    pub fn origin(&self) -> Option<&str> {
        self.local_config
            .get(ORIGIN_KEY)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    pub fn affinity_group(&self) -> Option<&str> {
        self.local_config
            .get(GROUP_KEY)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Whether the workload was running when its state was last recorded
    pub fn was_running(&self) -> bool {
        self.local_config
            .get(LAST_POWER_STATE_KEY)
            .is_some_and(|v| v == POWER_STATE_RUNNING)
    }

    /// `boot.autostart` if set, otherwise the last recorded power state
    pub fn should_auto_start(&self) -> bool {
        match self.expanded_config.get(AUTOSTART_KEY).map(String::as_str) {
            Some("") | None => self
                .expanded_config
                .get(LAST_POWER_STATE_KEY)
                .is_some_and(|v| v == POWER_STATE_RUNNING),
            Some(value) => is_true(value),
        }
    }

    /// Configured clean shutdown timeout, `None` when unset or unparsable
    pub fn shutdown_timeout(&self) -> Option<Duration> {
        self.expanded_config
            .get(SHUTDOWN_TIMEOUT_KEY)
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs)
    }

    pub fn has_remote_storage(&self) -> bool {
        self.storage == Some(StorageBacking::Remote)
    }
}

fn is_true(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "true" | "1" | "yes" | "on")
}
