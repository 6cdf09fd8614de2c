//! Cluster member types
//!
//! A cluster member moves between `Created` and `Evacuated` while it is part of
//! the cluster. `Pending` members have not finished joining and are never
//! evacuated or restored.

use crate::error::{FleetError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Lifecycle state of a cluster member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberState {
    Pending,
    Created,
    Evacuated,
}

impl Default for MemberState {
    fn default() -> Self {
        Self::Pending
    }
}

impl fmt::Display for MemberState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Created => write!(f, "created"),
            Self::Evacuated => write!(f, "evacuated"),
        }
    }
}

impl MemberState {
    /// Validate a transition from `self` to `target` for the named member.
    ///
    /// Pending members reject every transition. A member already in the target
    /// state is rejected with `AlreadyInState`.
    pub fn check_transition(self, member: &str, target: MemberState) -> Result<()> {
        if self == MemberState::Pending {
            return Err(FleetError::InvalidState {
                member: member.to_string(),
            });
        }

        if self == target {
            return Err(FleetError::AlreadyInState {
                member: member.to_string(),
                state: target,
            });
        }

        Ok(())
    }
}

/// A member of the cluster as recorded in the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterMember {
    pub name: String,
    /// Cluster address in `host:port` form
    pub address: String,
    pub state: MemberState,
    pub groups: Vec<String>,
    pub last_heartbeat: DateTime<Utc>,
    pub architectures: Vec<String>,
}

impl ClusterMember {
    /// Create a member in `Created` state with a fresh heartbeat
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            state: MemberState::Created,
            groups: vec!["default".to_string()],
            last_heartbeat: Utc::now(),
            architectures: vec!["x86_64".to_string()],
        }
    }

    pub fn with_state(mut self, state: MemberState) -> Self {
        self.state = state;
        self
    }

    pub fn with_groups(mut self, groups: &[&str]) -> Self {
        self.groups = groups.iter().map(|g| g.to_string()).collect();
        self
    }

    pub fn with_architectures(mut self, architectures: &[&str]) -> Self {
        self.architectures = architectures.iter().map(|a| a.to_string()).collect();
        self
    }

    pub fn with_heartbeat(mut self, heartbeat: DateTime<Utc>) -> Self {
        self.last_heartbeat = heartbeat;
        self
    }

    /// Age of the last heartbeat relative to `now`
    pub fn heartbeat_age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.last_heartbeat).to_std().unwrap_or(Duration::ZERO)
    }

    /// Whether the last heartbeat is older than `threshold`
    pub fn is_offline(&self, threshold: Duration, now: DateTime<Utc>) -> bool {
        self.heartbeat_age(now) > threshold
    }

    pub fn in_group(&self, group: &str) -> bool {
        self.groups.iter().any(|g| g == group)
    }

    pub fn supports_architecture(&self, architecture: &str) -> bool {
        self.architectures.iter().any(|a| a == architecture)
    }

    /// Host part of the cluster address (brackets stripped for IPv6)
    pub fn host(&self) -> Option<&str> {
        let (host, port) = self.address.rsplit_once(':')?;
        if port.is_empty() || port.parse::<u16>().is_err() {
            return None;
        }

        let host = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);

        if host.is_empty() {
            None
        } else {
            Some(host)
        }
    }
}
