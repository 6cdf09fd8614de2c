//! Lifecycle events emitted when a cluster member changes hands

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Kind of cluster member lifecycle event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LifecycleKind {
    ClusterMemberEvacuated,
    ClusterMemberRestored,
    ClusterMemberHealed,
}

impl fmt::Display for LifecycleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClusterMemberEvacuated => write!(f, "cluster-member-evacuated"),
            Self::ClusterMemberRestored => write!(f, "cluster-member-restored"),
            Self::ClusterMemberHealed => write!(f, "cluster-member-healed"),
        }
    }
}

/// A lifecycle notification about one cluster member
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub kind: LifecycleKind,
    pub member: String,
    /// Who triggered the operation, when known
    pub requestor: Option<String>,
    pub detail: BTreeMap<String, String>,
}

impl LifecycleEvent {
    pub fn new(kind: LifecycleKind, member: impl Into<String>, requestor: Option<String>) -> Self {
        Self {
            kind,
            member: member.into(),
            requestor,
            detail: BTreeMap::new(),
        }
    }
}
