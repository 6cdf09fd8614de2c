//! Cluster services used during evacuation
//!
//! Bundles the collaborators an evacuation episode talks to, plus the
//! operation-progress plumbing.

use crate::placement::PlacementPolicy;
use crate::runtime::WorkloadRuntime;
use crate::transport::Transport;
use async_trait::async_trait;
use fleetd_catalog::Catalog;
use fleetd_core::error::Result;
use fleetd_core::LifecycleEvent;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Metadata key carrying the latest progress message
pub const PROGRESS_KEY: &str = "evacuation_progress";

/// Cluster topology as seen from this member
#[async_trait]
pub trait ClusterInfo: Send + Sync {
    /// Address of the current leader, `None` when not clustered
    async fn leader_address(&self) -> Result<Option<String>>;

    /// Address of this member
    fn local_address(&self) -> String;
}

/// Host networking tied to member availability
#[async_trait]
pub trait NetworkHooks: Send + Sync {
    /// Tear down networks once the member has been evacuated
    async fn shutdown(&self);

    /// Bring networks back before workloads return
    async fn startup(&self) -> Result<()>;
}

/// Sink for cluster lifecycle events
pub trait LifecycleNotifier: Send + Sync {
    fn send_lifecycle(&self, event: LifecycleEvent);
}

/// The long-running operation an episode reports into
pub trait OperationReporter: Send + Sync {
    fn update_metadata(&self, metadata: BTreeMap<String, String>);

    /// Who asked for the operation
    fn requestor(&self) -> Option<String> {
        None
    }
}

/// Reporter for operations nobody is watching, such as background healing
pub struct LogReporter {
    operation: String,
}

impl LogReporter {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
        }
    }
}

impl OperationReporter for LogReporter {
    fn update_metadata(&self, metadata: BTreeMap<String, String>) {
        if let Some(progress) = metadata.get(PROGRESS_KEY) {
            debug!(operation = %self.operation, progress = %progress, "Operation progress");
        }
    }
}

/// Per-workload progress messages
pub struct Progress {
    reporter: Arc<dyn OperationReporter>,
}

impl Progress {
    pub fn new(reporter: Arc<dyn OperationReporter>) -> Self {
        Self { reporter }
    }

    pub fn report(&self, message: String) {
        let mut metadata = BTreeMap::new();
        metadata.insert(PROGRESS_KEY.to_string(), message);
        self.reporter.update_metadata(metadata);
    }
}

/// Collaborators shared by evacuation, restoration and healing
#[derive(Clone)]
pub struct ClusterServices {
    pub catalog: Arc<dyn Catalog>,
    pub runtime: Arc<dyn WorkloadRuntime>,
    pub transport: Arc<dyn Transport>,
    pub cluster: Arc<dyn ClusterInfo>,
    pub network: Arc<dyn NetworkHooks>,
    pub notifier: Arc<dyn LifecycleNotifier>,
    pub placement: Option<Arc<dyn PlacementPolicy>>,
}
