//! Shared fakes for evacuator integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use fleetd_catalog::{Catalog, MemoryCatalog};
use fleetd_core::error::{FleetError, Result};
use fleetd_core::workload::ORIGIN_KEY;
use fleetd_core::{ClusterMember, LifecycleEvent, LifecycleKind, MigrationAction, Workload};
use fleetd_evacuator::{
    ClusterInfo, ClusterServices, CompletedOperation, Evacuator, EvacuatorConfig,
    LifecycleNotifier, LivenessProbe, MigrationOutcome, MigrationRequest, Migrator, NetworkHooks,
    OperationHandle, OperationReporter, PlacementPolicy, RemoteHost, RemoteOperation, Restorer,
    StopRequest, Transport, WorkloadRuntime, PROGRESS_KEY,
};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("fleetd_evacuator=debug")
        .try_init();
}

/// Workload runtime backed by the in-memory catalog
pub struct FakeRuntime {
    catalog: Arc<MemoryCatalog>,
    running: Mutex<HashSet<String>>,
    capabilities: Mutex<HashMap<String, MigrationAction>>,
    fail_start: Mutex<HashSet<String>>,
    calls: Mutex<Vec<String>>,
}

impl FakeRuntime {
    pub fn new(catalog: Arc<MemoryCatalog>) -> Self {
        Self {
            catalog,
            running: Mutex::new(HashSet::new()),
            capabilities: Mutex::new(HashMap::new()),
            fail_start: Mutex::new(HashSet::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn set_running(&self, key: &str, running: bool) {
        let mut set = self.running.lock();
        if running {
            set.insert(key.to_string());
        } else {
            set.remove(key);
        }
    }

    pub fn running(&self, key: &str) -> bool {
        self.running.lock().contains(key)
    }

    pub fn set_capability(&self, key: &str, action: MigrationAction) {
        self.capabilities.lock().insert(key.to_string(), action);
    }

    pub fn fail_start(&self, key: &str) {
        self.fail_start.lock().insert(key.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl WorkloadRuntime for FakeRuntime {
    fn can_migrate(&self, workload: &Workload) -> MigrationAction {
        self.capabilities
            .lock()
            .get(&workload.key())
            .copied()
            .unwrap_or(MigrationAction::Migrate)
    }

    fn is_running(&self, workload: &Workload) -> bool {
        self.running(&workload.key())
    }

    async fn stop(&self, workload: &Workload, action: MigrationAction) -> Result<()> {
        self.calls
            .lock()
            .push(format!("stop {} {}", workload.key(), action));
        self.set_running(&workload.key(), false);
        Ok(())
    }

    async fn start(&self, workload: &Workload, stateful: bool) -> Result<()> {
        self.calls
            .lock()
            .push(format!("start {} stateful={stateful}", workload.key()));
        if self.fail_start.lock().contains(&workload.key()) {
            return Err(FleetError::Runtime("start refused".into()));
        }
        self.set_running(&workload.key(), true);
        Ok(())
    }

    async fn set_origin_marker(&self, workload: &Workload, origin: &str) -> Result<bool> {
        self.catalog.set_workload_config_if_absent(
            &workload.project,
            &workload.name,
            ORIGIN_KEY,
            origin,
        )
    }

    async fn update_config(
        &self,
        workload: &Workload,
        config: BTreeMap<String, String>,
    ) -> Result<()> {
        self.catalog
            .set_workload_config(&workload.project, &workload.name, config)
    }
}

#[derive(Default)]
struct HostFaults {
    fail_clean_stop: HashSet<String>,
    hang_clean_stop: HashSet<String>,
    already_stopped_on_force: HashSet<String>,
    fail_migration: HashSet<String>,
}

struct HostState {
    catalog: Arc<MemoryCatalog>,
    runtime: Arc<FakeRuntime>,
    faults: Mutex<HostFaults>,
    calls: Mutex<Vec<String>>,
}

/// Remote API shared by every member. Workload placement lives in the
/// catalog, power state in the fake runtime.
pub struct FakeTransport {
    state: Arc<HostState>,
}

impl FakeTransport {
    pub fn new(catalog: Arc<MemoryCatalog>, runtime: Arc<FakeRuntime>) -> Self {
        Self {
            state: Arc::new(HostState {
                catalog,
                runtime,
                faults: Mutex::new(HostFaults::default()),
                calls: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn fail_clean_stop(&self, key: &str) {
        self.state.faults.lock().fail_clean_stop.insert(key.to_string());
    }

    /// Clean stops of `key` never finish
    pub fn hang_clean_stop(&self, key: &str) {
        self.state.faults.lock().hang_clean_stop.insert(key.to_string());
    }

    pub fn already_stopped_on_force(&self, key: &str) {
        self.state
            .faults
            .lock()
            .already_stopped_on_force
            .insert(key.to_string());
    }

    pub fn fail_migration(&self, key: &str) {
        self.state.faults.lock().fail_migration.insert(key.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.calls.lock().clone()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn connect(&self, member: &ClusterMember) -> Result<Arc<dyn RemoteHost>> {
        Ok(Arc::new(FakeHost {
            member: member.name.clone(),
            state: self.state.clone(),
        }))
    }
}

/// Operation that never completes
struct HangingOperation;

#[async_trait]
impl RemoteOperation for HangingOperation {
    async fn wait(&mut self) -> Result<()> {
        std::future::pending().await
    }
}

struct FakeHost {
    member: String,
    state: Arc<HostState>,
}

impl FakeHost {
    fn record(&self, call: String) {
        self.state.calls.lock().push(format!("{}: {call}", self.member));
    }
}

#[async_trait]
impl RemoteHost for FakeHost {
    async fn is_running(&self, project: &str, name: &str) -> Result<bool> {
        Ok(self.state.runtime.running(&format!("{project}/{name}")))
    }

    async fn stop(
        &self,
        project: &str,
        name: &str,
        request: StopRequest,
    ) -> Result<OperationHandle> {
        let key = format!("{project}/{name}");
        let faults = self.state.faults.lock();

        if request.force {
            self.record(format!("force-stop {key}"));
            if faults.already_stopped_on_force.contains(&key) {
                return Ok(CompletedOperation::failed(FleetError::AlreadyStopped));
            }
        } else {
            self.record(format!("stop {key}"));
            if faults.fail_clean_stop.contains(&key) {
                return Ok(CompletedOperation::failed(FleetError::Runtime(
                    "guest did not shut down".into(),
                )));
            }
            if faults.hang_clean_stop.contains(&key) {
                return Ok(Box::new(HangingOperation));
            }
        }

        self.state.runtime.set_running(&key, false);
        Ok(CompletedOperation::ok())
    }

    async fn start(&self, project: &str, name: &str) -> Result<OperationHandle> {
        let key = format!("{project}/{name}");
        self.record(format!("start {key}"));
        self.state.runtime.set_running(&key, true);
        Ok(CompletedOperation::ok())
    }

    async fn migrate(
        &self,
        project: &str,
        name: &str,
        target: &str,
        live: bool,
    ) -> Result<OperationHandle> {
        let key = format!("{project}/{name}");
        self.record(format!("migrate {key} -> {target} live={live}"));

        if self.state.faults.lock().fail_migration.contains(&key) {
            return Ok(CompletedOperation::failed(FleetError::Transport(
                "target refused workload".into(),
            )));
        }

        self.state
            .catalog
            .set_workload_location(project, name, target)?;
        if !live {
            self.state.runtime.set_running(&key, false);
        }
        Ok(CompletedOperation::ok())
    }
}

/// Cluster with a fixed leader
pub struct FakeCluster {
    leader: Mutex<Option<String>>,
    local: String,
}

impl FakeCluster {
    pub fn new(leader: Option<&str>, local: &str) -> Self {
        Self {
            leader: Mutex::new(leader.map(str::to_string)),
            local: local.to_string(),
        }
    }

    pub fn set_leader(&self, leader: Option<&str>) {
        *self.leader.lock() = leader.map(str::to_string);
    }
}

#[async_trait]
impl ClusterInfo for FakeCluster {
    async fn leader_address(&self) -> Result<Option<String>> {
        Ok(self.leader.lock().clone())
    }

    fn local_address(&self) -> String {
        self.local.clone()
    }
}

#[derive(Default)]
pub struct FakeNetwork {
    pub shutdowns: AtomicUsize,
    pub startups: AtomicUsize,
    fail_startup: Mutex<bool>,
}

impl FakeNetwork {
    pub fn fail_startup(&self) {
        *self.fail_startup.lock() = true;
    }

    pub fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }

    pub fn startups(&self) -> usize {
        self.startups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NetworkHooks for FakeNetwork {
    async fn shutdown(&self) {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
    }

    async fn startup(&self) -> Result<()> {
        self.startups.fetch_add(1, Ordering::SeqCst);
        if *self.fail_startup.lock() {
            return Err(FleetError::Network("bridge missing".into()));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<LifecycleEvent>>,
}

impl RecordingNotifier {
    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.events.lock().clone()
    }

    pub fn kinds(&self) -> Vec<LifecycleKind> {
        self.events.lock().iter().map(|e| e.kind).collect()
    }
}

impl LifecycleNotifier for RecordingNotifier {
    fn send_lifecycle(&self, event: LifecycleEvent) {
        self.events.lock().push(event);
    }
}

#[derive(Default)]
pub struct RecordingReporter {
    progress: Mutex<Vec<String>>,
    requestor: Option<String>,
}

impl RecordingReporter {
    pub fn with_requestor(requestor: &str) -> Self {
        Self {
            progress: Mutex::new(Vec::new()),
            requestor: Some(requestor.to_string()),
        }
    }

    pub fn progress(&self) -> Vec<String> {
        self.progress.lock().clone()
    }
}

impl OperationReporter for RecordingReporter {
    fn update_metadata(&self, metadata: BTreeMap<String, String>) {
        if let Some(message) = metadata.get(PROGRESS_KEY) {
            self.progress.lock().push(message.clone());
        }
    }

    fn requestor(&self) -> Option<String> {
        self.requestor.clone()
    }
}

/// Probe with a fixed set of reachable members
#[derive(Default)]
pub struct FakeProbe {
    reachable: Mutex<HashSet<String>>,
}

impl FakeProbe {
    pub fn set_reachable(&self, member: &str) {
        self.reachable.lock().insert(member.to_string());
    }
}

#[async_trait]
impl LivenessProbe for FakeProbe {
    async fn is_reachable(&self, member: &ClusterMember) -> bool {
        self.reachable.lock().contains(&member.name)
    }
}

/// Migrator that moves workloads in the catalog, tracks concurrency and can
/// be told to fail.
pub struct CountingMigrator {
    catalog: Arc<MemoryCatalog>,
    delay: Duration,
    in_flight: AtomicUsize,
    pub peak: AtomicUsize,
    /// Remaining forced failures per workload key
    failures: Mutex<HashMap<String, usize>>,
    attempts: Mutex<HashMap<String, usize>>,
    moved: Mutex<Vec<String>>,
}

impl CountingMigrator {
    pub fn new(catalog: Arc<MemoryCatalog>, delay: Duration) -> Self {
        Self {
            catalog,
            delay,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            failures: Mutex::new(HashMap::new()),
            attempts: Mutex::new(HashMap::new()),
            moved: Mutex::new(Vec::new()),
        }
    }

    pub fn fail_times(&self, key: &str, times: usize) {
        self.failures.lock().insert(key.to_string(), times);
    }

    pub fn attempts(&self, key: &str) -> usize {
        self.attempts.lock().get(key).copied().unwrap_or(0)
    }

    pub fn moved(&self) -> Vec<String> {
        self.moved.lock().clone()
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Migrator for CountingMigrator {
    async fn migrate(&self, request: &MigrationRequest) -> Result<MigrationOutcome> {
        let key = request.workload.key();
        *self.attempts.lock().entry(key.clone()).or_default() += 1;

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        {
            let mut failures = self.failures.lock();
            if let Some(remaining) = failures.get_mut(&key) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(FleetError::Transport(format!("injected failure for {key}")));
                }
            }
        }

        self.catalog.set_workload_location(
            &request.workload.project,
            &request.workload.name,
            &request.target.name,
        )?;
        self.moved.lock().push(key);
        Ok(MigrationOutcome::Moved)
    }
}

/// A three-member cluster (node1 leads) wired to fakes
pub struct Harness {
    pub catalog: Arc<MemoryCatalog>,
    pub runtime: Arc<FakeRuntime>,
    pub transport: Arc<FakeTransport>,
    pub cluster: Arc<FakeCluster>,
    pub network: Arc<FakeNetwork>,
    pub notifier: Arc<RecordingNotifier>,
    pub placement: Option<Arc<dyn PlacementPolicy>>,
}

impl Harness {
    pub fn new() -> Self {
        init_tracing();

        let catalog = Arc::new(MemoryCatalog::new());
        for (name, address) in [
            ("node1", "10.0.0.1:8443"),
            ("node2", "10.0.0.2:8443"),
            ("node3", "10.0.0.3:8443"),
        ] {
            catalog.put_member(ClusterMember::new(name, address));
        }

        let runtime = Arc::new(FakeRuntime::new(catalog.clone()));
        let transport = Arc::new(FakeTransport::new(catalog.clone(), runtime.clone()));

        Self {
            catalog,
            runtime,
            transport,
            cluster: Arc::new(FakeCluster::new(Some("10.0.0.1:8443"), "10.0.0.1:8443")),
            network: Arc::new(FakeNetwork::default()),
            notifier: Arc::new(RecordingNotifier::default()),
            placement: None,
        }
    }

    /// Add a workload; `running` also sets its last recorded power state
    pub fn add_workload(&self, workload: Workload, running: bool) -> String {
        let workload = if running {
            workload.with_config(
                fleetd_core::workload::LAST_POWER_STATE_KEY,
                fleetd_core::workload::POWER_STATE_RUNNING,
            )
        } else {
            workload
        };
        let key = workload.key();
        self.catalog.put_workload(workload);
        self.runtime.set_running(&key, running);
        key
    }

    pub fn services(&self) -> ClusterServices {
        ClusterServices {
            catalog: self.catalog.clone(),
            runtime: self.runtime.clone(),
            transport: self.transport.clone(),
            cluster: self.cluster.clone(),
            network: self.network.clone(),
            notifier: self.notifier.clone(),
            placement: self.placement.clone(),
        }
    }

    pub fn config(host_cpus: usize) -> EvacuatorConfig {
        EvacuatorConfig {
            host_cpus,
            ..Default::default()
        }
    }

    pub fn evacuator(&self) -> Evacuator {
        Evacuator::new(Self::config(16), self.services())
    }

    pub fn restorer(&self) -> Restorer {
        Restorer::new(Self::config(16), self.services())
    }

    pub async fn location(&self, key: &str) -> String {
        let (project, name) = key.split_once('/').unwrap_or(("default", key));
        self.catalog.workload(project, name).await.unwrap().location
    }

    pub async fn workload(&self, key: &str) -> Workload {
        let (project, name) = key.split_once('/').unwrap_or(("default", key));
        self.catalog.workload(project, name).await.unwrap()
    }

    pub async fn member_state(&self, member: &str) -> fleetd_core::MemberState {
        self.catalog.member(member).await.unwrap().state
    }
}

pub fn reporter() -> Arc<RecordingReporter> {
    Arc::new(RecordingReporter::with_requestor("admin"))
}
