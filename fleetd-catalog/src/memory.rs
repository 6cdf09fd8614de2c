//! In-memory catalog
//!
//! Used for testing and embedding. Not persistent.

use crate::backend::Catalog;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fleetd_core::error::{FleetError, Result};
use fleetd_core::{ClusterMember, MemberState, Workload};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Default)]
struct Tables {
    members: BTreeMap<String, ClusterMember>,
    /// Keyed by `project/name`
    workloads: BTreeMap<String, Workload>,
}

/// In-memory catalog
pub struct MemoryCatalog {
    tables: RwLock<Tables>,

    /// Successful member state writes
    state_writes: AtomicU64,
}

impl MemoryCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            state_writes: AtomicU64::new(0),
        }
    }

    /// Insert or replace a member
    pub fn put_member(&self, member: ClusterMember) {
        self.tables
            .write()
            .members
            .insert(member.name.clone(), member);
    }

    /// Insert or replace a workload
    pub fn put_workload(&self, workload: Workload) {
        self.tables
            .write()
            .workloads
            .insert(workload.key(), workload);
    }

    pub fn set_heartbeat(&self, member: &str, at: DateTime<Utc>) -> Result<()> {
        let mut tables = self.tables.write();
        let member = tables
            .members
            .get_mut(member)
            .ok_or_else(|| FleetError::MemberNotFound(member.to_string()))?;
        member.last_heartbeat = at;
        Ok(())
    }

    /// Record that a workload now lives on `location`
    pub fn set_workload_location(&self, project: &str, name: &str, location: &str) -> Result<()> {
        self.with_workload(project, name, |w| {
            w.location = location.to_string();
        })
    }

    /// Replace a workload's local configuration
    pub fn set_workload_config(
        &self,
        project: &str,
        name: &str,
        config: BTreeMap<String, String>,
    ) -> Result<()> {
        self.with_workload(project, name, |w| {
            for key in w.local_config.keys() {
                if !config.contains_key(key) {
                    w.expanded_config.remove(key);
                }
            }
            for (key, value) in &config {
                w.expanded_config.insert(key.clone(), value.clone());
            }
            w.local_config = config;
        })
    }

    /// Set a local configuration key unless it already holds a non-empty value.
    ///
    /// Returns whether the key was written.
    pub fn set_workload_config_if_absent(
        &self,
        project: &str,
        name: &str,
        key: &str,
        value: &str,
    ) -> Result<bool> {
        let mut written = false;
        self.with_workload(project, name, |w| {
            if w.local_config.get(key).is_some_and(|v| !v.is_empty()) {
                return;
            }
            w.local_config.insert(key.to_string(), value.to_string());
            w.expanded_config.insert(key.to_string(), value.to_string());
            written = true;
        })?;
        Ok(written)
    }

    /// Number of workloads hosted by each member
    pub fn member_loads(&self) -> HashMap<String, usize> {
        let tables = self.tables.read();
        let mut loads: HashMap<String, usize> =
            tables.members.keys().map(|name| (name.clone(), 0)).collect();
        for workload in tables.workloads.values() {
            *loads.entry(workload.location.clone()).or_default() += 1;
        }
        loads
    }

    /// Successful member state writes since creation
    pub fn state_writes(&self) -> u64 {
        self.state_writes.load(Ordering::SeqCst)
    }

    fn with_workload<F>(&self, project: &str, name: &str, f: F) -> Result<()>
    where
        F: FnOnce(&mut Workload),
    {
        let mut tables = self.tables.write();
        let workload = tables
            .workloads
            .get_mut(&format!("{project}/{name}"))
            .ok_or_else(|| FleetError::WorkloadNotFound {
                project: project.to_string(),
                name: name.to_string(),
            })?;
        f(workload);
        Ok(())
    }
}

impl Default for MemoryCatalog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Catalog for MemoryCatalog {
    async fn members(&self) -> Result<Vec<ClusterMember>> {
        Ok(self.tables.read().members.values().cloned().collect())
    }

    async fn member(&self, name: &str) -> Result<ClusterMember> {
        self.tables
            .read()
            .members
            .get(name)
            .cloned()
            .ok_or_else(|| FleetError::MemberNotFound(name.to_string()))
    }

    async fn update_member_state(
        &self,
        name: &str,
        expected: MemberState,
        new: MemberState,
    ) -> Result<bool> {
        let mut tables = self.tables.write();
        let member = tables
            .members
            .get_mut(name)
            .ok_or_else(|| FleetError::MemberNotFound(name.to_string()))?;

        if member.state != expected {
            return Ok(false);
        }

        member.state = new;
        self.state_writes.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }

    async fn candidate_members(
        &self,
        architectures: &[String],
        group: Option<&str>,
        offline_threshold: Duration,
    ) -> Result<Vec<ClusterMember>> {
        let loads = self.member_loads();
        let now = Utc::now();

        let mut candidates: Vec<(usize, ClusterMember)> = self
            .tables
            .read()
            .members
            .values()
            .filter(|m| m.state == MemberState::Created)
            .filter(|m| group.map_or(true, |g| m.in_group(g)))
            .filter(|m| !m.is_offline(offline_threshold, now))
            .filter(|m| {
                architectures.is_empty()
                    || architectures.iter().any(|a| m.supports_architecture(a))
            })
            .map(|m| (loads.get(&m.name).copied().unwrap_or(0), m.clone()))
            .collect();

        candidates.sort_by(|(load_a, a), (load_b, b)| {
            load_a.cmp(load_b).then_with(|| a.name.cmp(&b.name))
        });

        Ok(candidates.into_iter().map(|(_, m)| m).collect())
    }

    async fn workloads_at_member(&self, member: &str) -> Result<Vec<Workload>> {
        Ok(self
            .tables
            .read()
            .workloads
            .values()
            .filter(|w| w.location == member)
            .cloned()
            .collect())
    }

    async fn workloads_by_origin(&self, origin: &str) -> Result<Vec<Workload>> {
        Ok(self
            .tables
            .read()
            .workloads
            .values()
            .filter(|w| w.origin() == Some(origin))
            .cloned()
            .collect())
    }

    async fn workload(&self, project: &str, name: &str) -> Result<Workload> {
        self.tables
            .read()
            .workloads
            .get(&format!("{project}/{name}"))
            .cloned()
            .ok_or_else(|| FleetError::WorkloadNotFound {
                project: project.to_string(),
                name: name.to_string(),
            })
    }
}
