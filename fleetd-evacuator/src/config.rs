//! Evacuator configuration
//!
//! Configuration loaded from environment variables.

use std::time::Duration;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Evacuation and restoration settings
#[derive(Debug, Clone)]
pub struct EvacuatorConfig {
    /// Members without a heartbeat for this long are not migration targets
    pub offline_threshold: Duration,

    /// Upper bound on one placement policy evaluation
    pub placement_timeout: Duration,

    /// Clean shutdown timeout for workloads that don't configure their own
    pub shutdown_timeout: Duration,

    /// CPUs on this host, used to size the relocation pool
    pub host_cpus: usize,
}

impl Default for EvacuatorConfig {
    fn default() -> Self {
        Self {
            offline_threshold: Duration::from_secs(20),
            placement_timeout: Duration::from_secs(5),
            shutdown_timeout: Duration::from_secs(30),
            host_cpus: detect_host_cpus(),
        }
    }
}

impl EvacuatorConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        Ok(Self {
            offline_threshold: env_secs(
                "FLEETD_OFFLINE_THRESHOLD_SECS",
                defaults.offline_threshold,
            )?,
            placement_timeout: env_secs(
                "FLEETD_PLACEMENT_TIMEOUT_SECS",
                defaults.placement_timeout,
            )?,
            shutdown_timeout: env_secs("FLEETD_SHUTDOWN_TIMEOUT_SECS", defaults.shutdown_timeout)?,
            host_cpus: env_parse("FLEETD_HOST_CPUS", defaults.host_cpus)?,
        })
    }

    /// Relocations allowed to run at once: one per 16 CPUs, at least one
    pub fn parallelism(&self) -> usize {
        (self.host_cpus / 16).max(1)
    }
}

/// Healing scheduler settings
#[derive(Debug, Clone)]
pub struct HealingConfig {
    /// Heartbeat age after which a member is healed (zero disables healing)
    pub healing_threshold: Duration,

    /// Time between healing passes
    pub check_interval: Duration,

    /// Evacuation attempts per dead member
    pub max_attempts: u32,

    /// Timeout for the network liveness probe
    pub probe_timeout: Duration,
}

impl Default for HealingConfig {
    fn default() -> Self {
        Self {
            healing_threshold: Duration::ZERO,
            check_interval: Duration::from_secs(60),
            max_attempts: 5,
            probe_timeout: Duration::from_secs(1),
        }
    }
}

impl HealingConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        Ok(Self {
            healing_threshold: env_secs(
                "FLEETD_HEALING_THRESHOLD_SECS",
                defaults.healing_threshold,
            )?,
            check_interval: env_secs("FLEETD_HEALING_INTERVAL_SECS", defaults.check_interval)?,
            max_attempts: env_parse("FLEETD_HEALING_MAX_ATTEMPTS", defaults.max_attempts)?,
            probe_timeout: env_secs("FLEETD_PROBE_TIMEOUT_SECS", defaults.probe_timeout)?,
        })
    }

    pub fn is_enabled(&self) -> bool {
        !self.healing_threshold.is_zero()
    }

    /// Healing threshold, never below the offline threshold while enabled
    pub fn effective_threshold(&self, offline_threshold: Duration) -> Duration {
        if !self.is_enabled() {
            return Duration::ZERO;
        }

        self.healing_threshold.max(offline_threshold)
    }
}

fn detect_host_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(name.to_string(), value)),
        Err(_) => Ok(default),
    }
}

fn env_secs(name: &str, default: Duration) -> Result<Duration, ConfigError> {
    env_parse(name, default.as_secs()).map(Duration::from_secs)
}
