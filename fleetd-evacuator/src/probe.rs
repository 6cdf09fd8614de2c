//! Network liveness probes
//!
//! Before healing a member whose heartbeat has gone stale, the healer checks
//! whether the host still answers on the network. A host that answers is
//! left alone.

use async_trait::async_trait;
use fleetd_core::ClusterMember;
use std::process::Stdio;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

#[async_trait]
pub trait LivenessProbe: Send + Sync {
    /// Whether the member's host responds on the network
    async fn is_reachable(&self, member: &ClusterMember) -> bool;
}

/// One ICMP echo through the system `ping`
pub struct PingProbe {
    timeout: Duration,
}

impl PingProbe {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl LivenessProbe for PingProbe {
    async fn is_reachable(&self, member: &ClusterMember) -> bool {
        let Some(host) = member.host() else {
            debug!(member = %member.name, address = %member.address, "Unparsable member address");
            return false;
        };

        let deadline = self.timeout.as_secs().max(1).to_string();
        let status = Command::new("ping")
            .args(["-w", deadline.as_str(), "-c1", "-n", "-q", host])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status();

        // Grace on top of ping's own deadline
        match timeout(self.timeout + Duration::from_secs(1), status).await {
            Ok(Ok(status)) => status.success(),
            Ok(Err(e)) => {
                debug!(error = %e, "Failed to run ping");
                false
            }
            Err(_) => false,
        }
    }
}

/// TCP connect to the member's cluster address
pub struct TcpProbe {
    timeout: Duration,
}

impl TcpProbe {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl LivenessProbe for TcpProbe {
    async fn is_reachable(&self, member: &ClusterMember) -> bool {
        matches!(
            timeout(self.timeout, TcpStream::connect(member.address.as_str())).await,
            Ok(Ok(_))
        )
    }
}
