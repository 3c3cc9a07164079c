//! ICMP reachability checks

use anyhow::Result;
use async_trait::async_trait;
use std::net::Ipv4Addr;
use std::time::Duration;
use tokio::time::timeout;
use tracing::trace;

/// Result of one reachability probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reachability {
    /// Host answered the echo request
    Reachable,
    /// No reply, or the probe could not be sent
    Unreachable,
    /// No reply before the deadline
    TimedOut,
}

impl Reachability {
    pub fn is_reachable(self) -> bool {
        self == Reachability::Reachable
    }
}

/// Checks whether a host responds at all
#[async_trait]
pub trait ReachabilityProber: Send + Sync {
    /// Send one probe to `address`, giving up after `timeout`
    async fn probe(&self, address: Ipv4Addr, timeout: Duration) -> Reachability;
}

/// Reachability via the platform `ping` utility
///
/// Avoids raw sockets so sweeps work without elevated privileges.
#[derive(Debug, Clone, Copy, Default)]
pub struct PingProber;

#[async_trait]
impl ReachabilityProber for PingProber {
    async fn probe(&self, address: Ipv4Addr, deadline: Duration) -> Reachability {
        match timeout(deadline, ping_once(address, deadline)).await {
            Ok(Ok(true)) => Reachability::Reachable,
            Ok(Ok(false)) => Reachability::Unreachable,
            Ok(Err(e)) => {
                trace!(ip = %address, error = %e, "Failed to run ping");
                Reachability::Unreachable
            }
            Err(_) => Reachability::TimedOut,
        }
    }
}

async fn ping_once(address: Ipv4Addr, deadline: Duration) -> Result<bool> {
    let output = tokio::process::Command::new("ping")
        .args(ping_args(address, deadline))
        .kill_on_drop(true)
        .output()
        .await?;

    Ok(output.status.success())
}

/// Single echo request with a reply wait of at least `deadline`
fn ping_args(address: Ipv4Addr, deadline: Duration) -> Vec<String> {
    let millis = deadline.as_millis().max(1);

    if cfg!(target_os = "windows") {
        vec![
            "-n".to_string(),
            "1".to_string(),
            "-w".to_string(),
            millis.to_string(),
            address.to_string(),
        ]
    } else if cfg!(target_os = "macos") {
        // macOS takes -W in milliseconds
        vec![
            "-c".to_string(),
            "1".to_string(),
            "-W".to_string(),
            millis.to_string(),
            address.to_string(),
        ]
    } else {
        // iputils takes whole seconds, the outer timeout enforces the real deadline
        let secs = millis.div_ceil(1000);
        vec![
            "-c".to_string(),
            "1".to_string(),
            "-W".to_string(),
            secs.to_string(),
            address.to_string(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(target_os = "linux")]
    fn test_ping_args_round_up_to_seconds() {
        let args = ping_args(Ipv4Addr::new(192, 168, 1, 20), Duration::from_millis(500));
        assert_eq!(args, vec!["-c", "1", "-W", "1", "192.168.1.20"]);

        let args = ping_args(Ipv4Addr::new(10, 0, 0, 1), Duration::from_millis(2001));
        assert_eq!(args, vec!["-c", "1", "-W", "3", "10.0.0.1"]);
    }

    #[test]
    fn test_reachability_flags() {
        assert!(Reachability::Reachable.is_reachable());
        assert!(!Reachability::Unreachable.is_reachable());
        assert!(!Reachability::TimedOut.is_reachable());
    }

    #[tokio::test]
    async fn test_zero_deadline_times_out() {
        let outcome = PingProber.probe(Ipv4Addr::new(192, 0, 2, 1), Duration::ZERO).await;
        assert_ne!(outcome, Reachability::Reachable);
    }
}
