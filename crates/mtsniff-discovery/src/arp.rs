//! Hardware address lookup from the kernel neighbor table
//!
//! By the time an agent has answered a probe the kernel has already resolved
//! its link-layer address, so a lookup only reads the neighbor table and never
//! puts traffic on the wire.

use anyhow::Result;
use mtsniff_core::MacAddress;
use std::net::Ipv4Addr;
use std::process::Command;
use std::str::FromStr;
use tracing::{debug, trace};

/// Neighbor table entry
#[derive(Debug, Clone)]
pub struct ArpEntry {
    pub ip: Ipv4Addr,
    pub mac: Option<MacAddress>,
    pub interface: String,
    pub state: ArpState,
}

impl ArpEntry {
    /// Link-layer address if the entry is usable
    pub fn resolved_mac(&self) -> Option<MacAddress> {
        match self.state {
            ArpState::Failed | ArpState::Incomplete => None,
            _ => self.mac.filter(|mac| !mac.is_zero()),
        }
    }
}

/// Neighbor entry state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArpState {
    Reachable,
    Stale,
    Delay,
    Probe,
    Failed,
    Incomplete,
    Permanent,
    Unknown,
}

/// Resolves the link-layer address of a host
///
/// Lookups are synchronous and best-effort: any failure yields `None`.
pub trait HardwareAddressResolver: Send + Sync {
    fn resolve(&self, ip: Ipv4Addr) -> Option<MacAddress>;
}

/// Resolver backed by the platform neighbor table
#[derive(Debug, Clone, Copy, Default)]
pub struct NeighborTableResolver;

impl HardwareAddressResolver for NeighborTableResolver {
    #[cfg(target_os = "linux")]
    fn resolve(&self, ip: Ipv4Addr) -> Option<MacAddress> {
        let mac = match lookup_ip_neigh(ip) {
            Ok(mac) => mac,
            Err(e) => {
                trace!(ip = %ip, error = %e, "ip neigh lookup failed, reading /proc/net/arp");
                lookup_proc_arp(ip).unwrap_or_else(|e| {
                    debug!(ip = %ip, error = %e, "Failed to read /proc/net/arp");
                    None
                })
            }
        };

        trace!(ip = %ip, mac = ?mac, "Hardware address lookup");
        mac
    }

    #[cfg(not(target_os = "linux"))]
    fn resolve(&self, ip: Ipv4Addr) -> Option<MacAddress> {
        trace!(ip = %ip, "Hardware address lookup not supported on this platform");
        None
    }
}

/// Look up one address with `ip neigh show <ip>`
#[cfg(target_os = "linux")]
fn lookup_ip_neigh(ip: Ipv4Addr) -> Result<Option<MacAddress>> {
    let output = Command::new("ip")
        .args(["neigh", "show", &ip.to_string()])
        .output()?;

    if !output.status.success() {
        anyhow::bail!(
            "ip neigh failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(stdout
        .lines()
        .filter_map(parse_ip_neigh_line)
        .find(|entry| entry.ip == ip)
        .and_then(usable_mac))
}

/// Look up one address in `/proc/net/arp`
#[cfg(target_os = "linux")]
fn lookup_proc_arp(ip: Ipv4Addr) -> Result<Option<MacAddress>> {
    let table = std::fs::read_to_string("/proc/net/arp")?;
    Ok(table
        .lines()
        .skip(1)
        .filter_map(parse_proc_arp_line)
        .find(|entry| entry.ip == ip)
        .and_then(usable_mac))
}

#[cfg(target_os = "linux")]
fn usable_mac(entry: ArpEntry) -> Option<MacAddress> {
    trace!(
        ip = %entry.ip,
        interface = %entry.interface,
        state = ?entry.state,
        "Neighbor entry"
    );
    entry.resolved_mac()
}

/// Parse a line from `ip neigh show` output
fn parse_ip_neigh_line(line: &str) -> Option<ArpEntry> {
    // Format: "192.168.1.1 dev eth0 lladdr aa:bb:cc:dd:ee:ff REACHABLE"
    let parts: Vec<&str> = line.split_whitespace().collect();

    if parts.len() < 4 {
        return None;
    }

    let ip = Ipv4Addr::from_str(parts[0]).ok()?;

    let dev_idx = parts.iter().position(|&p| p == "dev")?;
    if dev_idx + 1 >= parts.len() {
        return None;
    }
    let interface = parts[dev_idx + 1].to_string();

    // No lladdr for INCOMPLETE/FAILED entries
    let mac = parts
        .iter()
        .position(|&p| p == "lladdr")
        .and_then(|idx| parts.get(idx + 1))
        .and_then(|s| s.parse().ok());

    let state = parts
        .last()
        .map(|s| parse_arp_state(s))
        .unwrap_or(ArpState::Unknown);

    Some(ArpEntry {
        ip,
        mac,
        interface,
        state,
    })
}

/// Parse a data line from `/proc/net/arp`
fn parse_proc_arp_line(line: &str) -> Option<ArpEntry> {
    // Format: "192.168.1.1  0x1  0x2  aa:bb:cc:dd:ee:ff  *  eth0"
    let parts: Vec<&str> = line.split_whitespace().collect();

    if parts.len() < 6 {
        return None;
    }

    let ip = Ipv4Addr::from_str(parts[0]).ok()?;
    let flags = u32::from_str_radix(parts[2].trim_start_matches("0x"), 16).ok()?;

    // ATF_COM = 0x2, ATF_PERM = 0x4
    let state = if flags & 0x4 != 0 {
        ArpState::Permanent
    } else if flags & 0x2 != 0 {
        ArpState::Reachable
    } else {
        ArpState::Incomplete
    };

    Some(ArpEntry {
        ip,
        mac: parts[3].parse().ok(),
        interface: parts[5].to_string(),
        state,
    })
}

/// Parse neighbor state string
fn parse_arp_state(s: &str) -> ArpState {
    match s.to_uppercase().as_str() {
        "REACHABLE" => ArpState::Reachable,
        "STALE" => ArpState::Stale,
        "DELAY" => ArpState::Delay,
        "PROBE" => ArpState::Probe,
        "FAILED" => ArpState::Failed,
        "INCOMPLETE" => ArpState::Incomplete,
        "PERMANENT" => ArpState::Permanent,
        _ => ArpState::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ip_neigh_line_reachable() {
        let line = "192.168.1.100 dev eth0 lladdr aa:bb:cc:dd:ee:ff REACHABLE";
        let entry = parse_ip_neigh_line(line).unwrap();
        assert_eq!(entry.ip, Ipv4Addr::new(192, 168, 1, 100));
        assert_eq!(
            entry.mac,
            Some(MacAddress::new([0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]))
        );
        assert_eq!(entry.interface, "eth0");
        assert_eq!(entry.state, ArpState::Reachable);
        assert!(entry.resolved_mac().is_some());
    }

    #[test]
    fn test_parse_ip_neigh_line_stale_still_resolves() {
        let line = "192.168.1.100 dev wlan0 lladdr aa:bb:cc:dd:ee:ff STALE";
        let entry = parse_ip_neigh_line(line).unwrap();
        assert_eq!(entry.state, ArpState::Stale);
        assert!(entry.resolved_mac().is_some());
    }

    #[test]
    fn test_parse_incomplete_line() {
        let line = "192.168.1.100 dev eth0 INCOMPLETE";
        let entry = parse_ip_neigh_line(line).unwrap();
        assert_eq!(entry.mac, None);
        assert_eq!(entry.state, ArpState::Incomplete);
        assert_eq!(entry.resolved_mac(), None);
    }

    #[test]
    fn test_failed_entry_does_not_resolve() {
        let line = "192.168.1.100 dev eth0 lladdr aa:bb:cc:dd:ee:ff FAILED";
        let entry = parse_ip_neigh_line(line).unwrap();
        assert_eq!(entry.resolved_mac(), None);
    }

    #[test]
    fn test_parse_too_short() {
        assert!(parse_ip_neigh_line("192.168.1.100 dev").is_none());
        assert!(parse_ip_neigh_line("fe80::1 dev eth0 lladdr aa:bb:cc:dd:ee:ff REACHABLE").is_none());
    }

    #[test]
    fn test_parse_proc_arp_complete() {
        let line = "192.168.1.20     0x1         0x2         02:42:ac:11:00:02     *        eth0";
        let entry = parse_proc_arp_line(line).unwrap();
        assert_eq!(entry.ip, Ipv4Addr::new(192, 168, 1, 20));
        assert_eq!(entry.state, ArpState::Reachable);
        assert_eq!(entry.interface, "eth0");
        assert_eq!(
            entry.resolved_mac(),
            Some(MacAddress::new([0x02, 0x42, 0xac, 0x11, 0x00, 0x02]))
        );
    }

    #[test]
    fn test_parse_proc_arp_incomplete() {
        let line = "192.168.1.21     0x1         0x0         00:00:00:00:00:00     *        eth0";
        let entry = parse_proc_arp_line(line).unwrap();
        assert_eq!(entry.state, ArpState::Incomplete);
        assert_eq!(entry.resolved_mac(), None);
    }

    #[test]
    fn test_parse_proc_arp_header_skipped() {
        let header = "IP address       HW type     Flags       HW address            Mask     Device";
        assert!(parse_proc_arp_line(header).is_none());
    }
}
