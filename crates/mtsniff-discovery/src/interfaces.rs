//! Local interface enumeration

use network_interface::{Addr, NetworkInterface, NetworkInterfaceConfig};
use std::net::Ipv4Addr;
use tracing::{debug, warn};

/// Interface name prefixes for virtual, container and tunnel devices
const VIRTUAL_PREFIXES: &[&str] = &[
    "lo", "docker", "br-", "veth", "virbr", "vmnet", "vboxnet", "tun", "tap", "wg", "zt",
    "utun", "llw", "awdl", "bridge",
];

/// Source of local IPv4 addresses to sweep from
pub trait InterfaceEnumerator: Send + Sync {
    fn local_ipv4_addresses(&self) -> Vec<Ipv4Addr>;
}

/// Wired and wireless interfaces of this host
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemInterfaces;

impl InterfaceEnumerator for SystemInterfaces {
    fn local_ipv4_addresses(&self) -> Vec<Ipv4Addr> {
        let interfaces = match NetworkInterface::show() {
            Ok(interfaces) => interfaces,
            Err(e) => {
                warn!(error = %e, "Failed to enumerate network interfaces");
                return Vec::new();
            }
        };

        let mut addresses = Vec::new();
        for iface in interfaces {
            if !is_physical_interface(&iface.name, iface.mac_addr.as_deref()) {
                continue;
            }

            for addr in &iface.addr {
                if let Addr::V4(v4) = addr {
                    if is_sweepable_address(v4.ip) {
                        debug!(interface = %iface.name, ip = %v4.ip, "Using interface");
                        addresses.push(v4.ip);
                    }
                }
            }
        }

        addresses
    }
}

/// Ethernet/Wi-Fi adapters carry a hardware address, tunnels don't
fn is_physical_interface(name: &str, mac: Option<&str>) -> bool {
    if VIRTUAL_PREFIXES.iter().any(|prefix| name.starts_with(prefix)) {
        return false;
    }

    match mac {
        Some(mac) => !mac.is_empty() && mac != "00:00:00:00:00:00",
        None => false,
    }
}

fn is_sweepable_address(ip: Ipv4Addr) -> bool {
    !(ip.is_loopback()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_multicast()
        || ip.is_broadcast())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_physical_interfaces() {
        assert!(is_physical_interface("eth0", Some("aa:bb:cc:dd:ee:ff")));
        assert!(is_physical_interface("wlp3s0", Some("aa:bb:cc:dd:ee:ff")));
        assert!(is_physical_interface("en0", Some("aa:bb:cc:dd:ee:ff")));
    }

    #[test]
    fn test_virtual_interfaces_skipped() {
        let mac = Some("02:42:ac:11:00:02");
        assert!(!is_physical_interface("lo", Some("00:00:00:00:00:00")));
        assert!(!is_physical_interface("docker0", mac));
        assert!(!is_physical_interface("br-1a2b3c", mac));
        assert!(!is_physical_interface("veth12ab", mac));
        assert!(!is_physical_interface("tun0", None));
        assert!(!is_physical_interface("wg0", None));
    }

    #[test]
    fn test_interface_without_mac_skipped() {
        assert!(!is_physical_interface("eth1", None));
        assert!(!is_physical_interface("eth1", Some("")));
    }

    #[test]
    fn test_sweepable_addresses() {
        assert!(is_sweepable_address(Ipv4Addr::new(192, 168, 1, 10)));
        assert!(is_sweepable_address(Ipv4Addr::new(10, 4, 0, 2)));
        assert!(!is_sweepable_address(Ipv4Addr::LOCALHOST));
        assert!(!is_sweepable_address(Ipv4Addr::new(169, 254, 3, 7)));
        assert!(!is_sweepable_address(Ipv4Addr::UNSPECIFIED));
    }
}
