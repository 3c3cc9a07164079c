//! Subnet expansion for local interface addresses

use std::fmt;
use std::net::Ipv4Addr;
use thiserror::Error;

/// Mask applied to interface addresses unless configured otherwise
pub const DEFAULT_PREFIX_LEN: u8 = 24;

/// Smallest prefix accepted, bounds a sweep to 65534 hosts
pub const MIN_PREFIX_LEN: u8 = 16;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SubnetError {
    #[error("Prefix length /{0} outside /{min}../32", min = MIN_PREFIX_LEN)]
    InvalidPrefix(u8),
}

/// IPv4 network derived from an interface address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Subnet {
    network: Ipv4Addr,
    prefix_len: u8,
}

impl Subnet {
    /// Network containing `address` under a `/prefix_len` mask
    pub fn from_interface(address: Ipv4Addr, prefix_len: u8) -> Result<Self, SubnetError> {
        if !(MIN_PREFIX_LEN..=32).contains(&prefix_len) {
            return Err(SubnetError::InvalidPrefix(prefix_len));
        }

        let network = u32::from(address) & mask(prefix_len);
        Ok(Self {
            network: Ipv4Addr::from(network),
            prefix_len,
        })
    }

    pub fn network(&self) -> Ipv4Addr {
        self.network
    }

    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    pub fn broadcast(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.network) | !mask(self.prefix_len))
    }

    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        u32::from(ip) & mask(self.prefix_len) == u32::from(self.network)
    }

    /// Candidate host addresses, in ascending order
    ///
    /// Network and broadcast addresses are skipped except on /31 and /32,
    /// where every address is a host.
    pub fn hosts(&self) -> impl Iterator<Item = Ipv4Addr> {
        let (first, last) = self.host_bounds();
        (first..=last).map(Ipv4Addr::from)
    }

    /// Number of candidate hosts
    pub fn len(&self) -> usize {
        let (first, last) = self.host_bounds();
        (last - first) as usize + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    fn host_bounds(&self) -> (u32, u32) {
        let network = u32::from(self.network);
        let broadcast = u32::from(self.broadcast());
        if self.prefix_len >= 31 {
            (network, broadcast)
        } else {
            (network + 1, broadcast - 1)
        }
    }
}

impl fmt::Display for Subnet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix_len)
    }
}

fn mask(prefix_len: u8) -> u32 {
    if prefix_len == 0 {
        0
    } else {
        !0u32 << (32 - u32::from(prefix_len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_interface_masks_host_bits() {
        let subnet = Subnet::from_interface(Ipv4Addr::new(192, 168, 1, 10), 24).unwrap();
        assert_eq!(subnet.network(), Ipv4Addr::new(192, 168, 1, 0));
        assert_eq!(subnet.broadcast(), Ipv4Addr::new(192, 168, 1, 255));
        assert_eq!(subnet.to_string(), "192.168.1.0/24");
    }

    #[test]
    fn test_hosts_skip_network_and_broadcast() {
        let subnet = Subnet::from_interface(Ipv4Addr::new(192, 168, 1, 10), 24).unwrap();
        let hosts: Vec<Ipv4Addr> = subnet.hosts().collect();
        assert_eq!(hosts.len(), 254);
        assert_eq!(subnet.len(), 254);
        assert_eq!(hosts.first(), Some(&Ipv4Addr::new(192, 168, 1, 1)));
        assert_eq!(hosts.last(), Some(&Ipv4Addr::new(192, 168, 1, 254)));
        assert!(hosts.contains(&Ipv4Addr::new(192, 168, 1, 10)));
    }

    #[test]
    fn test_hosts_restartable() {
        let subnet = Subnet::from_interface(Ipv4Addr::new(10, 0, 0, 5), 29).unwrap();
        let first: Vec<_> = subnet.hosts().collect();
        let second: Vec<_> = subnet.hosts().collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 6);
    }

    #[test]
    fn test_point_to_point_prefixes() {
        let p31 = Subnet::from_interface(Ipv4Addr::new(10, 0, 0, 1), 31).unwrap();
        assert_eq!(
            p31.hosts().collect::<Vec<_>>(),
            vec![Ipv4Addr::new(10, 0, 0, 0), Ipv4Addr::new(10, 0, 0, 1)]
        );

        let p32 = Subnet::from_interface(Ipv4Addr::new(10, 0, 0, 1), 32).unwrap();
        assert_eq!(p32.hosts().collect::<Vec<_>>(), vec![Ipv4Addr::new(10, 0, 0, 1)]);
        assert_eq!(p32.len(), 1);
    }

    #[test]
    fn test_invalid_prefix() {
        assert_eq!(
            Subnet::from_interface(Ipv4Addr::new(10, 0, 0, 1), 8),
            Err(SubnetError::InvalidPrefix(8))
        );
        assert_eq!(
            Subnet::from_interface(Ipv4Addr::new(10, 0, 0, 1), 33),
            Err(SubnetError::InvalidPrefix(33))
        );
    }

    #[test]
    fn test_contains() {
        let subnet = Subnet::from_interface(Ipv4Addr::new(192, 168, 186, 0), 24).unwrap();
        assert!(subnet.contains(Ipv4Addr::new(192, 168, 186, 1)));
        assert!(subnet.contains(Ipv4Addr::new(192, 168, 186, 255)));
        assert!(!subnet.contains(Ipv4Addr::new(192, 168, 187, 1)));
        assert!(!subnet.contains(Ipv4Addr::new(10, 0, 0, 1)));
    }

    #[test]
    fn test_same_network_from_different_interfaces() {
        let a = Subnet::from_interface(Ipv4Addr::new(192, 168, 1, 10), 24).unwrap();
        let b = Subnet::from_interface(Ipv4Addr::new(192, 168, 1, 77), 24).unwrap();
        assert_eq!(a, b);
    }
}
