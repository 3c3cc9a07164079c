//! Device types produced by a discovery run

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum MacAddressError {
    #[error("Expected 6 octets, got {0}")]
    WrongLength(usize),
    #[error("Invalid octet '{0}'")]
    InvalidOctet(String),
}

/// Link-layer (Ethernet) hardware address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    pub const fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }

    /// All-zero addresses show up for incomplete neighbor entries
    pub fn is_zero(&self) -> bool {
        self.0 == [0; 6]
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

impl FromStr for MacAddress {
    type Err = MacAddressError;

    /// Accepts `aa:bb:cc:dd:ee:ff` and `aa-bb-cc-dd-ee-ff`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split([':', '-']).collect();
        if parts.len() != 6 {
            return Err(MacAddressError::WrongLength(parts.len()));
        }

        let mut octets = [0u8; 6];
        for (octet, part) in octets.iter_mut().zip(&parts) {
            if part.is_empty() || part.len() > 2 {
                return Err(MacAddressError::InvalidOctet(part.to_string()));
            }
            *octet = u8::from_str_radix(part, 16)
                .map_err(|_| MacAddressError::InvalidOctet(part.to_string()))?;
        }

        Ok(Self(octets))
    }
}

impl Serialize for MacAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MacAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Correlation record for one in-flight protocol probe
///
/// Handed to the protocol client by value and returned verbatim with the
/// probe's completion, so the response can be tied back to the host and
/// port that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProbeContext {
    pub address: Ipv4Addr,
    pub port: u16,
}

impl ProbeContext {
    pub fn new(address: Ipv4Addr, port: u16) -> Self {
        Self { address, port }
    }

    pub fn socket_addr(&self) -> SocketAddrV4 {
        SocketAddrV4::new(self.address, self.port)
    }
}

impl fmt::Display for ProbeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

/// A device reported by an MTConnect agent
///
/// One value is created per `Device` element in a successful probe response.
/// Fields are read-only once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredDevice {
    address: Ipv4Addr,
    port: u16,
    mac: Option<MacAddress>,
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    uuid: Option<String>,
    discovered_at: DateTime<Utc>,
}

impl DiscoveredDevice {
    /// Create a device stamped with the current time
    pub fn new(address: Ipv4Addr, port: u16, mac: Option<MacAddress>, name: impl Into<String>) -> Self {
        Self {
            address,
            port,
            mac,
            name: name.into(),
            id: None,
            uuid: None,
            discovered_at: Utc::now(),
        }
    }

    /// Attach the `id` and `uuid` attributes reported by the agent
    pub fn with_identity(mut self, id: Option<String>, uuid: Option<String>) -> Self {
        self.id = id;
        self.uuid = uuid;
        self
    }

    pub fn address(&self) -> Ipv4Addr {
        self.address
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn socket_addr(&self) -> SocketAddrV4 {
        SocketAddrV4::new(self.address, self.port)
    }

    pub fn mac(&self) -> Option<MacAddress> {
        self.mac
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn uuid(&self) -> Option<&str> {
        self.uuid.as_deref()
    }

    pub fn discovered_at(&self) -> DateTime<Utc> {
        self.discovered_at
    }
}

impl fmt::Display for DiscoveredDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}:{}", self.name, self.address, self.port)?;
        if let Some(mac) = self.mac {
            write!(f, " ({})", mac)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mac_parse_colon() {
        let mac: MacAddress = "AA:bb:0c:DD:ee:0F".parse().unwrap();
        assert_eq!(mac.octets(), [0xaa, 0xbb, 0x0c, 0xdd, 0xee, 0x0f]);
        assert_eq!(mac.to_string(), "aa:bb:0c:dd:ee:0f");
    }

    #[test]
    fn test_mac_parse_dash() {
        let mac: MacAddress = "00-1a-2b-3c-4d-5e".parse().unwrap();
        assert_eq!(mac, MacAddress::new([0x00, 0x1a, 0x2b, 0x3c, 0x4d, 0x5e]));
    }

    #[test]
    fn test_mac_parse_rejects_garbage() {
        assert_eq!(
            "aa:bb:cc".parse::<MacAddress>(),
            Err(MacAddressError::WrongLength(3))
        );
        assert!(matches!(
            "aa:bb:cc:dd:ee:zz".parse::<MacAddress>(),
            Err(MacAddressError::InvalidOctet(_))
        ));
        assert!(matches!(
            "aa:bb:cc:dd:ee:123".parse::<MacAddress>(),
            Err(MacAddressError::InvalidOctet(_))
        ));
    }

    #[test]
    fn test_mac_zero() {
        assert!(MacAddress::new([0; 6]).is_zero());
        assert!(!MacAddress::new([0, 0, 0, 0, 0, 1]).is_zero());
    }

    #[test]
    fn test_device_json_shape() {
        let device = DiscoveredDevice::new(
            Ipv4Addr::new(192, 168, 1, 20),
            5000,
            Some(MacAddress::new([0x02, 0, 0, 0, 0, 0x20])),
            "Lathe-1",
        )
        .with_identity(Some("d1".to_string()), None);

        let json = serde_json::to_value(&device).unwrap();
        assert_eq!(json["address"], "192.168.1.20");
        assert_eq!(json["port"], 5000);
        assert_eq!(json["mac"], "02:00:00:00:00:20");
        assert_eq!(json["name"], "Lathe-1");
        assert_eq!(json["id"], "d1");
        assert!(json.get("uuid").is_none());

        let back: DiscoveredDevice = serde_json::from_value(json).unwrap();
        assert_eq!(back, device);
    }

    #[test]
    fn test_device_display() {
        let device = DiscoveredDevice::new(Ipv4Addr::new(10, 0, 0, 5), 5001, None, "Mill");
        assert_eq!(device.to_string(), "Mill at 10.0.0.5:5001");
        assert_eq!(device.socket_addr().to_string(), "10.0.0.5:5001");
    }

    #[test]
    fn test_probe_context_display() {
        let ctx = ProbeContext::new(Ipv4Addr::new(192, 168, 1, 20), 5000);
        assert_eq!(ctx.to_string(), "192.168.1.20:5000");
    }
}
