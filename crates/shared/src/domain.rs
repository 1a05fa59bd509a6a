use std::{
    fmt,
    net::{Ipv4Addr, SocketAddr, SocketAddrV4},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Port the control service listens on; a successful connect here defines "device present".
pub const SERVICE_PORT: u16 = 8060;

/// Prefix every interface address is widened to before scanning.
pub const SCAN_PREFIX_LEN: u8 = 24;

/// An IPv4 network: canonical network address plus prefix length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Subnet {
    network: Ipv4Addr,
    prefix_len: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubnetParseError {
    #[error("subnet '{0}' is missing a '/prefix' suffix")]
    MissingPrefix(String),
    #[error("invalid network address in '{0}'")]
    InvalidAddress(String),
    #[error("invalid prefix length in '{0}'")]
    InvalidPrefix(String),
}

impl Subnet {
    /// Builds a subnet, zeroing any host bits in `address`.
    pub fn new(address: Ipv4Addr, prefix_len: u8) -> Self {
        let prefix_len = prefix_len.min(32);
        Self {
            network: Ipv4Addr::from(u32::from(address) & mask(prefix_len)),
            prefix_len,
        }
    }

    /// The /24 network an interface address belongs to.
    pub fn scan_network_for(address: Ipv4Addr) -> Self {
        Self::new(address, SCAN_PREFIX_LEN)
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

    pub fn contains(&self, address: Ipv4Addr) -> bool {
        u32::from(address) & mask(self.prefix_len) == u32::from(self.network)
    }

    /// Usable host addresses, ascending. Networks of /31 and narrower have no reserved addresses.
    pub fn hosts(&self) -> impl Iterator<Item = Ipv4Addr> {
        let first = u32::from(self.network);
        let last = u32::from(self.broadcast());
        let (start, end) = if self.prefix_len >= 31 {
            (first, last)
        } else {
            (first + 1, last - 1)
        };
        (start..=end).map(Ipv4Addr::from)
    }
}

fn mask(prefix_len: u8) -> u32 {
    match prefix_len {
        0 => 0,
        len => u32::MAX << (32 - u32::from(len.min(32))),
    }
}

impl fmt::Display for Subnet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix_len)
    }
}

impl FromStr for Subnet {
    type Err = SubnetParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim();
        let (address, prefix) = raw
            .split_once('/')
            .ok_or_else(|| SubnetParseError::MissingPrefix(raw.to_string()))?;
        let address = address
            .parse::<Ipv4Addr>()
            .map_err(|_| SubnetParseError::InvalidAddress(raw.to_string()))?;
        let prefix_len = prefix
            .parse::<u8>()
            .ok()
            .filter(|len| *len <= 32)
            .ok_or_else(|| SubnetParseError::InvalidPrefix(raw.to_string()))?;
        Ok(Self::new(address, prefix_len))
    }
}

/// A hardware (MAC) address as reported in a discovery reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LinkAddress(pub [u8; 6]);

impl fmt::Display for LinkAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

/// A host that answered a discovery broadcast. Its control service is not verified yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Responder {
    pub address: Ipv4Addr,
    pub link_address: LinkAddress,
}

/// A responder whose control service accepted a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DiscoveredDevice {
    pub address: Ipv4Addr,
    pub port: u16,
}

impl DiscoveredDevice {
    pub fn new(address: Ipv4Addr, port: u16) -> Self {
        Self { address, port }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.address, self.port))
    }

    /// `http://{address}:{port}`, without a trailing slash.
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.address, self.port)
    }
}

impl fmt::Display for DiscoveredDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

/// Which device, if any, commands go to. Replaced wholesale, never patched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionState {
    pub target: Option<DiscoveredDevice>,
}

impl ConnectionState {
    pub fn disconnected() -> Self {
        Self { target: None }
    }

    pub fn connected(device: DiscoveredDevice) -> Self {
        Self {
            target: Some(device),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.target.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_network_zeroes_host_octet() {
        let subnet = Subnet::scan_network_for(Ipv4Addr::new(192, 168, 1, 37));
        assert_eq!(subnet.network(), Ipv4Addr::new(192, 168, 1, 0));
        assert_eq!(subnet.prefix_len(), 24);
        assert_eq!(subnet.to_string(), "192.168.1.0/24");
    }

    #[test]
    fn parses_and_canonicalizes_subnet() {
        let subnet: Subnet = "10.0.7.9/24".parse().expect("parse");
        assert_eq!(subnet, Subnet::new(Ipv4Addr::new(10, 0, 7, 0), 24));
        assert!(matches!(
            "10.0.7.9".parse::<Subnet>(),
            Err(SubnetParseError::MissingPrefix(_))
        ));
        assert!(matches!(
            "10.0.7.9/33".parse::<Subnet>(),
            Err(SubnetParseError::InvalidPrefix(_))
        ));
    }

    #[test]
    fn slash_24_has_254_hosts() {
        let subnet = Subnet::scan_network_for(Ipv4Addr::new(192, 168, 1, 1));
        let hosts: Vec<_> = subnet.hosts().collect();
        assert_eq!(hosts.len(), 254);
        assert_eq!(hosts.first(), Some(&Ipv4Addr::new(192, 168, 1, 1)));
        assert_eq!(hosts.last(), Some(&Ipv4Addr::new(192, 168, 1, 254)));
        assert_eq!(subnet.broadcast(), Ipv4Addr::new(192, 168, 1, 255));
    }

    #[test]
    fn contains_only_same_network() {
        let subnet: Subnet = "192.168.1.0/24".parse().expect("parse");
        assert!(subnet.contains(Ipv4Addr::new(192, 168, 1, 77)));
        assert!(!subnet.contains(Ipv4Addr::new(192, 168, 2, 77)));
    }

    #[test]
    fn device_urls_and_link_address_formatting() {
        let device = DiscoveredDevice::new(Ipv4Addr::new(192, 168, 1, 77), SERVICE_PORT);
        assert_eq!(device.base_url(), "http://192.168.1.77:8060");
        assert_eq!(
            LinkAddress([0xb0, 0xa7, 0x37, 0x01, 0x02, 0xff]).to_string(),
            "b0:a7:37:01:02:ff"
        );
    }

    #[test]
    fn connection_state_defaults_to_disconnected() {
        assert_eq!(ConnectionState::default(), ConnectionState::disconnected());
        assert!(!ConnectionState::default().is_connected());
    }
}
