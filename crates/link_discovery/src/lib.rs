//! Link-layer seams used by the device scanner: local interface listing and the
//! per-subnet discovery broadcast.

use std::{net::Ipv4Addr, time::Duration};

use async_trait::async_trait;
use shared::domain::{Responder, Subnet};
use thiserror::Error;

mod arp;
mod interfaces;

pub use arp::ArpBroadcaster;
pub use interfaces::SystemInterfaces;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceAddress {
    pub interface: String,
    pub address: Ipv4Addr,
    pub prefix_len: u8,
}

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("no local interface is attached to {subnet}")]
    NoInterfaceForSubnet { subnet: Subnet },
    #[error("interface {interface} has no hardware address")]
    MissingHardwareAddress { interface: String },
    #[error("interface {interface} does not provide an ethernet channel")]
    UnsupportedChannel { interface: String },
    #[error("failed to open datalink channel on {interface}: {source}")]
    Channel {
        interface: String,
        source: std::io::Error,
    },
    #[error("failed to send discovery frame on {interface}: {source}")]
    Send {
        interface: String,
        source: std::io::Error,
    },
    #[error("discovery worker stopped unexpectedly: {0}")]
    Worker(String),
}

pub trait InterfaceSource: Send + Sync {
    /// IPv4 addresses bound to local interfaces, in the order the OS reports them.
    fn ipv4_addresses(&self) -> anyhow::Result<Vec<InterfaceAddress>>;
}

#[async_trait]
pub trait DiscoveryBroadcaster: Send + Sync {
    /// Sends one discovery broadcast into `subnet` and returns every responder heard
    /// within `timeout`, in arrival order.
    async fn broadcast(&self, subnet: Subnet, timeout: Duration) -> anyhow::Result<Vec<Responder>>;
}
