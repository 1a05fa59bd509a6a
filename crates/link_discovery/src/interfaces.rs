use std::net::IpAddr;

use pnet::datalink;

use crate::{InterfaceAddress, InterfaceSource};

/// Reads interface addresses from the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemInterfaces;

impl InterfaceSource for SystemInterfaces {
    fn ipv4_addresses(&self) -> anyhow::Result<Vec<InterfaceAddress>> {
        let addresses = datalink::interfaces()
            .into_iter()
            .flat_map(|iface| {
                let name = iface.name.clone();
                iface.ips.into_iter().filter_map(move |network| match network.ip() {
                    IpAddr::V4(address) => Some(InterfaceAddress {
                        interface: name.clone(),
                        address,
                        prefix_len: network.prefix(),
                    }),
                    IpAddr::V6(_) => None,
                })
            })
            .collect::<Vec<_>>();
        tracing::debug!(count = addresses.len(), "listed local ipv4 addresses");
        Ok(addresses)
    }
}
