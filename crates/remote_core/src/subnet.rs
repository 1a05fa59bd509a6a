use std::{collections::BTreeSet, net::Ipv4Addr};

use link_discovery::InterfaceSource;
use shared::domain::Subnet;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EnumerationError {
    #[error("failed to list local interfaces: {0}")]
    InterfaceQuery(#[source] anyhow::Error),
    #[error("no local interface has a scannable ipv4 address")]
    NoUsableAddress,
}

/// Derives the deduplicated /24 networks to scan, ordered by network address.
pub fn enumerate_subnets(source: &dyn InterfaceSource) -> Result<Vec<Subnet>, EnumerationError> {
    let addresses = source
        .ipv4_addresses()
        .map_err(EnumerationError::InterfaceQuery)?;

    let subnets = addresses
        .iter()
        .filter(|entry| is_scannable(entry.address))
        .map(|entry| Subnet::scan_network_for(entry.address))
        .collect::<BTreeSet<_>>();

    if subnets.is_empty() {
        return Err(EnumerationError::NoUsableAddress);
    }

    tracing::debug!(count = subnets.len(), "derived scan subnets");
    Ok(subnets.into_iter().collect())
}

fn is_scannable(address: Ipv4Addr) -> bool {
    !(address.is_loopback() || address.is_unspecified() || address.is_link_local())
}
