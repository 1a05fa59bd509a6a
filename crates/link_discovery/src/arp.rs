use std::{
    collections::HashSet,
    io,
    net::{IpAddr, Ipv4Addr},
    time::{Duration, Instant},
};

use async_trait::async_trait;
use pnet::{
    datalink::{self, Channel, MacAddr, NetworkInterface},
    packet::{
        arp::{ArpHardwareTypes, ArpOperations, ArpPacket, MutableArpPacket},
        ethernet::{EtherTypes, EthernetPacket, MutableEthernetPacket},
        MutablePacket, Packet,
    },
};
use shared::domain::{LinkAddress, Responder, Subnet};
use tracing::{debug, warn};

use crate::{DiscoveryBroadcaster, LinkError};

const ETHERNET_HEADER_LEN: usize = 14;
const ARP_PACKET_LEN: usize = 28;
const FRAME_LEN: usize = ETHERNET_HEADER_LEN + ARP_PACKET_LEN;
const READ_POLL: Duration = Duration::from_millis(100);

/// ARP who-has sweep over every host of a subnet, sent as link-layer broadcasts.
///
/// Needs raw-socket privileges; without them opening the channel fails and the
/// subnet is reported as silent by the scanner.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArpBroadcaster;

#[async_trait]
impl DiscoveryBroadcaster for ArpBroadcaster {
    async fn broadcast(&self, subnet: Subnet, timeout: Duration) -> anyhow::Result<Vec<Responder>> {
        let responders = tokio::task::spawn_blocking(move || sweep(subnet, timeout))
            .await
            .map_err(|err| LinkError::Worker(err.to_string()))??;
        Ok(responders)
    }
}

struct LocalEndpoint {
    interface: NetworkInterface,
    mac: MacAddr,
    address: Ipv4Addr,
}

fn endpoint_for(subnet: Subnet) -> Result<LocalEndpoint, LinkError> {
    let (interface, address) = datalink::interfaces()
        .into_iter()
        .filter(|iface| iface.is_up() && !iface.is_loopback())
        .find_map(|iface| {
            let address = iface.ips.iter().find_map(|network| match network.ip() {
                IpAddr::V4(address) if subnet.contains(address) => Some(address),
                _ => None,
            })?;
            Some((iface, address))
        })
        .ok_or(LinkError::NoInterfaceForSubnet { subnet })?;

    let mac = interface
        .mac
        .ok_or_else(|| LinkError::MissingHardwareAddress {
            interface: interface.name.clone(),
        })?;

    Ok(LocalEndpoint {
        interface,
        mac,
        address,
    })
}

fn sweep(subnet: Subnet, timeout: Duration) -> Result<Vec<Responder>, LinkError> {
    let endpoint = endpoint_for(subnet)?;
    let name = endpoint.interface.name.clone();
    let config = datalink::Config {
        read_timeout: Some(READ_POLL),
        ..Default::default()
    };

    let (mut tx, mut rx) = match datalink::channel(&endpoint.interface, config) {
        Ok(Channel::Ethernet(tx, rx)) => (tx, rx),
        Ok(_) => return Err(LinkError::UnsupportedChannel { interface: name }),
        Err(source) => {
            return Err(LinkError::Channel {
                interface: name,
                source,
            })
        }
    };

    for target in subnet.hosts().filter(|host| *host != endpoint.address) {
        let frame = build_request(endpoint.mac, endpoint.address, target);
        if let Some(Err(source)) = tx.send_to(&frame, None) {
            return Err(LinkError::Send {
                interface: name,
                source,
            });
        }
    }
    debug!(%subnet, interface = %name, "arp sweep sent");

    let deadline = Instant::now() + timeout;
    let mut seen = HashSet::new();
    let mut responders = Vec::new();
    while Instant::now() < deadline {
        match rx.next() {
            Ok(frame) => {
                if let Some(responder) = parse_reply(frame, subnet) {
                    if seen.insert(responder.address) {
                        responders.push(responder);
                    }
                }
            }
            Err(err) if matches!(err.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => {}
            Err(err) => {
                warn!(%subnet, interface = %name, error = %err, "arp receive failed; ending sweep early");
                break;
            }
        }
    }

    Ok(responders)
}

fn build_request(source_mac: MacAddr, source_ip: Ipv4Addr, target_ip: Ipv4Addr) -> [u8; FRAME_LEN] {
    let mut buffer = [0u8; FRAME_LEN];
    if let Some(mut ethernet) = MutableEthernetPacket::new(&mut buffer) {
        ethernet.set_destination(MacAddr::broadcast());
        ethernet.set_source(source_mac);
        ethernet.set_ethertype(EtherTypes::Arp);

        if let Some(mut arp) = MutableArpPacket::new(ethernet.payload_mut()) {
            arp.set_hardware_type(ArpHardwareTypes::Ethernet);
            arp.set_protocol_type(EtherTypes::Ipv4);
            arp.set_hw_addr_len(6);
            arp.set_proto_addr_len(4);
            arp.set_operation(ArpOperations::Request);
            arp.set_sender_hw_addr(source_mac);
            arp.set_sender_proto_addr(source_ip);
            arp.set_target_hw_addr(MacAddr::zero());
            arp.set_target_proto_addr(target_ip);
        }
    }
    buffer
}

fn parse_reply(frame: &[u8], subnet: Subnet) -> Option<Responder> {
    let ethernet = EthernetPacket::new(frame)?;
    if ethernet.get_ethertype() != EtherTypes::Arp {
        return None;
    }
    let arp = ArpPacket::new(ethernet.payload())?;
    if arp.get_operation() != ArpOperations::Reply {
        return None;
    }
    let address = arp.get_sender_proto_addr();
    if !subnet.contains(address) {
        return None;
    }
    let MacAddr(a, b, c, d, e, f) = arp.get_sender_hw_addr();
    Some(Responder {
        address,
        link_address: LinkAddress([a, b, c, d, e, f]),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply_frame(sender_mac: MacAddr, sender_ip: Ipv4Addr) -> [u8; FRAME_LEN] {
        let mut frame = build_request(sender_mac, sender_ip, Ipv4Addr::new(192, 168, 1, 10));
        {
            let mut ethernet = MutableEthernetPacket::new(&mut frame).expect("ethernet");
            let mut arp = MutableArpPacket::new(ethernet.payload_mut()).expect("arp");
            arp.set_operation(ArpOperations::Reply);
        }
        frame
    }

    #[test]
    fn request_is_broadcast_who_has() {
        let mac = MacAddr::new(0x02, 0, 0, 0, 0, 0x01);
        let frame = build_request(
            mac,
            Ipv4Addr::new(192, 168, 1, 10),
            Ipv4Addr::new(192, 168, 1, 77),
        );

        let ethernet = EthernetPacket::new(&frame).expect("ethernet");
        assert_eq!(ethernet.get_destination(), MacAddr::broadcast());
        assert_eq!(ethernet.get_ethertype(), EtherTypes::Arp);

        let arp = ArpPacket::new(ethernet.payload()).expect("arp");
        assert_eq!(arp.get_operation(), ArpOperations::Request);
        assert_eq!(arp.get_sender_hw_addr(), mac);
        assert_eq!(arp.get_target_proto_addr(), Ipv4Addr::new(192, 168, 1, 77));
    }

    #[test]
    fn reply_inside_subnet_becomes_responder() {
        let subnet: Subnet = "192.168.1.0/24".parse().expect("subnet");
        let frame = reply_frame(
            MacAddr::new(0xb0, 0xa7, 0x37, 1, 2, 3),
            Ipv4Addr::new(192, 168, 1, 77),
        );

        let responder = parse_reply(&frame, subnet).expect("responder");
        assert_eq!(responder.address, Ipv4Addr::new(192, 168, 1, 77));
        assert_eq!(responder.link_address, LinkAddress([0xb0, 0xa7, 0x37, 1, 2, 3]));
    }

    #[test]
    fn requests_and_foreign_replies_are_ignored() {
        let subnet: Subnet = "192.168.1.0/24".parse().expect("subnet");
        let mac = MacAddr::new(0x02, 0, 0, 0, 0, 0x09);

        let request = build_request(mac, Ipv4Addr::new(192, 168, 1, 5), Ipv4Addr::new(192, 168, 1, 6));
        assert!(parse_reply(&request, subnet).is_none());

        let foreign = reply_frame(mac, Ipv4Addr::new(10, 0, 0, 5));
        assert!(parse_reply(&foreign, subnet).is_none());

        assert!(parse_reply(&[0u8; 4], subnet).is_none());
    }
}
