use super::*;
use std::{
    net::{Ipv4Addr, SocketAddr},
    time::Duration,
};

use anyhow::anyhow;
use async_trait::async_trait;
use link_discovery::InterfaceAddress;
use shared::{
    domain::{DiscoveredDevice, LinkAddress, Responder, Subnet},
    error::ErrorKind,
};
use tokio::sync::Mutex;
use url::Url;

use crate::{scan_task::DiscoveryError, scanner::ProbeFailure};

struct LivingRoom;

impl InterfaceSource for LivingRoom {
    fn ipv4_addresses(&self) -> anyhow::Result<Vec<InterfaceAddress>> {
        Ok(vec![InterfaceAddress {
            interface: "en0".into(),
            address: Ipv4Addr::new(192, 168, 1, 23),
            prefix_len: 24,
        }])
    }
}

struct FixedResponders(Vec<Ipv4Addr>);

#[async_trait]
impl DiscoveryBroadcaster for FixedResponders {
    async fn broadcast(&self, _subnet: Subnet, _timeout: Duration) -> anyhow::Result<Vec<Responder>> {
        Ok(self
            .0
            .iter()
            .map(|address| Responder {
                address: *address,
                link_address: LinkAddress([0xd8, 0x31, 0x34, 0, 0, address.octets()[3]]),
            })
            .collect())
    }
}

struct OnlyAccepts(Ipv4Addr);

#[async_trait]
impl LivenessProbe for OnlyAccepts {
    async fn probe(&self, addr: SocketAddr) -> Result<(), ProbeFailure> {
        if addr.ip() == self.0 {
            Ok(())
        } else {
            Err(ProbeFailure::Io(std::io::ErrorKind::ConnectionRefused.into()))
        }
    }
}

#[derive(Default)]
struct RecordingTransport {
    urls: Mutex<Vec<Url>>,
    fail: bool,
}

#[async_trait]
impl ControlTransport for RecordingTransport {
    async fn post(&self, url: Url) -> anyhow::Result<u16> {
        self.urls.lock().await.push(url);
        if self.fail {
            return Err(anyhow!("network is unreachable"));
        }
        Ok(200)
    }
}

fn controller(transport: Arc<RecordingTransport>) -> Arc<RemoteController> {
    let settings = RemoteSettings {
        activity: ActivitySettings {
            fade_duration: Duration::from_millis(20),
            ..ActivitySettings::default()
        },
        ..RemoteSettings::default()
    };
    RemoteController::new_with_dependencies(
        settings,
        Arc::new(LivingRoom),
        Arc::new(FixedResponders(vec![
            Ipv4Addr::new(192, 168, 1, 50),
            Ipv4Addr::new(192, 168, 1, 77),
        ])),
        Arc::new(OnlyAccepts(Ipv4Addr::new(192, 168, 1, 77))),
        transport,
    )
}

#[tokio::test]
async fn dispatch_before_discovery_is_not_connected() {
    let transport = Arc::new(RecordingTransport::default());
    let remote = controller(transport.clone());
    let mut events = remote.subscribe_events();

    let result = remote.dispatch(Command::Power).await;

    assert!(matches!(result, Err(DispatchError::NotConnected)));
    assert!(transport.urls.lock().await.is_empty());
    match events.recv().await {
        Ok(RemoteEvent::CommandFailed { command, error }) => {
            assert_eq!(command, Command::Power);
            assert_eq!(error.kind, ErrorKind::NotConnected);
            assert!(error.suggests_rescan());
        }
        other => panic!("expected CommandFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn discovers_the_listening_device_then_dispatches_to_it() {
    let transport = Arc::new(RecordingTransport::default());
    let remote = controller(transport.clone());
    assert_eq!(remote.scan_status(), ScanStatus::NotStarted);

    let ticket = remote.discover();
    let status = tokio::time::timeout(Duration::from_secs(2), remote.wait_for_scan(ticket))
        .await
        .expect("scan finished");

    let expected = DiscoveredDevice::new(Ipv4Addr::new(192, 168, 1, 77), 8060);
    assert_eq!(
        status,
        ScanStatus::Completed {
            generation: ticket.generation,
            result: Ok(expected),
        }
    );
    assert_eq!(remote.connection_state(), ConnectionState::connected(expected));

    let ack = remote
        .spawn_dispatch(Command::Home)
        .await
        .expect("dispatch task joined")
        .expect("home acknowledged");
    assert_eq!(ack.device, expected);
    assert_eq!(
        transport.urls.lock().await[0].as_str(),
        "http://192.168.1.77:8060/keypress/home"
    );
}

#[tokio::test]
async fn transport_failure_leaves_connection_in_place() {
    let transport = Arc::new(RecordingTransport {
        fail: true,
        ..RecordingTransport::default()
    });
    let remote = controller(transport.clone());
    let ticket = remote.discover();
    remote.wait_for_scan(ticket).await;
    let before = remote.connection_state();

    let first = remote.dispatch(Command::Select).await;
    let second = remote.dispatch(Command::Select).await;

    assert!(matches!(first, Err(DispatchError::Transport { .. })));
    assert!(matches!(second, Err(DispatchError::Transport { .. })));
    assert_eq!(transport.urls.lock().await.len(), 2);
    assert_eq!(remote.connection_state(), before);
    assert!(before.is_connected());
}

#[tokio::test]
async fn dispatch_attempts_count_as_interaction() {
    let remote = controller(Arc::new(RecordingTransport::default()));
    assert_eq!(remote.activity_intensity(), 0.0);

    let _ = remote.dispatch(Command::Back).await;
    tokio::time::sleep(Duration::from_millis(40)).await;

    assert_eq!(remote.activity_intensity(), 1.0);
    assert_eq!(remote.activity_phase(), ActivityPhase::Active);
}

#[tokio::test]
async fn raw_interaction_raises_intensity() {
    let remote = controller(Arc::new(RecordingTransport::default()));
    let rx = remote.subscribe_activity();

    remote.notify_interaction();
    tokio::time::sleep(Duration::from_millis(40)).await;

    assert_eq!(remote.activity_intensity(), 1.0);
    assert_eq!(*rx.borrow(), 1.0);
}

#[test]
fn surfaced_errors_map_to_error_kinds() {
    assert_eq!(
        RemoteError::from(&DiscoveryError::DeviceNotFound).kind,
        ErrorKind::DeviceNotFound
    );
    assert_eq!(
        RemoteError::from(&DiscoveryError::EnumerationFailed {
            reason: "no interfaces".into()
        })
        .kind,
        ErrorKind::EnumerationFailed
    );
    let transport = DispatchError::Transport {
        device: DiscoveredDevice::new(Ipv4Addr::new(10, 0, 0, 2), 8060),
        command: Command::Up,
        source: anyhow!("timed out"),
    };
    let projected = RemoteError::from(&transport);
    assert_eq!(projected.kind, ErrorKind::DispatchFailed);
    assert!(projected.message.contains("timed out"));
    assert!(!projected.suggests_rescan());
}
