use std::sync::Arc;

use anyhow::Result;
use link_discovery::{ArpBroadcaster, DiscoveryBroadcaster, InterfaceSource, SystemInterfaces};
use shared::{domain::ConnectionState, error::RemoteError, protocol::Command};
use tokio::{
    sync::{broadcast, watch},
    task::JoinHandle,
};

use crate::{
    activity::{ActivityMonitor, ActivityPhase, ActivitySettings, InteractionSink},
    dispatch::{
        Ack, CommandDispatcher, ControlTransport, DispatchError, DispatchSettings,
        HttpControlTransport,
    },
    scan_task::{ConnectionSlot, ScanCoordinator, ScanStatus, ScanTicket},
    scanner::{DeviceScanner, LivenessProbe, ScanSettings, TcpLivenessProbe},
    RemoteEvent,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemoteSettings {
    pub scan: ScanSettings,
    pub activity: ActivitySettings,
    pub dispatch: DispatchSettings,
}

/// The API surface presentation layers drive. Nothing here blocks the caller on
/// network I/O: scans run as background tasks and dispatches are futures.
pub struct RemoteController {
    scans: Arc<ScanCoordinator>,
    connection: Arc<ConnectionSlot>,
    dispatcher: CommandDispatcher,
    activity: Arc<ActivityMonitor>,
    events: broadcast::Sender<RemoteEvent>,
}

impl RemoteController {
    /// Wires the real interface listing, ARP sweep, TCP probe and HTTP transport.
    pub fn new(settings: RemoteSettings) -> Result<Arc<Self>> {
        let transport = HttpControlTransport::new(&settings.dispatch)?;
        Ok(Self::new_with_dependencies(
            settings,
            Arc::new(SystemInterfaces),
            Arc::new(ArpBroadcaster),
            Arc::new(TcpLivenessProbe),
            Arc::new(transport),
        ))
    }

    pub fn new_with_dependencies(
        settings: RemoteSettings,
        interfaces: Arc<dyn InterfaceSource>,
        broadcaster: Arc<dyn DiscoveryBroadcaster>,
        probe: Arc<dyn LivenessProbe>,
        transport: Arc<dyn ControlTransport>,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(256);
        let connection = Arc::new(ConnectionSlot::default());
        let activity = ActivityMonitor::new(settings.activity);
        let scanner = Arc::new(DeviceScanner::new(broadcaster, probe));
        let scans = ScanCoordinator::new(
            interfaces,
            scanner,
            settings.scan,
            Arc::clone(&connection),
            events.clone(),
        );
        let dispatcher = CommandDispatcher::new(transport, activity.clone());

        Arc::new(Self {
            scans,
            connection,
            dispatcher,
            activity,
            events,
        })
    }

    pub fn discover(&self) -> ScanTicket {
        self.scans.start()
    }

    pub fn cancel_scan(&self) -> Option<ScanTicket> {
        self.scans.cancel()
    }

    pub fn scan_status(&self) -> ScanStatus {
        self.scans.status()
    }

    pub fn subscribe_scan_status(&self) -> watch::Receiver<ScanStatus> {
        self.scans.subscribe()
    }

    /// Resolves once the scan behind `ticket` has finished, been cancelled, or been
    /// superseded by a newer scan; returns the status at that point.
    pub async fn wait_for_scan(&self, ticket: ScanTicket) -> ScanStatus {
        let mut rx = self.scans.subscribe();
        let settled = rx
            .wait_for(|status| match status {
                ScanStatus::NotStarted => false,
                ScanStatus::Running { generation } => *generation > ticket.generation,
                ScanStatus::Completed { generation, .. } | ScanStatus::Cancelled { generation } => {
                    *generation >= ticket.generation
                }
            })
            .await
            .map(|status| ScanStatus::clone(&status));
        match settled {
            Ok(status) => status,
            Err(_) => self.scans.status(),
        }
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.snapshot()
    }

    pub async fn dispatch(&self, command: Command) -> Result<Ack, DispatchError> {
        let target = self.connection.snapshot();
        let result = self.dispatcher.dispatch(&target, command).await;
        let event = match &result {
            Ok(ack) => RemoteEvent::CommandSent {
                command,
                status: ack.status,
            },
            Err(err) => RemoteEvent::CommandFailed {
                command,
                error: RemoteError::from(err),
            },
        };
        let _ = self.events.send(event);
        result
    }

    /// Runs [`Self::dispatch`] on the runtime; the handle yields its result.
    pub fn spawn_dispatch(
        self: &Arc<Self>,
        command: Command,
    ) -> JoinHandle<Result<Ack, DispatchError>> {
        let controller = Arc::clone(self);
        tokio::spawn(async move { controller.dispatch(command).await })
    }

    pub fn notify_interaction(&self) {
        self.activity.notify_interaction();
    }

    pub fn activity_intensity(&self) -> f64 {
        self.activity.intensity()
    }

    pub fn activity_phase(&self) -> ActivityPhase {
        self.activity.phase()
    }

    pub fn subscribe_activity(&self) -> watch::Receiver<f64> {
        self.activity.subscribe()
    }

    pub fn start_activity_ticker(&self) -> JoinHandle<()> {
        self.activity.spawn_ticker()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<RemoteEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
#[path = "tests/controller_tests.rs"]
mod tests;
