//! Background discovery with a single authoritative [`ConnectionState`].
//!
//! Each scan gets a generation number when it starts. Only the newest generation may
//! publish: a scan that finishes after a newer one was started has its result dropped.

use std::sync::{Arc, Mutex, PoisonError, RwLock};

use link_discovery::InterfaceSource;
use shared::domain::{ConnectionState, DiscoveredDevice, Subnet};
use thiserror::Error;
use tokio::{
    sync::{broadcast, watch},
    task::AbortHandle,
};
use tracing::{debug, info, warn};

use crate::{
    scanner::{DeviceScanner, ScanSettings},
    subnet::enumerate_subnets,
    RemoteEvent,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiscoveryError {
    #[error("could not determine local subnets: {reason}")]
    EnumerationFailed { reason: String },
    #[error("no device answered on the control port")]
    DeviceNotFound,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanStatus {
    NotStarted,
    Running {
        generation: u64,
    },
    Completed {
        generation: u64,
        result: Result<DiscoveredDevice, DiscoveryError>,
    },
    Cancelled {
        generation: u64,
    },
}

impl ScanStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, ScanStatus::Running { .. })
    }
}

/// Identifies one started scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanTicket {
    pub generation: u64,
}

/// The one slot holding the current target. Reads see whole values only.
#[derive(Debug, Default)]
pub struct ConnectionSlot {
    state: RwLock<ConnectionState>,
}

impl ConnectionSlot {
    pub fn snapshot(&self) -> ConnectionState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn replace(&self, next: ConnectionState) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = next;
    }
}

struct Generations {
    latest: u64,
    running: Option<AbortHandle>,
}

pub struct ScanCoordinator {
    interfaces: Arc<dyn InterfaceSource>,
    scanner: Arc<DeviceScanner>,
    settings: ScanSettings,
    connection: Arc<ConnectionSlot>,
    generations: Mutex<Generations>,
    status_tx: watch::Sender<ScanStatus>,
    events: broadcast::Sender<RemoteEvent>,
}

impl ScanCoordinator {
    pub fn new(
        interfaces: Arc<dyn InterfaceSource>,
        scanner: Arc<DeviceScanner>,
        settings: ScanSettings,
        connection: Arc<ConnectionSlot>,
        events: broadcast::Sender<RemoteEvent>,
    ) -> Arc<Self> {
        let (status_tx, _) = watch::channel(ScanStatus::NotStarted);
        Arc::new(Self {
            interfaces,
            scanner,
            settings,
            connection,
            generations: Mutex::new(Generations {
                latest: 0,
                running: None,
            }),
            status_tx,
            events,
        })
    }

    pub fn status(&self) -> ScanStatus {
        self.status_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ScanStatus> {
        self.status_tx.subscribe()
    }

    /// Starts a scan on the runtime and returns immediately. Any scan still running
    /// keeps going, but its result will be discarded.
    pub fn start(self: &Arc<Self>) -> ScanTicket {
        let mut generations = self.lock_generations();
        generations.latest += 1;
        let generation = generations.latest;

        self.status_tx.send_replace(ScanStatus::Running { generation });
        let _ = self.events.send(RemoteEvent::ScanStarted { generation });
        info!(generation, "scan: started");

        let coordinator = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let result = coordinator.run(generation).await;
            coordinator.finish(generation, result);
        });
        generations.running = Some(handle.abort_handle());

        ScanTicket { generation }
    }

    /// Invalidates and aborts the running scan, if any.
    pub fn cancel(&self) -> Option<ScanTicket> {
        let mut generations = self.lock_generations();
        let running = generations.running.take()?;
        let generation = generations.latest;
        generations.latest += 1;
        running.abort();
        self.status_tx
            .send_replace(ScanStatus::Cancelled { generation });
        info!(generation, "scan: cancelled");
        Some(ScanTicket { generation })
    }

    async fn run(&self, generation: u64) -> Result<DiscoveredDevice, DiscoveryError> {
        let subnets = enumerate_subnets(self.interfaces.as_ref()).map_err(|err| {
            DiscoveryError::EnumerationFailed {
                reason: err.to_string(),
            }
        })?;

        let events = self.events.clone();
        self.scanner
            .discover_with_progress(&subnets, &self.settings, |subnet: &Subnet| {
                debug!(generation, %subnet, "scan: probing subnet");
                let _ = events.send(RemoteEvent::ScanningSubnet {
                    generation,
                    subnet: *subnet,
                });
            })
            .await
            .ok_or(DiscoveryError::DeviceNotFound)
    }

    fn finish(&self, generation: u64, result: Result<DiscoveredDevice, DiscoveryError>) {
        let mut generations = self.lock_generations();
        if generations.latest != generation {
            debug!(
                generation,
                latest = generations.latest,
                "scan: discarding result of superseded scan"
            );
            return;
        }
        generations.running = None;

        let event = match &result {
            Ok(device) => {
                self.connection.replace(ConnectionState::connected(*device));
                info!(generation, %device, "scan: device found");
                RemoteEvent::DeviceFound {
                    generation,
                    device: *device,
                }
            }
            Err(DiscoveryError::DeviceNotFound) => {
                info!(generation, "scan: no device found");
                RemoteEvent::DeviceNotFound { generation }
            }
            Err(DiscoveryError::EnumerationFailed { reason }) => {
                warn!(generation, %reason, "scan: subnet enumeration failed");
                RemoteEvent::EnumerationFailed {
                    generation,
                    reason: reason.clone(),
                }
            }
        };

        self.status_tx
            .send_replace(ScanStatus::Completed { generation, result });
        let _ = self.events.send(event);
    }

    fn lock_generations(&self) -> std::sync::MutexGuard<'_, Generations> {
        self.generations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
#[path = "tests/scan_task_tests.rs"]
mod tests;
