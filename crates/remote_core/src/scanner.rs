use std::{io, net::SocketAddr, sync::Arc, time::Duration};

use async_trait::async_trait;
use link_discovery::DiscoveryBroadcaster;
use shared::domain::{DiscoveredDevice, Responder, Subnet, SERVICE_PORT};
use thiserror::Error;
use tokio::net::TcpStream;
use tracing::{debug, info};

/// Slack granted to a broadcaster past its own timeout before the sweep is abandoned.
const BROADCAST_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanSettings {
    pub service_port: u16,
    pub broadcast_timeout: Duration,
    pub probe_timeout: Duration,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            service_port: SERVICE_PORT,
            broadcast_timeout: Duration::from_secs(3),
            probe_timeout: Duration::from_secs(1),
        }
    }
}

impl ScanSettings {
    /// Upper bound on a full scan given how many responders each subnet produced.
    pub fn worst_case(&self, responders_per_subnet: &[usize]) -> Duration {
        responders_per_subnet
            .iter()
            .map(|responders| {
                self.broadcast_timeout
                    + BROADCAST_GRACE
                    + self.probe_timeout * u32::try_from(*responders).unwrap_or(u32::MAX)
            })
            .sum()
    }
}

/// Why a single responder or subnet dropped out of the scan. Never leaves the scanner.
#[derive(Debug, Error)]
pub enum ProbeFailure {
    #[error("no answer within {0:?}")]
    Timeout(Duration),
    #[error(transparent)]
    Io(#[from] io::Error),
}

#[async_trait]
pub trait LivenessProbe: Send + Sync {
    /// Attempts to reach the control service at `addr`. The scanner bounds the call
    /// with its own probe timeout.
    async fn probe(&self, addr: SocketAddr) -> Result<(), ProbeFailure>;
}

/// A plain TCP connect; the connection is closed as soon as it is established.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpLivenessProbe;

#[async_trait]
impl LivenessProbe for TcpLivenessProbe {
    async fn probe(&self, addr: SocketAddr) -> Result<(), ProbeFailure> {
        let stream = TcpStream::connect(addr).await?;
        drop(stream);
        Ok(())
    }
}

pub struct DeviceScanner {
    broadcaster: Arc<dyn DiscoveryBroadcaster>,
    probe: Arc<dyn LivenessProbe>,
}

impl DeviceScanner {
    pub fn new(broadcaster: Arc<dyn DiscoveryBroadcaster>, probe: Arc<dyn LivenessProbe>) -> Self {
        Self { broadcaster, probe }
    }

    pub async fn discover(
        &self,
        subnets: &[Subnet],
        settings: &ScanSettings,
    ) -> Option<DiscoveredDevice> {
        self.discover_with_progress(subnets, settings, |_| {}).await
    }

    /// Walks `subnets` in order and returns the first responder, in response order,
    /// whose service port accepts a connection. Nothing after it is probed.
    ///
    /// Broadcast and probe failures only end that subnet or responder; they are logged
    /// and never returned. `on_subnet` runs before each subnet's broadcast.
    pub async fn discover_with_progress<F>(
        &self,
        subnets: &[Subnet],
        settings: &ScanSettings,
        mut on_subnet: F,
    ) -> Option<DiscoveredDevice>
    where
        F: FnMut(&Subnet) + Send,
    {
        for subnet in subnets {
            on_subnet(subnet);

            let responders = match self.collect_responders(*subnet, settings).await {
                Ok(responders) => responders,
                Err(failure) => {
                    debug!(%subnet, error = %failure, "scan: broadcast produced no responders");
                    continue;
                }
            };
            debug!(%subnet, responders = responders.len(), "scan: broadcast finished");

            for responder in responders {
                let device = DiscoveredDevice::new(responder.address, settings.service_port);
                match self.verify(device, settings.probe_timeout).await {
                    Ok(()) => {
                        info!(
                            %subnet,
                            device = %device,
                            link_address = %responder.link_address,
                            "scan: device verified"
                        );
                        return Some(device);
                    }
                    Err(failure) => {
                        debug!(device = %device, error = %failure, "scan: liveness probe failed");
                    }
                }
            }
        }

        None
    }

    async fn collect_responders(
        &self,
        subnet: Subnet,
        settings: &ScanSettings,
    ) -> Result<Vec<Responder>, ProbeFailure> {
        let limit = settings.broadcast_timeout + BROADCAST_GRACE;
        match tokio::time::timeout(
            limit,
            self.broadcaster.broadcast(subnet, settings.broadcast_timeout),
        )
        .await
        {
            Ok(Ok(responders)) => Ok(responders),
            Ok(Err(err)) => Err(ProbeFailure::Io(io::Error::other(err.to_string()))),
            Err(_) => Err(ProbeFailure::Timeout(limit)),
        }
    }

    async fn verify(&self, device: DiscoveredDevice, timeout: Duration) -> Result<(), ProbeFailure> {
        match tokio::time::timeout(timeout, self.probe.probe(device.socket_addr())).await {
            Ok(result) => result,
            Err(_) => Err(ProbeFailure::Timeout(timeout)),
        }
    }
}

#[cfg(test)]
#[path = "tests/scanner_tests.rs"]
mod tests;
