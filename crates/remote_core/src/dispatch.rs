use std::{sync::Arc, time::Duration};

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use shared::{
    domain::{ConnectionState, DiscoveredDevice},
    protocol::Command,
};
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use crate::activity::InteractionSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSettings {
    pub request_timeout: Duration,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(5),
        }
    }
}

/// The device took the request. The protocol defines no payload beyond that.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    pub device: DiscoveredDevice,
    pub command: Command,
    pub status: u16,
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("no verified device; run a scan first")]
    NotConnected,
    #[error("cannot build request url for {command} on {device}: {source}")]
    InvalidTarget {
        device: DiscoveredDevice,
        command: Command,
        source: url::ParseError,
    },
    #[error("sending {command} to {device} failed: {source:#}")]
    Transport {
        device: DiscoveredDevice,
        command: Command,
        source: anyhow::Error,
    },
}

#[async_trait]
pub trait ControlTransport: Send + Sync {
    /// Issues one body-less control request and returns the HTTP status.
    async fn post(&self, url: Url) -> anyhow::Result<u16>;
}

pub struct HttpControlTransport {
    http: Client,
}

impl HttpControlTransport {
    pub fn new(settings: &DispatchSettings) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .context("failed to build control http client")?;
        Ok(Self { http })
    }
}

#[async_trait]
impl ControlTransport for HttpControlTransport {
    async fn post(&self, url: Url) -> anyhow::Result<u16> {
        let res = self
            .http
            .post(url.clone())
            .send()
            .await
            .with_context(|| format!("request to {url} failed"))?;
        Ok(res.status().as_u16())
    }
}

/// Sends control requests to the verified device, and only to it.
pub struct CommandDispatcher {
    transport: Arc<dyn ControlTransport>,
    interactions: Arc<dyn InteractionSink>,
}

impl CommandDispatcher {
    pub fn new(transport: Arc<dyn ControlTransport>, interactions: Arc<dyn InteractionSink>) -> Self {
        Self {
            transport,
            interactions,
        }
    }

    /// Every call counts as an interaction, whatever its outcome. With no target the
    /// call fails with [`DispatchError::NotConnected`] before touching the network.
    /// `target` is only read, so a transport failure leaves it usable for a retry.
    pub async fn dispatch(
        &self,
        target: &ConnectionState,
        command: Command,
    ) -> Result<Ack, DispatchError> {
        self.interactions.notify_interaction();

        let Some(device) = target.target else {
            warn!(%command, "dispatch: refused, no verified device");
            return Err(DispatchError::NotConnected);
        };

        let url = command_url(&device, &command).map_err(|source| DispatchError::InvalidTarget {
            device,
            command,
            source,
        })?;

        match self.transport.post(url).await {
            Ok(status) => {
                if (200..300).contains(&status) {
                    info!(%command, %device, status, "dispatch: command sent");
                } else {
                    warn!(%command, %device, status, "dispatch: device answered with non-success status");
                }
                Ok(Ack {
                    device,
                    command,
                    status,
                })
            }
            Err(source) => {
                warn!(%command, %device, error = %source, "dispatch: transport failure");
                Err(DispatchError::Transport {
                    device,
                    command,
                    source,
                })
            }
        }
    }
}

/// `http://{address}:{port}{path}`.
pub fn command_url(device: &DiscoveredDevice, command: &Command) -> Result<Url, url::ParseError> {
    Url::parse(&format!("{}{}", device.base_url(), command.path()))
}

#[cfg(test)]
#[path = "tests/dispatch_tests.rs"]
mod tests;
