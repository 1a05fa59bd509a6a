//! Discovery, command dispatch and activity feedback for a single network-attached
//! control device.
//!
//! Presentation layers talk to [`RemoteController`]: `discover` starts a background
//! scan, `dispatch` sends one command to the verified device, and
//! `notify_interaction` feeds the activity intensity read back with
//! `activity_intensity`.

use shared::{
    domain::{DiscoveredDevice, Subnet},
    error::{ErrorKind, RemoteError},
    protocol::Command,
};

pub mod activity;
mod controller;
pub mod dispatch;
pub mod scan_task;
pub mod scanner;
pub mod subnet;

pub use activity::{ActivityMonitor, ActivityPhase, ActivitySettings, ActivityStateMachine};
pub use controller::{RemoteController, RemoteSettings};
pub use dispatch::{Ack, CommandDispatcher, DispatchError, DispatchSettings};
pub use scan_task::{DiscoveryError, ScanStatus, ScanTicket};
pub use scanner::{DeviceScanner, ScanSettings};

#[derive(Debug, Clone)]
pub enum RemoteEvent {
    ScanStarted {
        generation: u64,
    },
    ScanningSubnet {
        generation: u64,
        subnet: Subnet,
    },
    DeviceFound {
        generation: u64,
        device: DiscoveredDevice,
    },
    DeviceNotFound {
        generation: u64,
    },
    EnumerationFailed {
        generation: u64,
        reason: String,
    },
    CommandSent {
        command: Command,
        status: u16,
    },
    CommandFailed {
        command: Command,
        error: RemoteError,
    },
}

impl From<&DiscoveryError> for RemoteError {
    fn from(value: &DiscoveryError) -> Self {
        let kind = match value {
            DiscoveryError::EnumerationFailed { .. } => ErrorKind::EnumerationFailed,
            DiscoveryError::DeviceNotFound => ErrorKind::DeviceNotFound,
        };
        RemoteError::new(kind, value.to_string())
    }
}

impl From<&DispatchError> for RemoteError {
    fn from(value: &DispatchError) -> Self {
        let kind = match value {
            DispatchError::NotConnected => ErrorKind::NotConnected,
            DispatchError::InvalidTarget { .. } | DispatchError::Transport { .. } => {
                ErrorKind::DispatchFailed
            }
        };
        RemoteError::new(kind, value.to_string())
    }
}
