use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Outcomes that cross the core boundary and are shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// No local interface produced a scannable subnet.
    EnumerationFailed,
    /// The scan finished without verifying any device.
    DeviceNotFound,
    /// A command was requested before any device was verified.
    NotConnected,
    /// The control request failed in transport.
    DispatchFailed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{kind:?}: {message}")]
pub struct RemoteError {
    pub kind: ErrorKind,
    pub message: String,
}

impl RemoteError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Whether a fresh scan is the sensible next step for the user.
    pub fn suggests_rescan(&self) -> bool {
        matches!(self.kind, ErrorKind::DeviceNotFound | ErrorKind::NotConnected)
    }
}
