//! Error types for the hidlink crate.

use std::time::Duration;

use thiserror::Error;

use crate::device::DeviceId;

/// Failures reported by a device access provider.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    /// The user declined the permission request.
    #[error("permission grant denied")]
    Denied,

    /// The device is no longer present.
    #[error("device not found: {0}")]
    NotFound(DeviceId),

    /// The device was found but could not be opened.
    #[error("failed to open device: {0}")]
    OpenFailed(String),

    /// A report was exchanged with a device that is not open.
    #[error("device is not open: {0}")]
    NotOpen(DeviceId),

    /// The device was unplugged while in use.
    #[error("device disconnected: {0}")]
    Disconnected(DeviceId),

    /// Any other failure of the underlying HID subsystem.
    #[error("HID I/O error: {0}")]
    Io(String),
}

/// Errors returned by [`ProbeSession`](crate::ProbeSession) operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The host does not expose HID device access.
    #[error("HID device access is not available in this environment")]
    CapabilityUnavailable,

    /// The user declined the grant or no device matched.
    #[error("no device was granted")]
    GrantDenied,

    /// A granted device failed to open.
    ///
    /// Devices earlier in the same batch remain open.
    #[error("failed to open device {index} ({device}): {source}")]
    OpenFailed {
        /// Position of the failing device in the granted batch.
        index: usize,
        /// Identity of the failing device.
        device: DeviceId,
        /// Underlying provider failure.
        #[source]
        source: ProviderError,
    },

    /// No device has been made active for report exchange.
    #[error("no active device")]
    NoActiveDevice,

    /// An index outside the current selection was requested.
    #[error("no device at index {index} (selection holds {len})")]
    NoSuchDevice {
        /// Requested index.
        index: usize,
        /// Number of devices in the selection.
        len: usize,
    },

    /// The request does not fit in one output report.
    #[error("request of {size} bytes exceeds report size of {max} bytes")]
    RequestTooLarge {
        /// Request length in bytes.
        size: usize,
        /// Configured report size.
        max: usize,
    },

    /// The device did not answer within the response timeout.
    #[error("device did not respond within {0:?}")]
    ResponseTimeout(Duration),

    /// The provider failed outside of the grant and open steps.
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// Result type alias for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;
