//! Device access providers.
//!
//! A provider is the platform subsystem that asks the user for permission,
//! hands out device handles and performs raw report I/O. The session only
//! talks to it through [`DeviceAccessProvider`] and [`HidDevice`].
//!
//! [`HidDevice`]: crate::device::HidDevice

#[cfg(feature = "hidapi")]
pub mod hidapi;
pub mod memory;

use std::future::Future;

use crate::device::{DeviceFilter, HidDevice};
use crate::error::ProviderError;

#[cfg(feature = "hidapi")]
pub use self::hidapi::{HidApiDevice, HidApiProvider};
pub use memory::{JournalEntry, MemoryDevice, MemoryProvider};

/// Source of permitted HID devices.
pub trait DeviceAccessProvider: Send + Sync {
    /// Handle type for granted devices.
    type Device: HidDevice;

    /// Asks for permission to use devices matching `filters`.
    ///
    /// An empty filter list requests every device type. Returns the devices
    /// the user approved, in grant order. A declined request yields either
    /// [`ProviderError::Denied`] or an empty list.
    fn request_grant(
        &self,
        filters: &[DeviceFilter],
    ) -> impl Future<Output = Result<Vec<Self::Device>, ProviderError>> + Send;
}
