//! Device handles and descriptors.
//!
//! A device handle is owned by its provider. The session only keeps cheap
//! clones of it and reads its open state; it never closes a device.

use std::fmt;
use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

/// Output report id used for every request.
pub const OUTPUT_REPORT_ID: u8 = 0x00;

/// Stable identity of a physical device for as long as it stays connected.
///
/// For native backends this is the platform device path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    /// Creates a device identity from a path or other stable key.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identity as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for DeviceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Descriptor of a debug probe as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Device identity (platform path).
    pub id: DeviceId,
    /// Serial number string, if the device reports one.
    pub serial: Option<String>,
    /// Manufacturer string.
    pub manufacturer: Option<String>,
    /// Product string.
    pub product: Option<String>,
    /// USB vendor id.
    pub vendor_id: u16,
    /// USB product id.
    pub product_id: u16,
    /// HID usage page of the interface.
    pub usage_page: u16,
    /// HID usage of the interface.
    pub usage: u16,
}

impl DeviceInfo {
    /// Creates a descriptor with only an identity set.
    pub fn new(id: impl Into<DeviceId>) -> Self {
        Self {
            id: id.into(),
            serial: None,
            manufacturer: None,
            product: None,
            vendor_id: 0,
            product_id: 0,
            usage_page: 0,
            usage: 0,
        }
    }

    /// Sets the USB vendor and product ids.
    pub fn with_ids(mut self, vendor_id: u16, product_id: u16) -> Self {
        self.vendor_id = vendor_id;
        self.product_id = product_id;
        self
    }

    /// Sets the product string.
    pub fn with_product(mut self, product: impl Into<String>) -> Self {
        self.product = Some(product.into());
        self
    }

    /// Sets the manufacturer string.
    pub fn with_manufacturer(mut self, manufacturer: impl Into<String>) -> Self {
        self.manufacturer = Some(manufacturer.into());
        self
    }

    /// Sets the serial number.
    pub fn with_serial(mut self, serial: impl Into<String>) -> Self {
        self.serial = Some(serial.into());
        self
    }

    /// Human-readable name, falling back to the vid:pid pair.
    pub fn display_name(&self) -> String {
        match (&self.manufacturer, &self.product) {
            (Some(m), Some(p)) => format!("{} {}", m, p),
            (None, Some(p)) => p.clone(),
            _ => format!("{:04x}:{:04x}", self.vendor_id, self.product_id),
        }
    }
}

/// Device-type filter for a grant request.
///
/// Unset fields match anything. An empty filter list in a request matches
/// every device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceFilter {
    /// USB vendor id.
    pub vendor_id: Option<u16>,
    /// USB product id.
    pub product_id: Option<u16>,
    /// HID usage page of the top-level collection.
    pub usage_page: Option<u16>,
    /// HID usage within `usage_page`.
    pub usage: Option<u16>,
}

impl DeviceFilter {
    /// Filter matching one vendor/product pair.
    pub fn ids(vendor_id: u16, product_id: u16) -> Self {
        Self {
            vendor_id: Some(vendor_id),
            product_id: Some(product_id),
            ..Self::default()
        }
    }

    /// Returns true if `info` satisfies every field set on this filter.
    pub fn matches(&self, info: &DeviceInfo) -> bool {
        self.vendor_id.is_none_or(|v| v == info.vendor_id)
            && self.product_id.is_none_or(|p| p == info.product_id)
            && self.usage_page.is_none_or(|u| u == info.usage_page)
            && self.usage.is_none_or(|u| u == info.usage)
    }

    /// Returns true if `info` passes a filter list (empty list passes all).
    pub fn any_matches(filters: &[DeviceFilter], info: &DeviceInfo) -> bool {
        filters.is_empty() || filters.iter().any(|f| f.matches(info))
    }
}

/// A handle to one granted HID device.
///
/// Clones refer to the same physical device.
pub trait HidDevice: Clone + Send + Sync + 'static {
    /// Descriptor of the device.
    fn info(&self) -> &DeviceInfo;

    /// Identity of the device.
    fn id(&self) -> &DeviceId {
        &self.info().id
    }

    /// Whether the device is currently open.
    fn is_opened(&self) -> bool;

    /// Opens the device for report exchange.
    fn open(&self) -> impl Future<Output = Result<(), ProviderError>> + Send;

    /// Sends one output report. `data` excludes the report id.
    fn send_report(
        &self,
        report_id: u8,
        data: &[u8],
    ) -> impl Future<Output = Result<(), ProviderError>> + Send;

    /// Waits for the next input report.
    ///
    /// Callers bound the wait themselves; this future may stay pending for as
    /// long as the device stays silent.
    fn receive_report(&self) -> impl Future<Output = Result<Vec<u8>, ProviderError>> + Send;

    /// Drops every input report already buffered for the device without
    /// waiting for new ones. Returns how many were dropped.
    fn discard_pending(&self) -> impl Future<Output = Result<usize, ProviderError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe() -> DeviceInfo {
        DeviceInfo::new("/dev/hidraw0")
            .with_ids(0x03eb, 0x2141)
            .with_manufacturer("Atmel Corp.")
            .with_product("EDBG CMSIS-DAP")
    }

    #[test]
    fn test_empty_filter_list_matches_everything() {
        assert!(DeviceFilter::any_matches(&[], &probe()));
        assert!(DeviceFilter::any_matches(&[], &DeviceInfo::new("x")));
    }

    #[test]
    fn test_filter_by_ids() {
        let info = probe();
        assert!(DeviceFilter::ids(0x03eb, 0x2141).matches(&info));
        assert!(!DeviceFilter::ids(0x0d28, 0x0204).matches(&info));
        assert!(DeviceFilter::any_matches(
            &[DeviceFilter::ids(0x0d28, 0x0204), DeviceFilter::ids(0x03eb, 0x2141)],
            &info
        ));
    }

    #[test]
    fn test_default_filter_matches_anything() {
        assert!(DeviceFilter::default().matches(&probe()));
    }

    #[test]
    fn test_display_name() {
        assert_eq!(probe().display_name(), "Atmel Corp. EDBG CMSIS-DAP");
        assert_eq!(
            DeviceInfo::new("p").with_product("CMSIS-DAP").display_name(),
            "CMSIS-DAP"
        );
        assert_eq!(
            DeviceInfo::new("p").with_ids(0x0d28, 0x0204).display_name(),
            "0d28:0204"
        );
    }

    #[test]
    fn test_device_id_conversions() {
        let id = DeviceId::from("/dev/hidraw1");
        assert_eq!(id.as_str(), "/dev/hidraw1");
        assert_eq!(id.to_string(), "/dev/hidraw1");
        assert_eq!(id, DeviceId::new(String::from("/dev/hidraw1")));
    }
}
