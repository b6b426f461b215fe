//! Native provider backed by the `hidapi` library.
//!
//! Native hosts have no browser-style chooser, so the grant is the set of
//! currently attached devices that pass both the request filters and the
//! operator allow-list configured on the provider. An empty allow-list
//! approves every device.
//!
//! All hidapi calls block, so they run on the blocking thread pool.

use std::ffi::CString;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use ::hidapi::{HidApi, HidDevice as RawDevice, HidError};
use tokio::task;
use tracing::debug;

use super::DeviceAccessProvider;
use crate::capability::CapabilityProbe;
use crate::device::{DeviceFilter, DeviceId, DeviceInfo, HidDevice};
use crate::error::ProviderError;

/// Poll interval for a single blocking read.
const READ_POLL_MS: i32 = 50;

/// Size of the input buffer handed to hidapi.
const MAX_INPUT_REPORT: usize = 1024;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn io_error(err: HidError) -> ProviderError {
    ProviderError::Io(err.to_string())
}

async fn blocking<T, F>(f: F) -> Result<T, ProviderError>
where
    F: FnOnce() -> Result<T, ProviderError> + Send + 'static,
    T: Send + 'static,
{
    task::spawn_blocking(f)
        .await
        .map_err(|e| ProviderError::Io(format!("blocking task failed: {e}")))?
}

/// Provider for devices reachable through the host's hidapi backend.
#[derive(Clone)]
pub struct HidApiProvider {
    api: Option<Arc<Mutex<HidApi>>>,
    allow: Vec<DeviceFilter>,
    report_size: usize,
}

impl HidApiProvider {
    /// Initialises hidapi.
    ///
    /// A failed initialisation is not an error here; the provider then reports
    /// itself as unavailable through [`CapabilityProbe`].
    pub fn new(report_size: usize) -> Self {
        let api = match HidApi::new() {
            Ok(api) => Some(Arc::new(Mutex::new(api))),
            Err(e) => {
                debug!(error = %e, "hidapi initialisation failed");
                None
            }
        };
        Self {
            api,
            allow: Vec::new(),
            report_size,
        }
    }

    /// Restricts grants to devices matching one of `filters`.
    pub fn with_allow_list(mut self, filters: Vec<DeviceFilter>) -> Self {
        self.allow = filters;
        self
    }
}

impl CapabilityProbe for HidApiProvider {
    fn is_available(&self) -> bool {
        self.api.is_some()
    }
}

impl DeviceAccessProvider for HidApiProvider {
    type Device = HidApiDevice;

    async fn request_grant(
        &self,
        filters: &[DeviceFilter],
    ) -> Result<Vec<HidApiDevice>, ProviderError> {
        let Some(api) = self.api.clone() else {
            return Err(ProviderError::Io("hidapi is not initialised".to_string()));
        };

        let filters = filters.to_vec();
        let allow = self.allow.clone();
        let report_size = self.report_size;

        blocking(move || {
            let mut api_guard = lock(&api);
            api_guard.refresh_devices().map_err(io_error)?;

            let mut seen = Vec::new();
            let mut devices = Vec::new();
            for raw in api_guard.device_list() {
                let path = raw.path().to_owned();
                let info = DeviceInfo {
                    id: DeviceId::new(path.to_string_lossy().into_owned()),
                    serial: raw.serial_number().map(str::to_owned),
                    manufacturer: raw.manufacturer_string().map(str::to_owned),
                    product: raw.product_string().map(str::to_owned),
                    vendor_id: raw.vendor_id(),
                    product_id: raw.product_id(),
                    usage_page: raw.usage_page(),
                    usage: raw.usage(),
                };

                if !DeviceFilter::any_matches(&filters, &info)
                    || !DeviceFilter::any_matches(&allow, &info)
                    || seen.contains(&info.id)
                {
                    continue;
                }

                seen.push(info.id.clone());
                devices.push(HidApiDevice {
                    inner: Arc::new(DeviceInner {
                        info,
                        path,
                        api: Arc::clone(&api),
                        handle: Mutex::new(None),
                        opened: AtomicBool::new(false),
                        report_size,
                    }),
                });
            }
            Ok(devices)
        })
        .await
    }
}

struct DeviceInner {
    info: DeviceInfo,
    path: CString,
    api: Arc<Mutex<HidApi>>,
    handle: Mutex<Option<RawDevice>>,
    opened: AtomicBool,
    report_size: usize,
}

/// Handle to a device enumerated by [`HidApiProvider`].
#[derive(Clone)]
pub struct HidApiDevice {
    inner: Arc<DeviceInner>,
}

impl std::fmt::Debug for HidApiDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HidApiDevice")
            .field("info", &self.inner.info)
            .field("opened", &self.is_opened())
            .finish()
    }
}

impl HidDevice for HidApiDevice {
    fn info(&self) -> &DeviceInfo {
        &self.inner.info
    }

    fn is_opened(&self) -> bool {
        self.inner.opened.load(Ordering::SeqCst)
    }

    async fn open(&self) -> Result<(), ProviderError> {
        let inner = Arc::clone(&self.inner);
        blocking(move || {
            let raw = lock(&inner.api)
                .open_path(&inner.path)
                .map_err(|e| ProviderError::OpenFailed(e.to_string()))?;
            *lock(&inner.handle) = Some(raw);
            inner.opened.store(true, Ordering::SeqCst);
            Ok(())
        })
        .await
    }

    async fn send_report(&self, report_id: u8, data: &[u8]) -> Result<(), ProviderError> {
        // hidapi expects the report id in front; pad to a full report.
        let mut report = vec![0u8; self.inner.report_size.max(data.len()) + 1];
        report[0] = report_id;
        report[1..=data.len()].copy_from_slice(data);

        let inner = Arc::clone(&self.inner);
        blocking(move || {
            let handle = lock(&inner.handle);
            let raw = handle
                .as_ref()
                .ok_or_else(|| ProviderError::NotOpen(inner.info.id.clone()))?;
            raw.write(&report).map_err(io_error)?;
            Ok(())
        })
        .await
    }

    async fn receive_report(&self) -> Result<Vec<u8>, ProviderError> {
        // Short blocking reads keep a dropped caller from pinning a pool
        // thread for longer than one poll interval.
        loop {
            let inner = Arc::clone(&self.inner);
            let report = blocking(move || {
                let handle = lock(&inner.handle);
                let raw = handle
                    .as_ref()
                    .ok_or_else(|| ProviderError::NotOpen(inner.info.id.clone()))?;
                let mut buf = vec![0u8; MAX_INPUT_REPORT];
                let n = raw.read_timeout(&mut buf, READ_POLL_MS).map_err(io_error)?;
                buf.truncate(n);
                Ok(buf)
            })
            .await?;

            if !report.is_empty() {
                return Ok(report);
            }
        }
    }

    async fn discard_pending(&self) -> Result<usize, ProviderError> {
        let inner = Arc::clone(&self.inner);
        blocking(move || {
            let handle = lock(&inner.handle);
            let raw = handle
                .as_ref()
                .ok_or_else(|| ProviderError::NotOpen(inner.info.id.clone()))?;
            let mut buf = vec![0u8; MAX_INPUT_REPORT];
            let mut dropped = 0;
            // A zero timeout returns 0 once the kernel buffer is empty.
            while raw.read_timeout(&mut buf, 0).map_err(io_error)? > 0 {
                dropped += 1;
            }
            Ok(dropped)
        })
        .await
    }
}
