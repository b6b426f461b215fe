//! Device session manager.
//!
//! A [`ProbeSession`] owns the device selection for one host session: the list
//! of granted and opened devices, the device currently in use, and the
//! lifecycle signal that tells collaborators the session has ended.
//!
//! Refreshes are serialized. Two overlapping `refresh_devices` calls never
//! interleave provider opens; the second waits for the first to finish and
//! then runs its own grant.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

use crate::capability::CapabilityProbe;
use crate::device::{DeviceInfo, HidDevice};
use crate::error::{ProviderError, Result, SessionError};
use crate::provider::DeviceAccessProvider;
use crate::signal::LifecycleSignal;

/// Unique identifier for a session.
pub type SessionId = Uuid;

/// Default size of one output report, in bytes.
pub const DEFAULT_REPORT_SIZE: usize = 64;

/// Default time to wait for a response report.
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_millis(2000);

/// Tunables for report exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    /// Maximum request length accepted by [`ProbeSession::transact`].
    pub report_size: usize,
    /// How long [`ProbeSession::transact`] waits for the response.
    pub response_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            report_size: DEFAULT_REPORT_SIZE,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
        }
    }
}

pub(super) struct Selection<D> {
    pub(super) devices: Vec<D>,
    pub(super) active: Option<D>,
}

/// Session over a set of user-granted HID debug probes.
pub struct ProbeSession<P: DeviceAccessProvider> {
    id: SessionId,
    provider: P,
    capability: Arc<dyn CapabilityProbe>,
    pub(super) options: SessionOptions,
    pub(super) selection: RwLock<Selection<P::Device>>,
    refresh_lock: Mutex<()>,
    pub(super) exchange_lock: Mutex<()>,
    lifecycle: LifecycleSignal,
}

impl<P: DeviceAccessProvider> ProbeSession<P> {
    /// Creates a session with default options and an empty selection.
    pub fn new(provider: P, capability: impl CapabilityProbe + 'static) -> Self {
        Self::with_options(provider, capability, SessionOptions::default())
    }

    /// Creates a session with explicit options.
    pub fn with_options(
        provider: P,
        capability: impl CapabilityProbe + 'static,
        options: SessionOptions,
    ) -> Self {
        let id = Uuid::new_v4();
        debug!(session_id = %id, "Created probe session");

        Self {
            id,
            provider,
            capability: Arc::new(capability),
            options,
            selection: RwLock::new(Selection {
                devices: Vec::new(),
                active: None,
            }),
            refresh_lock: Mutex::new(()),
            exchange_lock: Mutex::new(()),
            lifecycle: LifecycleSignal::new(),
        }
    }

    /// Unique identifier of this session.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// The provider this session draws devices from.
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Options in effect for report exchange.
    pub fn options(&self) -> SessionOptions {
        self.options
    }

    /// Whether the host exposes HID device access.
    pub fn is_available(&self) -> bool {
        self.capability.is_available()
    }

    /// Requests a fresh grant and opens every granted device.
    ///
    /// Must be called from within a user-initiated action when the provider
    /// gates grants on one; the session cannot check this.
    ///
    /// The grant is always requested unfiltered. On success the selection is
    /// replaced by the granted devices in grant order. On failure the
    /// selection is left untouched, though devices opened before a failing
    /// one stay open.
    ///
    /// # Errors
    /// * [`SessionError::CapabilityUnavailable`] if HID access is missing.
    /// * [`SessionError::GrantDenied`] if the user declined or nothing was
    ///   granted.
    /// * [`SessionError::OpenFailed`] with the batch index of the device that
    ///   failed to open.
    /// * [`SessionError::Provider`] if the grant request itself failed.
    pub async fn refresh_devices(&self) -> Result<()> {
        if !self.capability.is_available() {
            return Err(SessionError::CapabilityUnavailable);
        }

        let _refresh = self.refresh_lock.lock().await;

        let granted = match self.provider.request_grant(&[]).await {
            Ok(devices) if devices.is_empty() => return Err(SessionError::GrantDenied),
            Ok(devices) => devices,
            Err(ProviderError::Denied) => return Err(SessionError::GrantDenied),
            Err(e) => return Err(SessionError::Provider(e)),
        };

        debug!(session_id = %self.id, granted = granted.len(), "Grant received");

        for (index, device) in granted.iter().enumerate() {
            if device.is_opened() {
                continue;
            }

            device
                .open()
                .await
                .map_err(|source| SessionError::OpenFailed {
                    index,
                    device: device.id().clone(),
                    source,
                })?;

            debug!(session_id = %self.id, index, device = %device.id(), "Opened device");
        }

        let count = granted.len();
        self.selection.write().await.devices = granted;

        info!(session_id = %self.id, devices = count, "Device selection replaced");
        Ok(())
    }

    /// Snapshot of the current selection, in grant order.
    pub async fn devices(&self) -> Vec<P::Device> {
        self.selection.read().await.devices.clone()
    }

    /// Descriptors of the current selection, in grant order.
    pub async fn debuggers(&self) -> Vec<DeviceInfo> {
        self.selection
            .read()
            .await
            .devices
            .iter()
            .map(|d| d.info().clone())
            .collect()
    }

    /// The device currently used for report exchange.
    ///
    /// Always `None` once the session has been closed.
    pub async fn active(&self) -> Option<P::Device> {
        if self.lifecycle.is_fired() {
            return None;
        }
        self.selection.read().await.active.clone()
    }

    /// Makes `device` the active device.
    pub async fn set_active(&self, device: P::Device) {
        debug!(session_id = %self.id, device = %device.id(), "Active device set");
        self.selection.write().await.active = Some(device);
    }

    /// Makes the device at `index` of the selection active and returns it.
    pub async fn select(&self, index: usize) -> Result<P::Device> {
        let mut selection = self.selection.write().await;
        let device = selection
            .devices
            .get(index)
            .cloned()
            .ok_or(SessionError::NoSuchDevice {
                index,
                len: selection.devices.len(),
            })?;

        debug!(session_id = %self.id, index, device = %device.id(), "Active device selected");
        selection.active = Some(device.clone());
        Ok(device)
    }

    /// Makes the first device of the selection active.
    pub async fn select_first(&self) -> Result<P::Device> {
        self.select(0).await
    }

    /// Clears the active device.
    pub async fn clear_active(&self) {
        self.selection.write().await.active = None;
    }

    /// Ends the session.
    ///
    /// Fires the lifecycle signal on the first call; later calls do nothing.
    /// Never fails.
    pub fn close_session(&self) {
        if self.lifecycle.fire() {
            info!(session_id = %self.id, "Session closed");
        }
    }

    /// Whether [`close_session`](Self::close_session) has been called.
    pub fn is_closed(&self) -> bool {
        self.lifecycle.is_fired()
    }

    /// Resolves once the session has ended; immediately if it already has.
    ///
    /// The returned future does not borrow the session.
    pub fn session_ended(&self) -> impl std::future::Future<Output = ()> + Send + 'static {
        self.lifecycle.wait_owned()
    }

    /// Shared handle to the lifecycle signal, for collaborators that outlive
    /// a borrow of the session.
    pub fn lifecycle(&self) -> LifecycleSignal {
        self.lifecycle.clone()
    }
}

impl<P: DeviceAccessProvider> std::fmt::Debug for ProbeSession<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProbeSession")
            .field("id", &self.id)
            .field("options", &self.options)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
