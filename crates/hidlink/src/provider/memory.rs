//! In-process device provider.
//!
//! `MemoryProvider` plays back scripted grant results and hands out
//! `MemoryDevice` handles whose open and report behaviour can be steered from
//! the outside. Every provider call is recorded in a shared journal so callers
//! can check the exact order in which a session drove the provider.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;

use super::DeviceAccessProvider;
use crate::device::{DeviceFilter, DeviceId, DeviceInfo, HidDevice};
use crate::error::ProviderError;

/// One recorded provider interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JournalEntry {
    /// A grant was requested with these filters.
    GrantRequested(Vec<DeviceFilter>),
    /// An open call started.
    OpenStarted(DeviceId),
    /// An open call completed successfully.
    Opened(DeviceId),
    /// An open call failed.
    OpenFailed(DeviceId),
    /// An output report was written.
    ReportSent {
        device: DeviceId,
        report_id: u8,
        data: Vec<u8>,
    },
}

type Journal = Arc<Mutex<Vec<JournalEntry>>>;
type Responder = Box<dyn Fn(u8, &[u8]) -> Option<Vec<u8>> + Send + Sync>;

enum GrantScript {
    Devices(Vec<MemoryDevice>),
    Fail(ProviderError),
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Scripted provider for tests and embedding without hardware.
///
/// Each `request_grant` call consumes the next scripted result. With no
/// script left the request is denied, as a user dismissing the chooser would.
#[derive(Clone, Default)]
pub struct MemoryProvider {
    grants: Arc<Mutex<VecDeque<GrantScript>>>,
    journal: Journal,
}

impl MemoryProvider {
    /// Creates a provider with an empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a device handle that records into this provider's journal.
    pub fn device(&self, info: DeviceInfo) -> MemoryDevice {
        MemoryDevice {
            state: Arc::new(DeviceState {
                info,
                opened: AtomicBool::new(false),
                open_count: AtomicUsize::new(0),
                open_error: Mutex::new(None),
                open_delay: Mutex::new(Duration::ZERO),
                input: Mutex::new(VecDeque::new()),
                input_ready: Notify::new(),
                sent: Mutex::new(Vec::new()),
                responder: Mutex::new(None),
            }),
            journal: Arc::clone(&self.journal),
        }
    }

    /// Scripts the next grant to return `devices`.
    pub fn push_grant(&self, devices: impl IntoIterator<Item = MemoryDevice>) {
        lock(&self.grants).push_back(GrantScript::Devices(devices.into_iter().collect()));
    }

    /// Scripts the next grant to be declined by the user.
    pub fn push_denial(&self) {
        self.push_error(ProviderError::Denied);
    }

    /// Scripts the next grant to fail with `err`.
    pub fn push_error(&self, err: ProviderError) {
        lock(&self.grants).push_back(GrantScript::Fail(err));
    }

    /// Returns a copy of every recorded interaction.
    pub fn journal(&self) -> Vec<JournalEntry> {
        lock(&self.journal).clone()
    }

    /// Returns the filter lists of every grant request made so far.
    pub fn grant_requests(&self) -> Vec<Vec<DeviceFilter>> {
        lock(&self.journal)
            .iter()
            .filter_map(|entry| match entry {
                JournalEntry::GrantRequested(filters) => Some(filters.clone()),
                _ => None,
            })
            .collect()
    }

    /// Returns the devices successfully opened, in completion order.
    pub fn opened_order(&self) -> Vec<DeviceId> {
        lock(&self.journal)
            .iter()
            .filter_map(|entry| match entry {
                JournalEntry::Opened(id) => Some(id.clone()),
                _ => None,
            })
            .collect()
    }
}

impl fmt::Debug for MemoryProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryProvider")
            .field("scripted_grants", &lock(&self.grants).len())
            .field("journal_len", &lock(&self.journal).len())
            .finish()
    }
}

impl DeviceAccessProvider for MemoryProvider {
    type Device = MemoryDevice;

    async fn request_grant(
        &self,
        filters: &[DeviceFilter],
    ) -> Result<Vec<MemoryDevice>, ProviderError> {
        lock(&self.journal).push(JournalEntry::GrantRequested(filters.to_vec()));

        let script = lock(&self.grants).pop_front();
        match script {
            Some(GrantScript::Devices(devices)) => Ok(devices
                .into_iter()
                .filter(|d| DeviceFilter::any_matches(filters, d.info()))
                .collect()),
            Some(GrantScript::Fail(err)) => Err(err),
            None => Err(ProviderError::Denied),
        }
    }
}

struct DeviceState {
    info: DeviceInfo,
    opened: AtomicBool,
    open_count: AtomicUsize,
    open_error: Mutex<Option<ProviderError>>,
    open_delay: Mutex<Duration>,
    input: Mutex<VecDeque<Vec<u8>>>,
    input_ready: Notify,
    sent: Mutex<Vec<(u8, Vec<u8>)>>,
    responder: Mutex<Option<Responder>>,
}

/// Handle to a simulated device.
///
/// Clones share state, so a test can keep one clone while the session holds
/// another.
#[derive(Clone)]
pub struct MemoryDevice {
    state: Arc<DeviceState>,
    journal: Journal,
}

impl MemoryDevice {
    /// Makes every later `open` call fail with `err`.
    pub fn fail_open(&self, err: ProviderError) {
        *lock(&self.state.open_error) = Some(err);
    }

    /// Delays each `open` call by `delay`.
    pub fn set_open_delay(&self, delay: Duration) {
        *lock(&self.state.open_delay) = delay;
    }

    /// Marks the device as already open, as if a previous session opened it.
    pub fn mark_opened(&self) {
        self.state.opened.store(true, Ordering::SeqCst);
    }

    /// Number of successful `open` calls.
    pub fn open_count(&self) -> usize {
        self.state.open_count.load(Ordering::SeqCst)
    }

    /// Queues an input report for the next `receive_report`.
    pub fn push_input_report(&self, report: Vec<u8>) {
        lock(&self.state.input).push_back(report);
        self.state.input_ready.notify_one();
    }

    /// Installs a function that produces an input report for each output
    /// report written to the device.
    pub fn respond_with<F>(&self, responder: F)
    where
        F: Fn(u8, &[u8]) -> Option<Vec<u8>> + Send + Sync + 'static,
    {
        *lock(&self.state.responder) = Some(Box::new(responder));
    }

    /// Output reports written so far, as `(report_id, data)` pairs.
    pub fn sent_reports(&self) -> Vec<(u8, Vec<u8>)> {
        lock(&self.state.sent).clone()
    }

    fn record(&self, entry: JournalEntry) {
        lock(&self.journal).push(entry);
    }

    fn ensure_open(&self) -> Result<(), ProviderError> {
        if self.is_opened() {
            Ok(())
        } else {
            Err(ProviderError::NotOpen(self.id().clone()))
        }
    }
}

impl fmt::Debug for MemoryDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryDevice")
            .field("id", &self.state.info.id)
            .field("opened", &self.is_opened())
            .finish()
    }
}

impl PartialEq for MemoryDevice {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

impl Eq for MemoryDevice {}

impl HidDevice for MemoryDevice {
    fn info(&self) -> &DeviceInfo {
        &self.state.info
    }

    fn is_opened(&self) -> bool {
        self.state.opened.load(Ordering::SeqCst)
    }

    async fn open(&self) -> Result<(), ProviderError> {
        self.record(JournalEntry::OpenStarted(self.id().clone()));

        let delay = *lock(&self.state.open_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let open_error = lock(&self.state.open_error).clone();
        if let Some(err) = open_error {
            self.record(JournalEntry::OpenFailed(self.id().clone()));
            return Err(err);
        }

        self.state.opened.store(true, Ordering::SeqCst);
        self.state.open_count.fetch_add(1, Ordering::SeqCst);
        self.record(JournalEntry::Opened(self.id().clone()));
        Ok(())
    }

    async fn send_report(&self, report_id: u8, data: &[u8]) -> Result<(), ProviderError> {
        self.ensure_open()?;

        lock(&self.state.sent).push((report_id, data.to_vec()));
        self.record(JournalEntry::ReportSent {
            device: self.id().clone(),
            report_id,
            data: data.to_vec(),
        });

        let response = lock(&self.state.responder)
            .as_ref()
            .and_then(|respond| respond(report_id, data));
        if let Some(report) = response {
            self.push_input_report(report);
        }
        Ok(())
    }

    async fn receive_report(&self) -> Result<Vec<u8>, ProviderError> {
        self.ensure_open()?;

        loop {
            let next = lock(&self.state.input).pop_front();
            if let Some(report) = next {
                return Ok(report);
            }
            self.state.input_ready.notified().await;
        }
    }

    async fn discard_pending(&self) -> Result<usize, ProviderError> {
        self.ensure_open()?;

        let mut input = lock(&self.state.input);
        let dropped = input.len();
        input.clear();
        Ok(dropped)
    }
}
