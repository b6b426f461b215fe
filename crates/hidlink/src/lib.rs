//! # hidlink
//!
//! Session management for USB HID debug probes.
//!
//! ## Overview
//!
//! Host platforms only hand out HID devices the user has explicitly granted.
//! This crate wraps that restriction in a session object:
//!
//! - **Capability probe**: whether the host exposes HID access at all
//! - **Device access provider**: the platform subsystem that grants, opens and
//!   talks to devices
//! - **Probe session**: requests a grant, opens each granted device in order,
//!   publishes the selection and signals when the session ends
//! - **Report exchange**: one raw request/response round trip on the active
//!   device
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │        Debug-probe protocol layer       │  (not part of this crate)
//! ├─────────────────────────────────────────┤
//! │  ProbeSession  ── LifecycleSignal       │
//! │      │                                  │
//! │      ├── CapabilityProbe                │
//! │      └── DeviceAccessProvider           │
//! ├─────────────────────────────────────────┤
//! │     MemoryProvider  │  HidApiProvider   │
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```rust
//! use hidlink::{DeviceInfo, MemoryProvider, ProbeSession, StaticCapability};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> hidlink::Result<()> {
//! let provider = MemoryProvider::new();
//! let probe = provider.device(DeviceInfo::new("/dev/hidraw0").with_ids(0x03eb, 0x2141));
//! provider.push_grant([probe]);
//!
//! let session = ProbeSession::new(provider, StaticCapability::AVAILABLE);
//! session.refresh_devices().await?;
//! session.select_first().await?;
//!
//! // Later, from any code path:
//! session.close_session();
//! session.session_ended().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`capability`]: Host capability probe
//! - [`device`]: Device handles, descriptors and filters
//! - [`provider`]: Device access providers
//! - [`session`]: The probe session and report exchange
//! - [`signal`]: One-shot lifecycle signal
//! - [`error`]: Error types

pub mod capability;
pub mod device;
pub mod error;
pub mod provider;
pub mod session;
pub mod signal;

pub use capability::{CapabilityProbe, StaticCapability};
pub use device::{DeviceFilter, DeviceId, DeviceInfo, HidDevice, OUTPUT_REPORT_ID};
pub use error::{ProviderError, Result, SessionError};
#[cfg(feature = "hidapi")]
pub use provider::{HidApiDevice, HidApiProvider};
pub use provider::{DeviceAccessProvider, JournalEntry, MemoryDevice, MemoryProvider};
pub use session::{
    ProbeSession, SessionId, SessionOptions, DEFAULT_REPORT_SIZE, DEFAULT_RESPONSE_TIMEOUT,
};
pub use signal::LifecycleSignal;
