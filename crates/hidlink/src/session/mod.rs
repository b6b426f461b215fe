//! Probe session management.
//!
//! This module provides the session object that drives the grant/open
//! sequence, tracks the selected devices and exchanges raw reports with the
//! active one.

mod exchange;
pub mod manager;

pub use manager::{
    ProbeSession, SessionId, SessionOptions, DEFAULT_REPORT_SIZE, DEFAULT_RESPONSE_TIMEOUT,
};
