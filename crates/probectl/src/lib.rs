//! # probectl
//!
//! Operator front end for hidlink probe sessions.
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading and defaults
//! - [`commands`]: Command implementations shared by the binary and tests

pub mod commands;
pub mod config;

// Re-export hidlink for convenience
pub use hidlink;

pub use config::Config;
