//! Core domain types for the uptime monitor.
//!
//! Targets, probe results, sessions, the status-protocol codec, MOTD
//! parsing, settings and wall-clock helpers shared by every other crate.

pub mod codec;
pub mod error;
pub mod formatting;
pub mod models;
pub mod motd;
pub mod settings;
pub mod status;
pub mod time_utils;

pub use error::{MonitorError, Result};
