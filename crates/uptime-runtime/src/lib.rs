//! Runtime layer for the uptime monitor.
//!
//! Probes targets over the status protocol, drives one polling task per
//! target, tracks online sessions into the shared uptime log, and fans
//! status events out to subscribers.

pub mod events;
pub mod monitor;
pub mod protocol;
pub mod scheduler;
pub mod session_tracker;

#[cfg(test)]
mod testing;

pub use uptime_core as core;
pub use uptime_data as data;
