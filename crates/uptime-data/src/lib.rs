//! Uptime log storage and reconstruction.
//!
//! Owns the line-oriented uptime log: the line grammar, serialized file
//! access, parsing the log back into sessions, and per-day / per-week /
//! per-month online-time aggregation.

pub mod aggregator;
pub mod log_line;
pub mod log_store;
pub mod reader;

pub use uptime_core as core;
