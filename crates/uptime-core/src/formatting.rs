//! Human-readable rendering of probe results and durations.

use chrono::NaiveDateTime;

use crate::models::ProbeResult;

/// One-line summary of a probe, as shown in status menus and logs.
///
/// `[12:00:00] [host:25565] online | ping 12.34 ms | players 3/20`
/// `[12:00:00] [host:25565] offline - connection refused`
pub fn status_line(address: &str, result: &ProbeResult, at: NaiveDateTime) -> String {
    let stamp = at.format("%H:%M:%S");
    match result {
        ProbeResult::Online(status) => {
            let ping = match status.latency() {
                Some(ms) => format!("{ms:.2} ms"),
                None => "unknown".to_string(),
            };
            format!(
                "[{stamp}] [{address}] online | ping {ping} | players {}/{}",
                status.players_online, status.players_max
            )
        }
        ProbeResult::Offline { error_reason } => {
            format!("[{stamp}] [{address}] offline - {error_reason}")
        }
    }
}

/// Format a number of seconds as `"{h}h {mm}m"`.
///
/// Negative inputs are clamped to zero.
pub fn format_duration(total_seconds: i64) -> String {
    let secs = total_seconds.max(0);
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    format!("{hours}h {minutes:02}m")
}

/// Format seconds as fractional hours with one decimal, e.g. `"2.5"`.
pub fn format_hours(total_seconds: i64) -> String {
    format!("{:.1}", total_seconds.max(0) as f64 / 3600.0)
}
