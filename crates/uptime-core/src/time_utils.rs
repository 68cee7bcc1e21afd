use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, SubsecRound, Utc};
use chrono_tz::Tz;
use tracing::warn;

use crate::error::{MonitorError, Result};

/// Timestamp layout used in the uptime log.
pub const LOG_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// ── System timezone detection ─────────────────────────────────────────────────

/// Detect the IANA timezone name of the running system.
///
/// Falls back to `"UTC"` if detection fails.
pub fn get_system_timezone() -> String {
    iana_time_zone::get_timezone().unwrap_or_else(|_| "UTC".to_string())
}

/// Validate that `tz_name` is a recognised IANA timezone identifier.
pub fn validate_timezone(tz_name: &str) -> bool {
    tz_name.parse::<Tz>().is_ok()
}

// ── WallClock ─────────────────────────────────────────────────────────────────

/// Source of local wall-clock time for log timestamps.
///
/// Session boundaries are recorded as naive local times with whole-second
/// resolution, so every reading is truncated to the second.
#[derive(Debug, Clone, Copy)]
pub struct WallClock {
    tz: Tz,
}

impl WallClock {
    /// Create a clock for `tz_name`; `"auto"` resolves to the system zone.
    ///
    /// Unrecognised names fall back to UTC with a warning.
    pub fn new(tz_name: &str) -> Self {
        let name = if tz_name.eq_ignore_ascii_case("auto") {
            get_system_timezone()
        } else {
            tz_name.to_string()
        };
        let tz = name.parse::<Tz>().unwrap_or_else(|_| {
            warn!("WallClock: unrecognised timezone \"{}\", falling back to UTC", name);
            Tz::UTC
        });
        Self { tz }
    }

    /// Current local time, truncated to whole seconds.
    pub fn now(&self) -> NaiveDateTime {
        Utc::now()
            .with_timezone(&self.tz)
            .naive_local()
            .trunc_subsecs(0)
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }
}

impl Default for WallClock {
    fn default() -> Self {
        Self::new("auto")
    }
}

// ── Log timestamps ────────────────────────────────────────────────────────────

/// Render a timestamp the way the log stores it, optionally marked `*` as
/// an estimated boundary.
pub fn format_log_timestamp(ts: NaiveDateTime, estimated: bool) -> String {
    let mut out = ts.format(LOG_TIMESTAMP_FORMAT).to_string();
    if estimated {
        out.push('*');
    }
    out
}

/// Parse a log timestamp, returning the time and whether it carried the
/// estimated marker.
pub fn parse_log_timestamp(s: &str) -> Result<(NaiveDateTime, bool)> {
    let trimmed = s.trim();
    let (body, estimated) = match trimmed.strip_suffix('*') {
        Some(rest) => (rest.trim_end(), true),
        None => (trimmed, false),
    };
    let ts = NaiveDateTime::parse_from_str(body, LOG_TIMESTAMP_FORMAT)
        .map_err(|_| MonitorError::TimestampParse(s.to_string()))?;
    Ok((ts, estimated))
}

// ── Calendar helpers ──────────────────────────────────────────────────────────

/// Local midnight at the start of `date`.
pub fn day_start(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN)
}

/// Local midnight at the start of the following day (exclusive day end).
pub fn day_end(date: NaiveDate) -> NaiveDateTime {
    day_start(date) + chrono::Duration::days(1)
}

/// Seconds of `[start, end)` that fall inside `date`, never negative.
pub fn seconds_within_day(start: NaiveDateTime, end: NaiveDateTime, date: NaiveDate) -> i64 {
    let lo = start.max(day_start(date));
    let hi = end.min(day_end(date));
    (hi - lo).num_seconds().max(0)
}

/// ISO week key, e.g. `"2024-W05"`.
pub fn iso_week_key(date: NaiveDate) -> String {
    let week = date.iso_week();
    format!("{}-W{:02}", week.year(), week.week())
}

/// Month key, e.g. `"2024-01"`.
pub fn month_key(date: NaiveDate) -> String {
    date.format("%Y-%m").to_string()
}

/// Day key, e.g. `"2024-01-15"`.
pub fn day_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
