//! The uptime log line grammar.
//!
//! ```text
//! [<address>] [online] <start> ~ <end> | MOTD: <motd>
//! ```
//!
//! `<start>`/`<end>` are `YYYY-MM-DD HH:MM:SS`, optionally suffixed with `*`
//! for an estimated boundary. `<end>` is [`OPEN_SENTINEL`] while the session
//! is still running.

use std::sync::OnceLock;

use regex::Regex;
use uptime_core::error::{MonitorError, Result};
use uptime_core::models::Session;
use uptime_core::motd::single_line;
use uptime_core::time_utils::{format_log_timestamp, parse_log_timestamp};

/// Tag written between the address and the time range.
pub const ONLINE_TAG: &str = "[online]";

/// End token of a session that has not been closed yet.
pub const OPEN_SENTINEL: &str = "open";

/// Tag and sentinel found in logs written by older releases.
const LEGACY_ONLINE_TAG: &str = "[上线]";
const LEGACY_OPEN_SENTINEL: &str = "无";

/// MOTD recorded when a line has no MOTD section at all.
const MISSING_MOTD: &str = "No MOTD";

fn line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^\[(?P<addr>.+?)\] \[(?:online|上线)\] (?P<start>[^~]+?)\s*~\s*(?P<end>[^|]*?)\s*(?:\|\s*MOTD:\s?(?P<motd>.*))?$",
        )
        .expect("regex is valid")
    })
}

/// Render `session` as a log line (without the trailing newline).
pub fn format_line(session: &Session) -> String {
    let start = format_log_timestamp(session.start, session.start_estimated);
    let end = match session.end {
        Some(end) => format_log_timestamp(end, session.end_estimated),
        None => OPEN_SENTINEL.to_string(),
    };
    format!(
        "[{}] {ONLINE_TAG} {start} ~ {end} | MOTD: {}",
        session.target,
        single_line(&session.motd)
    )
}

/// Parse one log line back into a [`Session`].
pub fn parse_line(line: &str) -> Result<Session> {
    let line = line.trim();
    let malformed = |reason: &str| MonitorError::LogParse {
        line: line.to_string(),
        reason: reason.to_string(),
    };

    if !line.contains(ONLINE_TAG) && !line.contains(LEGACY_ONLINE_TAG) {
        return Err(malformed("missing online tag"));
    }
    let caps = line_re()
        .captures(line)
        .ok_or_else(|| malformed("does not match line grammar"))?;

    let target = caps["addr"].to_string();
    let (start, start_estimated) =
        parse_log_timestamp(&caps["start"]).map_err(|_| malformed("bad start timestamp"))?;

    let end_raw = caps["end"].trim();
    let (end, end_estimated) = if end_raw == OPEN_SENTINEL || end_raw == LEGACY_OPEN_SENTINEL {
        (None, false)
    } else {
        let (end, estimated) =
            parse_log_timestamp(end_raw).map_err(|_| malformed("bad end timestamp"))?;
        (Some(end), estimated)
    };

    let motd = caps
        .name("motd")
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_else(|| MISSING_MOTD.to_string());

    Ok(Session {
        target,
        start,
        end,
        motd,
        start_estimated,
        end_estimated,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
