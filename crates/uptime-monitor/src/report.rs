//! Plain-text report views over the uptime log.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use chrono::{NaiveDate, NaiveDateTime};
use uptime_core::formatting::{format_duration, format_hours};
use uptime_core::models::Session;
use uptime_core::time_utils::format_log_timestamp;
use uptime_data::aggregator::{DayAggregate, PeriodAggregate, SessionFilter, UptimeAggregator};
use uptime_data::reader::LogReconstructor;

/// Report views selectable with `--view`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportView {
    Daily,
    Weekly,
    Monthly,
    Sessions,
}

impl ReportView {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "daily" => Some(Self::Daily),
            "weekly" => Some(Self::Weekly),
            "monthly" => Some(Self::Monthly),
            "sessions" => Some(Self::Sessions),
            _ => None,
        }
    }
}

/// Filter built from `--filter-target` and `--days`.
pub fn build_filter(target: Option<&str>, days: Option<u32>, today: NaiveDate) -> SessionFilter {
    let filter = match target {
        Some(t) => SessionFilter::for_target(t),
        None => SessionFilter::all(),
    };
    match days {
        Some(days) => filter.last_days(days, today),
        None => filter,
    }
}

/// Render `view` for the parsed log.
pub fn render(
    view: ReportView,
    log: &LogReconstructor,
    filter: &SessionFilter,
    now: NaiveDateTime,
) -> String {
    let mut out = match view {
        ReportView::Daily => {
            let days = UptimeAggregator::aggregate_by_day(log.sessions(), filter, now);
            render_daily(&days)
        }
        ReportView::Weekly => {
            let days = UptimeAggregator::aggregate_by_day(log.sessions(), filter, now);
            render_periods("Week", &UptimeAggregator::aggregate_weekly(&days))
        }
        ReportView::Monthly => {
            let days = UptimeAggregator::aggregate_by_day(log.sessions(), filter, now);
            render_periods("Month", &UptimeAggregator::aggregate_monthly(&days))
        }
        ReportView::Sessions => {
            let sessions: Vec<&Session> = log
                .sessions()
                .iter()
                .filter(|s| filter.accepts_session(s, now))
                .collect();
            render_sessions(&sessions, now)
        }
    };

    let _ = writeln!(
        out,
        "\n{} session(s) in log across {} target(s), {} open",
        log.session_count(),
        log.targets().len(),
        log.open_sessions().len()
    );
    if log.skipped() > 0 {
        let _ = writeln!(out, "{} malformed line(s) skipped", log.skipped());
    }
    out
}

// ── Tables ────────────────────────────────────────────────────────────────────

pub fn render_daily(days: &[DayAggregate]) -> String {
    if days.is_empty() {
        return "No uptime recorded.\n".to_string();
    }

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<12} {:>10} {:>7} {:>9}  Targets",
        "Date", "Online", "Hours", "Sessions"
    );
    for day in days {
        let targets: Vec<String> = day
            .by_target
            .iter()
            .map(|(t, secs)| format!("{t} ({})", format_duration(*secs)))
            .collect();
        let _ = writeln!(
            out,
            "{:<12} {:>10} {:>7} {:>9}  {}",
            day.key(),
            format_duration(day.total_seconds),
            format_hours(day.total_seconds),
            day.sessions,
            targets.join(", ")
        );
    }
    let total = UptimeAggregator::total_seconds(days);
    let _ = writeln!(
        out,
        "{:<12} {:>10} {:>7}",
        "Total",
        format_duration(total),
        format_hours(total)
    );

    let mut by_motd: BTreeMap<&str, i64> = BTreeMap::new();
    for day in days {
        for (motd, secs) in &day.by_motd {
            *by_motd.entry(motd.as_str()).or_default() += secs;
        }
    }
    out.push_str(&render_breakdown("MOTD", by_motd.into_iter()));
    out
}

pub fn render_periods(label: &str, periods: &[PeriodAggregate]) -> String {
    if periods.is_empty() {
        return "No uptime recorded.\n".to_string();
    }

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<10} {:>10} {:>7} {:>6}  Targets",
        label, "Online", "Hours", "Days"
    );
    for period in periods {
        let targets: Vec<String> = period
            .by_target
            .iter()
            .map(|(t, secs)| format!("{t} ({})", format_hours(*secs)))
            .collect();
        let _ = writeln!(
            out,
            "{:<10} {:>10} {:>7} {:>6}  {}",
            period.period_key,
            format_duration(period.total_seconds),
            format_hours(period.total_seconds),
            period.active_days,
            targets.join(", ")
        );
    }

    let mut by_motd: BTreeMap<&str, i64> = BTreeMap::new();
    for period in periods {
        for (motd, secs) in &period.by_motd {
            *by_motd.entry(motd.as_str()).or_default() += secs;
        }
    }
    out.push_str(&render_breakdown("MOTD", by_motd.into_iter()));
    out
}

pub fn render_sessions(sessions: &[&Session], now: NaiveDateTime) -> String {
    if sessions.is_empty() {
        return "No sessions recorded.\n".to_string();
    }

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<22} {:<21} {:<21} {:>10}  MOTD",
        "Target", "Start", "End", "Duration"
    );
    for session in sessions {
        let (end, duration) = match session.end {
            Some(end) => (
                format_log_timestamp(end, session.end_estimated),
                format_duration(session.duration_seconds()),
            ),
            None => (
                "open".to_string(),
                format!("{}+", format_duration((now - session.start).num_seconds())),
            ),
        };
        let _ = writeln!(
            out,
            "{:<22} {:<21} {:<21} {:>10}  {}",
            session.target,
            format_log_timestamp(session.start, session.start_estimated),
            end,
            duration,
            session.motd
        );
    }
    out
}

/// Longest-first listing of `(label, seconds)` pairs.
fn render_breakdown<'a>(title: &str, entries: impl Iterator<Item = (&'a str, i64)>) -> String {
    let mut entries: Vec<(&str, i64)> = entries.filter(|(_, secs)| *secs > 0).collect();
    if entries.is_empty() {
        return String::new();
    }
    entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

    let mut out = format!("\nBy {title}:\n");
    for (label, secs) in entries {
        let _ = writeln!(out, "  {:>10}  {label}", format_duration(secs));
    }
    out
}

// ── Tests ──────────────────────────────────────────────────────────────────────
