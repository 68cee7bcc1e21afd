//! Online-time aggregation over days, ISO weeks and months.
//!
//! Sessions are split at local midnight: a session contributes to a day
//! exactly the seconds of its `[start, end)` interval that fall inside that
//! day, so the per-day pieces of a closed session always sum to its
//! duration. Open sessions use a caller-supplied `now` as a provisional end;
//! nothing computed here is ever written back to the log.

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use uptime_core::models::Session;
use uptime_core::time_utils::{day_key, iso_week_key, month_key, seconds_within_day};

// ── SessionFilter ─────────────────────────────────────────────────────────────

/// Restricts which sessions and days take part in an aggregation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionFilter {
    /// Only sessions of this target address.
    pub target: Option<String>,
    /// First day to report (inclusive).
    pub since: Option<NaiveDate>,
    /// Last day to report (inclusive).
    pub until: Option<NaiveDate>,
}

impl SessionFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn for_target(target: impl Into<String>) -> Self {
        Self {
            target: Some(target.into()),
            ..Self::default()
        }
    }

    /// Limit to the `days` calendar days ending on `today`, e.g. `days = 7`
    /// covers today and the six days before it.
    pub fn last_days(mut self, days: u32, today: NaiveDate) -> Self {
        let span = i64::from(days.max(1)) - 1;
        self.since = Some(today - Duration::days(span));
        self.until = Some(today);
        self
    }

    pub fn accepts_target(&self, session: &Session) -> bool {
        self.target.as_deref().map_or(true, |t| session.target == t)
    }

    pub fn accepts_day(&self, date: NaiveDate) -> bool {
        self.since.map_or(true, |s| date >= s) && self.until.map_or(true, |u| date <= u)
    }

    /// Target matches and the session overlaps the date range (an open
    /// session runs until `now`).
    pub fn accepts_session(&self, session: &Session, now: NaiveDateTime) -> bool {
        let end = session.effective_end(now).max(session.start).date();
        self.accepts_target(session)
            && self.since.map_or(true, |s| end >= s)
            && self.until.map_or(true, |u| session.start.date() <= u)
    }
}

// ── DayAggregate ──────────────────────────────────────────────────────────────

/// Online time attributed to one calendar day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayAggregate {
    pub date: NaiveDate,
    /// Seconds online across all accepted targets.
    pub total_seconds: i64,
    /// Seconds online per target address.
    pub by_target: BTreeMap<String, i64>,
    /// Seconds online per MOTD.
    pub by_motd: BTreeMap<String, i64>,
    /// Number of sessions touching this day.
    pub sessions: u32,
}

impl DayAggregate {
    fn new(date: NaiveDate) -> Self {
        Self {
            date,
            total_seconds: 0,
            by_target: BTreeMap::new(),
            by_motd: BTreeMap::new(),
            sessions: 0,
        }
    }

    fn add(&mut self, session: &Session, seconds: i64) {
        self.total_seconds += seconds;
        *self.by_target.entry(session.target.clone()).or_default() += seconds;
        *self.by_motd.entry(session.motd.clone()).or_default() += seconds;
        self.sessions += 1;
    }

    /// Day key, e.g. `"2024-01-15"`.
    pub fn key(&self) -> String {
        day_key(self.date)
    }
}

// ── PeriodAggregate ───────────────────────────────────────────────────────────

/// Online time summed over a week or a month.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeriodAggregate {
    /// `"2024-W05"` (weekly) or `"2024-01"` (monthly).
    pub period_key: String,
    pub total_seconds: i64,
    pub by_target: BTreeMap<String, i64>,
    pub by_motd: BTreeMap<String, i64>,
    /// Days in the period with any recorded session.
    pub active_days: u32,
}

impl PeriodAggregate {
    fn new(period_key: impl Into<String>) -> Self {
        Self {
            period_key: period_key.into(),
            total_seconds: 0,
            by_target: BTreeMap::new(),
            by_motd: BTreeMap::new(),
            active_days: 0,
        }
    }

    fn add_day(&mut self, day: &DayAggregate) {
        self.total_seconds += day.total_seconds;
        for (target, secs) in &day.by_target {
            *self.by_target.entry(target.clone()).or_default() += secs;
        }
        for (motd, secs) in &day.by_motd {
            *self.by_motd.entry(motd.clone()).or_default() += secs;
        }
        self.active_days += 1;
    }
}

// ── UptimeAggregator ──────────────────────────────────────────────────────────

/// Stateless helper that groups sessions by calendar period.
pub struct UptimeAggregator;

impl UptimeAggregator {
    /// Per-day online seconds, sorted by date.
    ///
    /// Days on which a session contributes zero seconds are omitted, except
    /// the start day of a zero-length session so that it is still listed.
    pub fn aggregate_by_day(
        sessions: &[Session],
        filter: &SessionFilter,
        now: NaiveDateTime,
    ) -> Vec<DayAggregate> {
        let mut map: BTreeMap<NaiveDate, DayAggregate> = BTreeMap::new();

        for session in sessions.iter().filter(|s| filter.accepts_target(s)) {
            let start = session.start;
            let end = session.effective_end(now).max(start);

            let mut date = start.date();
            let last = end.date();
            while date <= last {
                let seconds = seconds_within_day(start, end, date);
                if (seconds > 0 || date == start.date()) && filter.accepts_day(date) {
                    map.entry(date)
                        .or_insert_with(|| DayAggregate::new(date))
                        .add(session, seconds);
                }
                match date.succ_opt() {
                    Some(next) => date = next,
                    None => break,
                }
            }
        }

        map.into_values().collect()
    }

    /// Per-ISO-week totals built from day aggregates, sorted by key.
    pub fn aggregate_weekly(days: &[DayAggregate]) -> Vec<PeriodAggregate> {
        Self::aggregate_by_period(days, iso_week_key)
    }

    /// Per-month totals built from day aggregates, sorted by key.
    pub fn aggregate_monthly(days: &[DayAggregate]) -> Vec<PeriodAggregate> {
        Self::aggregate_by_period(days, month_key)
    }

    /// Sum of `total_seconds` across `days`.
    pub fn total_seconds(days: &[DayAggregate]) -> i64 {
        days.iter().map(|d| d.total_seconds).sum()
    }

    /// Seconds per target per day: `(date, target) -> seconds`, sorted.
    pub fn target_day_table(days: &[DayAggregate]) -> BTreeMap<(NaiveDate, String), i64> {
        days.iter()
            .flat_map(|d| {
                d.by_target
                    .iter()
                    .map(move |(target, secs)| ((d.date, target.clone()), *secs))
            })
            .collect()
    }

    // ── Private ───────────────────────────────────────────────────────────────

    fn aggregate_by_period(
        days: &[DayAggregate],
        key_fn: impl Fn(NaiveDate) -> String,
    ) -> Vec<PeriodAggregate> {
        let mut map: BTreeMap<String, PeriodAggregate> = BTreeMap::new();
        for day in days {
            let key = key_fn(day.date);
            map.entry(key.clone())
                .or_insert_with(|| PeriodAggregate::new(key))
                .add_day(day);
        }
        map.into_values().collect()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
