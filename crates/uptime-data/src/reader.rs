//! Uptime log reconstruction.
//!
//! Rebuilds [`Session`] records from the raw lines held by a [`LogStore`].
//! Malformed lines are logged and skipped; they never abort a read.

use std::collections::BTreeSet;

use chrono::{NaiveDate, NaiveDateTime};
use tracing::{debug, warn};
use uptime_core::error::Result;
use uptime_core::models::Session;

use crate::log_line::parse_line;
use crate::log_store::LogStore;

/// Parsed view of the uptime log, rebuilt on every call.
#[derive(Debug, Clone, Default)]
pub struct LogReconstructor {
    sessions: Vec<Session>,
    skipped: usize,
}

impl LogReconstructor {
    /// Read and parse the whole log.
    pub fn load(store: &LogStore) -> Result<Self> {
        let lines = store.read_all()?;
        Ok(Self::from_lines(&lines))
    }

    /// Parse already-read lines in file order. Blank lines are ignored,
    /// malformed ones are counted and skipped.
    pub fn from_lines<S: AsRef<str>>(lines: &[S]) -> Self {
        let mut sessions = Vec::with_capacity(lines.len());
        let mut skipped = 0usize;

        for (idx, line) in lines.iter().enumerate() {
            let line = line.as_ref().trim();
            if line.is_empty() {
                continue;
            }
            match parse_line(line) {
                Ok(session) => sessions.push(session),
                Err(e) => {
                    warn!(line_no = idx + 1, error = %e, "skipping malformed log line");
                    skipped += 1;
                }
            }
        }

        debug!(sessions = sessions.len(), skipped, "reconstructed uptime log");
        Self { sessions, skipped }
    }

    /// All sessions in log (append) order.
    pub fn sessions(&self) -> &[Session] {
        &self.sessions
    }

    pub fn into_sessions(self) -> Vec<Session> {
        self.sessions
    }

    /// Number of lines that could not be parsed.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Total number of parsed sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Distinct target addresses, sorted.
    pub fn targets(&self) -> Vec<String> {
        self.sessions
            .iter()
            .map(|s| s.target.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Sessions that are still open, in log order.
    pub fn open_sessions(&self) -> Vec<&Session> {
        self.sessions.iter().filter(|s| s.is_open()).collect()
    }

    /// Sessions touching `date` (open sessions run until `now`), optionally
    /// restricted to one target.
    pub fn sessions_on(
        &self,
        date: NaiveDate,
        target: Option<&str>,
        now: NaiveDateTime,
    ) -> Vec<&Session> {
        self.sessions
            .iter()
            .filter(|s| target.map_or(true, |t| s.target == t))
            .filter(|s| {
                let end = s.effective_end(now).max(s.start);
                s.start.date() <= date && date <= end.date()
            })
            .collect()
    }

    /// Earliest calendar date any session starts on.
    pub fn first_date(&self) -> Option<NaiveDate> {
        self.sessions.iter().map(|s| s.start.date()).min()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    const LOG: &[&str] = &[
        "[a:25565] [online] 2024-06-01 22:00:00* ~ 2024-06-02 02:00:00 | MOTD: Alpha",
        "this line is junk",
        "",
        "[b] [online] 2024-06-02 10:00:00 ~ 2024-06-02 11:00:00* | MOTD: Beta",
        "[a:25565] [online] 2024-06-03 08:00:00 ~ open | MOTD: Alpha 2",
    ];

    #[test]
    fn test_from_lines_skips_malformed() {
        let r = LogReconstructor::from_lines(LOG);
        assert_eq!(r.session_count(), 3);
        assert_eq!(r.skipped(), 1);
        assert_eq!(r.sessions()[1].target, "b");
    }

    #[test]
    fn test_targets_sorted_and_distinct() {
        let r = LogReconstructor::from_lines(LOG);
        assert_eq!(r.targets(), vec!["a:25565", "b"]);
    }

    #[test]
    fn test_open_sessions() {
        let r = LogReconstructor::from_lines(LOG);
        let open = r.open_sessions();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].motd, "Alpha 2");
        assert!(open[0].end.is_none());
    }

    #[test]
    fn test_sessions_on_date_spanning_midnight() {
        let r = LogReconstructor::from_lines(LOG);
        let now = dt("2024-06-03 12:00:00");
        let d2 = NaiveDate::from_ymd_opt(2024, 6, 2).unwrap();
        assert_eq!(r.sessions_on(d2, None, now).len(), 2);
        assert_eq!(r.sessions_on(d2, Some("b"), now).len(), 1);
        let d3 = NaiveDate::from_ymd_opt(2024, 6, 3).unwrap();
        assert_eq!(r.sessions_on(d3, Some("a:25565"), now).len(), 1);
    }

    #[test]
    fn test_first_date() {
        let r = LogReconstructor::from_lines(LOG);
        assert_eq!(r.first_date(), NaiveDate::from_ymd_opt(2024, 6, 1));
        assert_eq!(LogReconstructor::default().first_date(), None);
    }

    #[test]
    fn test_load_from_store() {
        let tmp = TempDir::new().unwrap();
        let store = LogStore::new(tmp.path().join("server_status.log"));
        for line in LOG {
            if !line.is_empty() {
                store.append(line).unwrap();
            }
        }
        let r = LogReconstructor::load(&store).unwrap();
        assert_eq!(r.session_count(), 3);
        assert_eq!(r.skipped(), 1);
    }

    #[test]
    fn test_load_keeps_going_past_non_utf8_bytes() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("server_status.log");
        let mut content = b"[a] [online] 2024-06-01 10:00:00 ~ 2024-06-01 11:00:00 | MOTD: ".to_vec();
        content.extend_from_slice(&[0xC9, 0xCF, 0xCF, 0xDF, b'\n']);
        content.extend_from_slice(&[0xFF, 0xFE, b'\n']);
        content.extend_from_slice(b"[b] [online] 2024-06-02 10:00:00 ~ open | MOTD: Beta\n");
        std::fs::write(&path, content).unwrap();

        let r = LogReconstructor::load(&LogStore::new(path)).unwrap();
        assert_eq!(r.session_count(), 2);
        assert_eq!(r.skipped(), 1);
        assert_eq!(r.sessions()[0].duration_seconds(), 3600);
        assert_eq!(r.open_sessions().len(), 1);
    }

    #[test]
    fn test_load_missing_file() {
        let tmp = TempDir::new().unwrap();
        let store = LogStore::new(tmp.path().join("none.log"));
        assert_eq!(LogReconstructor::load(&store).unwrap().session_count(), 0);
    }
}
