//! Per-target online/offline state machine.
//!
//! [`SessionTracker`] turns the stream of probe results for one target into
//! session records in the uptime log:
//!
//! - first probe online: open a session with an estimated start
//! - offline to online: open a session
//! - online to offline: replace the open line with a closed one
//! - MOTD change while online (unless ignored): close, then open anew
//! - stop: close any open session with an estimated end
//!
//! Timestamps are passed in by the caller so the machine itself is
//! synchronous and clock-free.

use std::sync::Arc;

use chrono::NaiveDateTime;
use uptime_core::error::MonitorError;
use uptime_core::models::{ProbeResult, Session, Target};
use uptime_data::log_line::format_line;
use uptime_data::log_store::LogStore;

// ── Public types ──────────────────────────────────────────────────────────────

/// Where the tracker currently stands.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackerState {
    /// No probe observed yet.
    Pending,
    Offline,
    /// `session` is the open record last written to the log; `last_motd` is
    /// the most recently observed MOTD.
    Online { session: Session, last_motd: String },
    /// Terminal; further probes are ignored.
    Stopped,
}

/// Log-level effect of one observation.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// Nothing was written.
    Unchanged,
    Opened(Session),
    Closed(Session),
    Restarted { closed: Session, opened: Session },
}

// ── SessionTracker ────────────────────────────────────────────────────────────

/// State machine for a single target.
///
/// Log write failures never abort a transition: the in-memory state advances
/// regardless, and the error is queued for [`SessionTracker::drain_errors`].
pub struct SessionTracker {
    target: Target,
    store: Arc<LogStore>,
    state: TrackerState,
    errors: Vec<MonitorError>,
}

impl SessionTracker {
    pub fn new(target: Target, store: Arc<LogStore>) -> Self {
        Self {
            target,
            store,
            state: TrackerState::Pending,
            errors: Vec::new(),
        }
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn state(&self) -> &TrackerState {
        &self.state
    }

    pub fn is_online(&self) -> bool {
        matches!(self.state, TrackerState::Online { .. })
    }

    /// The open session, if the target is currently online.
    pub fn open_session(&self) -> Option<&Session> {
        match &self.state {
            TrackerState::Online { session, .. } => Some(session),
            _ => None,
        }
    }

    /// Log failures since the last call.
    pub fn drain_errors(&mut self) -> Vec<MonitorError> {
        std::mem::take(&mut self.errors)
    }

    // ── Transitions ───────────────────────────────────────────────────────

    /// Feed one probe result taken at `now`.
    pub fn observe(&mut self, result: &ProbeResult, now: NaiveDateTime) -> Transition {
        let state = std::mem::replace(&mut self.state, TrackerState::Stopped);
        let (next, transition) = match (state, result) {
            (TrackerState::Stopped, _) => {
                tracing::debug!(target_addr = %self.target.address, "ignoring probe after stop");
                (TrackerState::Stopped, Transition::Unchanged)
            }

            (TrackerState::Pending, ProbeResult::Online(status)) => {
                // Already up when we started watching: start time is a guess.
                let session = self.open(now, status.motd_plain(), true);
                (
                    online(session.clone(), status.motd_plain()),
                    Transition::Opened(session),
                )
            }
            (TrackerState::Pending | TrackerState::Offline, ProbeResult::Offline { .. }) => {
                (TrackerState::Offline, Transition::Unchanged)
            }
            (TrackerState::Offline, ProbeResult::Online(status)) => {
                let session = self.open(now, status.motd_plain(), false);
                (
                    online(session.clone(), status.motd_plain()),
                    Transition::Opened(session),
                )
            }

            (TrackerState::Online { session, .. }, ProbeResult::Offline { .. }) => {
                let closed = self.close(&session, session.closed_at(now, false));
                (TrackerState::Offline, Transition::Closed(closed))
            }
            (TrackerState::Online { session, last_motd }, ProbeResult::Online(status)) => {
                let motd = status.motd_plain();
                if motd != last_motd && !self.target.ignore_motd_changes {
                    tracing::info!(
                        target_addr = %self.target.address,
                        old = %last_motd,
                        new = %motd,
                        "MOTD changed; treating as restart"
                    );
                    let mut ending = session.closed_at(now, false);
                    ending.motd = last_motd;
                    let closed = self.close(&session, ending);
                    let opened = self.open(now, motd.clone(), false);
                    (
                        online(opened.clone(), motd),
                        Transition::Restarted { closed, opened },
                    )
                } else {
                    (online(session, motd), Transition::Unchanged)
                }
            }
        };
        self.state = next;
        transition
    }

    /// Stop tracking at `now`. Any open session is closed with an estimated
    /// end. Idempotent.
    pub fn stop(&mut self, now: NaiveDateTime) -> Transition {
        let state = std::mem::replace(&mut self.state, TrackerState::Stopped);
        match state {
            TrackerState::Online { session, .. } => {
                let closed = self.close(&session, session.closed_at(now, true));
                Transition::Closed(closed)
            }
            _ => Transition::Unchanged,
        }
    }

    // ── Private helpers ───────────────────────────────────────────────────

    fn open(&mut self, now: NaiveDateTime, motd: String, start_estimated: bool) -> Session {
        let session = Session::open(self.target.address.clone(), now, motd, start_estimated);
        tracing::info!(
            target_addr = %self.target.address,
            estimated = start_estimated,
            "session opened"
        );
        if let Err(e) = self.store.append(&format_line(&session)) {
            self.record_error(e);
        }
        session
    }

    /// Remove the last line identical to `open`'s line and append `closed`.
    fn close(&mut self, open: &Session, closed: Session) -> Session {
        let open_line = format_line(open);
        tracing::info!(
            target_addr = %self.target.address,
            seconds = closed.duration_seconds(),
            estimated = closed.end_estimated,
            "session closed"
        );
        match self
            .store
            .replace_last_matching(|line| line == open_line, &format_line(&closed))
        {
            Ok(true) => {}
            Ok(false) => tracing::warn!(
                target_addr = %self.target.address,
                "open log entry not found; appending closed entry only"
            ),
            Err(e) => self.record_error(e),
        }
        closed
    }

    fn record_error(&mut self, error: MonitorError) {
        tracing::warn!(target_addr = %self.target.address, error = %error, "uptime log write failed");
        self.errors.push(error);
    }
}

fn online(session: Session, last_motd: String) -> TrackerState {
    TrackerState::Online { session, last_motd }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;
    use uptime_core::models::ServerStatus;
    use uptime_core::motd::Motd;
    use uptime_data::reader::LogReconstructor;

    // ── helpers ───────────────────────────────────────────────────────────

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn up(motd: &str) -> ProbeResult {
        ProbeResult::Online(ServerStatus {
            version: "1.20.4".into(),
            protocol_number: 765,
            motd: Motd::PlainText(motd.into()),
            players_online: 1,
            players_max: 20,
            player_sample: vec![],
            favicon: None,
            ping_millis: 10.0,
        })
    }

    fn down() -> ProbeResult {
        ProbeResult::offline("connection refused")
    }

    fn setup(tmp: &TempDir, ignore_motd: bool) -> (SessionTracker, Arc<LogStore>) {
        let store = Arc::new(LogStore::new(tmp.path().join("server_status.log")));
        let target = Target::parse("A").unwrap().with_ignore_motd_changes(ignore_motd);
        (SessionTracker::new(target, Arc::clone(&store)), store)
    }

    fn lines(store: &LogStore) -> Vec<String> {
        store.read_all().unwrap()
    }

    // ── scenarios ─────────────────────────────────────────────────────────

    #[test]
    fn test_startup_online_then_offline() {
        let tmp = TempDir::new().unwrap();
        let (mut tracker, store) = setup(&tmp, false);

        tracker.observe(&up("M"), dt("2024-06-28 10:00:00"));
        assert_eq!(
            lines(&store),
            vec!["[A] [online] 2024-06-28 10:00:00* ~ open | MOTD: M"]
        );

        let t = tracker.observe(&down(), dt("2024-06-28 11:30:00"));
        assert!(matches!(t, Transition::Closed(_)));
        assert_eq!(
            lines(&store),
            vec!["[A] [online] 2024-06-28 10:00:00* ~ 2024-06-28 11:30:00 | MOTD: M"]
        );
        assert_eq!(tracker.state(), &TrackerState::Offline);
    }

    #[test]
    fn test_offline_then_online_then_stop() {
        let tmp = TempDir::new().unwrap();
        let (mut tracker, store) = setup(&tmp, false);

        tracker.observe(&down(), dt("2024-06-28 09:00:00"));
        assert!(lines(&store).is_empty());

        let t = tracker.observe(&up("M"), dt("2024-06-28 10:00:00"));
        assert!(matches!(t, Transition::Opened(ref s) if !s.start_estimated));
        assert_eq!(
            lines(&store),
            vec!["[A] [online] 2024-06-28 10:00:00 ~ open | MOTD: M"]
        );

        tracker.stop(dt("2024-06-28 12:00:00"));
        assert_eq!(
            lines(&store),
            vec!["[A] [online] 2024-06-28 10:00:00 ~ 2024-06-28 12:00:00* | MOTD: M"]
        );
        assert_eq!(tracker.state(), &TrackerState::Stopped);
    }

    #[test]
    fn test_motd_change_restarts_session() {
        let tmp = TempDir::new().unwrap();
        let (mut tracker, store) = setup(&tmp, false);

        tracker.observe(&up("M1"), dt("2024-06-28 10:00:00"));
        let t = tracker.observe(&up("M2"), dt("2024-06-28 11:00:00"));
        assert!(matches!(t, Transition::Restarted { .. }));
        assert_eq!(
            lines(&store),
            vec![
                "[A] [online] 2024-06-28 10:00:00* ~ 2024-06-28 11:00:00 | MOTD: M1",
                "[A] [online] 2024-06-28 11:00:00 ~ open | MOTD: M2",
            ]
        );
    }

    #[test]
    fn test_motd_change_ignored() {
        let tmp = TempDir::new().unwrap();
        let (mut tracker, store) = setup(&tmp, true);

        tracker.observe(&up("M1"), dt("2024-06-28 10:00:00"));
        let t = tracker.observe(&up("M2"), dt("2024-06-28 11:00:00"));
        assert_eq!(t, Transition::Unchanged);
        assert_eq!(lines(&store).len(), 1);

        tracker.observe(&down(), dt("2024-06-28 12:00:00"));
        // Closed under the MOTD it was opened with.
        assert_eq!(
            lines(&store),
            vec!["[A] [online] 2024-06-28 10:00:00* ~ 2024-06-28 12:00:00 | MOTD: M1"]
        );
    }

    #[test]
    fn test_unchanged_online_writes_nothing() {
        let tmp = TempDir::new().unwrap();
        let (mut tracker, store) = setup(&tmp, false);
        tracker.observe(&up("M"), dt("2024-06-28 10:00:00"));
        for minute in 1..5 {
            let now = dt("2024-06-28 10:00:00") + chrono::Duration::minutes(minute);
            assert_eq!(tracker.observe(&up("M"), now), Transition::Unchanged);
        }
        assert_eq!(lines(&store).len(), 1);
    }

    #[test]
    fn test_stop_when_offline_writes_nothing_and_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let (mut tracker, store) = setup(&tmp, false);
        tracker.observe(&down(), dt("2024-06-28 10:00:00"));
        assert_eq!(tracker.stop(dt("2024-06-28 10:05:00")), Transition::Unchanged);
        assert_eq!(tracker.stop(dt("2024-06-28 10:06:00")), Transition::Unchanged);
        assert!(lines(&store).is_empty());
    }

    #[test]
    fn test_probe_after_stop_is_ignored() {
        let tmp = TempDir::new().unwrap();
        let (mut tracker, store) = setup(&tmp, false);
        tracker.stop(dt("2024-06-28 10:00:00"));
        assert_eq!(
            tracker.observe(&up("M"), dt("2024-06-28 10:01:00")),
            Transition::Unchanged
        );
        assert!(lines(&store).is_empty());
    }

    #[test]
    fn test_repair_keeps_stale_identical_line() {
        let tmp = TempDir::new().unwrap();
        let (mut tracker, store) = setup(&tmp, false);
        // A crash left an identical open line behind earlier in the file.
        let stale = "[A] [online] 2024-06-28 10:00:00* ~ open | MOTD: M";
        store.append(stale).unwrap();
        store.append("[B] [online] 2024-06-28 09:00:00 ~ open | MOTD: other").unwrap();

        tracker.observe(&up("M"), dt("2024-06-28 10:00:00"));
        tracker.observe(&down(), dt("2024-06-28 10:30:00"));

        assert_eq!(
            lines(&store),
            vec![
                stale,
                "[B] [online] 2024-06-28 09:00:00 ~ open | MOTD: other",
                "[A] [online] 2024-06-28 10:00:00* ~ 2024-06-28 10:30:00 | MOTD: M",
            ]
        );
    }

    #[test]
    fn test_two_trackers_share_a_log() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(LogStore::new(tmp.path().join("server_status.log")));
        let mut a = SessionTracker::new(Target::parse("A").unwrap(), Arc::clone(&store));
        let mut b = SessionTracker::new(Target::parse("B").unwrap(), Arc::clone(&store));

        a.observe(&up("M"), dt("2024-06-28 10:00:00"));
        b.observe(&up("N"), dt("2024-06-28 10:00:00"));
        a.observe(&down(), dt("2024-06-28 11:00:00"));
        b.stop(dt("2024-06-28 12:00:00"));

        let sessions = LogReconstructor::load(&store).unwrap().into_sessions();
        assert_eq!(sessions.len(), 2);
        assert!(sessions.iter().all(|s| !s.is_open()));
        assert_eq!(sessions[0].target, "A");
        assert_eq!(sessions[0].duration_seconds(), 3600);
        assert_eq!(sessions[1].target, "B");
        assert!(sessions[1].end_estimated);
    }

    #[test]
    fn test_cycles_close_despite_non_utf8_line_in_log() {
        let tmp = TempDir::new().unwrap();
        let (mut tracker, store) = setup(&tmp, false);
        // Closed entry from an older log whose MOTD was saved as GBK.
        let mut legacy = b"[A] [online] 2024-06-27 08:00:00 ~ 2024-06-27 09:00:00 | MOTD: ".to_vec();
        legacy.extend_from_slice(&[0xC9, 0xCF, 0xCF, 0xDF, b'\n']);
        fs::write(store.path(), &legacy).unwrap();

        for hour in 10..13 {
            let start = dt("2024-06-28 00:00:00") + chrono::Duration::hours(hour);
            tracker.observe(&up("M"), start);
            tracker.observe(&down(), start + chrono::Duration::minutes(30));
        }

        assert!(tracker.drain_errors().is_empty());
        let all = lines(&store);
        assert_eq!(all.len(), 4);
        assert_eq!(open_lines(&all, "A"), 0);
        assert_eq!(
            all[3],
            "[A] [online] 2024-06-28 12:00:00 ~ 2024-06-28 12:30:00 | MOTD: M"
        );
        assert!(fs::read(store.path()).unwrap().starts_with(&legacy));
    }

    #[derive(Debug, Clone, Copy)]
    enum Step {
        Up(&'static str),
        Down,
        Stop,
    }

    fn open_lines(lines: &[String], address: &str) -> usize {
        let prefix = format!("[{address}] ");
        lines
            .iter()
            .filter(|l| l.starts_with(&prefix) && l.contains(" ~ open |"))
            .count()
    }

    #[test]
    fn test_at_most_one_open_line_for_every_step_sequence() {
        const STEPS: [Step; 4] = [Step::Up("M1"), Step::Up("M2"), Step::Down, Step::Stop];
        const LEN: u32 = 4;

        let tmp = TempDir::new().unwrap();
        for ignore_motd in [false, true] {
            for mut code in 0..STEPS.len().pow(LEN) {
                let name = format!("run-{ignore_motd}-{code}.log");
                let store = Arc::new(LogStore::new(tmp.path().join(name)));
                // Another target's open entry must never be touched.
                store.append("[B] [online] 2024-06-28 09:00:00 ~ open | MOTD: M1").unwrap();
                let target = Target::parse("A").unwrap().with_ignore_motd_changes(ignore_motd);
                let mut tracker = SessionTracker::new(target, Arc::clone(&store));

                let mut history = Vec::new();
                for i in 0..LEN {
                    let step = STEPS[code % STEPS.len()];
                    code /= STEPS.len();
                    history.push(step);

                    let now = dt("2024-06-28 10:00:00") + chrono::Duration::minutes(i.into());
                    match step {
                        Step::Up(motd) => tracker.observe(&up(motd), now),
                        Step::Down => tracker.observe(&down(), now),
                        Step::Stop => tracker.stop(now),
                    };

                    let all = lines(&store);
                    let expected = usize::from(tracker.is_online());
                    assert_eq!(open_lines(&all, "A"), expected, "after {history:?}: {all:#?}");
                    assert_eq!(open_lines(&all, "B"), 1, "after {history:?}: {all:#?}");
                }
                assert!(tracker.drain_errors().is_empty());
            }
        }
    }

    #[test]
    fn test_log_failure_is_reported_not_fatal() {
        let tmp = TempDir::new().unwrap();
        let blocker = tmp.path().join("file");
        fs::write(&blocker, "x").unwrap();
        let store = Arc::new(LogStore::new(blocker.join("server_status.log")));
        let mut tracker = SessionTracker::new(Target::parse("A").unwrap(), store);

        let t = tracker.observe(&up("M"), dt("2024-06-28 10:00:00"));
        assert!(matches!(t, Transition::Opened(_)));
        assert!(tracker.is_online());

        let errors = tracker.drain_errors();
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], MonitorError::LogIo { .. }));
        assert!(tracker.drain_errors().is_empty());

        tracker.observe(&down(), dt("2024-06-28 10:30:00"));
        assert!(!tracker.is_online());
        assert_eq!(tracker.drain_errors().len(), 1);
    }
}
