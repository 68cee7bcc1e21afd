//! One polling task per target.
//!
//! A [`Scheduler`] probes its target immediately, feeds the result to its
//! [`SessionTracker`], publishes events on the [`StatusBus`], then sleeps for
//! the interval. The sleep is cut short by a forced check or by cancellation;
//! cancellation also abandons an in-flight probe. On exit the tracker is
//! stopped so an open session gets its estimated end written.
//!
//! A scheduler may be given the [`Finished`] signals of earlier schedulers
//! for the same target; it does not probe until they have all exited, so
//! their closing writes never overlap its first open entry.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time;
use uptime_core::formatting::status_line;
use uptime_core::models::{ProbeResult, Target};
use uptime_core::time_utils::WallClock;
use uptime_data::log_store::LogStore;

use crate::events::{StatusBus, StatusEvent, StatusKind};
use crate::protocol::StatusProbe;
use crate::session_tracker::{SessionTracker, Transition};

/// Reason attached to events emitted after the scheduler has stopped.
const STOPPED_REASON: &str = "monitoring stopped";

// ── Scheduler ─────────────────────────────────────────────────────────────────

/// Polling loop for a single target. Consumed by [`Scheduler::spawn`].
pub struct Scheduler<P: StatusProbe> {
    tracker: SessionTracker,
    prober: Arc<P>,
    bus: StatusBus,
    clock: WallClock,
    interval: Duration,
}

impl<P: StatusProbe> Scheduler<P> {
    pub fn new(
        target: Target,
        store: Arc<LogStore>,
        prober: Arc<P>,
        bus: StatusBus,
        clock: WallClock,
        interval: Duration,
    ) -> Self {
        Self {
            tracker: SessionTracker::new(target, store),
            prober,
            bus,
            clock,
            interval,
        }
    }

    /// Start the loop on the tokio runtime.
    ///
    /// `shutdown_grace` bounds how long [`SchedulerHandle::stop`] waits for
    /// the final log write.
    pub fn spawn(self, shutdown_grace: Duration) -> SchedulerHandle {
        self.spawn_after(shutdown_grace, Vec::new())
    }

    /// Like [`Scheduler::spawn`], but the first probe waits until every
    /// scheduler in `predecessors` has exited.
    pub fn spawn_after(
        self,
        shutdown_grace: Duration,
        predecessors: Vec<Finished>,
    ) -> SchedulerHandle {
        let target = self.tracker.target().clone();
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let (finished_tx, finished_rx) = watch::channel(());
        let force = Arc::new(Notify::new());

        let task = tokio::spawn(self.run(
            cancel_rx,
            Arc::clone(&force),
            predecessors,
            finished_tx,
        ));

        SchedulerHandle {
            target,
            cancel: cancel_tx,
            force,
            finished: Finished(finished_rx),
            task,
            shutdown_grace,
        }
    }

    // ── Private implementation ────────────────────────────────────────────

    /// `_finished` is dropped when the task ends, including by abort or panic.
    async fn run(
        mut self,
        mut cancel: watch::Receiver<bool>,
        force: Arc<Notify>,
        predecessors: Vec<Finished>,
        _finished: watch::Sender<()>,
    ) {
        let target = self.tracker.target().clone();
        if !predecessors.is_empty() {
            tracing::debug!(target_addr = %target.address, "waiting for previous monitor to exit");
            tokio::select! {
                biased;
                _ = cancelled(&mut cancel) => {
                    tracing::info!(target_addr = %target.address, "monitoring stopped before start");
                    return;
                }
                _ = wait_all(predecessors) => {}
            }
        }
        tracing::info!(target_addr = %target.address, interval = ?self.interval, "monitoring started");

        loop {
            let result = tokio::select! {
                biased;
                _ = cancelled(&mut cancel) => break,
                result = self.prober.probe(&target) => result,
            };
            self.handle_result(result);

            tokio::select! {
                biased;
                _ = cancelled(&mut cancel) => break,
                _ = force.notified() => {
                    tracing::debug!(target_addr = %target.address, "forced check");
                }
                _ = time::sleep(self.interval) => {}
            }
        }

        let now = self.clock.now();
        if let Transition::Closed(session) = self.tracker.stop(now) {
            tracing::debug!(target_addr = %target.address, start = %session.start, "closed session on stop");
        }
        self.publish_errors(&ProbeResult::offline(STOPPED_REASON), now);
        tracing::info!(target_addr = %target.address, "monitoring stopped");
    }

    /// Advance the tracker and notify subscribers, in order: log errors,
    /// came-online / restarted / went-offline, then the refresh summary.
    fn handle_result(&mut self, result: ProbeResult) {
        let now = self.clock.now();
        let was_online = self.tracker.is_online();
        let transition = self.tracker.observe(&result, now);
        self.publish_errors(&result, now);

        match (&result, &transition) {
            (ProbeResult::Online(_), _) if !was_online => {
                self.publish(&result, StatusKind::CameOnline, now);
            }
            (ProbeResult::Online(_), Transition::Restarted { .. }) => {
                self.publish(&result, StatusKind::Restarted, now);
            }
            (ProbeResult::Offline { .. }, _) => {
                self.publish(&result, StatusKind::WentOffline, now);
            }
            _ => {}
        }

        let summary = status_line(&self.tracker.target().address, &result, now);
        tracing::debug!("{summary}");
        self.publish(&result, StatusKind::Refreshed(summary), now);
    }

    fn publish_errors(&mut self, result: &ProbeResult, now: chrono::NaiveDateTime) {
        for error in self.tracker.drain_errors() {
            self.publish(result, StatusKind::LogError(error.to_string()), now);
        }
    }

    fn publish(&self, result: &ProbeResult, kind: StatusKind, at: chrono::NaiveDateTime) {
        self.bus.publish(&StatusEvent {
            target: self.tracker.target().address.clone(),
            result: result.clone(),
            kind,
            at,
        });
    }
}

/// Resolves once a stop is requested or the handle is gone.
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    let _ = cancel.wait_for(|stop| *stop).await;
}

async fn wait_all(predecessors: Vec<Finished>) {
    for finished in predecessors {
        finished.wait().await;
    }
}

// ── Finished ──────────────────────────────────────────────────────────────────

/// Resolves once a scheduler task has exited, however it exited.
#[derive(Debug, Clone)]
pub struct Finished(watch::Receiver<()>);

impl Finished {
    pub fn is_done(&self) -> bool {
        // The sender is never written to; an error means it was dropped.
        self.0.has_changed().is_err()
    }

    pub async fn wait(mut self) {
        let _ = self.0.changed().await;
    }
}

// ── SchedulerHandle ───────────────────────────────────────────────────────────

/// Control side of a running [`Scheduler`].
///
/// Dropping the handle stops the scheduler as well.
pub struct SchedulerHandle {
    target: Target,
    cancel: watch::Sender<bool>,
    force: Arc<Notify>,
    finished: Finished,
    task: JoinHandle<()>,
    shutdown_grace: Duration,
}

impl SchedulerHandle {
    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Signal that outlives the handle and resolves when the task exits.
    pub fn finished(&self) -> Finished {
        self.finished.clone()
    }

    /// Probe as soon as the current wait or probe finishes.
    pub fn force_check(&self) {
        self.force.notify_one();
    }

    /// Signal the loop to stop without waiting for it.
    pub fn request_stop(&self) {
        // Fails only if the task already exited.
        let _ = self.cancel.send(true);
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop and wait up to the shutdown grace for the final log write.
    ///
    /// Returns `false` if the task had to be aborted or had panicked.
    pub async fn stop(self) -> bool {
        self.request_stop();
        self.join().await
    }

    /// Wait for a stop requested earlier via [`SchedulerHandle::request_stop`].
    pub async fn join(mut self) -> bool {
        match time::timeout(self.shutdown_grace, &mut self.task).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                tracing::warn!(target_addr = %self.target.address, error = %e, "scheduler task failed");
                false
            }
            Err(_) => {
                tracing::warn!(
                    target_addr = %self.target.address,
                    grace = ?self.shutdown_grace,
                    "scheduler did not stop in time; aborting"
                );
                self.task.abort();
                false
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{down, up, wait_until, ScriptedProbe, SlowProbe};
    use std::sync::Mutex;
    use tempfile::TempDir;

    const HOUR: Duration = Duration::from_secs(3600);

    fn store(tmp: &TempDir) -> Arc<LogStore> {
        Arc::new(LogStore::new(tmp.path().join("server_status.log")))
    }

    fn spawn<P: StatusProbe>(
        store: Arc<LogStore>,
        prober: Arc<P>,
        bus: StatusBus,
        interval: Duration,
    ) -> SchedulerHandle {
        Scheduler::new(
            Target::parse("A").unwrap(),
            store,
            prober,
            bus,
            WallClock::new("UTC"),
            interval,
        )
        .spawn(Duration::from_secs(2))
    }

    fn record_kinds(bus: &StatusBus) -> Arc<Mutex<Vec<StatusKind>>> {
        let kinds = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&kinds);
        bus.subscribe(move |event| sink.lock().unwrap().push(event.kind.clone()));
        kinds
    }

    #[tokio::test]
    async fn test_online_then_offline_notifications_and_log() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        let bus = StatusBus::new();
        let kinds = record_kinds(&bus);
        let prober = Arc::new(ScriptedProbe::new(vec![up("M")], down()));

        let interval = Duration::from_millis(20);
        let handle = spawn(Arc::clone(&store), Arc::clone(&prober), bus, interval);
        assert!(wait_until(|| prober.calls() >= 3, Duration::from_secs(5)).await);
        assert!(handle.stop().await);

        let kinds = kinds.lock().unwrap().clone();
        assert_eq!(kinds[0], StatusKind::CameOnline);
        assert!(matches!(kinds[1], StatusKind::Refreshed(ref s) if s.contains("online")));
        assert_eq!(kinds[2], StatusKind::WentOffline);
        let offline_count = kinds.iter().filter(|k| **k == StatusKind::WentOffline).count();
        assert!(offline_count >= 2, "offline is reported on every offline probe");

        let lines = store.read_all().unwrap();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("* ~ "), "first session start is estimated");
        assert!(!lines[0].contains("open"));
    }

    #[tokio::test]
    async fn test_force_check_cuts_wait_short() {
        let tmp = TempDir::new().unwrap();
        let prober = Arc::new(ScriptedProbe::new(vec![], down()));
        let handle = spawn(store(&tmp), Arc::clone(&prober), StatusBus::new(), HOUR);

        assert!(wait_until(|| prober.calls() == 1, Duration::from_secs(5)).await);
        handle.force_check();
        assert!(wait_until(|| prober.calls() == 2, Duration::from_secs(5)).await);
        assert!(handle.stop().await);
    }

    #[tokio::test]
    async fn test_stop_closes_open_session_with_estimated_end() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        let prober = Arc::new(ScriptedProbe::new(vec![], up("M")));
        let handle = spawn(Arc::clone(&store), Arc::clone(&prober), StatusBus::new(), HOUR);

        assert!(wait_until(|| prober.calls() == 1, Duration::from_secs(5)).await);
        assert!(handle.stop().await);

        let lines = store.read_all().unwrap();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("* | MOTD: M"), "got {}", lines[0]);
    }

    #[tokio::test]
    async fn test_stop_abandons_slow_probe() {
        let tmp = TempDir::new().unwrap();
        let prober = Arc::new(SlowProbe::new(Duration::from_secs(30)));
        let handle = spawn(store(&tmp), Arc::clone(&prober), StatusBus::new(), HOUR);

        assert!(wait_until(|| prober.started() == 1, Duration::from_secs(5)).await);
        let begun = std::time::Instant::now();
        assert!(handle.stop().await);
        assert!(begun.elapsed() < Duration::from_secs(2));
    }

    fn spawn_after_first<P: StatusProbe>(
        store: Arc<LogStore>,
        prober: Arc<P>,
        first: &SchedulerHandle,
    ) -> SchedulerHandle {
        Scheduler::new(
            Target::parse("A").unwrap(),
            store,
            prober,
            StatusBus::new(),
            WallClock::new("UTC"),
            HOUR,
        )
        .spawn_after(Duration::from_secs(2), vec![first.finished()])
    }

    #[tokio::test]
    async fn test_spawn_after_waits_for_previous_scheduler() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        let slow = Arc::new(SlowProbe::new(HOUR));
        let first = spawn(Arc::clone(&store), Arc::clone(&slow), StatusBus::new(), HOUR);
        assert!(wait_until(|| slow.started() == 1, Duration::from_secs(5)).await);

        let prober = Arc::new(ScriptedProbe::new(vec![], up("M")));
        let second = spawn_after_first(Arc::clone(&store), Arc::clone(&prober), &first);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(prober.calls(), 0);

        let first_done = first.finished();
        assert!(!first_done.is_done());
        assert!(first.stop().await);
        assert!(first_done.is_done());

        assert!(wait_until(|| prober.calls() == 1, Duration::from_secs(5)).await);
        assert!(second.stop().await);
        assert_eq!(store.read_all().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_stop_while_waiting_for_previous_scheduler() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        let slow = Arc::new(SlowProbe::new(HOUR));
        let first = spawn(Arc::clone(&store), Arc::clone(&slow), StatusBus::new(), HOUR);

        let prober = Arc::new(ScriptedProbe::new(vec![], up("M")));
        let second = spawn_after_first(Arc::clone(&store), Arc::clone(&prober), &first);
        assert!(second.stop().await);
        assert_eq!(prober.calls(), 0);

        assert!(first.stop().await);
        assert!(store.read_all().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_log_failure_is_published() {
        let tmp = TempDir::new().unwrap();
        let blocker = tmp.path().join("file");
        std::fs::write(&blocker, "x").unwrap();
        let store = Arc::new(LogStore::new(blocker.join("server_status.log")));

        let bus = StatusBus::new();
        let kinds = record_kinds(&bus);
        let prober = Arc::new(ScriptedProbe::new(vec![], up("M")));
        let handle = spawn(store, Arc::clone(&prober), bus, HOUR);

        assert!(wait_until(|| prober.calls() == 1, Duration::from_secs(5)).await);
        assert!(handle.stop().await);

        let kinds = kinds.lock().unwrap().clone();
        let errors = kinds
            .iter()
            .filter(|k| matches!(k, StatusKind::LogError(_)))
            .count();
        // One for the open write, one for the close on stop.
        assert_eq!(errors, 2);
        assert!(kinds.contains(&StatusKind::CameOnline));
    }

    #[tokio::test]
    async fn test_dropping_handle_stops_loop() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        let prober = Arc::new(ScriptedProbe::new(vec![], up("M")));
        let handle = spawn(Arc::clone(&store), Arc::clone(&prober), StatusBus::new(), HOUR);

        assert!(wait_until(|| prober.calls() == 1, Duration::from_secs(5)).await);
        drop(handle);
        let closed = wait_until(
            || {
                store
                    .read_all()
                    .map(|l| l.len() == 1 && !l[0].contains("~ open"))
                    .unwrap_or(false)
            },
            Duration::from_secs(5),
        )
        .await;
        assert!(closed);
    }
}
