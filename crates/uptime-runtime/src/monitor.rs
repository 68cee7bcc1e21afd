//! Application-facing facade over the per-target schedulers.
//!
//! [`UptimeMonitor`] owns the shared log store, the status bus and one
//! [`SchedulerHandle`] per running target. Everything a front end needs
//! (start/stop, forced checks, subscriptions, last known statuses and log
//! reconstruction) goes through it.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::NaiveDateTime;
use uptime_core::error::Result;
use uptime_core::models::{ProbeResult, Session, Target};
use uptime_core::settings::SharedSettings;
use uptime_core::time_utils::WallClock;
use uptime_data::aggregator::{DayAggregate, SessionFilter, UptimeAggregator};
use uptime_data::log_store::LogStore;
use uptime_data::reader::LogReconstructor;

use crate::events::{StatusBus, StatusEvent, StatusKind, SubscriptionId};
use crate::protocol::{ProtocolClient, StatusProbe};
use crate::scheduler::{Finished, Scheduler, SchedulerHandle};

/// Identifies a running target. Returned by [`UptimeMonitor::start`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TargetHandle {
    address: String,
}

impl TargetHandle {
    pub fn address(&self) -> &str {
        &self.address
    }
}

type StatusMap = Arc<Mutex<BTreeMap<String, ProbeResult>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ── UptimeMonitor ─────────────────────────────────────────────────────────────

pub struct UptimeMonitor<P: StatusProbe = ProtocolClient> {
    settings: SharedSettings,
    store: Arc<LogStore>,
    prober: Arc<P>,
    bus: StatusBus,
    clock: WallClock,
    schedulers: Mutex<HashMap<String, SchedulerHandle>>,
    /// Schedulers told to stop that may still be writing their final entry.
    stopping: Mutex<HashMap<String, Vec<Finished>>>,
    statuses: StatusMap,
}

impl UptimeMonitor<ProtocolClient> {
    /// Monitor that probes over the network with timeouts from `settings`.
    pub fn new(settings: SharedSettings) -> Self {
        let prober = ProtocolClient::from_settings(&settings.snapshot());
        Self::with_prober(settings, prober)
    }
}

impl<P: StatusProbe> UptimeMonitor<P> {
    pub fn with_prober(settings: SharedSettings, prober: P) -> Self {
        let snapshot = settings.snapshot();
        let store = Arc::new(LogStore::new(snapshot.log_file.clone()));
        let clock = WallClock::new(&snapshot.timezone);

        let bus = StatusBus::new();
        let statuses: StatusMap = Arc::default();
        let sink = Arc::clone(&statuses);
        bus.subscribe(move |event| {
            if let StatusKind::Refreshed(_) = event.kind {
                lock(&sink).insert(event.target.clone(), event.result.clone());
            }
        });

        Self {
            settings,
            store,
            prober: Arc::new(prober),
            bus,
            clock,
            schedulers: Mutex::new(HashMap::new()),
            stopping: Mutex::new(HashMap::new()),
            statuses,
        }
    }

    pub fn settings(&self) -> &SharedSettings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<LogStore> {
        &self.store
    }

    /// Current local wall-clock time, as written to the log.
    pub fn now(&self) -> NaiveDateTime {
        self.clock.now()
    }

    // ── Scheduling ────────────────────────────────────────────────────────

    /// Start monitoring `target`. Must be called inside a tokio runtime.
    ///
    /// Starting an address that is already running returns the existing
    /// handle, so a target never has two trackers writing to the log. An
    /// address that is still shutting down is started once the old
    /// scheduler has exited.
    pub fn start(&self, target: Target) -> TargetHandle {
        let handle = TargetHandle {
            address: target.address.clone(),
        };
        let mut schedulers = lock(&self.schedulers);
        if schedulers
            .get(&target.address)
            .is_some_and(|running| !running.is_finished())
        {
            tracing::debug!(target_addr = %target.address, "already monitoring");
            return handle;
        }

        let predecessors = {
            let mut stopping = lock(&self.stopping);
            stopping.retain(|_, pending| {
                pending.retain(|finished| !finished.is_done());
                !pending.is_empty()
            });
            stopping.get(&target.address).cloned().unwrap_or_default()
        };

        let settings = self.settings.snapshot();
        let interval = Duration::from_secs(settings.check_interval_secs.max(1));
        let grace = Duration::from_secs(settings.shutdown_grace_secs);
        let scheduler = Scheduler::new(
            target.clone(),
            Arc::clone(&self.store),
            Arc::clone(&self.prober),
            self.bus.clone(),
            self.clock,
            interval,
        );
        schedulers.insert(target.address, scheduler.spawn_after(grace, predecessors));
        handle
    }

    /// Start every valid target from the settings.
    pub fn start_configured(&self) -> Vec<TargetHandle> {
        self.settings
            .snapshot()
            .resolved_targets()
            .into_iter()
            .map(|target| self.start(target))
            .collect()
    }

    pub fn is_running(&self, handle: &TargetHandle) -> bool {
        lock(&self.schedulers)
            .get(&handle.address)
            .is_some_and(|running| !running.is_finished())
    }

    /// Addresses with a live scheduler, sorted.
    pub fn running_targets(&self) -> Vec<String> {
        let mut addresses: Vec<String> = lock(&self.schedulers)
            .iter()
            .filter(|(_, running)| !running.is_finished())
            .map(|(address, _)| address.clone())
            .collect();
        addresses.sort();
        addresses
    }

    /// Ask `handle`'s scheduler to probe now. Returns `false` if it is not
    /// running.
    pub fn force_check(&self, handle: &TargetHandle) -> bool {
        match lock(&self.schedulers).get(&handle.address) {
            Some(running) => {
                running.force_check();
                true
            }
            None => false,
        }
    }

    pub fn force_check_all(&self) {
        for running in lock(&self.schedulers).values() {
            running.force_check();
        }
    }

    /// Stop one target, waiting up to the shutdown grace for its final log
    /// write. Returns `false` if it was not running or did not stop cleanly.
    pub async fn stop(&self, handle: &TargetHandle) -> bool {
        let clean = match self.take_schedulers(|address| address == handle.address).pop() {
            Some(running) => running.stop().await,
            None => false,
        };
        if !self.is_running(handle) {
            lock(&self.statuses).remove(&handle.address);
        }
        clean
    }

    /// Stop every target. All stops are requested first, so one target that
    /// overruns its grace does not delay the others. Returns how many
    /// stopped cleanly.
    pub async fn stop_all(&self) -> usize {
        let running = self.take_schedulers(|_| true);

        for handle in &running {
            handle.request_stop();
        }
        let mut clean = 0;
        for handle in running {
            if handle.join().await {
                clean += 1;
            }
        }
        lock(&self.statuses).clear();
        tracing::info!(stopped = clean, "all monitoring stopped");
        clean
    }

    /// Remove the schedulers whose address matches, recording each as
    /// stopping until its task exits.
    fn take_schedulers(&self, matches: impl Fn(&str) -> bool) -> Vec<SchedulerHandle> {
        let mut schedulers = lock(&self.schedulers);
        let addresses: Vec<String> = schedulers
            .keys()
            .filter(|address| matches(address))
            .cloned()
            .collect();

        let mut stopping = lock(&self.stopping);
        addresses
            .into_iter()
            .filter_map(|address| {
                let running = schedulers.remove(&address)?;
                stopping.entry(address).or_default().push(running.finished());
                Some(running)
            })
            .collect()
    }

    // ── Observation ───────────────────────────────────────────────────────

    /// Register a callback for every [`StatusEvent`]. It runs on the
    /// scheduler task that produced the event.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&StatusEvent) + Send + Sync + 'static,
    {
        self.bus.subscribe(callback)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.bus.unsubscribe(id)
    }

    /// Last probe result per running target, keyed by address.
    pub fn statuses(&self) -> BTreeMap<String, ProbeResult> {
        lock(&self.statuses).clone()
    }

    /// Number of targets whose last probe was online.
    pub fn online_count(&self) -> usize {
        lock(&self.statuses)
            .values()
            .filter(|result| result.is_online())
            .count()
    }

    // ── Log access ────────────────────────────────────────────────────────

    /// Parse the uptime log.
    pub fn reconstruct(&self) -> Result<LogReconstructor> {
        LogReconstructor::load(&self.store)
    }

    /// All sessions in the log, in file order.
    pub fn read_log(&self) -> Result<Vec<Session>> {
        Ok(self.reconstruct()?.into_sessions())
    }

    /// Per-day online time, open sessions counted up to now.
    pub fn aggregate_by_day(&self, filter: &SessionFilter) -> Result<Vec<DayAggregate>> {
        let sessions = self.read_log()?;
        Ok(UptimeAggregator::aggregate_by_day(
            &sessions,
            filter,
            self.now(),
        ))
    }
}

impl<P: StatusProbe> std::fmt::Debug for UptimeMonitor<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UptimeMonitor")
            .field("log_file", &self.store.path())
            .field("running", &self.running_targets())
            .finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
