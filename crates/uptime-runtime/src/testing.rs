//! Probes and helpers shared by the runtime tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use uptime_core::models::{ProbeResult, ServerStatus, Target};
use uptime_core::motd::Motd;

use crate::protocol::StatusProbe;

pub fn up(motd: &str) -> ProbeResult {
    ProbeResult::Online(ServerStatus {
        version: "1.20.4".into(),
        protocol_number: 765,
        motd: Motd::PlainText(motd.into()),
        players_online: 2,
        players_max: 20,
        player_sample: vec![],
        favicon: None,
        ping_millis: 12.5,
    })
}

pub fn down() -> ProbeResult {
    ProbeResult::offline("connection refused")
}

/// Poll `condition` every 10 ms until it holds or `limit` elapses.
pub async fn wait_until(mut condition: impl FnMut() -> bool, limit: Duration) -> bool {
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Returns queued results in order, then `fallback` forever.
pub struct ScriptedProbe {
    script: Mutex<VecDeque<ProbeResult>>,
    fallback: ProbeResult,
    calls: AtomicUsize,
}

impl ScriptedProbe {
    pub fn new(script: Vec<ProbeResult>, fallback: ProbeResult) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl StatusProbe for ScriptedProbe {
    async fn probe(&self, _target: &Target) -> ProbeResult {
        let next = self.script.lock().unwrap().pop_front();
        let result = next.unwrap_or_else(|| self.fallback.clone());
        self.calls.fetch_add(1, Ordering::SeqCst);
        result
    }
}

/// Never answers within any reasonable test window.
pub struct SlowProbe {
    delay: Duration,
    started: AtomicUsize,
}

impl SlowProbe {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            started: AtomicUsize::new(0),
        }
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }
}

impl StatusProbe for SlowProbe {
    async fn probe(&self, _target: &Target) -> ProbeResult {
        self.started.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        ProbeResult::offline("slow")
    }
}
