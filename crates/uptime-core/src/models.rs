use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::{MonitorError, Result};
use crate::motd::Motd;

/// Port assumed when an address carries none (or an unparsable one).
pub const DEFAULT_PORT: u16 = 25565;

/// Value returned by a latency probe that could not complete.
pub const PING_UNKNOWN: f64 = -1.0;

/// A monitored server endpoint.
///
/// `address` is kept exactly as configured because it is the key written to
/// the uptime log.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Target {
    pub address: String,
    pub host: String,
    pub port: u16,
    /// When set, a changed MOTD is not treated as a restart.
    #[serde(default)]
    pub ignore_motd_changes: bool,
}

impl Target {
    /// Parse `host`, `host:port` or `[v6-host]:port`.
    ///
    /// A port that is not a valid `u16` falls back to [`DEFAULT_PORT`]. An
    /// empty host is rejected.
    pub fn parse(address: &str) -> Result<Self> {
        let address = address.trim();
        let (host, port) = split_host_port(address);
        if host.is_empty() {
            return Err(MonitorError::InvalidAddress(address.to_string()));
        }
        Ok(Self {
            address: address.to_string(),
            host: host.to_string(),
            port,
            ignore_motd_changes: false,
        })
    }

    /// Builder-style toggle for [`Target::ignore_motd_changes`].
    pub fn with_ignore_motd_changes(mut self, ignore: bool) -> Self {
        self.ignore_motd_changes = ignore;
        self
    }
}

fn split_host_port(address: &str) -> (&str, u16) {
    if let Some(rest) = address.strip_prefix('[') {
        if let Some((host, tail)) = rest.split_once(']') {
            let port = tail
                .strip_prefix(':')
                .and_then(|p| p.parse().ok())
                .unwrap_or(DEFAULT_PORT);
            return (host, port);
        }
    }
    match address.split_once(':') {
        // A bare IPv6 literal has several colons; treat it as host only.
        Some((host, port)) if !port.contains(':') => {
            (host, port.parse().unwrap_or(DEFAULT_PORT))
        }
        Some(_) => (address, DEFAULT_PORT),
        None => (address, DEFAULT_PORT),
    }
}

/// Everything an online status query reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerStatus {
    /// Human-readable version name, `"Unknown"` when absent.
    pub version: String,
    /// Protocol number, `-1` when absent.
    pub protocol_number: i32,
    pub motd: Motd,
    pub players_online: i64,
    pub players_max: i64,
    /// Player names from `players.sample`, in server order.
    #[serde(default)]
    pub player_sample: Vec<String>,
    /// Decoded PNG bytes of the server icon.
    #[serde(default, skip_serializing)]
    pub favicon: Option<Vec<u8>>,
    /// Latency from the legacy ping; [`PING_UNKNOWN`] when it failed.
    pub ping_millis: f64,
}

impl ServerStatus {
    /// Latency in milliseconds, or `None` when the probe failed.
    pub fn latency(&self) -> Option<f64> {
        (self.ping_millis >= 0.0).then_some(self.ping_millis)
    }

    /// Plain-text MOTD with formatting codes removed.
    pub fn motd_plain(&self) -> String {
        self.motd.plain_text()
    }
}

/// Outcome of a single probe. Produced fresh on every poll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum ProbeResult {
    Online(ServerStatus),
    Offline { error_reason: String },
}

impl ProbeResult {
    pub fn offline(reason: impl Into<String>) -> Self {
        ProbeResult::Offline {
            error_reason: reason.into(),
        }
    }

    pub fn is_online(&self) -> bool {
        matches!(self, ProbeResult::Online(_))
    }

    pub fn status(&self) -> Option<&ServerStatus> {
        match self {
            ProbeResult::Online(status) => Some(status),
            ProbeResult::Offline { .. } => None,
        }
    }

    pub fn error_reason(&self) -> Option<&str> {
        match self {
            ProbeResult::Online(_) => None,
            ProbeResult::Offline { error_reason } => Some(error_reason),
        }
    }
}

/// One contiguous online interval of a target, as recorded in the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Target address as written in the log.
    pub target: String,
    pub start: NaiveDateTime,
    /// `None` while the session is still open.
    pub end: Option<NaiveDateTime>,
    /// Plain-text MOTD, single line.
    pub motd: String,
    /// The start preceded tracker start-up and is therefore approximate.
    pub start_estimated: bool,
    /// The end followed tracker shutdown and is therefore approximate.
    pub end_estimated: bool,
}

impl Session {
    /// A freshly opened session.
    pub fn open(
        target: impl Into<String>,
        start: NaiveDateTime,
        motd: impl Into<String>,
        start_estimated: bool,
    ) -> Self {
        Self {
            target: target.into(),
            start,
            end: None,
            motd: motd.into(),
            start_estimated,
            end_estimated: false,
        }
    }

    /// Copy of this session closed at `end`.
    pub fn closed_at(&self, end: NaiveDateTime, end_estimated: bool) -> Self {
        Self {
            end: Some(end),
            end_estimated,
            ..self.clone()
        }
    }

    pub fn is_open(&self) -> bool {
        self.end.is_none()
    }

    /// Length in whole seconds; `0` while open.
    pub fn duration_seconds(&self) -> i64 {
        self.end
            .map(|end| (end - self.start).num_seconds().max(0))
            .unwrap_or(0)
    }

    /// End used for aggregation: the real end, or `now` for an open session.
    pub fn effective_end(&self, now: NaiveDateTime) -> NaiveDateTime {
        self.end.unwrap_or(now)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
