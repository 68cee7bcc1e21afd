use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{MonitorError, Result};
use crate::models::Target;

/// Directory under the home directory holding settings and the default log.
pub const APP_DIR_NAME: &str = ".uptime-monitor";

// ── Defaults ───────────────────────────────────────────────────────────────────

fn default_check_interval() -> u64 {
    180
}
fn default_status_timeout() -> u64 {
    5
}
fn default_ping_timeout() -> u64 {
    3
}
fn default_protocol_version() -> i32 {
    404
}
fn default_shutdown_grace() -> u64 {
    2
}
fn default_timezone() -> String {
    "auto".to_string()
}
fn default_true() -> bool {
    true
}
fn default_targets() -> Vec<TargetSettings> {
    vec![TargetSettings::new("127.0.0.1:25565")]
}

/// Root of the per-user application directory (`~/.uptime-monitor`).
pub fn app_dir() -> PathBuf {
    app_dir_in(&dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
}

/// Application directory rooted at `base_dir` (used for testing).
pub fn app_dir_in(base_dir: &Path) -> PathBuf {
    base_dir.join(APP_DIR_NAME)
}

fn default_log_file() -> PathBuf {
    app_dir().join("server_status.log")
}

// ── TargetSettings ─────────────────────────────────────────────────────────────

/// Per-target options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetSettings {
    /// `host` or `host:port`.
    pub address: String,
    /// Show a blocking popup when the target comes online.
    #[serde(default = "default_true")]
    pub popup_on_online: bool,
    /// Emit a notification when the target comes online.
    #[serde(default = "default_true")]
    pub notify_online: bool,
    /// Emit a notification when the target goes offline.
    #[serde(default = "default_true")]
    pub notify_offline: bool,
    /// Do not treat MOTD changes as restarts.
    #[serde(default)]
    pub ignore_motd_changes: bool,
}

impl TargetSettings {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            popup_on_online: true,
            notify_online: true,
            notify_offline: true,
            ignore_motd_changes: false,
        }
    }

    /// Resolve into a [`Target`], carrying the ignore-MOTD flag along.
    pub fn to_target(&self) -> Result<Target> {
        Ok(Target::parse(&self.address)?.with_ignore_motd_changes(self.ignore_motd_changes))
    }
}

// ── MonitorSettings ────────────────────────────────────────────────────────────

/// Every recognised option, defaulted at construction.
///
/// Read from `~/.uptime-monitor/settings.json`; keys missing from the file
/// keep their defaults. The monitor never writes this file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    /// Seconds between probes of one target.
    pub check_interval_secs: u64,
    /// Location of the append-only uptime log.
    pub log_file: PathBuf,
    /// Timeout for the full status query.
    pub status_timeout_secs: u64,
    /// Timeout for the legacy latency ping.
    pub ping_timeout_secs: u64,
    /// Protocol version announced in the handshake.
    pub protocol_version: i32,
    /// How long shutdown waits for each target's final log write.
    pub shutdown_grace_secs: u64,
    /// IANA timezone for log timestamps, or `"auto"`.
    pub timezone: String,
    pub show_startup_notification: bool,
    pub show_refresh_notification: bool,
    pub targets: Vec<TargetSettings>,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            check_interval_secs: default_check_interval(),
            log_file: default_log_file(),
            status_timeout_secs: default_status_timeout(),
            ping_timeout_secs: default_ping_timeout(),
            protocol_version: default_protocol_version(),
            shutdown_grace_secs: default_shutdown_grace(),
            timezone: default_timezone(),
            show_startup_notification: true,
            show_refresh_notification: true,
            targets: default_targets(),
        }
    }
}

impl MonitorSettings {
    /// Default settings file path: `~/.uptime-monitor/settings.json`.
    pub fn config_path() -> PathBuf {
        app_dir().join("settings.json")
    }

    /// Load settings from `path`. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&content)
            .map_err(|e| MonitorError::Config(format!("{}: {e}", path.display())))
    }

    /// Like [`MonitorSettings::load_from`] but falls back to defaults on a
    /// broken file. The error is handed back so the caller can report it once
    /// logging is up.
    pub fn load_or_default(path: &Path) -> (Self, Option<MonitorError>) {
        match Self::load_from(path) {
            Ok(settings) => (settings, None),
            Err(e) => (Self::default(), Some(e)),
        }
    }

    /// Parse every configured target, skipping (and logging) invalid ones.
    pub fn resolved_targets(&self) -> Vec<Target> {
        self.targets
            .iter()
            .filter_map(|t| match t.to_target() {
                Ok(target) => Some(target),
                Err(e) => {
                    tracing::warn!(error = %e, "skipping invalid target");
                    None
                }
            })
            .collect()
    }

    /// Options for `address`, or the defaults when it is not configured.
    pub fn target_settings(&self, address: &str) -> TargetSettings {
        self.targets
            .iter()
            .find(|t| t.address == address)
            .cloned()
            .unwrap_or_else(|| TargetSettings::new(address))
    }
}

// ── SharedSettings ─────────────────────────────────────────────────────────────

/// Settings shared between the monitor facade and its schedulers.
///
/// All reads take a snapshot and all writes are a read-modify-write under the
/// single lock.
#[derive(Debug, Clone, Default)]
pub struct SharedSettings {
    inner: Arc<Mutex<MonitorSettings>>,
}

impl SharedSettings {
    pub fn new(settings: MonitorSettings) -> Self {
        Self {
            inner: Arc::new(Mutex::new(settings)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MonitorSettings> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Clone of the current settings.
    pub fn snapshot(&self) -> MonitorSettings {
        self.lock().clone()
    }

    /// Apply `f` to the settings while holding the lock.
    pub fn update<R>(&self, f: impl FnOnce(&mut MonitorSettings) -> R) -> R {
        let mut guard = self.lock();
        f(&mut guard)
    }
}

// ── Cli ────────────────────────────────────────────────────────────────────────

/// Uptime monitor for game servers speaking the server-list status protocol
#[derive(Parser, Debug, Clone)]
#[command(
    name = "uptime-monitor",
    about = "Track game-server uptime and report online time per day",
    version
)]
pub struct Cli {
    /// Settings file (defaults to ~/.uptime-monitor/settings.json)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// What to do
    #[arg(long, default_value = "watch", value_parser = ["watch", "daily", "weekly", "monthly", "sessions"])]
    pub view: String,

    /// Seconds between probes (overrides the settings file)
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..=86400))]
    pub interval: Option<u64>,

    /// Uptime log path (overrides the settings file)
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Target address; repeat to monitor several (replaces configured targets)
    #[arg(long = "target")]
    pub targets: Vec<String>,

    /// Do not treat MOTD changes as restarts for --target entries
    #[arg(long)]
    pub ignore_motd: bool,

    /// Timezone for log timestamps
    #[arg(long)]
    pub timezone: Option<String>,

    /// Restrict report views to one target address
    #[arg(long)]
    pub filter_target: Option<String>,

    /// Restrict report views to the last N days
    #[arg(long)]
    pub days: Option<u32>,

    /// Logging level
    #[arg(long, default_value = "INFO", value_parser = ["DEBUG", "INFO", "WARNING", "ERROR"])]
    pub log_level: String,

    /// Diagnostic log file (separate from the uptime log)
    #[arg(long)]
    pub diagnostic_log: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,
}

impl Cli {
    /// Parse process arguments and resolve the effective settings.
    ///
    /// The third element is the error that made the settings file fall back
    /// to defaults, if any.
    pub fn load() -> (Self, MonitorSettings, Option<MonitorError>) {
        Self::load_from_args(std::env::args_os())
    }

    /// Same as [`Cli::load`] with an explicit argument list.
    pub fn load_from_args<I, T>(args: I) -> (Self, MonitorSettings, Option<MonitorError>)
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let mut cli = Cli::parse_from(args);
        if cli.debug {
            cli.log_level = "DEBUG".to_string();
        }
        let path = cli.config.clone().unwrap_or_else(MonitorSettings::config_path);
        let (mut settings, settings_error) = MonitorSettings::load_or_default(&path);
        cli.apply(&mut settings);
        (cli, settings, settings_error)
    }

    /// Overlay explicitly given flags onto `settings` (CLI always wins).
    pub fn apply(&self, settings: &mut MonitorSettings) {
        if let Some(interval) = self.interval {
            settings.check_interval_secs = interval;
        }
        if let Some(path) = &self.log_file {
            settings.log_file = path.clone();
        }
        if let Some(tz) = &self.timezone {
            settings.timezone = tz.clone();
        }
        if !self.targets.is_empty() {
            settings.targets = self
                .targets
                .iter()
                .map(|address| TargetSettings {
                    ignore_motd_changes: self.ignore_motd,
                    ..TargetSettings::new(address.clone())
                })
                .collect();
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
