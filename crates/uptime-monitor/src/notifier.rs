//! Console notifications for the `watch` view.
//!
//! Which events are shown follows the settings: per-target
//! `notify_online` / `notify_offline` / `popup_on_online` and the global
//! `show_refresh_notification`. Log write failures are always shown.

use uptime_core::models::ProbeResult;
use uptime_core::settings::MonitorSettings;
use uptime_runtime::events::{StatusEvent, StatusKind};

/// How a notification is presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Plain,
    /// Framed so it stands out (targets with `popup_on_online`).
    Banner,
    /// Written to stderr.
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub channel: Channel,
    pub text: String,
}

impl Notification {
    fn plain(text: String) -> Self {
        Self {
            channel: Channel::Plain,
            text,
        }
    }
}

/// The notification to show for `event`, if any.
pub fn notification_for(settings: &MonitorSettings, event: &StatusEvent) -> Option<Notification> {
    let target = settings.target_settings(&event.target);
    let stamp = event.at.format("%Y-%m-%d %H:%M:%S");

    match &event.kind {
        StatusKind::CameOnline if target.notify_online => {
            let text = format!("{stamp} {} is online | {}", event.target, describe(&event.result));
            let channel = if target.popup_on_online {
                Channel::Banner
            } else {
                Channel::Plain
            };
            Some(Notification { channel, text })
        }
        StatusKind::Restarted if target.notify_online => Some(Notification::plain(format!(
            "{stamp} {} restarted | {}",
            event.target,
            describe(&event.result)
        ))),
        StatusKind::WentOffline if target.notify_offline => Some(Notification::plain(format!(
            "{stamp} {} is offline - {}",
            event.target,
            event.result.error_reason().unwrap_or("unknown")
        ))),
        StatusKind::Refreshed(summary) if settings.show_refresh_notification => {
            Some(Notification::plain(summary.clone()))
        }
        StatusKind::LogError(message) => Some(Notification {
            channel: Channel::Error,
            text: format!("{stamp} {}: uptime log error: {message}", event.target),
        }),
        _ => None,
    }
}

/// Print `notification` to the console.
pub fn emit(notification: &Notification) {
    match notification.channel {
        Channel::Plain => println!("{}", notification.text),
        Channel::Banner => {
            let rule = "=".repeat(notification.text.chars().count().min(78));
            println!("{rule}\n{}\n{rule}", notification.text);
        }
        Channel::Error => eprintln!("{}", notification.text),
    }
}

/// Line shown once when monitoring starts.
pub fn startup_message(settings: &MonitorSettings, addresses: &[String]) -> String {
    format!(
        "Monitoring {} target(s) every {}s: {} | uptime log: {}",
        addresses.len(),
        settings.check_interval_secs,
        addresses.join(", "),
        settings.log_file.display()
    )
}

fn describe(result: &ProbeResult) -> String {
    match result.status() {
        Some(status) => format!(
            "MOTD: {} | players {}/{} | version {}",
            status.motd_plain(),
            status.players_online,
            status.players_max,
            status.version
        ),
        None => "no status".to_string(),
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
