mod bootstrap;
mod notifier;
mod report;

use anyhow::{bail, Result};
use uptime_core::settings::{Cli, MonitorSettings, SharedSettings};
use uptime_runtime::monitor::UptimeMonitor;

use crate::report::ReportView;

#[tokio::main]
async fn main() -> Result<()> {
    let (cli, settings, settings_error) = Cli::load();

    bootstrap::ensure_directories(&settings.log_file)?;
    bootstrap::setup_logging(&cli.log_level, cli.diagnostic_log.as_ref())?;
    if let Some(e) = settings_error {
        tracing::warn!(error = %e, "using default settings");
    }

    tracing::info!("Uptime Monitor v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        "View: {}, interval: {}s, log: {}",
        cli.view,
        settings.check_interval_secs,
        settings.log_file.display()
    );

    match cli.view.as_str() {
        "watch" => watch(settings).await?,

        name => match ReportView::from_name(name) {
            Some(view) => {
                let monitor = UptimeMonitor::new(SharedSettings::new(settings));
                let now = monitor.now();
                let filter =
                    report::build_filter(cli.filter_target.as_deref(), cli.days, now.date());
                let log = monitor.reconstruct()?;
                print!("{}", report::render(view, &log, &filter, now));
            }
            None => eprintln!("Unknown view mode: {}", name),
        },
    }

    Ok(())
}

/// Run one scheduler per configured target until Ctrl+C, then stop them all.
async fn watch(settings: MonitorSettings) -> Result<()> {
    let shared = SharedSettings::new(settings);
    let monitor = UptimeMonitor::new(shared.clone());

    let notify_settings = shared.clone();
    monitor.subscribe(move |event| {
        let settings = notify_settings.snapshot();
        if let Some(notification) = notifier::notification_for(&settings, event) {
            notifier::emit(&notification);
        }
    });

    let handles = monitor.start_configured();
    if handles.is_empty() {
        bail!("no valid targets configured");
    }

    let snapshot = shared.snapshot();
    if snapshot.show_startup_notification {
        let addresses: Vec<String> = handles.iter().map(|h| h.address().to_string()).collect();
        println!("{}", notifier::startup_message(&snapshot, &addresses));
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("Ctrl+C received; stopping monitors");

    let clean = monitor.stop_all().await;
    if clean < handles.len() {
        tracing::warn!(
            stopped = clean,
            total = handles.len(),
            "some monitors did not stop in time; their sessions may remain open in the log"
        );
    }
    Ok(())
}
