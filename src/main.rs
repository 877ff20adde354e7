use std::{net::IpAddr, path::Path, sync::Arc};

use clap::Parser;
use cli::{Cli, Commands};
use log::{info, warn};
use printmon::{
    config::Settings,
    ipp_client::IppProbe,
    report_client::HttpReportFetcher,
    DeviceProbe, MonitorEvent, PrintMonitor, PrinterView, ReportFetcher,
};
use snafu::{ResultExt, Whatever};
use tokio::sync::broadcast::{error::RecvError, Receiver};

mod cli;

#[snafu::report]
#[tokio::main]
async fn main() -> Result<(), Whatever> {
    colog::init();

    let settings = printmon::config::load_config().whatever_context("Could not load configuration")?;
    let _sentry = settings
        .sentry_dsn
        .as_deref()
        .filter(|dsn| !dsn.is_empty())
        .map(|dsn| sentry::init((dsn, sentry::ClientOptions { release: sentry::release_name!(), ..Default::default() })));

    match Cli::parse().command.unwrap_or(Commands::Watch) {
        Commands::Watch => watch(&settings).await,
        Commands::Probe { address } => probe(&settings, address).await,
        Commands::Report { address, output } => report(&settings, address, &output).await,
    }
}

async fn watch(settings: &Settings) -> Result<(), Whatever> {
    let monitor = Arc::new(PrintMonitor::from_settings(settings).whatever_context("Could not set up the monitor")?);
    let events = monitor.subscribe();

    for (name, address) in settings.initial_printers() {
        if let Err(e) = monitor.add_printer(&name, &address) {
            warn!("Skipping printer '{}': {}", name, e);
        }
    }
    if monitor.registry().is_empty() {
        warn!("No printers configured, set PMON_PRINTERS to a list of name@address entries");
    }

    monitor.start_with_default_interval().whatever_context("Could not start polling")?;
    let logger = tokio::spawn(log_events(monitor.clone(), events));

    tokio::signal::ctrl_c().await.whatever_context("Could not listen for Ctrl-C")?;
    info!("Stopping, waiting for in-flight refreshes");
    monitor.stop().await;
    logger.abort();
    if let Some(cycle) = monitor.last_cycle() {
        info!(
            "Last cycle {}: {} of {} printers answered",
            cycle.cycle, cycle.succeeded, cycle.attempted
        );
    }
    Ok(())
}

async fn log_events(monitor: Arc<PrintMonitor>, mut events: Receiver<MonitorEvent>) {
    loop {
        match events.recv().await {
            Ok(event @ MonitorEvent::Updated(_)) => {
                if let Some(view) = monitor.get(event.printer()) {
                    log_status(&view);
                }
            }
            Ok(event @ MonitorEvent::Added(_)) => info!("Watching {}", event.printer()),
            Ok(event @ MonitorEvent::Removed(_)) => info!("No longer watching {}", event.printer()),
            Err(RecvError::Lagged(missed)) => warn!("Event log fell behind, missed {} events", missed),
            Err(RecvError::Closed) => break,
        }
    }
}

fn log_status(view: &PrinterView) {
    let Some(status) = view.snapshot.status else {
        info!("{} ({}): unknown", view.name, view.id);
        return;
    };
    if !status.is_reachable() {
        let error = view.snapshot.last_error.as_deref().unwrap_or_default();
        warn!("{} ({}): {} - {}", view.name, view.id, status, error);
        return;
    }
    let Some(device) = &view.snapshot.device else {
        return;
    };

    let gauges = format!(
        "ink {}%{}{}",
        device.ink,
        gauge(" fuser", device.fuser_wear),
        gauge(" maintenance", device.maintenance)
    );
    if device.needs_attention() {
        warn!("{} ({}): {} - {}, {}", view.name, view.id, status, device.feedback, gauges);
    } else {
        info!("{} ({}): {} - {}, {}, {}", view.name, view.id, status, device.feedback, gauges, device.model);
    }
}

fn gauge(label: &str, percent: Option<u8>) -> String {
    percent.map(|p| format!(",{} {}%", label, p)).unwrap_or_default()
}

async fn probe(settings: &Settings, address: IpAddr) -> Result<(), Whatever> {
    let snapshot = IppProbe::new(&settings.probe)
        .probe(address)
        .await
        .whatever_context("Probe failed")?;
    let json = serde_json::to_string_pretty(&snapshot).whatever_context("Could not encode snapshot")?;
    println!("{}", json);
    Ok(())
}

async fn report(settings: &Settings, address: IpAddr, output: &Path) -> Result<(), Whatever> {
    let fetcher = HttpReportFetcher::new(&settings.report).whatever_context("Could not set up the HTTP client")?;
    let report = fetcher.fetch_report(address).await.whatever_context("Could not fetch report")?;
    tokio::fs::write(output, &report)
        .await
        .with_whatever_context(|_| format!("Could not write {}", output.display()))?;
    info!("Wrote {} bytes to {}", report.len(), output.display());
    Ok(())
}
