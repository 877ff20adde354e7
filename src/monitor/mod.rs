//! The polling core: a registry of printers, a scheduler refreshing them and
//! an event bus telling observers what changed.
//!
//! Observers subscribe with [`PrintMonitor::subscribe`] and read state through
//! [`PrintMonitor::list`] or [`PrintMonitor::get`]. Events may arrive on any
//! thread; moving them onto a UI thread is up to the subscriber.

pub mod events;
pub mod printer;
pub mod registry;
pub mod scheduler;

#[cfg(test)]
pub(crate) mod fakes;

use std::{sync::Arc, time::Duration};

use log::debug;
use snafu::ensure;
use tokio::sync::broadcast;

use crate::{
    config::{models::Poll, Settings},
    device::DeviceProbe,
    ipp_client::IppProbe,
    report_client::{
        client::HttpClientError, fetcher::UnknownPrinterSnafu, HttpReportFetcher, ReportError, ReportFetcher,
    },
};

pub use events::{EventBus, MonitorEvent};
pub use printer::{Printer, PrinterId, PrinterSnapshot};
pub use registry::{PrinterRegistry, PrinterView, ValidationError};
pub use scheduler::{CycleReport, Scheduler, SchedulerError};

pub struct PrintMonitor {
    registry: Arc<PrinterRegistry>,
    scheduler: Scheduler,
    reports: Arc<dyn ReportFetcher>,
    events: EventBus,
    settings: Poll,
}

impl PrintMonitor {
    pub fn new(probe: Arc<dyn DeviceProbe>, reports: Arc<dyn ReportFetcher>, settings: Poll) -> Self {
        let events = EventBus::new(settings.event_capacity);
        let registry = Arc::new(PrinterRegistry::new(probe, events.clone()));
        let scheduler = Scheduler::new(registry.clone(), &settings);
        PrintMonitor {
            registry,
            scheduler,
            reports,
            events,
            settings,
        }
    }

    /// Wires the IPP probe and the HTTP report fetcher from configuration.
    pub fn from_settings(settings: &Settings) -> Result<Self, HttpClientError> {
        let probe = Arc::new(IppProbe::new(&settings.probe));
        let reports = Arc::new(HttpReportFetcher::new(&settings.report)?);
        Ok(PrintMonitor::new(probe, reports, settings.poll.clone()))
    }

    /// Registers a printer and, when enabled, kicks off a best-effort first
    /// refresh in the background. The printer is listed before that refresh
    /// starts.
    pub fn add_printer(&self, name: &str, address: &str) -> Result<PrinterId, ValidationError> {
        let id = self.registry.add(name, address)?;

        if self.settings.refresh_on_add {
            if let Some(printer) = self.registry.get(id) {
                if !self.scheduler.spawn_refresh(printer) {
                    debug!("No runtime, {} waits for the next cycle", id);
                }
            }
        }

        Ok(id)
    }

    pub fn remove_printer(&self, id: PrinterId) -> bool {
        self.registry.remove(id)
    }

    /// Refreshes one printer now. `None` if it is not registered.
    pub async fn refresh_printer(&self, id: PrinterId) -> Option<bool> {
        let printer = self.registry.get(id)?;
        Some(printer.refresh().await)
    }

    pub fn list(&self) -> Vec<PrinterView> {
        self.registry.list()
    }

    pub fn get(&self, id: PrinterId) -> Option<PrinterView> {
        self.registry.get(id).map(|printer| PrinterView {
            id,
            name: printer.name().to_string(),
            snapshot: printer.snapshot(),
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.events.subscribe()
    }

    /// Downloads the usage report of a registered printer. The caller decides
    /// where the bytes go.
    pub async fn fetch_report(&self, id: PrinterId) -> Result<Vec<u8>, ReportError> {
        ensure!(self.registry.get(id).is_some(), UnknownPrinterSnafu { address: id.address() });
        self.reports.fetch_report(id.address()).await
    }

    pub fn start(&self, interval: Duration) -> Result<(), SchedulerError> {
        self.scheduler.start(interval)
    }

    pub fn start_with_default_interval(&self) -> Result<(), SchedulerError> {
        self.scheduler.start(self.settings.interval)
    }

    pub async fn stop(&self) {
        self.scheduler.stop().await
    }

    pub async fn run_cycle(&self) -> CycleReport {
        self.scheduler.run_cycle().await
    }

    pub fn last_cycle(&self) -> Option<CycleReport> {
        self.scheduler.last_report()
    }

    pub fn registry(&self) -> &Arc<PrinterRegistry> {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::{
        device::StatusIcon,
        monitor::fakes::{device, CannedReports, ScriptedProbe},
    };

    fn monitor(probe: &Arc<ScriptedProbe>, reports: &Arc<CannedReports>, refresh_on_add: bool) -> PrintMonitor {
        let settings = Poll {
            refresh_on_add,
            ..Default::default()
        };
        PrintMonitor::new(probe.clone(), reports.clone(), settings)
    }

    #[tokio::test]
    async fn added_event_comes_before_the_first_update() {
        let probe = Arc::new(ScriptedProbe::default());
        let reports = Arc::new(CannedReports::new(b"%PDF-1.4"));
        let monitor = monitor(&probe, &reports, true);
        let mut events = monitor.subscribe();
        probe.succeed("10.0.0.5".parse().unwrap(), device("X1", 45));

        let id = monitor.add_printer("Lobby-1", "10.0.0.5").unwrap();
        assert_eq!(monitor.get(id).unwrap().snapshot.status, None);

        assert_eq!(events.recv().await.unwrap(), MonitorEvent::Added(id));
        assert_eq!(events.recv().await.unwrap(), MonitorEvent::Updated(id));
        assert_eq!(monitor.get(id).unwrap().snapshot.status, Some(StatusIcon::Ink60));
    }

    #[tokio::test]
    async fn slow_initial_refresh_does_not_block_add() {
        let probe = Arc::new(ScriptedProbe::default());
        let reports = Arc::new(CannedReports::new(b"%PDF-1.4"));
        let monitor = monitor(&probe, &reports, true);
        probe.delay("10.0.0.5".parse().unwrap(), Duration::from_secs(3600));

        let id = monitor.add_printer("Lobby-1", "10.0.0.5").unwrap();
        assert_eq!(monitor.list().len(), 1);
        assert_eq!(monitor.list()[0].id, id);
    }

    #[test]
    fn add_without_runtime_skips_initial_refresh() {
        let probe = Arc::new(ScriptedProbe::default());
        let reports = Arc::new(CannedReports::new(b"%PDF-1.4"));
        let monitor = monitor(&probe, &reports, true);

        let id = monitor.add_printer("Lobby-1", "10.0.0.5").unwrap();
        assert_eq!(probe.calls(id.address()), 0);
    }

    #[tokio::test]
    async fn report_of_unknown_printer_is_rejected() {
        let probe = Arc::new(ScriptedProbe::default());
        let reports = Arc::new(CannedReports::new(b"%PDF-1.4"));
        let monitor = monitor(&probe, &reports, false);

        let result = monitor.fetch_report("10.0.0.5".parse().unwrap()).await;
        assert!(matches!(result, Err(ReportError::UnknownPrinter { .. })));
        assert_eq!(reports.fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn report_errors_reach_the_caller() {
        let probe = Arc::new(ScriptedProbe::default());
        let reports = Arc::new(CannedReports::new(b""));
        let monitor = monitor(&probe, &reports, false);
        let id = monitor.add_printer("Lobby-1", "10.0.0.5").unwrap();

        let result = monitor.fetch_report(id).await;
        assert!(matches!(result, Err(ReportError::EmptyReport { .. })));
    }

    #[tokio::test]
    async fn refresh_printer_reports_outcome() {
        let probe = Arc::new(ScriptedProbe::default());
        let reports = Arc::new(CannedReports::new(b"%PDF-1.4"));
        let monitor = monitor(&probe, &reports, false);
        let id = monitor.add_printer("Lobby-1", "10.0.0.5").unwrap();

        assert_eq!(monitor.refresh_printer(id).await, Some(false));
        assert_eq!(monitor.get(id).unwrap().snapshot.status, Some(StatusIcon::Offline));
        assert_eq!(monitor.refresh_printer("10.0.0.6".parse().unwrap()).await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_cuts_off_a_hanging_initial_refresh() {
        let probe = Arc::new(ScriptedProbe::default());
        let reports = Arc::new(CannedReports::new(b"%PDF-1.4"));
        let monitor = monitor(&probe, &reports, true);
        let address = "10.0.0.5".parse().unwrap();
        probe.succeed(address, device("X1", 45));
        probe.delay(address, Duration::from_secs(3600));

        let id = monitor.add_printer("Lobby-1", "10.0.0.5").unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        monitor.stop().await;
        tokio::time::sleep(Duration::from_secs(7200)).await;

        assert_eq!(probe.calls(address), 1);
        assert_eq!(monitor.get(id).unwrap().snapshot.status, None);
    }

    #[tokio::test(start_paused = true)]
    async fn removal_during_a_refresh_is_the_last_event() {
        let probe = Arc::new(ScriptedProbe::default());
        let reports = Arc::new(CannedReports::new(b"%PDF-1.4"));
        let monitor = Arc::new(monitor(&probe, &reports, false));
        let id = monitor.add_printer("Lobby-1", "10.0.0.5").unwrap();
        probe.succeed(id.address(), device("X1", 45));
        probe.delay(id.address(), Duration::from_secs(1));
        let mut events = monitor.subscribe();

        let refresh = tokio::spawn({
            let monitor = monitor.clone();
            async move { monitor.refresh_printer(id).await }
        });
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(monitor.remove_printer(id));

        assert_eq!(refresh.await.unwrap(), Some(true));
        assert_eq!(events.recv().await.unwrap(), MonitorEvent::Removed(id));
        assert!(events.try_recv().is_err());
    }
}
