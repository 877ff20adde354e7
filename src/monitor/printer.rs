use std::{
    fmt,
    net::IpAddr,
    str::FromStr,
    sync::{Arc, Mutex as SyncMutex, PoisonError},
};

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde_derive::Serialize;
use tokio::sync::Mutex;

use crate::device::{DeviceProbe, DeviceSnapshot, StatusIcon};

use super::events::{EventBus, MonitorEvent};

/// Registry key of a printer: its network address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct PrinterId(IpAddr);

impl PrinterId {
    pub fn new(address: IpAddr) -> Self {
        PrinterId(address)
    }

    pub fn address(&self) -> IpAddr {
        self.0
    }
}

impl From<IpAddr> for PrinterId {
    fn from(address: IpAddr) -> Self {
        PrinterId(address)
    }
}

impl FromStr for PrinterId {
    type Err = std::net::AddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(PrinterId)
    }
}

impl fmt::Display for PrinterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// What is known about a printer at one point in time.
///
/// Replaced as a whole on every refresh, so a reader holding one never sees
/// fields from two different probes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PrinterSnapshot {
    /// `None` until the first refresh completes.
    pub status: Option<StatusIcon>,
    /// Details of the last successful probe. Kept when later probes fail.
    pub device: Option<DeviceSnapshot>,
    pub last_error: Option<String>,
    pub last_attempt: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
}

impl PrinterSnapshot {
    fn succeeded(device: DeviceSnapshot, at: DateTime<Utc>) -> Self {
        PrinterSnapshot {
            status: Some(device.status_icon()),
            device: Some(device),
            last_error: None,
            last_attempt: Some(at),
            last_success: Some(at),
            consecutive_failures: 0,
        }
    }

    fn failed(&self, status: StatusIcon, error: String, at: DateTime<Utc>) -> Self {
        PrinterSnapshot {
            status: Some(status),
            device: self.device.clone(),
            last_error: Some(error),
            last_attempt: Some(at),
            last_success: self.last_success,
            consecutive_failures: self.consecutive_failures.saturating_add(1),
        }
    }
}

pub struct Printer {
    id: PrinterId,
    name: String,
    probe: Arc<dyn DeviceProbe>,
    snapshot: ArcSwap<PrinterSnapshot>,
    // Serializes refreshes so the snapshot has a single writer.
    refresh_lock: Mutex<()>,
    // Set once the printer leaves the registry. Guards event emission so
    // `Updated` never follows `Removed`.
    retired: SyncMutex<bool>,
    events: EventBus,
}

impl Printer {
    pub(crate) fn new(name: String, id: PrinterId, probe: Arc<dyn DeviceProbe>, events: EventBus) -> Self {
        Printer {
            id,
            name,
            probe,
            snapshot: ArcSwap::from_pointee(PrinterSnapshot::default()),
            refresh_lock: Mutex::new(()),
            retired: SyncMutex::new(false),
            events,
        }
    }

    pub fn id(&self) -> PrinterId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> IpAddr {
        self.id.address()
    }

    pub fn snapshot(&self) -> Arc<PrinterSnapshot> {
        self.snapshot.load_full()
    }

    /// Probes the device once and swaps in the resulting snapshot.
    ///
    /// Returns whether the probe succeeded. A failed probe only changes the
    /// status and failure bookkeeping; the last known device details stay
    /// visible. Emits exactly one [`MonitorEvent::Updated`] either way,
    /// unless the printer was removed meanwhile.
    pub async fn refresh(&self) -> bool {
        let _guard = self.refresh_lock.lock().await;

        let result = self.probe.probe(self.address()).await;
        let now = Utc::now();
        let previous = self.snapshot.load();

        let (next, succeeded) = match result {
            Ok(device) => {
                debug!("Printer {} ({}) refreshed: {}, ink {}%", self.name, self.id, device.feedback, device.ink);
                (PrinterSnapshot::succeeded(device, now), true)
            }
            Err(e) => {
                // Offline devices are routine; only warn when a printer goes away.
                if previous.consecutive_failures == 0 {
                    warn!("Printer {} ({}) refresh failed: {}", self.name, self.id, e);
                } else {
                    debug!("Printer {} ({}) still failing: {}", self.name, self.id, e);
                }
                (previous.failed(e.status_icon(), e.to_string(), now), false)
            }
        };

        self.snapshot.store(Arc::new(next));
        let retired = self.retired.lock().unwrap_or_else(PoisonError::into_inner);
        if !*retired {
            self.events.emit(MonitorEvent::Updated(self.id));
        }
        succeeded
    }

    /// Marks the printer as removed and emits [`MonitorEvent::Removed`].
    /// Refreshes that finish afterwards stay silent.
    pub(crate) fn retire(&self) {
        let mut retired = self.retired.lock().unwrap_or_else(PoisonError::into_inner);
        *retired = true;
        self.events.emit(MonitorEvent::Removed(self.id));
    }
}

impl fmt::Debug for Printer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Printer")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("snapshot", &self.snapshot.load())
            .finish()
    }
}
