//! Scripted collaborators for unit tests.

use std::{
    net::IpAddr,
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::{
    device::{DeviceProbe, DeviceSnapshot, ProbeError, Tray},
    report_client::{ReportError, ReportFetcher},
};

pub fn device(model: &str, ink: u8) -> DeviceSnapshot {
    DeviceSnapshot {
        model: model.to_string(),
        device_type: "Monochrome laser".to_string(),
        speed: "40 ppm".to_string(),
        toner_capacity: "Black Cartridge".to_string(),
        ink,
        fuser_wear: Some(80),
        maintenance: Some(60),
        feedback: "Ready".to_string(),
        default_input: Tray {
            name: "Tray 1".to_string(),
            capacity_in_sheets: 250,
            media_size: "iso_a4_210x297mm".to_string(),
            media_type: "stationery".to_string(),
            status: "Ready".to_string(),
        },
        secondary_input: Tray::not_installed(),
        default_output: Tray::not_installed(),
    }
}

/// Probe answering from a per-address script. Unscripted addresses are unreachable.
#[derive(Default)]
pub struct ScriptedProbe {
    results: DashMap<IpAddr, Result<DeviceSnapshot, ProbeError>>,
    delays: DashMap<IpAddr, Duration>,
    calls: DashMap<IpAddr, usize>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedProbe {
    pub fn succeed(&self, address: IpAddr, device: DeviceSnapshot) {
        self.results.insert(address, Ok(device));
    }

    pub fn fail(&self, address: IpAddr, error: ProbeError) {
        self.results.insert(address, Err(error));
    }

    pub fn delay(&self, address: IpAddr, delay: Duration) {
        self.delays.insert(address, delay);
    }

    pub fn calls(&self, address: IpAddr) -> usize {
        self.calls.get(&address).map(|c| *c).unwrap_or(0)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeviceProbe for ScriptedProbe {
    async fn probe(&self, address: IpAddr) -> Result<DeviceSnapshot, ProbeError> {
        *self.calls.entry(address).or_insert(0) += 1;
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = self.delays.get(&address).map(|d| *d);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        let result = self.results.get(&address).map(|r| r.clone());
        result.unwrap_or_else(|| Err(ProbeError::Unreachable { address, reason: "no script".to_string() }))
    }
}

/// Report fetcher returning a fixed payload after an optional delay.
pub struct CannedReports {
    pub payload: Vec<u8>,
    pub delay: Duration,
    pub fetches: AtomicUsize,
}

impl CannedReports {
    pub fn new(payload: &[u8]) -> Self {
        CannedReports {
            payload: payload.to_vec(),
            delay: Duration::ZERO,
            fetches: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ReportFetcher for CannedReports {
    async fn fetch_report(&self, address: IpAddr) -> Result<Vec<u8>, ReportError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        if self.payload.is_empty() {
            return Err(ReportError::EmptyReport { address });
        }
        Ok(self.payload.clone())
    }
}
