//! Polling and status aggregation for network printers.
//!
//! [`monitor::PrintMonitor`] owns a registry of printers, refreshes them on a
//! fixed cadence through a [`device::DeviceProbe`] and tells subscribers what
//! changed. Usage reports are fetched on demand through a
//! [`report_client::ReportFetcher`]. [`ipp_client::IppProbe`] and
//! [`report_client::HttpReportFetcher`] are the network implementations.

pub mod config;
pub mod device;
pub mod ipp_client;
pub mod monitor;
pub mod report_client;

pub use device::{DeviceProbe, DeviceSnapshot, ProbeError, StatusIcon, Tray};
pub use monitor::{MonitorEvent, PrintMonitor, PrinterId, PrinterSnapshot, PrinterView, ValidationError};
pub use report_client::{ReportError, ReportFetcher};
