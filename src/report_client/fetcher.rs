use std::net::IpAddr;

use async_trait::async_trait;
use snafu::Snafu;

/// On-demand retrieval of a device's usage report.
///
/// Independent of polling: a fetch never reads or writes a printer's snapshot.
#[async_trait]
pub trait ReportFetcher: Send + Sync {
    async fn fetch_report(&self, address: IpAddr) -> Result<Vec<u8>, ReportError>;
}

// ////// //
// Errors //
// ////// //

#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub))]
pub enum ReportError {
    #[snafu(display("Printer {address} is unreachable: {reason}"))]
    Unreachable { address: IpAddr, reason: String },

    #[snafu(display("Printer {address} sent an unusable report: {reason}"))]
    Protocol { address: IpAddr, reason: String },

    #[snafu(display("Printer {address} sent an empty report"))]
    EmptyReport { address: IpAddr },

    #[snafu(display("No printer registered at {address}"))]
    UnknownPrinter { address: IpAddr },
}
