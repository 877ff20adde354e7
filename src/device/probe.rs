use std::net::IpAddr;

use async_trait::async_trait;
use snafu::Snafu;

use super::models::{DeviceSnapshot, StatusIcon};

/// One network round-trip to a printer.
///
/// Implementations must bound their own wait; a probe that never returns
/// would hold a scheduler cycle open until it is stopped.
#[async_trait]
pub trait DeviceProbe: Send + Sync {
    async fn probe(&self, address: IpAddr) -> Result<DeviceSnapshot, ProbeError>;
}

// ////// //
// Errors //
// ////// //

#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub))]
pub enum ProbeError {
    /// No response, timeout or connection refused.
    #[snafu(display("Printer {address} is unreachable: {reason}"))]
    Unreachable { address: IpAddr, reason: String },

    /// A response arrived but could not be understood.
    #[snafu(display("Printer {address} sent an unusable response: {reason}"))]
    Protocol { address: IpAddr, reason: String },
}

impl ProbeError {
    pub fn status_icon(&self) -> StatusIcon {
        match self {
            ProbeError::Unreachable { .. } => StatusIcon::Offline,
            ProbeError::Protocol { .. } => StatusIcon::Error,
        }
    }
}
