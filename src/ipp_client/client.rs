use std::{
    net::{IpAddr, SocketAddr},
    time::Duration,
};

use async_trait::async_trait;
use ipp::prelude::*;
use log::debug;
use url::Url;

use crate::{
    config::models::Probe,
    device::{probe::ProtocolSnafu, DeviceProbe, DeviceSnapshot, ProbeError},
};

use super::models::{snapshot_from_attributes, PrinterAttributes};

const REQUESTED_ATTRIBUTES: [&str; 16] = [
    "printer-make-and-model",
    "printer-state",
    "printer-state-message",
    "printer-state-reasons",
    "color-supported",
    "pages-per-minute",
    "pages-per-minute-color",
    "marker-names",
    "marker-types",
    "marker-levels",
    "marker-high-levels",
    "printer-input-tray",
    "printer-output-tray",
    "media-ready",
    "media-type-ready",
    "media-type-default",
];

/// Probes printers with an IPP Get-Printer-Attributes request.
#[derive(Debug, Clone)]
pub struct IppProbe {
    port: u16,
    path: String,
    secure: bool,
    ignore_tls_errors: bool,
    timeout: Duration,
}

impl IppProbe {
    pub fn new(settings: &Probe) -> Self {
        IppProbe {
            port: settings.port,
            path: settings.path.clone(),
            secure: settings.secure,
            ignore_tls_errors: settings.ignore_tls_errors,
            timeout: settings.timeout,
        }
    }

    /// Builds `ipp://<address>:<port>/<path>`, bracketing IPv6 literals.
    pub fn printer_uri(&self, address: IpAddr) -> Result<String, url::ParseError> {
        let scheme = if self.secure { "ipps" } else { "ipp" };
        let base = Url::parse(&format!("{}://{}/", scheme, SocketAddr::new(address, self.port)))?;
        Ok(base.join(self.path.trim_start_matches('/'))?.to_string())
    }

    /// Send a Get-Printer-Attributes request to `address` and flatten the
    /// printer attribute group of the response.
    async fn get_printer_attributes(&self, address: IpAddr) -> Result<PrinterAttributes, ProbeError> {
        let uri: Uri = self
            .printer_uri(address)
            .map_err(|e| e.to_string())
            .and_then(|uri| uri.parse::<Uri>().map_err(|e| e.to_string()))
            .map_err(|reason| ProbeError::Unreachable { address, reason })?;

        let operation = IppOperationBuilder::get_printer_attributes(uri.clone())
            .attributes(&REQUESTED_ATTRIBUTES)
            .build();
        let client = AsyncIppClient::builder(uri).ignore_tls_errors(self.ignore_tls_errors).build();

        debug!("Sending Get-Printer-Attributes to {}", address);
        let response = tokio::time::timeout(self.timeout, client.send(operation))
            .await
            .map_err(|_| ProbeError::Unreachable {
                address,
                reason: format!("no response within {}", humantime::format_duration(self.timeout)),
            })?
            .map_err(|e| e.to_string())
            .map_err(|reason| ProbeError::Unreachable { address, reason })?;

        let status = response.header().status_code();
        if !status.is_success() {
            return ProtocolSnafu { address, reason: format!("Get-Printer-Attributes returned {status:?}") }.fail();
        }

        Ok(flatten_printer_attributes(response.attributes()))
    }
}

#[async_trait]
impl DeviceProbe for IppProbe {
    async fn probe(&self, address: IpAddr) -> Result<DeviceSnapshot, ProbeError> {
        let attributes = self.get_printer_attributes(address).await?;
        debug!("Printer {} returned {} attributes", address, attributes.len());
        snapshot_from_attributes(address, &attributes)
    }
}

/// Flatten the printer attribute groups of a response, keeping every value of
/// multi-valued attributes.
fn flatten_printer_attributes(attributes: &IppAttributes) -> PrinterAttributes {
    let mut map = PrinterAttributes::new();
    for group in attributes.groups_of(DelimiterTag::PrinterAttributes) {
        for (name, attribute) in group.attributes() {
            let values = match attribute.value() {
                IppValue::Array(items) => items.iter().map(ToString::to_string).collect(),
                value => vec![value.to_string()],
            };
            map.insert(name.clone(), values);
        }
    }
    map
}
