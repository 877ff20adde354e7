use std::{
    net::{IpAddr, SocketAddr},
    time::Duration,
};

use async_trait::async_trait;
use log::{debug, info};
use snafu::{ResultExt, Snafu};
use url::Url;

use crate::config::models::Report;

use super::fetcher::{EmptyReportSnafu, ProtocolSnafu, ReportError, ReportFetcher};

const PDF_MAGIC: &[u8] = b"%PDF-";

/// Downloads the usage report a printer serves over its embedded web server.
#[derive(Debug, Clone)]
pub struct HttpReportFetcher {
    client: reqwest::Client,
    port: u16,
    path: String,
    secure: bool,
    timeout: Duration,
    expect_pdf: bool,
}

impl HttpReportFetcher {
    pub fn new(settings: &Report) -> Result<Self, HttpClientError> {
        // Printers live on the local network; never route them through a proxy.
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .danger_accept_invalid_certs(settings.ignore_tls_errors)
            .no_proxy()
            .build()
            .context(BuildSnafu)?;

        Ok(HttpReportFetcher {
            client,
            port: settings.port,
            path: settings.path.clone(),
            secure: settings.secure,
            timeout: settings.timeout,
            expect_pdf: settings.expect_pdf,
        })
    }

    pub fn report_url(&self, address: IpAddr) -> Result<Url, url::ParseError> {
        let scheme = if self.secure { "https" } else { "http" };
        Url::parse(&format!("{}://{}/", scheme, SocketAddr::new(address, self.port)))?.join(&self.path)
    }

    fn unreachable(&self, address: IpAddr, error: reqwest::Error) -> ReportError {
        let reason = if error.is_timeout() {
            format!("no report within {}", humantime::format_duration(self.timeout))
        } else {
            error.to_string()
        };
        ReportError::Unreachable { address, reason }
    }
}

#[async_trait]
impl ReportFetcher for HttpReportFetcher {
    async fn fetch_report(&self, address: IpAddr) -> Result<Vec<u8>, ReportError> {
        let url = self
            .report_url(address)
            .map_err(|e| ReportError::Protocol { address, reason: e.to_string() })?;

        debug!("Requesting report from {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.unreachable(address, e))?;

        let status = response.status();
        if !status.is_success() {
            return ProtocolSnafu { address, reason: format!("HTTP {status}") }.fail();
        }

        let body = response.bytes().await.map_err(|e| self.unreachable(address, e))?;
        if body.is_empty() {
            return EmptyReportSnafu { address }.fail();
        }
        if self.expect_pdf && !body.starts_with(PDF_MAGIC) {
            return ProtocolSnafu { address, reason: "report is not a PDF document" }.fail();
        }

        info!("Fetched {} byte report from {}", body.len(), address);
        Ok(body.to_vec())
    }
}

// ////// //
// Errors //
// ////// //

#[derive(Debug, Snafu)]
pub enum HttpClientError {
    #[snafu(display("Could not build the HTTP client"))]
    Build { source: reqwest::Error },
}
