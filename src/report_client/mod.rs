pub mod client;
pub mod fetcher;

pub use client::HttpReportFetcher;
pub use fetcher::{ReportError, ReportFetcher};
