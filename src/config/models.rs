use std::time::Duration;

use serde_derive::Deserialize;

// When changing anything here, make sure to add
// #[serde(alias = "ihavenounderscores")]
// where needed, so it can be read from the ENV vars.

#[derive(Debug, Clone, Deserialize)]
pub struct Probe {
    pub port: u16,
    pub path: String,
    pub secure: bool,
    #[serde(alias = "ignoretlserrors")]
    pub ignore_tls_errors: bool,
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Report {
    pub port: u16,
    pub path: String,
    pub secure: bool,
    #[serde(alias = "ignoretlserrors")]
    pub ignore_tls_errors: bool,
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    #[serde(alias = "expectpdf")]
    pub expect_pdf: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Poll {
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    #[serde(alias = "maxconcurrency")]
    pub max_concurrency: usize,
    #[serde(alias = "stopgrace", with = "humantime_serde")]
    pub stop_grace: Duration,
    #[serde(alias = "refreshonadd")]
    pub refresh_on_add: bool,
    #[serde(alias = "eventcapacity")]
    pub event_capacity: usize,
}

impl Default for Poll {
    fn default() -> Self {
        Poll {
            interval: Duration::from_secs(30),
            max_concurrency: 16,
            stop_grace: Duration::from_secs(5),
            refresh_on_add: true,
            event_capacity: 256,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub probe: Probe,
    pub report: Report,
    pub poll: Poll,
    /// `name@address` entries added on startup.
    #[serde(default)]
    pub printers: Vec<String>,
    #[serde(alias = "sentrydsn")]
    pub sentry_dsn: Option<String>,
}

impl Settings {
    /// Splits the configured `name@address` entries. Entries without `@` use
    /// the address as the name.
    pub fn initial_printers(&self) -> Vec<(String, String)> {
        self.printers
            .iter()
            .map(|entry| entry.trim())
            .filter(|entry| !entry.is_empty())
            .map(|entry| match entry.rsplit_once('@') {
                Some((name, address)) => (name.trim().to_string(), address.trim().to_string()),
                None => (entry.to_string(), entry.to_string()),
            })
            .collect()
    }
}
