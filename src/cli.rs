use std::{net::IpAddr, path::PathBuf};

use clap::{Parser, Subcommand};

// ///////////// //
// CLI interface //
// ///////////// //

/// printmon - Periodically polls network printers for consumables, trays and status.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Polls the configured printers until interrupted. This is the default.
    Watch,
    /// Probes one printer once and dumps the result as JSON to stdout.
    Probe {
        address: IpAddr,
    },
    /// Downloads the usage report of one printer.
    Report {
        address: IpAddr,
        /// Where to write the report.
        output: PathBuf,
    },
}
