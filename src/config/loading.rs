use config::{Config, ConfigBuilder, Environment, builder::DefaultState};
use log::info;
use snafu::{ResultExt, Snafu};

use super::models::Settings;

pub fn load_config() -> Result<Settings, ConfigError> {
    // As Rust has no native support for .env files,
    // we use the dotenv_flow crate to import to actual ENV vars.
    if let Ok(dotenv_path) = dotenv_flow::dotenv_flow() {
        info!("Loaded dotenv file: {:?}", dotenv_path);
    }

    let builder = Config::builder().add_source(
        Environment::default()
            .prefix("PMON")
            .separator("_")
            .prefix_separator("_")
            .try_parsing(true)
            .with_list_parse_key("printers")
            .list_separator(","),
    );

    with_defaults(builder)?
        .build()
        .context(BuildSnafu)?
        .try_deserialize()
        .context(DeserializeSnafu)
}

fn with_defaults(builder: ConfigBuilder<DefaultState>) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let defaults: [(&str, &str); 17] = [
        ("probe.port", "631"),
        ("probe.path", "ipp/print"),
        ("probe.secure", "false"),
        ("probe.ignoretlserrors", "true"),
        ("probe.timeout", "5s"),
        ("report.port", "80"),
        ("report.path", "/cgi-bin/dynamic/printer/config/reports/deviceinfo.pdf"),
        ("report.secure", "false"),
        ("report.ignoretlserrors", "true"),
        ("report.timeout", "30s"),
        ("report.expectpdf", "true"),
        ("poll.interval", "30s"),
        ("poll.maxconcurrency", "16"),
        ("poll.stopgrace", "5s"),
        ("poll.refreshonadd", "true"),
        ("poll.eventcapacity", "256"),
        ("sentrydsn", ""),
    ];

    defaults.into_iter().try_fold(builder, |builder, (key, value)| {
        builder.set_default(key, value).context(DefaultSnafu { key })
    })
}

// ////// //
// Errors //
// ////// //

#[derive(Debug, Snafu)]
pub enum ConfigError {
    #[snafu(display("Could not set default for {key}"))]
    Default { key: String, source: config::ConfigError },

    #[snafu(display("Could not read configuration"))]
    Build { source: config::ConfigError },

    #[snafu(display("Configuration is invalid"))]
    Deserialize { source: config::ConfigError },
}
