pub mod loading;
pub mod models;

pub use loading::{load_config, ConfigError};
pub use models::Settings;
