pub mod models;
pub mod probe;

pub use models::{DeviceSnapshot, FeedbackKind, LevelBand, StatusIcon, Tray};
pub use probe::{DeviceProbe, ProbeError};
