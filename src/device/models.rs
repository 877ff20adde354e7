use std::fmt;

use serde_derive::{Deserialize, Serialize};

// //////// //
// Snapshot //
// //////// //

/// Everything one successful probe tells us about a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSnapshot {
    pub model: String,
    pub device_type: String,
    pub speed: String,
    pub toner_capacity: String,
    /// Remaining ink/toner, 0-100.
    pub ink: u8,
    /// Remaining fuser life, 0-100. `None` when the device does not report one.
    pub fuser_wear: Option<u8>,
    /// Remaining maintenance kit life, 0-100.
    pub maintenance: Option<u8>,
    /// Human readable status line, e.g. "Ready" or "Power Saving".
    pub feedback: String,
    pub default_input: Tray,
    pub secondary_input: Tray,
    pub default_output: Tray,
}

impl DeviceSnapshot {
    pub fn status_icon(&self) -> StatusIcon {
        StatusIcon::from_ink(self.ink)
    }

    pub fn feedback_kind(&self) -> FeedbackKind {
        FeedbackKind::of(&self.feedback)
    }

    /// Whether an operator should look at the device: its feedback asks for
    /// attention or any reported gauge is in [`LevelBand::Low`].
    pub fn needs_attention(&self) -> bool {
        let low = [Some(self.ink), self.fuser_wear, self.maintenance]
            .into_iter()
            .flatten()
            .any(|percent| LevelBand::of(percent) == LevelBand::Low);
        low || self.feedback_kind() == FeedbackKind::Attention
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tray {
    pub name: String,
    pub capacity_in_sheets: u32,
    pub media_size: String,
    pub media_type: String,
    pub status: String,
}

impl Tray {
    pub fn not_installed() -> Self {
        Tray {
            status: "Not installed".to_string(),
            ..Default::default()
        }
    }
}

// ////// //
// Status //
// ////// //

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusIcon {
    Ink0,
    Ink30,
    Ink60,
    Ink90,
    Ink100,
    Offline,
    Error,
}

impl StatusIcon {
    /// Buckets: 0, 1-30, 31-60, 61-90, 91-100. Anything above 100 counts as full.
    pub fn from_ink(ink: u8) -> Self {
        match ink {
            0 => StatusIcon::Ink0,
            1..=30 => StatusIcon::Ink30,
            31..=60 => StatusIcon::Ink60,
            61..=90 => StatusIcon::Ink90,
            _ => StatusIcon::Ink100,
        }
    }

    pub fn is_reachable(&self) -> bool {
        !matches!(self, StatusIcon::Offline | StatusIcon::Error)
    }
}

impl fmt::Display for StatusIcon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            StatusIcon::Ink0 => "ink 0%",
            StatusIcon::Ink30 => "ink 30%",
            StatusIcon::Ink60 => "ink 60%",
            StatusIcon::Ink90 => "ink 90%",
            StatusIcon::Ink100 => "ink 100%",
            StatusIcon::Offline => "offline",
            StatusIcon::Error => "error",
        };
        f.write_str(label)
    }
}

/// Coarse band of a consumable gauge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LevelBand {
    Good,
    Medium,
    Low,
}

impl LevelBand {
    pub fn of(percent: u8) -> Self {
        if percent >= 60 {
            LevelBand::Good
        } else if percent <= 30 {
            LevelBand::Low
        } else {
            LevelBand::Medium
        }
    }
}

/// What a feedback line means for an operator glancing at it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeedbackKind {
    Ready,
    PowerSaving,
    Busy,
    Attention,
}

impl FeedbackKind {
    pub fn of(feedback: &str) -> Self {
        let feedback = feedback.to_lowercase();
        if feedback.contains("ready") {
            FeedbackKind::Ready
        } else if feedback.contains("power saving") {
            FeedbackKind::PowerSaving
        } else if feedback.contains("busy") {
            FeedbackKind::Busy
        } else {
            FeedbackKind::Attention
        }
    }
}
