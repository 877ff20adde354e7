use std::{collections::HashMap, net::IpAddr};

use snafu::OptionExt;

use crate::device::{probe::ProtocolSnafu, DeviceSnapshot, ProbeError, Tray};

/// Printer attributes of a Get-Printer-Attributes response, one entry per
/// attribute name. Multi-valued attributes keep every value in order.
pub type PrinterAttributes = HashMap<String, Vec<String>>;

const PRIMARY_MARKERS: [&str; 3] = ["toner", "ink", "ink-cartridge"];
const MAINTENANCE_MARKERS: [&str; 3] = ["maintenance-kit", "transfer-unit", "opc"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrinterMarker {
    pub marker_type: String,
    pub name: String,
    /// Normalised to 0-100, `None` if the device reports an unknown level.
    pub level: Option<u8>,
}

impl PrinterMarker {
    fn is_primary(&self) -> bool {
        PRIMARY_MARKERS.contains(&self.marker_type.as_str())
    }

    fn is_fuser(&self) -> bool {
        self.marker_type.starts_with("fuser")
    }

    fn is_maintenance(&self) -> bool {
        MAINTENANCE_MARKERS.contains(&self.marker_type.as_str())
    }
}

/// One entry of `printer-input-tray` / `printer-output-tray`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrayEntry {
    pub tray_type: String,
    pub name: String,
    pub max_capacity: Option<i64>,
    pub level: Option<i64>,
    pub status: Option<i64>,
}

impl TrayEntry {
    /// Parses the `key=value;key=value;` form defined by PWG 5100.13.
    pub fn parse(raw: &str) -> Self {
        let fields: HashMap<&str, &str> = raw
            .split(';')
            .filter_map(|field| field.split_once('='))
            .map(|(key, value)| (key.trim(), value.trim()))
            .collect();
        let number = |key: &str| fields.get(key).and_then(|v| v.parse::<i64>().ok());

        TrayEntry {
            tray_type: fields.get("type").copied().unwrap_or_default().to_string(),
            name: fields.get("name").copied().unwrap_or_default().to_string(),
            max_capacity: number("maxcapacity"),
            // Output trays report what is left as "remaining".
            level: number("level").or_else(|| number("remaining")),
            status: number("status"),
        }
    }

    fn is_secondary_input(&self) -> bool {
        if self.tray_type == "sheetFeedManual" {
            return true;
        }
        let name = self.name.to_lowercase();
        name.split(|c: char| !c.is_alphanumeric()).any(|word| word == "mp" || word == "mpt")
            || name.contains("multi")
            || name.contains("manual")
            || name.contains("bypass")
    }
}

// /////// //
// Parsing //
// /////// //

pub fn snapshot_from_attributes(address: IpAddr, attributes: &PrinterAttributes) -> Result<DeviceSnapshot, ProbeError> {
    let model = first(attributes, "printer-make-and-model")
        .filter(|m| !m.is_empty())
        .context(ProtocolSnafu { address, reason: "missing printer-make-and-model" })?
        .to_string();
    let state = first(attributes, "printer-state")
        .and_then(|s| s.parse::<i32>().ok())
        .context(ProtocolSnafu { address, reason: "missing or malformed printer-state" })?;

    let markers = parse_markers(attributes);
    let primary = markers
        .iter()
        .filter(|m| m.is_primary())
        .filter_map(|m| m.level.map(|level| (level, m)))
        .min_by_key(|(level, _)| *level)
        .context(ProtocolSnafu { address, reason: "no toner or ink level reported" })?;
    let (ink, primary_marker) = primary;

    let fuser_wear = markers.iter().filter(|m| m.is_fuser()).filter_map(|m| m.level).min();
    let maintenance = markers.iter().filter(|m| m.is_maintenance()).filter_map(|m| m.level).min();

    let (default_input, secondary_input, default_output) = parse_trays(attributes);

    Ok(DeviceSnapshot {
        model,
        device_type: device_type(attributes, primary_marker),
        speed: speed(attributes),
        toner_capacity: primary_marker.name.clone(),
        ink,
        fuser_wear,
        maintenance,
        feedback: feedback(attributes, state),
        default_input,
        secondary_input,
        default_output,
    })
}

pub fn parse_markers(attributes: &PrinterAttributes) -> Vec<PrinterMarker> {
    let names = all(attributes, "marker-names");
    let types = all(attributes, "marker-types");
    let levels = all(attributes, "marker-levels");
    let high_levels = all(attributes, "marker-high-levels");

    types
        .iter()
        .enumerate()
        .map(|(i, marker_type)| {
            let high = high_levels
                .get(i)
                .and_then(|h| h.parse::<i64>().ok())
                .filter(|h| *h > 0)
                .unwrap_or(100);
            let level = levels
                .get(i)
                .and_then(|l| l.parse::<i64>().ok())
                .filter(|l| *l >= 0)
                // Overflowing readings count as unknown.
                .and_then(|l| l.checked_mul(100))
                .map(|l| (l / high).clamp(0, 100) as u8);
            PrinterMarker {
                marker_type: marker_type.clone(),
                name: names.get(i).cloned().unwrap_or_default(),
                level,
            }
        })
        .collect()
}

fn parse_trays(attributes: &PrinterAttributes) -> (Tray, Tray, Tray) {
    let inputs: Vec<TrayEntry> = all(attributes, "printer-input-tray").iter().map(|raw| TrayEntry::parse(raw)).collect();
    let outputs: Vec<TrayEntry> = all(attributes, "printer-output-tray").iter().map(|raw| TrayEntry::parse(raw)).collect();

    let secondary_index = inputs
        .iter()
        .position(TrayEntry::is_secondary_input)
        .or_else(|| (inputs.len() > 1).then_some(1));
    let default_index = (0..inputs.len()).find(|i| Some(*i) != secondary_index);

    let pick = |index: Option<usize>| match index {
        Some(i) => input_tray(attributes, &inputs[i], i),
        None => Tray::not_installed(),
    };
    let default_output = outputs.first().map(output_tray).unwrap_or_else(Tray::not_installed);

    (pick(default_index), pick(secondary_index), default_output)
}

fn input_tray(attributes: &PrinterAttributes, entry: &TrayEntry, index: usize) -> Tray {
    let media_size = all(attributes, "media-ready").get(index).cloned().unwrap_or_default();
    let media_type = all(attributes, "media-type-ready")
        .get(index)
        .cloned()
        .or_else(|| first(attributes, "media-type-default").map(str::to_string))
        .unwrap_or_default();

    Tray {
        name: entry.name.clone(),
        capacity_in_sheets: capacity(entry.max_capacity),
        media_size,
        media_type,
        status: tray_status(entry, "Empty"),
    }
}

fn output_tray(entry: &TrayEntry) -> Tray {
    Tray {
        name: entry.name.clone(),
        capacity_in_sheets: capacity(entry.max_capacity),
        media_size: String::new(),
        media_type: String::new(),
        status: tray_status(entry, "Full"),
    }
}

fn capacity(max_capacity: Option<i64>) -> u32 {
    max_capacity.filter(|c| *c > 0).map(|c| u32::try_from(c).unwrap_or(u32::MAX)).unwrap_or(0)
}

/// Status text from the RFC 3805 sub-unit status bits. A level of zero wins
/// over availability: `exhausted` is "Empty" for inputs and "Full" for outputs.
fn tray_status(entry: &TrayEntry, exhausted: &str) -> String {
    let status = entry.status.unwrap_or(5);
    if status & 0x20 != 0 {
        return "Offline".to_string();
    }
    if entry.level == Some(0) {
        return exhausted.to_string();
    }
    if status & 0x10 != 0 {
        return "Needs attention".to_string();
    }
    match status & 0x07 {
        0 => "Ready",
        2 => "Standby",
        4 => "Active",
        6 => "Busy",
        1 => "Unavailable",
        3 => "Broken",
        _ => "Unknown",
    }
    .to_string()
}

fn device_type(attributes: &PrinterAttributes, primary: &PrinterMarker) -> String {
    let color = match first(attributes, "color-supported") {
        Some("true") => "Color",
        _ => "Monochrome",
    };
    let technology = if primary.marker_type == "toner" { "laser" } else { "inkjet" };
    format!("{color} {technology}")
}

fn speed(attributes: &PrinterAttributes) -> String {
    let mono = first(attributes, "pages-per-minute").filter(|p| *p != "0");
    let color = first(attributes, "pages-per-minute-color").filter(|p| *p != "0");
    match (mono, color) {
        (Some(mono), Some(color)) => format!("{mono} ppm ({color} ppm color)"),
        (Some(mono), None) => format!("{mono} ppm"),
        (None, Some(color)) => format!("{color} ppm color"),
        (None, None) => String::new(),
    }
}

fn feedback(attributes: &PrinterAttributes, state: i32) -> String {
    if let Some(message) = first(attributes, "printer-state-message").map(str::trim).filter(|m| !m.is_empty()) {
        return message.to_string();
    }

    let reasons: Vec<&str> = all(attributes, "printer-state-reasons")
        .iter()
        .map(String::as_str)
        .filter(|r| *r != "none")
        .collect();
    if reasons.iter().any(|r| r.contains("sleep") || r.contains("power-saving") || r.contains("standby")) {
        return "Power Saving".to_string();
    }

    let base = match state {
        3 => "Ready",
        4 => "Busy",
        5 => "Stopped",
        _ => "Unknown state",
    };
    match reasons.first() {
        Some(reason) => format!("{base} ({reason})"),
        None => base.to_string(),
    }
}

fn first<'a>(attributes: &'a PrinterAttributes, name: &str) -> Option<&'a str> {
    attributes.get(name).and_then(|values| values.first()).map(String::as_str)
}

fn all<'a>(attributes: &'a PrinterAttributes, name: &str) -> &'a [String] {
    attributes.get(name).map(Vec::as_slice).unwrap_or(&[])
}
