//! Record layout of a data-acquisition CSV log.
//!
//! A log row looks like this:
//!
//! ```text
//! | 0 | 1 (timestamp) | 2 | device 1 (12 columns) | device 2 (12 columns) | ...
//! ```
//!
//! Within each device block four columns are monitored: voltage at offset 0,
//! temperature at 2, RSSI at 6 and power at 11. The stride and the offsets
//! are properties of the file format and are deliberately not configurable.

use alloc::format;
use alloc::string::String;
use core::fmt;

/// Columns preceding the first device block.
pub const LEADING_COLUMNS: usize = 3;

/// Number of columns each device occupies.
pub const DEVICE_STRIDE: usize = 12;

/// Absolute column of the dataset timestamp.
pub const TIMESTAMP_COLUMN: usize = 1;

/// Label values of the dataset timestamp gauge.
pub const TIMESTAMP_SOURCE: &str = "local";
pub const TIMESTAMP_LOCATION: &str = "cca";

/// A monitored field within a device block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum FieldKind {
    Voltage,
    Rssi,
    Power,
    Temperature,
}

impl FieldKind {
    /// Every monitored field, in the order they are processed per device.
    pub const ALL: [FieldKind; 4] = [
        FieldKind::Voltage,
        FieldKind::Rssi,
        FieldKind::Power,
        FieldKind::Temperature,
    ];

    /// Offset of this field relative to the start of a device block.
    pub const fn offset(self) -> usize {
        match self {
            FieldKind::Voltage => 0,
            FieldKind::Temperature => 2,
            FieldKind::Rssi => 6,
            FieldKind::Power => 11,
        }
    }

    /// Name of the gauge family this field is exported as.
    pub const fn metric_name(self) -> &'static str {
        match self {
            FieldKind::Voltage => "tigo_module_volts",
            FieldKind::Rssi => "tigo_module_rssi",
            FieldKind::Power => "tigo_module_power",
            FieldKind::Temperature => "tigo_module_temp",
        }
    }

    /// HELP text of the gauge family.
    pub const fn help(self) -> &'static str {
        match self {
            FieldKind::Voltage => "Module volt value in V",
            FieldKind::Rssi => "Tigo signal strength value",
            FieldKind::Power => "Module power value in W",
            FieldKind::Temperature => "Tigo module temperature value in celsius",
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            FieldKind::Voltage => "voltage",
            FieldKind::Rssi => "rssi",
            FieldKind::Power => "power",
            FieldKind::Temperature => "temperature",
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single monitored (device, field) position in a row.
///
/// Devices are numbered from 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Slot {
    pub device: usize,
    pub kind: FieldKind,
}

impl Slot {
    pub const fn new(device: usize, kind: FieldKind) -> Self {
        debug_assert!(device >= 1, "devices are numbered from 1");
        Self { device, kind }
    }

    /// Absolute column index of this slot.
    ///
    /// `device` must be at least 1. Device 0 is rejected in debug builds and
    /// clamps to device 1 otherwise.
    pub const fn column(&self) -> usize {
        debug_assert!(self.device >= 1, "devices are numbered from 1");
        LEADING_COLUMNS + self.device.saturating_sub(1) * DEVICE_STRIDE + self.kind.offset()
    }
}

/// Per-file layout, inferred from the width of the header row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecordLayout {
    device_count: usize,
}

impl RecordLayout {
    /// Create a layout for a known number of devices.
    pub const fn new(device_count: usize) -> Self {
        Self { device_count }
    }

    /// Infer the layout from the number of header columns.
    ///
    /// Trailing columns that do not fill a whole device block are ignored.
    pub const fn from_header_width(width: usize) -> Self {
        Self {
            device_count: width.saturating_sub(LEADING_COLUMNS) / DEVICE_STRIDE,
        }
    }

    pub const fn device_count(&self) -> usize {
        self.device_count
    }

    /// Absolute column of `kind` for the 1-based `device`.
    pub const fn column(&self, device: usize, kind: FieldKind) -> usize {
        Slot::new(device, kind).column()
    }

    /// Iterate every monitored slot, device by device.
    pub fn slots(&self) -> impl Iterator<Item = Slot> {
        (1..=self.device_count)
            .flat_map(|device| FieldKind::ALL.into_iter().map(move |kind| Slot::new(device, kind)))
    }
}

/// Value of the `name` label for a device, e.g. `A3`.
pub fn device_label(device: usize) -> String {
    format!("A{}", device)
}
