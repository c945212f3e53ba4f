//! MetricsSnapshot - the exported state of the collector.

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;

use crate::{FieldKind, RecordLayout, SchemaVersion, Slot};

/// Latest gauge values of one device.
///
/// `None` means the gauge has no series: it was never set, or it was
/// removed by a staleness clear.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DeviceGauges {
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub voltage: Option<f64>,

    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub rssi: Option<f64>,

    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub power: Option<f64>,

    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub temperature: Option<f64>,
}

impl DeviceGauges {
    pub fn get(&self, kind: FieldKind) -> Option<f64> {
        match kind {
            FieldKind::Voltage => self.voltage,
            FieldKind::Rssi => self.rssi,
            FieldKind::Power => self.power,
            FieldKind::Temperature => self.temperature,
        }
    }

    pub fn set(&mut self, kind: FieldKind, value: f64) {
        let gauge = match kind {
            FieldKind::Voltage => &mut self.voltage,
            FieldKind::Rssi => &mut self.rssi,
            FieldKind::Power => &mut self.power,
            FieldKind::Temperature => &mut self.temperature,
        };
        *gauge = Some(value);
    }

    pub fn is_empty(&self) -> bool {
        FieldKind::ALL.iter().all(|kind| self.get(*kind).is_none())
    }
}

/// Dataset timestamp gauge, keyed by its `source` and `location` labels.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DatasetTimestamp {
    pub source: String,
    pub location: String,
    pub value: f64,
}

/// A point-in-time view of every exported gauge and failure counter.
///
/// Snapshots are produced by cloning the shared metrics state; the HTTP
/// sink renders them and `--export` serializes them.
///
/// # Example
///
/// ```rust
/// use tigowatch_types::{FieldKind, MetricsSnapshot};
///
/// let mut snapshot = MetricsSnapshot::new();
/// snapshot.set_gauge(1, FieldKind::Power, 150.2);
///
/// assert_eq!(snapshot.gauge(1, FieldKind::Power), Some(150.2));
/// assert_eq!(snapshot.gauge(1, FieldKind::Rssi), None);
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MetricsSnapshot {
    /// Schema version for forward compatibility.
    pub version: SchemaVersion,

    /// Bumped every time the state changes (reading applied or series cleared).
    pub generation: u64,

    /// Gauges per device, keyed by 1-based device index.
    pub devices: BTreeMap<usize, DeviceGauges>,

    /// Dataset timestamp gauges.
    pub timestamps: Vec<DatasetTimestamp>,

    /// Consecutive decode failures, keyed by absolute column index.
    pub failures: BTreeMap<usize, u64>,
}

impl MetricsSnapshot {
    /// Create an empty snapshot at generation 0.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gauge(&self, device: usize, kind: FieldKind) -> Option<f64> {
        self.devices.get(&device).and_then(|gauges| gauges.get(kind))
    }

    pub fn set_gauge(&mut self, device: usize, kind: FieldKind, value: f64) {
        self.devices.entry(device).or_default().set(kind, value);
    }

    /// Whether any device-keyed gauge currently has a series.
    pub fn has_device_series(&self) -> bool {
        self.devices.values().any(|gauges| !gauges.is_empty())
    }

    /// Iterate the devices that have a series for `kind`, in device order.
    pub fn series(&self, kind: FieldKind) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.devices
            .iter()
            .filter_map(move |(device, gauges)| gauges.get(kind).map(|value| (*device, value)))
    }

    pub fn timestamp(&self, source: &str, location: &str) -> Option<f64> {
        self.timestamps
            .iter()
            .find(|ts| ts.source == source && ts.location == location)
            .map(|ts| ts.value)
    }

    pub fn set_timestamp(&mut self, source: &str, location: &str, value: f64) {
        match self
            .timestamps
            .iter_mut()
            .find(|ts| ts.source == source && ts.location == location)
        {
            Some(ts) => ts.value = value,
            None => self.timestamps.push(DatasetTimestamp {
                source: source.into(),
                location: location.into(),
                value,
            }),
        }
    }

    /// Consecutive decode failures of the slot at `column` (0 if never seen).
    pub fn failure_count(&self, column: usize) -> u64 {
        self.failures.get(&column).copied().unwrap_or(0)
    }
}

/// One monitored cell of a decoded row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldReading {
    pub slot: Slot,
    /// `None` when the cell failed to decode.
    pub value: Option<f64>,
}

/// The last row of a dataset, decoded against its layout.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Reading {
    pub layout: RecordLayout,
    pub fields: Vec<FieldReading>,
    /// `None` when the timestamp cell failed to decode.
    pub timestamp: Option<f64>,
}

impl Reading {
    /// Number of monitored cells that failed to decode.
    pub fn failed_fields(&self) -> usize {
        self.fields.iter().filter(|f| f.value.is_none()).count()
    }
}
