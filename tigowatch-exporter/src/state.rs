//! Shared metrics state.
//!
//! The collector is the only writer; the HTTP sink reads concurrently. Every
//! mutation happens under one write lock, so a scrape either sees the whole
//! of a reading or none of it.

use parking_lot::RwLock;
use tigowatch_types::{MetricsSnapshot, Reading, Slot, TIMESTAMP_LOCATION, TIMESTAMP_SOURCE};

/// Thread-safe handle to the current gauges and failure counters.
///
/// Share it with `Arc<MetricsState>` between the collector and the exporter.
#[derive(Debug, Default)]
pub struct MetricsState {
    inner: RwLock<MetricsSnapshot>,
}

/// What happened while applying a reading.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplyReport {
    /// Devices covered by the reading's layout.
    pub devices: usize,
    /// Slots that failed to decode, with their counter after the increment.
    pub failures: Vec<(Slot, u64)>,
    /// Whether the dataset timestamp gauge was updated.
    pub timestamp_updated: bool,
}

impl MetricsState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a decoded reading as a single atomic update.
    ///
    /// A decoded slot has its counter reset to 0 and its gauge set. A slot
    /// that failed to decode has its counter incremented and keeps its
    /// previous gauge value.
    pub fn apply(&self, reading: &Reading) -> ApplyReport {
        let mut report = ApplyReport {
            devices: reading.layout.device_count(),
            ..ApplyReport::default()
        };

        let mut state = self.inner.write();

        for field in &reading.fields {
            let column = field.slot.column();
            match field.value {
                Some(value) => {
                    state.failures.insert(column, 0);
                    state.set_gauge(field.slot.device, field.slot.kind, value);
                }
                None => {
                    let count = state.failures.entry(column).or_insert(0);
                    *count = count.saturating_add(1);
                    report.failures.push((field.slot, *count));
                }
            }
        }

        if let Some(timestamp) = reading.timestamp {
            state.set_timestamp(TIMESTAMP_SOURCE, TIMESTAMP_LOCATION, timestamp);
            report.timestamp_updated = true;
        }

        state.generation += 1;
        report
    }

    /// Remove every device-keyed gauge series.
    ///
    /// Failure counters and the dataset timestamp are left alone. Returns
    /// `true` if any series was removed.
    pub fn clear_devices(&self) -> bool {
        let mut state = self.inner.write();
        if state.devices.is_empty() {
            return false;
        }
        state.devices.clear();
        state.generation += 1;
        true
    }

    /// Clone the current state.
    pub fn snapshot(&self) -> MetricsSnapshot {
        self.inner.read().clone()
    }

    /// Run `f` against the current state under a shared lock.
    pub fn read<R>(&self, f: impl FnOnce(&MetricsSnapshot) -> R) -> R {
        f(&self.inner.read())
    }

    pub fn generation(&self) -> u64 {
        self.inner.read().generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tigowatch_types::{FieldKind, FieldReading, RecordLayout};

    fn reading(values: &[(usize, FieldKind, Option<f64>)], timestamp: Option<f64>) -> Reading {
        let devices = values.iter().map(|(d, _, _)| *d).max().unwrap_or(0);
        Reading {
            layout: RecordLayout::new(devices),
            fields: values
                .iter()
                .map(|(device, kind, value)| FieldReading {
                    slot: Slot::new(*device, *kind),
                    value: *value,
                })
                .collect(),
            timestamp,
        }
    }

    #[test]
    fn successful_decode_sets_gauge_and_resets_counter() {
        let state = MetricsState::new();

        state.apply(&reading(&[(1, FieldKind::Voltage, None)], None));
        state.apply(&reading(&[(1, FieldKind::Voltage, None)], None));
        assert_eq!(state.snapshot().failure_count(3), 2);

        state.apply(&reading(&[(1, FieldKind::Voltage, Some(12.5))], None));
        let snapshot = state.snapshot();
        assert_eq!(snapshot.failure_count(3), 0);
        assert_eq!(snapshot.gauge(1, FieldKind::Voltage), Some(12.5));
    }

    #[test]
    fn failed_decode_increments_by_one_and_keeps_previous_value() {
        let state = MetricsState::new();
        state.apply(&reading(&[(2, FieldKind::Power, Some(150.2))], None));

        let report = state.apply(&reading(&[(2, FieldKind::Power, None)], None));

        let column = Slot::new(2, FieldKind::Power).column();
        assert_eq!(column, 26);
        assert_eq!(report.failures, vec![(Slot::new(2, FieldKind::Power), 1)]);

        let snapshot = state.snapshot();
        assert_eq!(snapshot.failure_count(column), 1);
        assert_eq!(snapshot.gauge(2, FieldKind::Power), Some(150.2));
    }

    #[test]
    fn failure_on_fresh_slot_creates_no_series() {
        let state = MetricsState::new();
        state.apply(&reading(&[(1, FieldKind::Rssi, None)], None));

        let snapshot = state.snapshot();
        assert_eq!(snapshot.gauge(1, FieldKind::Rssi), None);
        assert!(!snapshot.has_device_series());
        assert_eq!(snapshot.failure_count(9), 1);
    }

    #[test]
    fn timestamp_only_updated_when_decoded() {
        let state = MetricsState::new();

        let report = state.apply(&reading(&[], Some(1_700_000_000.0)));
        assert!(report.timestamp_updated);

        let report = state.apply(&reading(&[], None));
        assert!(!report.timestamp_updated);
        assert_eq!(
            state.snapshot().timestamp(TIMESTAMP_SOURCE, TIMESTAMP_LOCATION),
            Some(1_700_000_000.0)
        );
    }

    #[test]
    fn apply_bumps_generation() {
        let state = MetricsState::new();
        assert_eq!(state.generation(), 0);
        state.apply(&reading(&[(1, FieldKind::Voltage, Some(1.0))], None));
        state.apply(&reading(&[(1, FieldKind::Voltage, None)], None));
        assert_eq!(state.generation(), 2);
    }

    #[test]
    fn clear_devices_keeps_counters_and_timestamp() {
        let state = MetricsState::new();
        state.apply(&reading(
            &[
                (1, FieldKind::Voltage, Some(12.5)),
                (1, FieldKind::Rssi, None),
                (2, FieldKind::Temperature, Some(40.0)),
            ],
            Some(42.0),
        ));
        let before = state.generation();

        assert!(state.clear_devices());

        let snapshot = state.snapshot();
        assert!(snapshot.devices.is_empty());
        assert_eq!(snapshot.failure_count(9), 1);
        assert_eq!(snapshot.timestamp(TIMESTAMP_SOURCE, TIMESTAMP_LOCATION), Some(42.0));
        assert_eq!(snapshot.generation, before + 1);
    }

    #[test]
    fn clearing_empty_state_is_a_no_op() {
        let state = MetricsState::new();
        assert!(!state.clear_devices());
        assert_eq!(state.generation(), 0);
    }

    #[test]
    fn readers_never_see_a_partial_update() {
        use std::thread;

        let state = Arc::new(MetricsState::new());
        let writer = {
            let state = state.clone();
            thread::spawn(move || {
                for i in 0..500 {
                    let value = Some(i as f64);
                    state.apply(&reading(
                        &[
                            (1, FieldKind::Voltage, value),
                            (2, FieldKind::Voltage, value),
                            (3, FieldKind::Voltage, value),
                        ],
                        value,
                    ));
                }
            })
        };

        let mut readers = vec![];
        for _ in 0..4 {
            let state = state.clone();
            readers.push(thread::spawn(move || {
                for _ in 0..500 {
                    state.read(|snapshot| {
                        let values: Vec<f64> =
                            snapshot.series(FieldKind::Voltage).map(|(_, v)| v).collect();
                        if let Some(first) = values.first() {
                            assert!(values.iter().all(|v| v == first));
                            assert_eq!(
                                snapshot.timestamp(TIMESTAMP_SOURCE, TIMESTAMP_LOCATION),
                                Some(*first)
                            );
                        }
                    });
                }
            }));
        }

        writer.join().unwrap();
        for r in readers {
            r.join().unwrap();
        }
        assert_eq!(state.generation(), 500);
    }
}
