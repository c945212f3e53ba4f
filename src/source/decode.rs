//! Cell and row decoding.

use std::str;

use csv::ByteRecord;
use tigowatch_types::{FieldReading, Reading, RecordLayout, TIMESTAMP_COLUMN};
use tracing::debug;

use crate::error::DecodeError;

/// Decode a single CSV cell as a float.
///
/// Empty cells are a failure, not zero.
pub fn decode_field(cell: &str) -> Result<f64, DecodeError> {
    if cell.is_empty() {
        return Err(DecodeError::Empty);
    }
    cell.parse().map_err(|source| DecodeError::Invalid {
        value: cell.to_string(),
        source,
    })
}

/// Decode a raw cell. Bytes that are not UTF-8 fail this cell only.
pub fn decode_cell(cell: &[u8]) -> Result<f64, DecodeError> {
    let text = str::from_utf8(cell).map_err(|source| DecodeError::NotUtf8 { source })?;
    decode_field(text)
}

/// Decode the cell at `column`, treating a missing cell as empty.
fn decode_column(record: &ByteRecord, column: usize) -> Result<f64, DecodeError> {
    decode_cell(record.get(column).unwrap_or_default())
}

/// Decode every monitored slot and the timestamp of `record`.
///
/// Cells that fail to decode become `None`; they never abort the row.
/// Unmonitored cells are never looked at, whatever their encoding.
pub fn decode_row(layout: RecordLayout, record: &ByteRecord) -> Reading {
    let fields = layout
        .slots()
        .map(|slot| {
            let value = match decode_column(record, slot.column()) {
                Ok(value) => Some(value),
                Err(e) => {
                    debug!(
                        device = slot.device,
                        field = %slot.kind,
                        column = slot.column(),
                        "Failed to decode field: {}",
                        e
                    );
                    None
                }
            };
            FieldReading { slot, value }
        })
        .collect();

    let timestamp = match decode_column(record, TIMESTAMP_COLUMN) {
        Ok(value) => Some(value),
        Err(e) => {
            debug!("Failed to decode dataset timestamp: {}", e);
            None
        }
    };

    Reading {
        layout,
        fields,
        timestamp,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tigowatch_types::{FieldKind, Slot};

    #[test]
    fn decodes_numbers() {
        assert_eq!(decode_field("12.5"), Ok(12.5));
        assert_eq!(decode_field("-3"), Ok(-3.0));
        assert_eq!(decode_field("1700000000"), Ok(1_700_000_000.0));
        assert_eq!(decode_field("1e3"), Ok(1000.0));
    }

    #[test]
    fn empty_cell_is_an_error() {
        assert_eq!(decode_field(""), Err(DecodeError::Empty));
    }

    #[test]
    fn non_numeric_cell_is_an_error() {
        assert!(matches!(
            decode_field("n/a"),
            Err(DecodeError::Invalid { ref value, .. }) if value == "n/a"
        ));
        assert!(matches!(decode_field("0,"), Err(DecodeError::Invalid { .. })));
        assert!(matches!(decode_field(" 1.0"), Err(DecodeError::Invalid { .. })));
    }

    #[test]
    fn decode_row_reads_fixed_offsets() {
        // Two devices: 3 + 2 * 12 columns
        let mut cells = vec![String::new(); 27];
        cells[1] = "1700000000".into();
        for device in 0..2 {
            let base = 3 + 12 * device;
            cells[base] = format!("{}", 10 + device);
            cells[base + 2] = format!("{}", 20 + device);
            cells[base + 6] = format!("{}", 30 + device);
            cells[base + 11] = format!("{}", 40 + device);
        }
        let record = ByteRecord::from(cells);

        let reading = decode_row(RecordLayout::new(2), &record);

        assert_eq!(reading.timestamp, Some(1_700_000_000.0));
        assert_eq!(reading.fields.len(), 8);
        assert_eq!(reading.failed_fields(), 0);

        let value = |device, kind| {
            reading
                .fields
                .iter()
                .find(|f| f.slot == Slot::new(device, kind))
                .and_then(|f| f.value)
        };
        assert_eq!(value(1, FieldKind::Voltage), Some(10.0));
        assert_eq!(value(1, FieldKind::Temperature), Some(20.0));
        assert_eq!(value(1, FieldKind::Rssi), Some(30.0));
        assert_eq!(value(1, FieldKind::Power), Some(40.0));
        assert_eq!(value(2, FieldKind::Voltage), Some(11.0));
        assert_eq!(value(2, FieldKind::Power), Some(41.0));
    }

    #[test]
    fn short_row_fails_missing_slots() {
        let record = ByteRecord::from(vec!["0", "5", "", "12.5"]);

        let reading = decode_row(RecordLayout::new(1), &record);

        assert_eq!(reading.timestamp, Some(5.0));
        assert_eq!(reading.failed_fields(), 3);
        assert_eq!(reading.fields[0].value, Some(12.5));
    }

    #[test]
    fn bad_timestamp_does_not_affect_fields() {
        let record = ByteRecord::from(vec!["0", "", "", "1"]);
        let reading = decode_row(RecordLayout::new(0), &record);

        assert_eq!(reading.timestamp, None);
        assert!(reading.fields.is_empty());
    }

    #[test]
    fn non_utf8_cell_is_an_error() {
        assert!(matches!(
            decode_cell(b"12\xb0"),
            Err(DecodeError::NotUtf8 { .. })
        ));
        assert_eq!(decode_cell(b"12.5"), Ok(12.5));
        assert_eq!(decode_cell(b""), Err(DecodeError::Empty));
    }

    #[test]
    fn non_utf8_bytes_only_fail_their_own_slot() {
        let mut cells: Vec<Vec<u8>> = vec![Vec::new(); 15];
        cells[0] = b"site \xb0C".to_vec();
        cells[1] = b"1700000000".to_vec();
        cells[3] = b"12\xb0".to_vec();
        cells[5] = b"31.5".to_vec();
        cells[9] = b"120".to_vec();
        cells[14] = b"150.2".to_vec();
        let record = ByteRecord::from(cells);

        let reading = decode_row(RecordLayout::new(1), &record);

        assert_eq!(reading.timestamp, Some(1_700_000_000.0));
        assert_eq!(reading.failed_fields(), 1);
        assert_eq!(reading.fields[0].slot, Slot::new(1, FieldKind::Voltage));
        assert_eq!(reading.fields[0].value, None);
        assert!(reading
            .fields
            .iter()
            .skip(1)
            .all(|field| field.value.is_some()));
    }
}
