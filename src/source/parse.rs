//! Dataset parsing.
//!
//! Only the last row of a dataset matters: the collector reports the latest
//! value of every gauge, not a time series. The header is only used for its
//! width, which determines how many device blocks each row holds.
//!
//! Records are kept as raw bytes. Text encoding is checked per monitored cell
//! when decoding, so stray non-UTF-8 bytes elsewhere in the file are harmless.

use std::fs::File;
use std::io;
use std::path::Path;

use csv::{ByteRecord, ReaderBuilder};
use tigowatch_types::RecordLayout;

use crate::error::{CollectError, ReadFailure};

/// The last row of a dataset, with the layout inferred from its header.
#[derive(Debug, Clone, PartialEq)]
pub struct LastRow {
    pub layout: RecordLayout,
    pub record: ByteRecord,
    /// Number of data rows in the file (header excluded).
    pub rows: usize,
}

/// Read the dataset at `path` and return its last data row.
///
/// Returns `Ok(None)` when the file holds a header but no data rows.
/// Rows whose width differs from the header's are a CSV structure error.
pub fn read_last_row(path: &Path) -> Result<Option<LastRow>, CollectError> {
    File::open(path)
        .map_err(ReadFailure::from)
        .and_then(read_last_row_from)
        .map_err(|source| CollectError::Read {
            path: path.to_path_buf(),
            source,
        })
}

/// Same as [`read_last_row`], for any reader.
pub fn read_last_row_from<R: io::Read>(reader: R) -> Result<Option<LastRow>, ReadFailure> {
    let mut rdr = ReaderBuilder::new().has_headers(true).from_reader(reader);

    let header_width = rdr.byte_headers()?.len();
    if header_width == 0 {
        return Err(ReadFailure::MissingHeader);
    }
    let layout = RecordLayout::from_header_width(header_width);

    let mut current = ByteRecord::new();
    let mut last = ByteRecord::new();
    let mut rows = 0;
    while rdr.read_byte_record(&mut current)? {
        std::mem::swap(&mut current, &mut last);
        rows += 1;
    }

    if rows == 0 {
        return Ok(None);
    }

    Ok(Some(LastRow {
        layout,
        record: last,
        rows,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn header(devices: usize) -> String {
        let width = 3 + 12 * devices;
        (0..width)
            .map(|i| format!("c{}", i))
            .collect::<Vec<_>>()
            .join(",")
    }

    fn row(devices: usize, fill: &str) -> String {
        vec![fill; 3 + 12 * devices].join(",")
    }

    #[test]
    fn returns_last_row_only() {
        let data = format!(
            "{}\n{}\n{}\n{}\n",
            header(1),
            row(1, "1"),
            row(1, "2"),
            row(1, "3")
        );

        let last = read_last_row_from(data.as_bytes()).unwrap().unwrap();

        assert_eq!(last.layout.device_count(), 1);
        assert_eq!(last.rows, 3);
        assert_eq!(last.record.len(), 15);
        assert!(last.record.iter().all(|cell| cell == b"3"));
    }

    #[test]
    fn layout_follows_header_width() {
        let data = format!("{}\n{}\n", header(4), row(4, "0"));
        let last = read_last_row_from(data.as_bytes()).unwrap().unwrap();
        assert_eq!(last.layout.device_count(), 4);
    }

    #[test]
    fn header_only_is_no_reading() {
        let data = format!("{}\n", header(2));
        assert_eq!(read_last_row_from(data.as_bytes()).unwrap(), None);
    }

    #[test]
    fn empty_file_is_missing_header() {
        let result = read_last_row_from(&b""[..]);
        assert!(matches!(result, Err(ReadFailure::MissingHeader)));
    }

    #[test]
    fn ragged_rows_are_a_csv_error() {
        let data = format!("{}\n{}\n1,2,3\n", header(1), row(1, "1"));
        let result = read_last_row_from(data.as_bytes());
        assert!(matches!(result, Err(ReadFailure::Csv(_))));
    }

    #[test]
    fn quoted_cells_are_unquoted() {
        let mut cells = vec![String::from("0"); 15];
        cells[3] = "\"12.5\"".to_string();
        let data = format!("{}\n{}\n", header(1), cells.join(","));

        let last = read_last_row_from(data.as_bytes()).unwrap().unwrap();
        assert_eq!(&last.record[3], b"12.5");
    }

    #[test]
    fn non_utf8_bytes_do_not_fail_the_read() {
        let mut data = b"name \xb0C".to_vec();
        for i in 1..15 {
            data.extend_from_slice(format!(",c{}", i).as_bytes());
        }
        data.extend_from_slice(b"\nx\xb0,1700000000,,12\xb0,,,,,,,,,,,150.2\n");

        let last = read_last_row_from(data.as_slice()).unwrap().unwrap();

        assert_eq!(last.layout.device_count(), 1);
        assert_eq!(&last.record[0], b"x\xb0");
        assert_eq!(&last.record[3], b"12\xb0");
        assert_eq!(&last.record[14], b"150.2");
    }

    #[test]
    fn reads_from_disk() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{}", header(1)).unwrap();
        writeln!(file, "{}", row(1, "7")).unwrap();
        file.flush().unwrap();

        let last = read_last_row(file.path()).unwrap().unwrap();
        assert_eq!(last.rows, 1);
        assert_eq!(&last.record[1], b"7");
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_last_row(&dir.path().join("gone.csv")).unwrap_err();
        assert!(matches!(
            err,
            CollectError::Read {
                source: ReadFailure::Io(_),
                ..
            }
        ));
    }
}
