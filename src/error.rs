//! Error types for the collection pipeline.
//!
//! `CollectError` aborts one poll cycle and is logged; the loop carries on at
//! the next interval. `DecodeError` only affects a single cell and is
//! tracked through that slot's failure counter.

use std::io;
use std::num::ParseFloatError;
use std::str::Utf8Error;
use std::path::PathBuf;

use thiserror::Error;

/// Errors that abort a single poll cycle.
#[derive(Debug, Error)]
pub enum CollectError {
    /// Walking the watched directory failed.
    #[error("Failed to scan {}: {source}", root.display())]
    Scan {
        root: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Reading the dataset's modification time failed.
    #[error("Failed to stat {}: {source}", path.display())]
    Stat {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Opening or parsing the dataset failed.
    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: ReadFailure,
    },
}

/// Why a dataset could not be read.
#[derive(Debug, Error)]
pub enum ReadFailure {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// The file has no header row at all.
    #[error("missing header row")]
    MissingHeader,
}

/// A cell that could not be decoded as a number.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    /// The cell is empty, or absent because the row is too short.
    #[error("empty field")]
    Empty,

    #[error("invalid number {value:?}: {source}")]
    Invalid {
        value: String,
        #[source]
        source: ParseFloatError,
    },

    #[error("field is not valid UTF-8: {source}")]
    NotUtf8 {
        #[source]
        source: Utf8Error,
    },
}
