//! # tigowatch-types
//!
//! Core types shared by the tigowatch collector and its metrics exporter.
//!
//! The crate describes two things:
//!
//! - **The record layout** of a data-acquisition CSV log: a handful of
//!   leading columns (one of them a dataset timestamp) followed by one
//!   fixed-width block of columns per device.
//! - **The metrics snapshot**: the latest gauge value for every monitored
//!   (device, field) pair, the dataset timestamp, and a consecutive
//!   decode-failure counter for every monitored column.
//!
//! ## Features
//!
//! - `std` (default): Standard library support
//! - `serde`: JSON/etc. serialization via serde
//!
//! ## Example
//!
//! ```rust
//! use tigowatch_types::{FieldKind, RecordLayout};
//!
//! // 3 leading columns + two 12-column device blocks
//! let layout = RecordLayout::from_header_width(27);
//! assert_eq!(layout.device_count(), 2);
//!
//! // Device 2's power reading lives at 3 + 12 + 11
//! assert_eq!(layout.column(2, FieldKind::Power), 26);
//! ```
//!
//! ## Schema Version
//!
//! The current schema version is **1**. It is embedded in every serialized
//! snapshot so consumers of `--export` output can detect format changes.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod layout;
mod snapshot;
mod version;

pub use layout::*;
pub use snapshot::*;
pub use version::*;

/// Current schema version.
///
/// Increment this when making breaking changes to the snapshot format.
pub const SCHEMA_VERSION: u32 = 1;
