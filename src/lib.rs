//! # tigowatch
//!
//! A Prometheus collector for Tigo solar-optimizer telemetry.
//!
//! The data-acquisition unit logs one CSV per period under a data directory.
//! `tigowatch` polls that directory, reads the last row of the newest file,
//! and publishes per-device voltage, RSSI, power and temperature gauges over
//! HTTP.
//!
//! ```text
//! ┌──────────────┐   poll    ┌───────────┐  apply   ┌──────────────┐  scrape
//! │  data dir    │──────────▶│ Collector │─────────▶│ MetricsState │◀────────── Prometheus
//! │ (*.csv logs) │           │ (source)  │          │  (exporter)  │
//! └──────────────┘           └───────────┘          └──────────────┘
//! ```
//!
//! - **[`source`]**: locating, parsing and decoding datasets
//! - **[`collector`]**: the poll loop and staleness handling
//! - **[`config`]**: layered runtime settings
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tigowatch::Collector;
//! use tigowatch_exporter::MetricsState;
//!
//! let state = Arc::new(MetricsState::new());
//! let mut collector = Collector::builder("/mnt/ffs/data/daqs")
//!     .state(state.clone())
//!     .build();
//!
//! let outcome = collector.poll_once().unwrap();
//! println!("{:?}: {}", outcome, tigowatch_exporter::prometheus::format_prometheus(&state.snapshot(), None));
//! ```

pub mod collector;
pub mod config;
pub mod duration;
pub mod error;
pub mod source;

pub use collector::{Collector, CollectorBuilder, CollectorHandle, CycleOutcome};
pub use config::{Overrides, Settings};
pub use error::{CollectError, DecodeError, ReadFailure};
