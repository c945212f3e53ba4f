//! # tigowatch-exporter
//!
//! Shared metrics state and the HTTP sink that exposes it for scraping.
//!
//! The collector owns all writes to [`MetricsState`]; the Prometheus endpoint
//! only ever reads it. Both sides hold the same `Arc<MetricsState>`, so the
//! updater can be tested without a live server.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use tigowatch_exporter::prometheus::{PrometheusConfig, PrometheusExporter};
//! use tigowatch_exporter::MetricsState;
//! use tigowatch_types::{FieldKind, FieldReading, Reading, RecordLayout, Slot};
//!
//! let state = Arc::new(MetricsState::new());
//! let exporter = PrometheusExporter::new(PrometheusConfig::default(), state.clone());
//!
//! state.apply(&Reading {
//!     layout: RecordLayout::new(1),
//!     fields: vec![FieldReading { slot: Slot::new(1, FieldKind::Voltage), value: Some(12.5) }],
//!     timestamp: Some(1_700_000_000.0),
//! });
//!
//! assert!(exporter.render().contains("tigo_module_volts{name=\"A1\"} 12.5"));
//! ```

mod error;
mod state;

pub mod prometheus;

pub use error::ExporterError;
pub use prometheus::{MetricsServer, PrometheusConfig, PrometheusExporter};
pub use state::{ApplyReport, MetricsState};

// Re-export types for convenience
pub use tigowatch_types::{FieldKind, FieldReading, MetricsSnapshot, Reading, RecordLayout, Slot};
