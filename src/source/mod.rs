//! The dataset pipeline: locate, parse and decode.
//!
//! ```text
//! data dir ──▶ locate ──▶ tracker ──▶ parse ──▶ decode ──▶ Reading
//!             (newest     (changed?   (last     (per-slot
//!              .csv)       stale?)     row)      floats)
//! ```
//!
//! Every stage here is synchronous and lock-free; the collector applies the
//! resulting [`Reading`](tigowatch_types::Reading) to the shared state.

mod decode;
mod locate;
mod parse;
mod tracker;

pub use decode::{decode_field, decode_row};
pub use locate::{dataset_modified, locate_newest_csv};
pub use parse::{read_last_row, read_last_row_from, LastRow};
pub use tracker::{ChangeTracker, Observation, DEFAULT_STALE_AFTER};
