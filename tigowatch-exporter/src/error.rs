//! Error types for the metrics endpoint.

use std::io;
use std::net::AddrParseError;

use thiserror::Error;

/// Errors that can occur while serving metrics.
#[derive(Debug, Error)]
pub enum ExporterError {
    /// The configured listen address is not a valid socket address.
    #[error("Invalid listen address {addr:?}: {source}")]
    InvalidAddress {
        addr: String,
        #[source]
        source: AddrParseError,
    },

    /// Binding the listener failed.
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
}
