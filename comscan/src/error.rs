//! Error types for comscan.
//!
//! Two layers live here. [`Error`] is what a collaborator returns when a call
//! fails outright. [`Degradation`] is what the pipeline records for a
//! subsystem that produced nothing usable, whatever the cause; it never
//! escapes a scan as an error.

use std::io;
use thiserror::Error;

/// Result type for comscan operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for comscan operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (spawning the fallback command, reading output).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serial port enumeration error.
    #[cfg(feature = "native")]
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// Device or driver inventory query failed.
    #[error("Query failed: {0}")]
    Query(String),

    /// Registry access failed for a reason other than a missing key or value.
    #[error("Registry error: {0}")]
    Registry(String),

    /// Fallback enumeration command exited unsuccessfully.
    #[error("Command `{command}` failed: {reason}")]
    Command {
        /// Command line that was run.
        command: String,
        /// Exit status or spawn failure.
        reason: String,
    },

    /// Facility not available on this platform.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Invalid inspector configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Why a subsystem contributed nothing to a record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Degradation {
    /// The facility failed or is not available.
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),

    /// The facility answered but returned no matching entry.
    #[error("no matching entry")]
    NoMatch,

    /// A matching entry lacked an attribute the subsystem needs.
    #[error("missing field: {0}")]
    MissingField(&'static str),

    /// An identifier or id pattern did not match the input.
    #[error("pattern did not match: {0}")]
    ParseMiss(String),
}

impl From<Error> for Degradation {
    fn from(err: Error) -> Self {
        Self::SourceUnavailable(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_converts_to_source_unavailable() {
        let degraded = Degradation::from(Error::Query("access denied".to_string()));
        assert_eq!(
            degraded,
            Degradation::SourceUnavailable("Query failed: access denied".to_string())
        );
    }

    #[test]
    fn test_degradation_messages() {
        assert_eq!(Degradation::NoMatch.to_string(), "no matching entry");
        assert_eq!(
            Degradation::MissingField("device_id").to_string(),
            "missing field: device_id"
        );
    }
}
