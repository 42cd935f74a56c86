//! # comscan
//!
//! Serial (COM) port discovery and multi-source enrichment.
//!
//! The crate answers "which serial ports exist or have existed on this
//! machine, and what is known about each". It:
//!
//! - discovers port identifiers from the device inventory and a fallback
//!   command, reconciled into one ordered, deduplicated set
//! - enriches each port from independent sources (device inventory,
//!   registry friendly names, driver services, signed drivers, USB ids)
//! - tracks progress across summary and detailed population phases
//! - keeps going when any single source fails, recording why on each record
//!
//! ## Supported Platforms
//!
//! - **Windows**: WMI device/driver queries and registry lookups
//! - **Other hosts**: the fallback command and the USB catalog only; the
//!   Windows-only sources degrade to "unavailable"
//!
//! ## Features
//!
//! - `native` (default): USB descriptor catalog via the `serialport` crate
//! - `serde`: Serialization support for data types
//!
//! ## Example
//!
//! ```rust,no_run
//! use comscan::{InspectorConfig, PortInspector};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let inspector = PortInspector::native(InspectorConfig::default())?;
//!
//!     for port in inspector.all_ports_detailed(Some(&mut |percent: f64| {
//!         eprintln!("{percent:.0}%");
//!     })) {
//!         println!("{} present={}", port.port_name, port.is_present);
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::sync::{Arc, OnceLock};

pub mod device;
pub mod error;
pub mod format;
pub mod identifier;
pub mod inspector;
pub mod progress;
pub mod record;
pub mod source;

#[cfg(test)]
mod testing;

static INTERRUPT_CHECKER: OnceLock<Arc<dyn Fn() -> bool + Send + Sync>> = OnceLock::new();

/// Register the process-wide interruption checker consulted between ports.
///
/// The checker should return `true` when the current scan should stop
/// (for example after receiving Ctrl-C in CLI applications). Only the first
/// registration takes effect.
pub fn set_interrupt_checker<F>(checker: F)
where
    F: Fn() -> bool + Send + Sync + 'static,
{
    let _ = INTERRUPT_CHECKER.set(Arc::new(checker));
}

/// Returns whether interruption was requested by the embedding application.
#[must_use]
pub fn is_interrupted_requested() -> bool {
    INTERRUPT_CHECKER
        .get()
        .is_some_and(|checker| checker())
}

pub use {
    device::{DeviceKind, UsbIds, extract_usb_ids},
    error::{Degradation, Error, Result},
    identifier::{IdentifierPattern, PortIdentifier},
    inspector::{
        DetailLevel, Discovery, InspectorConfig, PortInspector, PresenceFilter, ScanReport,
    },
    progress::ProgressTracker,
    record::{
        DriverInfo, EnrichmentReport, PortDetails, PortRecord, PortSummary, Stage, Subsystem,
        SystemDetails, UsbDetails,
    },
    source::{
        DeviceEntry, DeviceQuery, DriverQuery, FallbackEnumerator, KeyLookup, RegistryReader,
        SignedDriverEntry, Sources, SystemDriverEntry, UsbCatalog, UsbPortEntry,
        native::CommandEnumerator,
    },
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interrupt_checker_default_false() {
        // Nothing in the test suite registers a checker that returns true.
        assert!(!is_interrupted_requested());
    }
}
