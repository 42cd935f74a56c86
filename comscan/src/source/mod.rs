//! Collaborator interfaces for the system facilities a scan reads from.
//!
//! The pipeline never talks to WMI, the registry or a subprocess directly.
//! It goes through the traits in this module, bundled in [`Sources`] and
//! handed to the inspector at construction:
//!
//! ```text
//!                 +----------------+
//!                 | PortInspector  |
//!                 +-------+--------+
//!                         | Sources
//!    +----------+---------+-----+------------+-----------+
//!    |          |               |            |           |
//! DeviceQuery DriverQuery RegistryReader Fallback    UsbCatalog
//!    |          |               |       Enumerator       |
//!   WMI        WMI          HKLM (Win32)  wmic       serialport
//! ```
//!
//! Implementations acquire whatever handle they need per call and release it
//! before returning; nothing is held across ports. Every trait is
//! `Send + Sync` so a bundle can be shared by parallel workers.

pub mod native;

#[cfg(windows)]
pub mod registry;
#[cfg(windows)]
pub mod wmi_query;

use std::sync::Arc;

use crate::error::Result;

/// One entry of the device inventory (a Plug and Play device).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceEntry {
    /// Display name, e.g. `USB-SERIAL CH340 (COM7)`.
    pub name: String,
    /// Device description.
    pub description: Option<String>,
    /// Device manufacturer.
    pub manufacturer: Option<String>,
    /// Device status, e.g. `OK` or `Error`.
    pub status: Option<String>,
    /// Instance path, e.g. `USB\VID_1A86&PID_7523\5&2A1D3C&0&2`.
    pub device_id: Option<String>,
    /// Hardware ids, most specific first.
    pub hardware_ids: Vec<String>,
    /// Compatible ids, most specific first.
    pub compatible_ids: Vec<String>,
}

/// One system driver service record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SystemDriverEntry {
    /// Service name.
    pub name: Option<String>,
    /// Service type, e.g. `Kernel Driver`.
    pub service_type: Option<String>,
    /// Install date as reported by the facility.
    pub install_date: Option<String>,
    /// Driver version.
    pub version: Option<String>,
}

/// One signed driver record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignedDriverEntry {
    /// Device name the driver is bound to.
    pub device_name: Option<String>,
    /// Device setup class GUID.
    pub class_guid: Option<String>,
    /// Configuration manager user config flags.
    pub config_flags: Option<String>,
    /// Configuration manager error (problem) code.
    pub problem_code: Option<String>,
}

/// Outcome of reading a named value under a registry key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyLookup {
    /// The key does not exist.
    KeyMissing,
    /// The key exists but has no such string value.
    ValueMissing,
    /// The key exists and the value was read.
    Value(String),
}

/// USB descriptor strings of a serial port, as the OS reports them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UsbPortEntry {
    /// Port name, e.g. `COM7`.
    pub port_name: String,
    /// USB vendor id.
    pub vid: u16,
    /// USB product id.
    pub pid: u16,
    /// Serial number string.
    pub serial_number: Option<String>,
    /// Manufacturer string.
    pub manufacturer: Option<String>,
    /// Product string.
    pub product: Option<String>,
}

/// Device inventory query.
pub trait DeviceQuery: Send + Sync {
    /// Entries whose display name contains `fragment`.
    fn devices_named_like(&self, fragment: &str) -> Result<Vec<DeviceEntry>>;
}

/// Driver and service inventory queries.
pub trait DriverQuery: Send + Sync {
    /// System driver services whose name contains `fragment`.
    fn system_drivers_named_like(&self, fragment: &str) -> Result<Vec<SystemDriverEntry>>;

    /// Signed driver records whose device name contains `fragment`.
    fn signed_drivers_named_like(&self, fragment: &str) -> Result<Vec<SignedDriverEntry>>;
}

/// Read-only access to the hierarchical configuration store.
pub trait RegistryReader: Send + Sync {
    /// Open `key_path` and read the string value `value_name`.
    ///
    /// A missing key or value is not an error; it is reported through
    /// [`KeyLookup`]. `Err` is reserved for access failures.
    fn read_string(&self, key_path: &str, value_name: &str) -> Result<KeyLookup>;
}

/// Command-line enumeration of serial ports used as a discovery fallback.
pub trait FallbackEnumerator: Send + Sync {
    /// Raw text output listing serial port identifiers.
    fn enumerate_raw(&self) -> Result<String>;
}

/// Catalog of USB serial ports with descriptor strings.
pub trait UsbCatalog: Send + Sync {
    /// All USB serial ports currently attached.
    fn usb_ports(&self) -> Result<Vec<UsbPortEntry>>;
}

/// The collaborators a scan reads from.
#[derive(Clone)]
pub struct Sources {
    /// Device inventory.
    pub devices: Arc<dyn DeviceQuery>,
    /// Driver and service inventory.
    pub drivers: Arc<dyn DriverQuery>,
    /// Registry access.
    pub registry: Arc<dyn RegistryReader>,
    /// Fallback enumeration for discovery.
    pub fallback: Arc<dyn FallbackEnumerator>,
    /// USB descriptor catalog, if one is available.
    pub usb: Option<Arc<dyn UsbCatalog>>,
}

impl std::fmt::Debug for Sources {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sources")
            .field("usb", &self.usb.is_some())
            .finish_non_exhaustive()
    }
}
