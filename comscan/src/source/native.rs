//! Native collaborators for the host system.
//!
//! On Windows the device, driver and registry facilities are backed by WMI
//! and the Win32 registry API. Elsewhere they report [`Error::Unsupported`],
//! which the pipeline degrades like any other source failure. The fallback
//! command and the `serialport` USB catalog work on every platform.

use std::process::Command;
use std::sync::Arc;

use log::{debug, trace};

use crate::{
    error::{Error, Result},
    source::{
        DeviceEntry, DeviceQuery, DriverQuery, FallbackEnumerator, KeyLookup, RegistryReader,
        SignedDriverEntry, Sources, SystemDriverEntry,
    },
};

#[cfg(feature = "native")]
use crate::source::{UsbCatalog, UsbPortEntry};

/// Default fallback command: lists `Win32_SerialPort` device ids.
pub const DEFAULT_FALLBACK_COMMAND: &[&str] = &["wmic", "path", "win32_serialport", "get", "deviceid"];

/// Runs a command and hands back its standard output.
#[derive(Debug, Clone)]
pub struct CommandEnumerator {
    program: String,
    args: Vec<String>,
}

impl CommandEnumerator {
    /// Build from a command line split into program and arguments.
    pub fn new(command: &[impl AsRef<str>]) -> Result<Self> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| Error::Config("fallback command must not be empty".to_string()))?;
        Ok(Self {
            program: program.as_ref().to_string(),
            args: args
                .iter()
                .map(|a| a.as_ref().to_string())
                .collect(),
        })
    }

    fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl Default for CommandEnumerator {
    fn default() -> Self {
        Self {
            program: DEFAULT_FALLBACK_COMMAND[0].to_string(),
            args: DEFAULT_FALLBACK_COMMAND[1..]
                .iter()
                .map(|a| (*a).to_string())
                .collect(),
        }
    }
}

impl FallbackEnumerator for CommandEnumerator {
    fn enumerate_raw(&self) -> Result<String> {
        debug!("Running fallback enumeration: {}", self.command_line());
        let output = Command::new(&self.program)
            .args(&self.args)
            .output()
            .map_err(|e| Error::Command {
                command: self.command_line(),
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(Error::Command {
                command: self.command_line(),
                reason: output.status.to_string(),
            });
        }

        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        trace!("Fallback output: {} byte(s)", text.len());
        Ok(text)
    }
}

/// USB serial ports as reported by the `serialport` crate.
#[cfg(feature = "native")]
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialportCatalog;

#[cfg(feature = "native")]
impl UsbCatalog for SerialportCatalog {
    fn usb_ports(&self) -> Result<Vec<UsbPortEntry>> {
        let ports = serialport::available_ports()?;

        Ok(ports
            .into_iter()
            .filter_map(|p| match p.port_type {
                serialport::SerialPortType::UsbPort(info) => Some(UsbPortEntry {
                    port_name: p.port_name,
                    vid: info.vid,
                    pid: info.pid,
                    serial_number: info.serial_number,
                    manufacturer: info.manufacturer,
                    product: info.product,
                }),
                _ => None,
            })
            .collect())
    }
}

/// Stand-in for facilities this platform does not have.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unsupported;

impl Unsupported {
    fn error(facility: &str) -> Error {
        Error::Unsupported(format!(
            "{facility} is only available on Windows (running on {})",
            std::env::consts::OS
        ))
    }
}

impl DeviceQuery for Unsupported {
    fn devices_named_like(&self, _fragment: &str) -> Result<Vec<DeviceEntry>> {
        Err(Self::error("device inventory"))
    }
}

impl DriverQuery for Unsupported {
    fn system_drivers_named_like(&self, _fragment: &str) -> Result<Vec<SystemDriverEntry>> {
        Err(Self::error("system driver inventory"))
    }

    fn signed_drivers_named_like(&self, _fragment: &str) -> Result<Vec<SignedDriverEntry>> {
        Err(Self::error("signed driver inventory"))
    }
}

impl RegistryReader for Unsupported {
    fn read_string(&self, _key_path: &str, _value_name: &str) -> Result<KeyLookup> {
        Err(Self::error("registry"))
    }
}

impl Sources {
    /// Collaborators for the host system, with `fallback` as the discovery
    /// fallback.
    pub fn native(fallback: CommandEnumerator) -> Self {
        #[cfg(windows)]
        let (devices, drivers, registry): (
            Arc<dyn DeviceQuery>,
            Arc<dyn DriverQuery>,
            Arc<dyn RegistryReader>,
        ) = (
            Arc::new(crate::source::wmi_query::WmiClient),
            Arc::new(crate::source::wmi_query::WmiClient),
            Arc::new(crate::source::registry::RegistryClient),
        );

        #[cfg(not(windows))]
        let (devices, drivers, registry): (
            Arc<dyn DeviceQuery>,
            Arc<dyn DriverQuery>,
            Arc<dyn RegistryReader>,
        ) = (
            Arc::new(Unsupported),
            Arc::new(Unsupported),
            Arc::new(Unsupported),
        );

        #[cfg(feature = "native")]
        let usb: Option<Arc<dyn crate::source::UsbCatalog>> = Some(Arc::new(SerialportCatalog));
        #[cfg(not(feature = "native"))]
        let usb = None;

        Self {
            devices,
            drivers,
            registry,
            fallback: Arc::new(fallback),
            usb,
        }
    }
}
