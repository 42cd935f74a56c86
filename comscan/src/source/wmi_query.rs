//! WMI-backed device and driver inventory.

use log::debug;
use serde::{Deserialize, de::DeserializeOwned};
use wmi::{COMLibrary, WMIConnection};

use crate::{
    error::{Error, Result},
    source::{DeviceEntry, DeviceQuery, DriverQuery, SignedDriverEntry, SystemDriverEntry},
};

#[derive(Deserialize, Debug)]
#[serde(rename_all = "PascalCase")]
struct Win32PnPEntity {
    name: Option<String>,
    description: Option<String>,
    manufacturer: Option<String>,
    status: Option<String>,
    #[serde(rename = "DeviceID")]
    device_id: Option<String>,
    #[serde(rename = "HardwareID")]
    hardware_id: Option<Vec<String>>,
    #[serde(rename = "CompatibleID")]
    compatible_id: Option<Vec<String>>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "PascalCase")]
struct Win32SystemDriver {
    name: Option<String>,
    service_type: Option<String>,
    install_date: Option<String>,
    version: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "PascalCase")]
struct Win32PnPSignedDriver {
    device_name: Option<String>,
    class_guid: Option<String>,
    config_manager_user_config: Option<bool>,
    config_manager_error_code: Option<u32>,
}

impl From<Win32PnPEntity> for DeviceEntry {
    fn from(row: Win32PnPEntity) -> Self {
        Self {
            name: row.name.unwrap_or_default(),
            description: row.description,
            manufacturer: row.manufacturer,
            status: row.status,
            device_id: row.device_id,
            hardware_ids: row.hardware_id.unwrap_or_default(),
            compatible_ids: row.compatible_id.unwrap_or_default(),
        }
    }
}

impl From<Win32SystemDriver> for SystemDriverEntry {
    fn from(row: Win32SystemDriver) -> Self {
        Self {
            name: row.name,
            service_type: row.service_type,
            install_date: row.install_date,
            version: row.version,
        }
    }
}

impl From<Win32PnPSignedDriver> for SignedDriverEntry {
    fn from(row: Win32PnPSignedDriver) -> Self {
        Self {
            device_name: row.device_name,
            class_guid: row.class_guid,
            config_flags: row
                .config_manager_user_config
                .map(|flag| flag.to_string()),
            problem_code: row
                .config_manager_error_code
                .map(|code| code.to_string()),
        }
    }
}

/// Queries `Win32_PnPEntity`, `Win32_SystemDriver` and `Win32_PnPSignedDriver`.
///
/// A COM library and WMI connection are opened for every query and dropped
/// when it returns.
#[derive(Debug, Clone, Copy, Default)]
pub struct WmiClient;

impl WmiClient {
    fn query<T: DeserializeOwned>(&self, wql: &str) -> Result<Vec<T>> {
        debug!("WMI query: {wql}");
        let com = COMLibrary::without_security()
            .map_err(|e| Error::Query(format!("COM initialization failed: {e}")))?;
        let connection = WMIConnection::new(com)
            .map_err(|e| Error::Query(format!("WMI connection failed: {e}")))?;
        connection
            .raw_query::<T>(wql)
            .map_err(|e| Error::Query(format!("{wql}: {e}")))
    }
}

impl DeviceQuery for WmiClient {
    fn devices_named_like(&self, fragment: &str) -> Result<Vec<DeviceEntry>> {
        let rows: Vec<Win32PnPEntity> = self.query(&format!(
            "SELECT Name, Description, Manufacturer, Status, DeviceID, HardwareID, CompatibleID \
             FROM Win32_PnPEntity WHERE Name LIKE '%{}%'",
            escape_like(fragment)
        ))?;
        Ok(rows
            .into_iter()
            .map(DeviceEntry::from)
            .collect())
    }
}

impl DriverQuery for WmiClient {
    fn system_drivers_named_like(&self, fragment: &str) -> Result<Vec<SystemDriverEntry>> {
        let rows: Vec<Win32SystemDriver> = self.query(&format!(
            "SELECT * FROM Win32_SystemDriver WHERE Name LIKE '%{}%'",
            escape_like(fragment)
        ))?;
        Ok(rows
            .into_iter()
            .map(SystemDriverEntry::from)
            .collect())
    }

    fn signed_drivers_named_like(&self, fragment: &str) -> Result<Vec<SignedDriverEntry>> {
        let rows: Vec<Win32PnPSignedDriver> = self.query(&format!(
            "SELECT * FROM Win32_PnPSignedDriver WHERE DeviceName LIKE '%{}%'",
            escape_like(fragment)
        ))?;
        Ok(rows
            .into_iter()
            .map(SignedDriverEntry::from)
            .collect())
    }
}

/// Escape a literal for use inside a quoted WQL `LIKE` pattern.
fn escape_like(fragment: &str) -> String {
    let mut escaped = String::with_capacity(fragment.len());
    for c in fragment.chars() {
        match c {
            '\\' => escaped.push_str(r"\\"),
            '\'' => escaped.push_str(r"\'"),
            '%' | '_' | '[' => {
                escaped.push('[');
                escaped.push(c);
                escaped.push(']');
            },
            _ => escaped.push(c),
        }
    }
    escaped
}
