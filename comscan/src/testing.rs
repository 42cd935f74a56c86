//! In-memory collaborators for unit tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::{
    error::{Error, Result},
    source::{
        DeviceEntry, DeviceQuery, DriverQuery, FallbackEnumerator, KeyLookup, RegistryReader,
        SignedDriverEntry, Sources, SystemDriverEntry, UsbCatalog, UsbPortEntry,
    },
};

/// Scripted system state. Every facility filters the same way the real one
/// does (substring on the name) and can be told to fail.
#[derive(Debug, Clone, Default)]
pub(crate) struct FakeSystem {
    pub devices: Vec<DeviceEntry>,
    pub device_query_fails: bool,
    /// `None` makes the fallback command fail.
    pub fallback_output: Option<String>,
    pub registry: HashMap<String, HashMap<String, String>>,
    pub registry_fails: bool,
    pub system_drivers: Vec<SystemDriverEntry>,
    pub signed_drivers: Vec<SignedDriverEntry>,
    pub driver_query_fails: bool,
    pub usb_ports: Vec<UsbPortEntry>,
    pub device_queries: Arc<AtomicUsize>,
}

impl FakeSystem {
    pub fn registry_key(&mut self, key: &str) {
        self.registry
            .entry(key.to_string())
            .or_default();
    }

    pub fn registry_value(&mut self, key: &str, name: &str, value: &str) {
        self.registry
            .entry(key.to_string())
            .or_default()
            .insert(name.to_string(), value.to_string());
    }

    /// Number of device inventory queries issued so far.
    pub fn device_query_count(&self) -> usize {
        self.device_queries.load(Ordering::SeqCst)
    }

    pub fn sources(&self) -> Sources {
        let backend = Arc::new(self.clone());
        Sources {
            devices: backend.clone(),
            drivers: backend.clone(),
            registry: backend.clone(),
            fallback: backend.clone(),
            usb: Some(backend),
        }
    }
}

/// A present port with a display name of the form `<description> (<port>)`.
pub(crate) fn com_entry(port: &str, description: &str) -> DeviceEntry {
    DeviceEntry {
        name: format!("{description} ({port})"),
        description: Some(description.to_string()),
        ..DeviceEntry::default()
    }
}

impl DeviceQuery for FakeSystem {
    fn devices_named_like(&self, fragment: &str) -> Result<Vec<DeviceEntry>> {
        self.device_queries
            .fetch_add(1, Ordering::SeqCst);
        if self.device_query_fails {
            return Err(Error::Query("WMI service unavailable".to_string()));
        }
        Ok(self
            .devices
            .iter()
            .filter(|d| d.name.contains(fragment))
            .cloned()
            .collect())
    }
}

impl DriverQuery for FakeSystem {
    fn system_drivers_named_like(&self, fragment: &str) -> Result<Vec<SystemDriverEntry>> {
        if self.driver_query_fails {
            return Err(Error::Query("driver inventory unavailable".to_string()));
        }
        Ok(self
            .system_drivers
            .iter()
            .filter(|d| {
                d.name
                    .as_deref()
                    .is_some_and(|n| n.contains(fragment))
            })
            .cloned()
            .collect())
    }

    fn signed_drivers_named_like(&self, fragment: &str) -> Result<Vec<SignedDriverEntry>> {
        if self.driver_query_fails {
            return Err(Error::Query("driver inventory unavailable".to_string()));
        }
        Ok(self
            .signed_drivers
            .iter()
            .filter(|d| {
                d.device_name
                    .as_deref()
                    .is_some_and(|n| n.contains(fragment))
            })
            .cloned()
            .collect())
    }
}

impl RegistryReader for FakeSystem {
    fn read_string(&self, key_path: &str, value_name: &str) -> Result<KeyLookup> {
        if self.registry_fails {
            return Err(Error::Registry(format!("access denied: {key_path}")));
        }
        Ok(match self.registry.get(key_path) {
            None => KeyLookup::KeyMissing,
            Some(values) => match values.get(value_name) {
                None => KeyLookup::ValueMissing,
                Some(value) => KeyLookup::Value(value.clone()),
            },
        })
    }
}

impl FallbackEnumerator for FakeSystem {
    fn enumerate_raw(&self) -> Result<String> {
        self.fallback_output
            .clone()
            .ok_or_else(|| Error::Command {
                command: "wmic path win32_serialport get deviceid".to_string(),
                reason: "not found".to_string(),
            })
    }
}

impl UsbCatalog for FakeSystem {
    fn usb_ports(&self) -> Result<Vec<UsbPortEntry>> {
        Ok(self.usb_ports.clone())
    }
}
