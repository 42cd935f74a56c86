//! Read-only access to `HKEY_LOCAL_MACHINE`.

use std::io;

use log::trace;
use winreg::{
    RegKey,
    enums::{HKEY_LOCAL_MACHINE, RegType},
    types::FromRegValue,
};

use crate::{
    error::{Error, Result},
    source::{KeyLookup, RegistryReader},
};

/// Registry reader rooted at `HKEY_LOCAL_MACHINE`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegistryClient;

impl RegistryReader for RegistryClient {
    fn read_string(&self, key_path: &str, value_name: &str) -> Result<KeyLookup> {
        let key = match RegKey::predef(HKEY_LOCAL_MACHINE).open_subkey(key_path) {
            Ok(key) => key,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                trace!("Registry key missing: {key_path}");
                return Ok(KeyLookup::KeyMissing);
            },
            Err(e) => return Err(Error::Registry(format!("open {key_path}: {e}"))),
        };

        let raw = match key.get_raw_value(value_name) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(KeyLookup::ValueMissing),
            Err(e) => return Err(Error::Registry(format!("read {key_path}\\{value_name}: {e}"))),
        };
        if !matches!(raw.vtype, RegType::REG_SZ | RegType::REG_EXPAND_SZ) {
            trace!("{key_path}\\{value_name} is {:?}, not a string", raw.vtype);
            return Ok(KeyLookup::ValueMissing);
        }

        String::from_reg_value(&raw)
            .map(KeyLookup::Value)
            .map_err(|e| Error::Registry(format!("decode {key_path}\\{value_name}: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_key_is_not_an_error() {
        let lookup = RegistryClient
            .read_string(r"SYSTEM\CurrentControlSet\Enum\NOPE\comscan-missing", "FriendlyName")
            .unwrap();
        assert_eq!(lookup, KeyLookup::KeyMissing);
    }

    #[test]
    fn test_missing_value_under_existing_key() {
        let lookup = RegistryClient
            .read_string(r"SYSTEM\CurrentControlSet\Control", "comscan-missing-value")
            .unwrap();
        assert_eq!(lookup, KeyLookup::ValueMissing);
    }
}
