//! USB identification from hardware id strings.
//!
//! Windows exposes USB serial adapters with hardware ids such as
//! `USB\VID_1A86&PID_7523&REV_0264`. This module extracts the vendor and
//! product ids from those strings and classifies well-known USB-to-UART
//! bridges.

use std::sync::LazyLock;

use log::trace;
use regex::Regex;

use crate::error::Degradation;

#[allow(clippy::unwrap_used)] // Static pattern
static VID_PID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"VID_([0-9A-Fa-f]{4})&PID_([0-9A-Fa-f]{4})").unwrap());

/// Vendor and product id as they appear in a hardware id (4 hex digits each).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsbIds {
    /// USB vendor id.
    pub vendor_id: String,
    /// USB product id.
    pub product_id: String,
}

impl UsbIds {
    /// Numeric vendor and product id.
    pub fn numeric(&self) -> Option<(u16, u16)> {
        let vid = u16::from_str_radix(&self.vendor_id, 16).ok()?;
        let pid = u16::from_str_radix(&self.product_id, 16).ok()?;
        Some((vid, pid))
    }
}

/// Parse the first `VID_XXXX&PID_XXXX` pair out of `hardware_ids`.
///
/// Entries are scanned in order and scanning stops at the first match.
pub fn extract_usb_ids<S: AsRef<str>>(hardware_ids: &[S]) -> Result<UsbIds, Degradation> {
    if hardware_ids.is_empty() {
        return Err(Degradation::MissingField("hardware_ids"));
    }

    for hardware_id in hardware_ids {
        if let Some(caps) = VID_PID_PATTERN.captures(hardware_id.as_ref()) {
            let ids = UsbIds {
                vendor_id: caps[1].to_string(),
                product_id: caps[2].to_string(),
            };
            trace!(
                "Matched VID {} PID {} in {}",
                ids.vendor_id,
                ids.product_id,
                hardware_id.as_ref()
            );
            return Ok(ids);
        }
    }

    Err(Degradation::ParseMiss(format!(
        "no VID/PID in {} hardware id(s)",
        hardware_ids.len()
    )))
}

/// Known USB bridge kinds commonly used for serial adapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    /// CH340/CH341 USB-to-Serial converter.
    Ch340,
    /// Silicon Labs CP210x USB-to-Serial converter.
    Cp210x,
    /// FTDI FT232/FT2232/FT4232 USB-to-Serial converter.
    Ftdi,
    /// Prolific PL2303 USB-to-Serial converter.
    Prolific,
    /// Unknown device.
    Unknown,
}

/// Known USB VID/PID pairs for common USB-to-UART bridges.
const KNOWN_USB_DEVICES: &[(u16, &[u16], DeviceKind)] = &[
    (
        0x1A86,
        &[0x7523, 0x7522, 0x5523, 0x5512, 0x55D4],
        DeviceKind::Ch340,
    ),
    (0x10C4, &[0xEA60, 0xEA70, 0xEA71, 0xEA63], DeviceKind::Cp210x),
    (
        0x0403,
        &[0x6001, 0x6010, 0x6011, 0x6014, 0x6015],
        DeviceKind::Ftdi,
    ),
    (0x067B, &[0x2303, 0x23A3, 0x23C3, 0x23D3], DeviceKind::Prolific),
];

impl DeviceKind {
    /// Classify a VID/PID combination.
    #[must_use]
    pub fn from_vid_pid(vid: u16, pid: u16) -> Self {
        for (known_vid, pids, device) in KNOWN_USB_DEVICES {
            if vid == *known_vid && pids.contains(&pid) {
                return *device;
            }
        }
        Self::Unknown
    }

    /// Get a human-readable name for the device kind.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ch340 => "CH340/CH341",
            Self::Cp210x => "CP210x",
            Self::Ftdi => "FTDI",
            Self::Prolific => "PL2303",
            Self::Unknown => "Unknown",
        }
    }

    /// Check if this is a known device kind.
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}
