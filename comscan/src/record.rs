//! Per-port profile and the enrichment that fills it.
//!
//! A [`PortRecord`] moves through two population phases:
//!
//! ```text
//! Created --populate_summary--> SummaryPopulated --populate_detailed--> DetailedPopulated
//! ```
//!
//! Each phase signals the scan's [`ProgressTracker`] exactly once. Every
//! subsystem call is guarded on its own; its outcome lands in the record's
//! [`EnrichmentReport`] and a failure only leaves that subsystem's fields
//! unset. The device inventory is queried once per record and the result is
//! reused by both phases.

use log::{debug, warn};

use crate::{
    device::{DeviceKind, UsbIds, extract_usb_ids},
    error::Degradation,
    identifier::{IdentifierPattern, PortIdentifier},
    inspector::InspectorConfig,
    progress::ProgressTracker,
    source::{DeviceEntry, KeyLookup, Sources, UsbCatalog},
};

/// Driver service details.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DriverInfo {
    /// Service type of the matching driver service (not a vendor name).
    pub provider: Option<String>,
    /// Install date.
    pub date: Option<String>,
    /// Driver version.
    pub version: Option<String>,
}

/// USB identification.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct UsbDetails {
    /// Vendor id, 4 hex digits.
    pub vendor_id: Option<String>,
    /// Product id, 4 hex digits.
    pub product_id: Option<String>,
    /// USB serial number string.
    pub serial_number: Option<String>,
    /// USB manufacturer string.
    pub manufacturer: Option<String>,
    /// USB product string.
    pub product_name: Option<String>,
}

impl UsbDetails {
    /// Classify the bridge from the vendor and product id.
    pub fn device_kind(&self) -> DeviceKind {
        self.ids()
            .as_ref()
            .and_then(UsbIds::numeric)
            .map_or(DeviceKind::Unknown, |(vid, pid)| DeviceKind::from_vid_pid(vid, pid))
    }

    /// Vendor and product id, when both are known.
    pub fn ids(&self) -> Option<UsbIds> {
        Some(UsbIds {
            vendor_id: self.vendor_id.clone()?,
            product_id: self.product_id.clone()?,
        })
    }
}

/// Signed driver details.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SystemDetails {
    /// Device setup class GUID.
    pub class_guid: Option<String>,
    /// Configuration manager user config flags.
    pub config_flags: Option<String>,
    /// Configuration manager problem code.
    pub problem_code: Option<String>,
}

/// Summary-level snapshot of a record.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PortSummary {
    /// Port identifier.
    pub port_name: String,
    /// Whether the device inventory currently lists the port.
    pub is_present: bool,
    /// Device description.
    pub description: Option<String>,
    /// Device manufacturer.
    pub manufacturer: Option<String>,
    /// Device status.
    pub status: Option<String>,
}

/// Detailed snapshot of a record.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PortDetails {
    /// Port identifier.
    pub port_name: String,
    /// Whether the device inventory currently lists the port.
    pub is_present: bool,
    /// Device description.
    pub description: Option<String>,
    /// Device manufacturer.
    pub manufacturer: Option<String>,
    /// Device instance path.
    pub device_id: Option<String>,
    /// Friendly name from the registry.
    pub friendly_name: Option<String>,
    /// Device status.
    pub status: Option<String>,
    /// Registry key the friendly name was looked up under.
    pub registry_path: Option<String>,
    /// Hardware ids.
    pub hardware_ids: Vec<String>,
    /// Compatible ids.
    pub compatible_ids: Vec<String>,
    /// Driver service details.
    pub driver_info: DriverInfo,
    /// USB identification.
    pub usb_details: UsbDetails,
    /// Signed driver details.
    pub system_details: SystemDetails,
}

/// Population level a record has reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    /// Nothing populated yet.
    Created,
    /// Presence and identity populated.
    SummaryPopulated,
    /// Extended identity, registry, USB and driver details populated.
    DetailedPopulated,
}

/// The independent lookups that feed a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subsystem {
    /// Device inventory query.
    DeviceQuery,
    /// Registry friendly-name lookup.
    Registry,
    /// VID/PID extraction from hardware ids.
    UsbIds,
    /// System driver service lookup.
    SystemDriver,
    /// Signed driver lookup.
    SignedDriver,
    /// USB descriptor catalog lookup.
    UsbCatalog,
}

impl Subsystem {
    /// Short name for logs and reports.
    pub fn name(self) -> &'static str {
        match self {
            Self::DeviceQuery => "device query",
            Self::Registry => "registry",
            Self::UsbIds => "usb ids",
            Self::SystemDriver => "system driver",
            Self::SignedDriver => "signed driver",
            Self::UsbCatalog => "usb catalog",
        }
    }
}

/// Result of one subsystem call.
pub type Outcome = std::result::Result<(), Degradation>;

/// Per-subsystem outcomes of a record's population. `None` means the
/// subsystem has not run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnrichmentReport {
    /// Device inventory query.
    pub device_query: Option<Outcome>,
    /// Registry lookup.
    pub registry: Option<Outcome>,
    /// VID/PID extraction.
    pub usb_ids: Option<Outcome>,
    /// System driver lookup.
    pub system_driver: Option<Outcome>,
    /// Signed driver lookup.
    pub signed_driver: Option<Outcome>,
    /// USB descriptor catalog lookup.
    pub usb_catalog: Option<Outcome>,
}

impl EnrichmentReport {
    /// Outcome recorded for `subsystem`.
    pub fn get(&self, subsystem: Subsystem) -> Option<&Outcome> {
        self.slot(subsystem).as_ref()
    }

    /// Subsystems that ran and contributed nothing, with the reason.
    pub fn degraded(&self) -> Vec<(Subsystem, &Degradation)> {
        [
            Subsystem::DeviceQuery,
            Subsystem::Registry,
            Subsystem::UsbIds,
            Subsystem::SystemDriver,
            Subsystem::SignedDriver,
            Subsystem::UsbCatalog,
        ]
        .into_iter()
        .filter_map(|s| match self.get(s) {
            Some(Err(reason)) => Some((s, reason)),
            _ => None,
        })
        .collect()
    }

    fn slot(&self, subsystem: Subsystem) -> &Option<Outcome> {
        match subsystem {
            Subsystem::DeviceQuery => &self.device_query,
            Subsystem::Registry => &self.registry,
            Subsystem::UsbIds => &self.usb_ids,
            Subsystem::SystemDriver => &self.system_driver,
            Subsystem::SignedDriver => &self.signed_driver,
            Subsystem::UsbCatalog => &self.usb_catalog,
        }
    }

    fn slot_mut(&mut self, subsystem: Subsystem) -> &mut Option<Outcome> {
        match subsystem {
            Subsystem::DeviceQuery => &mut self.device_query,
            Subsystem::Registry => &mut self.registry,
            Subsystem::UsbIds => &mut self.usb_ids,
            Subsystem::SystemDriver => &mut self.system_driver,
            Subsystem::SignedDriver => &mut self.signed_driver,
            Subsystem::UsbCatalog => &mut self.usb_catalog,
        }
    }
}

/// What a population phase reads from: collaborators, settings, and the
/// scan's shared tracker.
#[derive(Debug, Clone, Copy)]
pub struct ScanContext<'a> {
    /// Collaborators.
    pub sources: &'a Sources,
    /// Inspector settings.
    pub config: &'a InspectorConfig,
    /// Identifier pattern used to match inventory entries.
    pub pattern: &'a IdentifierPattern,
    /// Tracker shared by every record of the scan.
    pub tracker: &'a ProgressTracker,
}

/// Aggregate profile of one serial port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortRecord {
    identifier: PortIdentifier,
    stage: Stage,
    is_present: bool,
    description: Option<String>,
    manufacturer: Option<String>,
    status: Option<String>,
    device_id: Option<String>,
    hardware_ids: Vec<String>,
    compatible_ids: Vec<String>,
    friendly_name: Option<String>,
    registry_path: Option<String>,
    driver_info: DriverInfo,
    usb_details: UsbDetails,
    system_details: SystemDetails,
    report: EnrichmentReport,
    device: Option<std::result::Result<DeviceEntry, Degradation>>,
}

impl PortRecord {
    /// New record with every field unknown.
    pub fn new(identifier: PortIdentifier) -> Self {
        Self {
            identifier,
            stage: Stage::Created,
            is_present: false,
            description: None,
            manufacturer: None,
            status: None,
            device_id: None,
            hardware_ids: Vec::new(),
            compatible_ids: Vec::new(),
            friendly_name: None,
            registry_path: None,
            driver_info: DriverInfo::default(),
            usb_details: UsbDetails::default(),
            system_details: SystemDetails::default(),
            report: EnrichmentReport::default(),
            device: None,
        }
    }

    /// Populate presence and identity from the device inventory.
    ///
    /// Only runs from [`Stage::Created`]; later calls are ignored and do not
    /// signal the tracker.
    pub fn populate_summary(&mut self, ctx: &ScanContext<'_>) {
        if self.stage != Stage::Created {
            debug!("{}: summary already populated", self.identifier);
            return;
        }

        let lookup = self.device_lookup(ctx);
        let outcome = match lookup {
            Ok(entry) => {
                self.is_present = true;
                fill(&mut self.description, entry.description);
                fill(&mut self.manufacturer, entry.manufacturer);
                fill(&mut self.status, entry.status);
                Ok(())
            },
            Err(reason) => Err(reason),
        };
        self.note(Subsystem::DeviceQuery, outcome);

        self.stage = Stage::SummaryPopulated;
        ctx.tracker.signal(&self.identifier);
    }

    /// Populate extended identity, registry, USB and driver details.
    ///
    /// Driver lookups only run for present ports and only accept entries
    /// naming exactly this identifier.
    ///
    /// Only runs from [`Stage::SummaryPopulated`]; other calls are ignored
    /// and do not signal the tracker.
    pub fn populate_detailed(&mut self, ctx: &ScanContext<'_>) {
        if self.stage != Stage::SummaryPopulated {
            debug!(
                "{}: detailed population skipped at stage {:?}",
                self.identifier, self.stage
            );
            return;
        }

        if let Ok(entry) = self.device_lookup(ctx) {
            fill(&mut self.device_id, entry.device_id);
            if !entry.hardware_ids.is_empty() {
                self.hardware_ids = entry.hardware_ids;
            }
            if !entry.compatible_ids.is_empty() {
                self.compatible_ids = entry.compatible_ids;
            }
        }

        let outcome = self.lookup_registry(ctx);
        self.note(Subsystem::Registry, outcome);

        let outcome = self.extract_usb_ids();
        self.note(Subsystem::UsbIds, outcome);

        let outcome = self.lookup_system_driver(ctx);
        self.note(Subsystem::SystemDriver, outcome);

        let outcome = self.lookup_signed_driver(ctx);
        self.note(Subsystem::SignedDriver, outcome);

        if ctx.config.use_usb_catalog {
            if let Some(catalog) = &ctx.sources.usb {
                let outcome = self.lookup_usb_catalog(catalog.as_ref());
                self.note(Subsystem::UsbCatalog, outcome);
            }
        }

        self.stage = Stage::DetailedPopulated;
        ctx.tracker.signal(&self.identifier);
    }

    /// Device inventory entry for this port, queried on first use.
    fn device_lookup(&mut self, ctx: &ScanContext<'_>) -> std::result::Result<DeviceEntry, Degradation> {
        self.device
            .get_or_insert_with(|| query_device(ctx, &self.identifier))
            .clone()
    }

    fn lookup_registry(&mut self, ctx: &ScanContext<'_>) -> Outcome {
        let device_id = self
            .device_id
            .as_deref()
            .ok_or(Degradation::MissingField("device_id"))?;
        let key_path = registry_key_path(&ctx.config.enumeration_root, device_id)?;

        match ctx
            .sources
            .registry
            .read_string(&key_path, &ctx.config.friendly_name_value)?
        {
            KeyLookup::KeyMissing => {
                debug!("{}: registry key {key_path} not found", self.identifier);
                Err(Degradation::NoMatch)
            },
            KeyLookup::ValueMissing => {
                self.registry_path = Some(key_path);
                Err(Degradation::MissingField("friendly_name"))
            },
            KeyLookup::Value(name) => {
                self.registry_path = Some(key_path);
                fill(&mut self.friendly_name, Some(name));
                Ok(())
            },
        }
    }

    fn extract_usb_ids(&mut self) -> Outcome {
        let ids = extract_usb_ids(&self.hardware_ids)?;
        fill(&mut self.usb_details.vendor_id, Some(ids.vendor_id));
        fill(&mut self.usb_details.product_id, Some(ids.product_id));
        Ok(())
    }

    fn lookup_system_driver(&mut self, ctx: &ScanContext<'_>) -> Outcome {
        if !self.is_present {
            return Err(Degradation::MissingField("device"));
        }
        let driver = ctx
            .sources
            .drivers
            .system_drivers_named_like(self.identifier.as_str())?
            .into_iter()
            .find(|d| {
                d.name
                    .as_deref()
                    .is_some_and(|name| names_port(ctx.pattern, name, &self.identifier))
            })
            .ok_or(Degradation::NoMatch)?;

        fill(&mut self.driver_info.provider, driver.service_type);
        fill(&mut self.driver_info.date, driver.install_date);
        fill(&mut self.driver_info.version, driver.version);
        Ok(())
    }

    fn lookup_signed_driver(&mut self, ctx: &ScanContext<'_>) -> Outcome {
        if !self.is_present {
            return Err(Degradation::MissingField("device"));
        }
        let driver = ctx
            .sources
            .drivers
            .signed_drivers_named_like(self.identifier.as_str())?
            .into_iter()
            .find(|d| {
                d.device_name
                    .as_deref()
                    .is_some_and(|name| names_port(ctx.pattern, name, &self.identifier))
            })
            .ok_or(Degradation::NoMatch)?;

        fill(&mut self.system_details.class_guid, driver.class_guid);
        fill(&mut self.system_details.config_flags, driver.config_flags);
        fill(&mut self.system_details.problem_code, driver.problem_code);
        Ok(())
    }

    fn lookup_usb_catalog(&mut self, catalog: &dyn UsbCatalog) -> Outcome {
        let port = catalog
            .usb_ports()?
            .into_iter()
            .find(|p| p.port_name == self.identifier.as_str())
            .ok_or(Degradation::NoMatch)?;

        fill(&mut self.usb_details.serial_number, port.serial_number);
        fill(&mut self.usb_details.manufacturer, port.manufacturer);
        fill(&mut self.usb_details.product_name, port.product);
        if self.usb_details.vendor_id.is_none() && self.usb_details.product_id.is_none() {
            self.usb_details.vendor_id = Some(format!("{:04X}", port.vid));
            self.usb_details.product_id = Some(format!("{:04X}", port.pid));
        }
        Ok(())
    }

    fn note(&mut self, subsystem: Subsystem, outcome: Outcome) {
        match &outcome {
            Err(reason @ Degradation::SourceUnavailable(_)) => {
                warn!("{}: {} unavailable: {reason}", self.identifier, subsystem.name());
            },
            Err(reason) => {
                debug!("{}: {} empty: {reason}", self.identifier, subsystem.name());
            },
            Ok(()) => {},
        }
        *self.report.slot_mut(subsystem) = Some(outcome);
    }

    /// Port identifier.
    pub fn identifier(&self) -> &PortIdentifier {
        &self.identifier
    }

    /// Population level reached.
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Whether the device inventory lists the port.
    pub fn is_present(&self) -> bool {
        self.is_present
    }

    /// Device description.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Device manufacturer.
    pub fn manufacturer(&self) -> Option<&str> {
        self.manufacturer.as_deref()
    }

    /// Device status.
    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    /// Device instance path.
    pub fn device_id(&self) -> Option<&str> {
        self.device_id.as_deref()
    }

    /// Hardware ids.
    pub fn hardware_ids(&self) -> &[String] {
        &self.hardware_ids
    }

    /// Compatible ids.
    pub fn compatible_ids(&self) -> &[String] {
        &self.compatible_ids
    }

    /// Friendly name from the registry.
    pub fn friendly_name(&self) -> Option<&str> {
        self.friendly_name.as_deref()
    }

    /// Registry key path used for the friendly name.
    pub fn registry_path(&self) -> Option<&str> {
        self.registry_path.as_deref()
    }

    /// Driver service details.
    pub fn driver_info(&self) -> &DriverInfo {
        &self.driver_info
    }

    /// USB identification.
    pub fn usb_details(&self) -> &UsbDetails {
        &self.usb_details
    }

    /// Signed driver details.
    pub fn system_details(&self) -> &SystemDetails {
        &self.system_details
    }

    /// Per-subsystem outcomes.
    pub fn report(&self) -> &EnrichmentReport {
        &self.report
    }

    /// Summary-level snapshot.
    pub fn summary(&self) -> PortSummary {
        PortSummary {
            port_name: self.identifier.to_string(),
            is_present: self.is_present,
            description: self.description.clone(),
            manufacturer: self.manufacturer.clone(),
            status: self.status.clone(),
        }
    }

    /// Detailed snapshot.
    pub fn details(&self) -> PortDetails {
        PortDetails {
            port_name: self.identifier.to_string(),
            is_present: self.is_present,
            description: self.description.clone(),
            manufacturer: self.manufacturer.clone(),
            device_id: self.device_id.clone(),
            friendly_name: self.friendly_name.clone(),
            status: self.status.clone(),
            registry_path: self.registry_path.clone(),
            hardware_ids: self.hardware_ids.clone(),
            compatible_ids: self.compatible_ids.clone(),
            driver_info: self.driver_info.clone(),
            usb_details: self.usb_details.clone(),
            system_details: self.system_details.clone(),
        }
    }
}

/// Registry key for a device instance: the root joined with the first two
/// `\`-separated segments of `device_id`.
pub fn registry_key_path(root: &str, device_id: &str) -> std::result::Result<String, Degradation> {
    let mut segments = device_id.split('\\');
    match (segments.next(), segments.next()) {
        (Some(enumerator), Some(device)) if !enumerator.is_empty() && !device.is_empty() => {
            Ok(format!("{root}\\{enumerator}\\{device}"))
        },
        _ => Err(Degradation::ParseMiss(format!(
            "device id {device_id:?} has fewer than two segments"
        ))),
    }
}

/// First inventory entry whose display name carries exactly this identifier.
///
/// The inventory filter is a substring match, so `COM1` also returns `COM10`;
/// entries naming a different port are skipped.
fn query_device(
    ctx: &ScanContext<'_>,
    identifier: &PortIdentifier,
) -> std::result::Result<DeviceEntry, Degradation> {
    let entries = ctx
        .sources
        .devices
        .devices_named_like(identifier.as_str())?;

    entries
        .into_iter()
        .find(|entry| names_port(ctx.pattern, &entry.name, identifier))
        .ok_or(Degradation::NoMatch)
}

/// Whether `text` mentions exactly `identifier` (`COM1` is not in `COM10`).
fn names_port(pattern: &IdentifierPattern, text: &str, identifier: &PortIdentifier) -> bool {
    pattern
        .all_in(text)
        .any(|found| found == *identifier)
}

/// Set `slot` from `value` unless the value is missing or blank.
fn fill(slot: &mut Option<String>, value: Option<String>) {
    if let Some(value) = value.filter(|v| !v.trim().is_empty()) {
        *slot = Some(value);
    }
}
