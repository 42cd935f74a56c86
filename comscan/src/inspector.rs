//! Discovery and scan orchestration.
//!
//! [`PortInspector`] reconciles the identifiers reported by the device
//! inventory and the fallback command into one ordered set, then drives a
//! [`PortRecord`] per identifier through summary (and optionally detailed)
//! population, filtering on presence.

use std::collections::BTreeSet;
use std::sync::Arc;

use log::{debug, info, trace, warn};

use crate::{
    error::{Degradation, Result},
    identifier::{DEFAULT_PORT_MARKER, IdentifierPattern, PortIdentifier},
    progress::ProgressTracker,
    record::{PortDetails, PortRecord, PortSummary, ScanContext},
    source::{
        Sources,
        native::{CommandEnumerator, DEFAULT_FALLBACK_COMMAND},
    },
};

/// Registry subtree holding device instance keys.
pub const DEFAULT_ENUMERATION_ROOT: &str = r"SYSTEM\CurrentControlSet\Enum";

/// Registry value holding a device's friendly name.
pub const DEFAULT_FRIENDLY_NAME_VALUE: &str = "FriendlyName";

/// How deep each record is populated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetailLevel {
    /// Presence and identity only.
    Summary,
    /// Summary plus registry, USB and driver details.
    Detailed,
}

impl DetailLevel {
    /// Population phases each record goes through at this level.
    pub fn phases(self) -> usize {
        match self {
            Self::Summary => 1,
            Self::Detailed => 2,
        }
    }
}

/// Which records a scan returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceFilter {
    /// Ports the device inventory currently lists.
    Present,
    /// Ports known only from the fallback enumeration.
    Absent,
    /// Every discovered port.
    All,
}

impl PresenceFilter {
    /// Whether a record with the given presence passes the filter.
    pub fn admits(self, is_present: bool) -> bool {
        match self {
            Self::Present => is_present,
            Self::Absent => !is_present,
            Self::All => true,
        }
    }
}

/// Inspector settings.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct InspectorConfig {
    /// Port family marker, `COM` by default.
    pub port_marker: String,
    /// Registry subtree the friendly-name keys live under.
    pub enumeration_root: String,
    /// Registry value name for the friendly name.
    pub friendly_name_value: String,
    /// Fallback enumeration command line.
    pub fallback_command: Vec<String>,
    /// Identifiers dropped from discovery.
    pub ignore: Vec<String>,
    /// Whether to run the fallback enumeration during discovery.
    pub use_fallback: bool,
    /// Whether to consult the USB descriptor catalog in detailed scans.
    pub use_usb_catalog: bool,
}

impl Default for InspectorConfig {
    fn default() -> Self {
        Self {
            port_marker: DEFAULT_PORT_MARKER.to_string(),
            enumeration_root: DEFAULT_ENUMERATION_ROOT.to_string(),
            friendly_name_value: DEFAULT_FRIENDLY_NAME_VALUE.to_string(),
            fallback_command: DEFAULT_FALLBACK_COMMAND
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
            ignore: Vec::new(),
            use_fallback: true,
            use_usb_catalog: true,
        }
    }
}

/// Outcome of one discovery source: how many identifiers it yielded.
pub type SourceOutcome = std::result::Result<usize, Degradation>;

/// Result of discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discovery {
    /// Deduplicated identifiers in scan order.
    pub identifiers: BTreeSet<PortIdentifier>,
    /// Device inventory outcome.
    pub device_query: SourceOutcome,
    /// Fallback command outcome; `None` when the fallback is disabled.
    pub fallback: Option<SourceOutcome>,
    /// Identifiers dropped by the ignore list.
    pub ignored: usize,
}

/// Records returned by a scan, with its progress bookkeeping.
#[derive(Debug, Clone)]
pub struct ScanReport {
    /// Records admitted by the presence filter, in discovery order.
    pub records: Vec<PortRecord>,
    /// Identifiers discovered.
    pub total_targets: usize,
    /// Identifiers fully processed.
    pub processed_count: usize,
    /// Whether the scan stopped early on an interrupt request.
    pub interrupted: bool,
}

type InterruptChecker = Arc<dyn Fn() -> bool + Send + Sync>;

/// Serial port inspector.
#[derive(Clone)]
pub struct PortInspector {
    sources: Sources,
    config: InspectorConfig,
    pattern: IdentifierPattern,
    interrupt: Option<InterruptChecker>,
}

impl std::fmt::Debug for PortInspector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortInspector")
            .field("sources", &self.sources)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl PortInspector {
    /// Inspector over `sources` with default settings.
    pub fn new(sources: Sources) -> Self {
        Self {
            sources,
            config: InspectorConfig::default(),
            pattern: IdentifierPattern::default(),
            interrupt: None,
        }
    }

    /// Inspector over `sources` with explicit settings.
    pub fn with_config(sources: Sources, config: InspectorConfig) -> Result<Self> {
        let pattern = IdentifierPattern::new(&config.port_marker)?;
        Ok(Self {
            sources,
            config,
            pattern,
            interrupt: None,
        })
    }

    /// Inspector over the host's native facilities.
    pub fn native(config: InspectorConfig) -> Result<Self> {
        let fallback = CommandEnumerator::new(&config.fallback_command)?;
        Self::with_config(Sources::native(fallback), config)
    }

    /// Use `checker` instead of the process-wide interrupt checker.
    #[must_use]
    pub fn with_interrupt_checker<F>(mut self, checker: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        self.interrupt = Some(Arc::new(checker));
        self
    }

    /// Settings in use.
    pub fn config(&self) -> &InspectorConfig {
        &self.config
    }

    /// Discover identifiers from both sources and report how each fared.
    ///
    /// Neither source failing is fatal; a failed source contributes nothing.
    pub fn discover(&self) -> Discovery {
        let mut identifiers = BTreeSet::new();

        let device_query = match self
            .sources
            .devices
            .devices_named_like(self.pattern.marker())
        {
            Ok(entries) => {
                let before = identifiers.len();
                for entry in &entries {
                    if let Some(id) = self.pattern.first_in(&entry.name) {
                        trace!("Device inventory: {} -> {id}", entry.name);
                        identifiers.insert(id);
                    }
                }
                Ok(identifiers.len() - before)
            },
            Err(e) => {
                warn!("Device inventory discovery failed: {e}");
                Err(Degradation::from(e))
            },
        };

        let fallback = self.config.use_fallback.then(|| {
            match self.sources.fallback.enumerate_raw() {
                Ok(raw) => {
                    let found: Vec<_> = self.pattern.all_in(&raw).collect();
                    trace!("Fallback enumeration: {found:?}");
                    let count = found.len();
                    identifiers.extend(found);
                    Ok(count)
                },
                Err(e) => {
                    warn!("Fallback discovery failed: {e}");
                    Err(Degradation::from(e))
                },
            }
        });

        let before = identifiers.len();
        identifiers.retain(|id| {
            !self
                .config
                .ignore
                .iter()
                .any(|ignored| ignored.eq_ignore_ascii_case(id.as_str()))
        });
        let ignored = before - identifiers.len();

        info!(
            "Discovered {} port(s){}",
            identifiers.len(),
            if ignored > 0 {
                format!(", {ignored} ignored")
            } else {
                String::new()
            }
        );

        Discovery {
            identifiers,
            device_query,
            fallback,
            ignored,
        }
    }

    /// Deduplicated identifiers from both sources.
    pub fn discover_identifiers(&self) -> BTreeSet<PortIdentifier> {
        self.discover().identifiers
    }

    /// Discover, populate and filter, keeping the full records.
    ///
    /// `on_progress` is called once per processed identifier with the
    /// overall percentage, whether or not the record passes the filter.
    pub fn scan_report(
        &self,
        detail: DetailLevel,
        filter: PresenceFilter,
        mut on_progress: Option<&mut dyn FnMut(f64)>,
    ) -> ScanReport {
        let discovery = self.discover();
        let total = discovery.identifiers.len();
        let tracker = ProgressTracker::new(total, detail.phases());
        let ctx = ScanContext {
            sources: &self.sources,
            config: &self.config,
            pattern: &self.pattern,
            tracker: &tracker,
        };

        debug!("Scanning {total} port(s) at {detail:?} level, filter {filter:?}");

        let mut records = Vec::new();
        let mut interrupted = false;

        for identifier in &discovery.identifiers {
            if self.interrupt_requested() {
                warn!("Scan interrupted after {} port(s)", tracker.processed_count());
                interrupted = true;
                break;
            }

            let mut record = PortRecord::new(identifier.clone());
            record.populate_summary(&ctx);
            if detail == DetailLevel::Detailed {
                record.populate_detailed(&ctx);
            }

            if filter.admits(record.is_present()) {
                records.push(record);
            }

            let percent = tracker.progress_percent();
            trace!(
                "Progress {percent:.1}% ({:?})",
                tracker
                    .current_target()
                    .map(|t| t.to_string())
            );
            if let Some(callback) = on_progress.as_deref_mut() {
                callback(percent);
            }
        }

        ScanReport {
            records,
            total_targets: tracker.total_targets(),
            processed_count: tracker.processed_count(),
            interrupted,
        }
    }

    /// Discover, populate and filter.
    pub fn scan(
        &self,
        detail: DetailLevel,
        filter: PresenceFilter,
        on_progress: Option<&mut dyn FnMut(f64)>,
    ) -> Vec<PortRecord> {
        self.scan_report(detail, filter, on_progress)
            .records
    }

    /// Summaries of ports the device inventory currently lists.
    pub fn present_ports(&self, on_progress: Option<&mut dyn FnMut(f64)>) -> Vec<PortSummary> {
        self.scan(DetailLevel::Summary, PresenceFilter::Present, on_progress)
            .iter()
            .map(PortRecord::summary)
            .collect()
    }

    /// Summaries of ports known only from the fallback enumeration.
    pub fn absent_ports(&self, on_progress: Option<&mut dyn FnMut(f64)>) -> Vec<PortSummary> {
        self.scan(DetailLevel::Summary, PresenceFilter::Absent, on_progress)
            .iter()
            .map(PortRecord::summary)
            .collect()
    }

    /// Detailed snapshots of every discovered port.
    pub fn all_ports_detailed(&self, on_progress: Option<&mut dyn FnMut(f64)>) -> Vec<PortDetails> {
        self.scan(DetailLevel::Detailed, PresenceFilter::All, on_progress)
            .iter()
            .map(PortRecord::details)
            .collect()
    }

    fn interrupt_requested(&self) -> bool {
        match &self.interrupt {
            Some(checker) => checker(),
            None => crate::is_interrupted_requested(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Subsystem;
    use crate::testing::{FakeSystem, com_entry};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn inspector(system: &FakeSystem) -> PortInspector {
        let _ = env_logger::builder()
            .is_test(true)
            .try_init();
        PortInspector::new(system.sources()).with_interrupt_checker(|| false)
    }

    fn ids(set: &BTreeSet<PortIdentifier>) -> Vec<&str> {
        set.iter()
            .map(PortIdentifier::as_str)
            .collect()
    }

    /// COM1 present (CH340), COM3 known only to the fallback.
    fn two_port_system() -> FakeSystem {
        let mut system = FakeSystem::default();
        let mut entry = com_entry("COM1", "USB-SERIAL CH340");
        entry.manufacturer = Some("wch.cn".to_string());
        entry.status = Some("OK".to_string());
        entry.device_id = Some(r"USB\VID_1A86&PID_7523\5&2A1D3C&0&2".to_string());
        entry.hardware_ids = vec![r"USB\VID_1A86&PID_7523&REV_0264".to_string()];
        system.devices.push(entry);
        system.fallback_output = Some("DeviceID  \r\r\nCOM1      \r\r\nCOM3      \r\r\n".to_string());
        system
    }

    fn collect_progress(run: impl FnOnce(&mut dyn FnMut(f64))) -> Vec<f64> {
        let mut seen = Vec::new();
        run(&mut |p: f64| seen.push(p));
        seen
    }

    #[test]
    fn test_discovery_unions_and_dedups_sources() {
        let mut system = two_port_system();
        system.devices.push(com_entry("COM10", "Bluetooth link"));

        let discovery = inspector(&system).discover();

        assert_eq!(ids(&discovery.identifiers), vec!["COM1", "COM3", "COM10"]);
        assert_eq!(discovery.device_query, Ok(2));
        assert_eq!(discovery.fallback, Some(Ok(2)));
        assert_eq!(discovery.ignored, 0);
    }

    #[test]
    fn test_discovery_survives_device_query_failure() {
        let mut system = two_port_system();
        system.device_query_fails = true;

        let discovery = inspector(&system).discover();

        assert_eq!(ids(&discovery.identifiers), vec!["COM1", "COM3"]);
        assert!(matches!(
            discovery.device_query,
            Err(Degradation::SourceUnavailable(_))
        ));
    }

    #[test]
    fn test_discovery_survives_fallback_failure() {
        let mut system = two_port_system();
        system.fallback_output = None;

        let discovery = inspector(&system).discover();

        assert_eq!(ids(&discovery.identifiers), vec!["COM1"]);
        assert!(matches!(
            discovery.fallback,
            Some(Err(Degradation::SourceUnavailable(_)))
        ));
    }

    #[test]
    fn test_fallback_can_be_disabled() {
        let config = InspectorConfig {
            use_fallback: false,
            ..InspectorConfig::default()
        };
        let inspector = PortInspector::with_config(two_port_system().sources(), config)
            .unwrap()
            .with_interrupt_checker(|| false);

        let discovery = inspector.discover();
        assert_eq!(ids(&discovery.identifiers), vec!["COM1"]);
        assert_eq!(discovery.fallback, None);
    }

    #[test]
    fn test_ignore_list_drops_identifiers() {
        let config = InspectorConfig {
            ignore: vec!["com3".to_string()],
            ..InspectorConfig::default()
        };
        let inspector = PortInspector::with_config(two_port_system().sources(), config)
            .unwrap()
            .with_interrupt_checker(|| false);

        let discovery = inspector.discover();
        assert_eq!(ids(&discovery.identifiers), vec!["COM1"]);
        assert_eq!(discovery.ignored, 1);
    }

    #[test]
    fn test_invalid_marker_rejected() {
        let config = InspectorConfig {
            port_marker: String::new(),
            ..InspectorConfig::default()
        };
        assert!(PortInspector::with_config(FakeSystem::default().sources(), config).is_err());
    }

    #[test]
    fn test_both_sources_failing_yields_empty_scan() {
        let system = FakeSystem {
            device_query_fails: true,
            ..FakeSystem::default()
        };
        let inspector = inspector(&system);

        let progress = collect_progress(|cb| {
            let report = inspector.scan_report(DetailLevel::Detailed, PresenceFilter::All, Some(cb));
            assert!(report.records.is_empty());
            assert_eq!(report.total_targets, 0);
            assert_eq!(report.processed_count, 0);
        });
        assert!(progress.is_empty());
    }

    #[test]
    fn test_two_port_detailed_scenario() {
        let system = two_port_system();
        let inspector = inspector(&system);

        let mut details = Vec::new();
        let progress = collect_progress(|cb| details = inspector.all_ports_detailed(Some(cb)));

        assert_eq!(details.len(), 2);
        assert_eq!(details[0].port_name, "COM1");
        assert!(details[0].is_present);
        assert_eq!(details[0].description.as_deref(), Some("USB-SERIAL CH340"));
        assert_eq!(details[0].manufacturer.as_deref(), Some("wch.cn"));
        assert_eq!(details[0].usb_details.vendor_id.as_deref(), Some("1A86"));
        assert_eq!(details[1].port_name, "COM3");
        assert!(!details[1].is_present);
        assert!(details[1].description.is_none());
        assert!(details[1].manufacturer.is_none());
        assert!(details[1].status.is_none());
        assert_eq!(progress, vec![50.0, 100.0]);
    }

    #[test]
    fn test_absent_port_keeps_neighbour_driver_data_out() {
        let mut system = FakeSystem::default();
        system.devices.push(com_entry("COM30", "USB Serial"));
        system.signed_drivers.push(crate::source::SignedDriverEntry {
            device_name: Some("USB Serial (COM30)".to_string()),
            class_guid: Some("{GUID-OF-COM30}".to_string()),
            ..Default::default()
        });
        system.fallback_output = Some("COM3 COM30".to_string());

        let details = inspector(&system).all_ports_detailed(None);

        assert_eq!(details.len(), 2);
        assert_eq!(details[0].port_name, "COM3");
        assert!(!details[0].is_present);
        assert!(details[0].system_details.class_guid.is_none());
        assert_eq!(details[1].port_name, "COM30");
        assert_eq!(
            details[1].system_details.class_guid.as_deref(),
            Some("{GUID-OF-COM30}")
        );
    }

    #[test]
    fn test_processed_count_ignores_filter() {
        let system = two_port_system();
        let inspector = inspector(&system);

        for filter in [PresenceFilter::Present, PresenceFilter::Absent, PresenceFilter::All] {
            for detail in [DetailLevel::Summary, DetailLevel::Detailed] {
                let mut calls = 0;
                let report = inspector.scan_report(detail, filter, Some(&mut |_: f64| calls += 1));
                assert_eq!(report.total_targets, 2);
                assert_eq!(report.processed_count, 2);
                assert_eq!(calls, 2);
                assert!(!report.interrupted);
            }
        }
    }

    #[test]
    fn test_progress_is_monotonic_and_ends_at_100() {
        let mut system = two_port_system();
        system.fallback_output = Some("COM1 COM2 COM3 COM4 COM5 COM6 COM7".to_string());
        let inspector = inspector(&system);

        let progress = collect_progress(|cb| {
            inspector.present_ports(Some(cb));
        });

        assert_eq!(progress.len(), 7);
        assert!(progress.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(progress.last().copied(), Some(100.0));
        assert!(progress.iter().all(|p| (0.0..=100.0).contains(p)));
    }

    #[test]
    fn test_present_and_absent_partition_all() {
        let system = two_port_system();
        let inspector = inspector(&system);

        let present = inspector.present_ports(None);
        let absent = inspector.absent_ports(None);
        let all = inspector.scan(DetailLevel::Summary, PresenceFilter::All, None);

        assert!(present.iter().all(|p| p.is_present));
        assert!(absent.iter().all(|p| !p.is_present));
        assert_eq!(present.len() + absent.len(), all.len());

        let mut names: Vec<_> = present
            .iter()
            .chain(&absent)
            .map(|p| p.port_name.clone())
            .collect();
        names.sort();
        let mut all_names: Vec<_> = all
            .iter()
            .map(|r| r.identifier().to_string())
            .collect();
        all_names.sort();
        assert_eq!(names, all_names);
    }

    #[test]
    fn test_summary_scan_leaves_details_unpopulated() {
        let system = two_port_system();
        let records = inspector(&system).scan(DetailLevel::Summary, PresenceFilter::Present, None);

        assert_eq!(records.len(), 1);
        assert!(records[0].device_id().is_none());
        assert!(records[0].report().get(Subsystem::Registry).is_none());
    }

    #[test]
    fn test_scans_are_repeatable() {
        let system = two_port_system();
        let inspector = inspector(&system);
        assert_eq!(inspector.all_ports_detailed(None), inspector.all_ports_detailed(None));
    }

    #[test]
    fn test_interrupt_stops_between_ports() {
        let mut system = two_port_system();
        system.fallback_output = Some("COM1 COM2 COM3 COM4".to_string());
        let checks = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&checks);
        let inspector = PortInspector::new(system.sources())
            .with_interrupt_checker(move || seen.fetch_add(1, Ordering::SeqCst) >= 2);

        let report = inspector.scan_report(DetailLevel::Summary, PresenceFilter::All, None);

        assert!(report.interrupted);
        assert_eq!(report.total_targets, 4);
        assert_eq!(report.processed_count, 2);
        assert_eq!(report.records.len(), 2);
    }

    #[test]
    fn test_detail_level_phases() {
        assert_eq!(DetailLevel::Summary.phases(), 1);
        assert_eq!(DetailLevel::Detailed.phases(), 2);
        assert!(PresenceFilter::All.admits(false));
        assert!(!PresenceFilter::Present.admits(false));
        assert!(PresenceFilter::Absent.admits(false));
    }
}
