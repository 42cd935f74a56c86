//! Configuration file support for comscan.
//!
//! Configuration is loaded from multiple sources with the following priority (highest first):
//! 1. Command-line arguments
//! 2. Environment variables (COMSCAN_*)
//! 3. Local config file (./comscan.toml)
//! 4. Global config file (~/.config/comscan/config.toml)

use comscan::InspectorConfig;
use directories::ProjectDirs;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the local config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "comscan.toml";

/// Discovery settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Port family marker (default `COM`).
    pub port_marker: Option<String>,
    /// Run the fallback enumeration command.
    pub fallback: Option<bool>,
    /// Fallback command line, program first.
    pub fallback_command: Option<Vec<String>>,
    /// Identifiers to leave out of every scan.
    #[serde(default)]
    pub ignore: Vec<String>,
}

/// Enrichment settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnrichConfig {
    /// Registry subtree holding device instance keys.
    pub enumeration_root: Option<String>,
    /// Registry value read as the friendly name.
    pub friendly_name_value: Option<String>,
    /// Consult the USB descriptor catalog in detailed scans.
    pub usb_catalog: Option<bool>,
}

/// Output settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Draw a progress bar while scanning.
    pub progress: Option<bool>,
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Discovery settings.
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    /// Enrichment settings.
    #[serde(default)]
    pub enrich: EnrichConfig,
    /// Output settings.
    #[serde(default)]
    pub output: OutputConfig,
}

impl Config {
    /// Load configuration from all available sources.
    pub fn load() -> Self {
        let mut config = Self::default();

        // Load global config
        if let Some(global_path) = Self::global_config_path() {
            if global_path.exists() {
                if let Some(global_config) = Self::load_from_file(&global_path) {
                    debug!("Loaded global config from {}", global_path.display());
                    config.merge(global_config);
                }
            }
        }

        // Load local config (overrides global)
        if let Some(local_config) = Self::load_from_file(Path::new(LOCAL_CONFIG_FILE)) {
            debug!("Loaded local config from {LOCAL_CONFIG_FILE}");
            config.merge(local_config);
        }

        config
    }

    /// Load configuration from a specific file path (--config flag).
    pub fn load_from_path(path: &Path) -> Self {
        if let Some(config) = Self::load_from_file(path) {
            debug!("Loaded config from {}", path.display());
            config
        } else {
            warn!(
                "Could not load config from {}, using defaults",
                path.display()
            );
            Self::default()
        }
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => Some(config),
                Err(e) => {
                    warn!("Failed to parse config file {}: {}", path.display(), e);
                    None
                },
            },
            Err(e) => {
                warn!("Failed to read config file {}: {}", path.display(), e);
                None
            },
        }
    }

    /// Get the global configuration directory.
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "comscan").map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the global configuration file path.
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Merge another config into this one.
    fn merge(&mut self, other: Self) {
        // Discovery
        if other.discovery.port_marker.is_some() {
            self.discovery.port_marker = other.discovery.port_marker;
        }
        if other.discovery.fallback.is_some() {
            self.discovery.fallback = other.discovery.fallback;
        }
        if other.discovery.fallback_command.is_some() {
            self.discovery.fallback_command = other.discovery.fallback_command;
        }
        for port in other.discovery.ignore {
            if !self.discovery.ignore.contains(&port) {
                self.discovery.ignore.push(port);
            }
        }

        // Enrichment
        if other.enrich.enumeration_root.is_some() {
            self.enrich.enumeration_root = other.enrich.enumeration_root;
        }
        if other.enrich.friendly_name_value.is_some() {
            self.enrich.friendly_name_value = other.enrich.friendly_name_value;
        }
        if other.enrich.usb_catalog.is_some() {
            self.enrich.usb_catalog = other.enrich.usb_catalog;
        }

        // Output
        if other.output.progress.is_some() {
            self.output.progress = other.output.progress;
        }
    }

    /// Inspector settings, with library defaults for anything unset.
    pub fn inspector_config(&self, no_fallback: bool) -> InspectorConfig {
        let defaults = InspectorConfig::default();
        InspectorConfig {
            port_marker: self
                .discovery
                .port_marker
                .clone()
                .unwrap_or(defaults.port_marker),
            enumeration_root: self
                .enrich
                .enumeration_root
                .clone()
                .unwrap_or(defaults.enumeration_root),
            friendly_name_value: self
                .enrich
                .friendly_name_value
                .clone()
                .unwrap_or(defaults.friendly_name_value),
            fallback_command: self
                .discovery
                .fallback_command
                .clone()
                .unwrap_or(defaults.fallback_command),
            ignore: self.discovery.ignore.clone(),
            use_fallback: !no_fallback
                && self
                    .discovery
                    .fallback
                    .unwrap_or(defaults.use_fallback),
            use_usb_catalog: self
                .enrich
                .usb_catalog
                .unwrap_or(defaults.use_usb_catalog),
        }
    }
}
