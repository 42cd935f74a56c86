//! Port identifiers and the pattern that extracts them from free text.

use std::cmp::Ordering;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Error, Result};

/// Family marker for Windows serial ports.
pub const DEFAULT_PORT_MARKER: &str = "COM";

#[allow(clippy::unwrap_used)] // Static pattern
static DEFAULT_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"COM\d+").unwrap());

/// Normalized label of a logical serial port, e.g. `COM3`.
///
/// Equality is exact string equality. Ordering puts lower port numbers first
/// (`COM2` before `COM10`) and falls back to the string for ties, so it stays
/// consistent with `Eq`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct PortIdentifier(String);

impl PortIdentifier {
    /// Wrap a label as an identifier.
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    /// The label as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Trailing port number, if the label ends in digits that fit a `u64`.
    pub fn number(&self) -> Option<u64> {
        self.digits()?.parse().ok()
    }

    /// Digit run after the marker, if the rest of the label is all digits.
    fn digits(&self) -> Option<&str> {
        let digits = self
            .0
            .trim_start_matches(|c: char| !c.is_ascii_digit());
        (!digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())).then_some(digits)
    }

    /// Numeric sort key of any length: significant digit count, then digits.
    fn numeric_key(&self) -> Option<(usize, &str)> {
        let significant = self.digits()?.trim_start_matches('0');
        Some((significant.len(), significant))
    }
}

impl Ord for PortIdentifier {
    fn cmp(&self, other: &Self) -> Ordering {
        self.numeric_key()
            .cmp(&other.numeric_key())
            .then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for PortIdentifier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for PortIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PortIdentifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PortIdentifier {
    fn from(label: &str) -> Self {
        Self::new(label)
    }
}

/// Marker followed by one or more digits (`COM\d+` by default).
#[derive(Debug, Clone)]
pub struct IdentifierPattern {
    marker: String,
    regex: Regex,
}

impl IdentifierPattern {
    /// Build a pattern for a port family marker.
    pub fn new(marker: &str) -> Result<Self> {
        if marker.is_empty() {
            return Err(Error::Config("port marker must not be empty".to_string()));
        }
        let regex = Regex::new(&format!(r"{}\d+", regex::escape(marker)))
            .map_err(|e| Error::Config(format!("invalid port marker {marker:?}: {e}")))?;
        Ok(Self {
            marker: marker.to_string(),
            regex,
        })
    }

    /// The family marker used in device-name filters.
    pub fn marker(&self) -> &str {
        &self.marker
    }

    /// First identifier found in `text`.
    pub fn first_in(&self, text: &str) -> Option<PortIdentifier> {
        self.regex
            .find(text)
            .map(|m| PortIdentifier::new(m.as_str()))
    }

    /// Every identifier found in `text`, in order of appearance.
    pub fn all_in<'t>(&'t self, text: &'t str) -> impl Iterator<Item = PortIdentifier> + 't {
        self.regex
            .find_iter(text)
            .map(|m| PortIdentifier::new(m.as_str()))
    }
}

impl Default for IdentifierPattern {
    fn default() -> Self {
        Self {
            marker: DEFAULT_PORT_MARKER.to_string(),
            regex: DEFAULT_PATTERN.clone(),
        }
    }
}
