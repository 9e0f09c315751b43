//! Package model shared by the backend, the cache and the presentation layer.

use bitflags::bitflags;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Metadata key holding the newest known version
pub const LATEST_VERSION: &str = "latest_version";
/// Metadata key holding the tap a package came from
pub const TAP: &str = "tap";

/// The two kinds of package brew tracks
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
    clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum PackageKind {
    Formula,
    Cask,
}

impl PackageKind {
    pub const ALL: [PackageKind; 2] = [PackageKind::Formula, PackageKind::Cask];

    pub fn as_str(self) -> &'static str {
        match self {
            PackageKind::Formula => "formula",
            PackageKind::Cask => "cask",
        }
    }
}

impl fmt::Display for PackageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

bitflags! {
    /// Independent status flags stored as a fixed-width bitmask.
    ///
    /// Serialized as the raw bits so a round trip through the cache can never
    /// reorder or drop flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(from = "u8", into = "u8")]
    pub struct PackageStatus: u8 {
        const OUTDATED = 1 << 0;
        const PINNED = 1 << 1;
        const NOT_LINKED = 1 << 2;
        const KEG_ONLY = 1 << 3;
        const HEAD = 1 << 4;
        const HAS_SERVICE = 1 << 5;
    }
}

impl PackageStatus {
    pub const NONE: PackageStatus = PackageStatus::empty();

    /// Every flag with its label, in display order
    pub const FLAGS: [(PackageStatus, &'static str); 6] = [
        (PackageStatus::OUTDATED, "outdated"),
        (PackageStatus::PINNED, "pinned"),
        (PackageStatus::NOT_LINKED, "not-linked"),
        (PackageStatus::KEG_ONLY, "keg-only"),
        (PackageStatus::HEAD, "head"),
        (PackageStatus::HAS_SERVICE, "service"),
    ];

    /// Labels of the flags that are set, in display order
    pub fn names(self) -> Vec<&'static str> {
        self.iter()
            .filter_map(|flag| Self::FLAGS.iter().find(|(f, _)| *f == flag))
            .map(|(_, name)| *name)
            .collect()
    }
}

impl Default for PackageStatus {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<u8> for PackageStatus {
    fn from(bits: u8) -> Self {
        Self::from_bits_retain(bits)
    }
}

impl From<PackageStatus> for u8 {
    fn from(status: PackageStatus) -> Self {
        status.bits()
    }
}

impl fmt::Display for PackageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("up-to-date");
        }
        f.write_str(&self.names().join(", "))
    }
}

/// A dependency edge of a package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub name: String,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub build: bool,
    #[serde(default)]
    pub test: bool,
}

impl Dependency {
    pub fn runtime(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            optional: false,
            build: false,
            test: false,
        }
    }
}

/// A single installed (or queried) formula or cask
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Package {
    pub name: String,
    pub kind: PackageKind,
    /// Installed versions, then the latest known version if not already last
    #[serde(default)]
    pub versions: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: PackageStatus,
    #[serde(default)]
    pub installed_on: Option<DateTime<Utc>>,
    #[serde(default)]
    pub size_kb: Option<u64>,
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
    #[serde(default)]
    pub used_by: BTreeSet<String>,
    #[serde(default)]
    pub tap: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl Package {
    pub fn new(name: impl Into<String>, kind: PackageKind) -> Self {
        Self {
            name: name.into(),
            kind,
            versions: Vec::new(),
            description: None,
            status: PackageStatus::NONE,
            installed_on: None,
            size_kb: None,
            dependencies: Vec::new(),
            used_by: BTreeSet::new(),
            tap: None,
            path: None,
            metadata: BTreeMap::new(),
        }
    }

    /// First recorded version, normally the oldest installed one
    pub fn installed_version(&self) -> Option<&str> {
        self.versions.first().map(String::as_str)
    }

    /// Latest known version, falling back to the last entry of `versions`
    pub fn latest_version(&self) -> Option<&str> {
        self.metadata
            .get(LATEST_VERSION)
            .map(String::as_str)
            .or_else(|| self.versions.last().map(String::as_str))
    }

    pub fn is_outdated(&self) -> bool {
        self.status.contains(PackageStatus::OUTDATED)
    }

    /// Case-insensitive match on name or description
    pub fn matches(&self, query: &str) -> bool {
        let query = query.to_lowercase();
        self.name.to_lowercase().contains(&query)
            || self
                .description
                .as_ref()
                .is_some_and(|d| d.to_lowercase().contains(&query))
    }

    /// Sort key for deterministic presentation: kind, then lower-cased name
    pub fn sort_key(&self) -> (PackageKind, String) {
        (self.kind, self.name.to_lowercase())
    }
}
