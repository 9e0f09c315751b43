//! brew's `info --json=v2` records and their conversion into [`Package`]s.

use crate::package::{Dependency, LATEST_VERSION, Package, PackageKind, TAP};
use crate::status::{StatusFields, derive_status};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

/// Top-level document printed by `brew info --json=v2`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InfoDocument {
    #[serde(default)]
    pub formulae: Vec<RawFormula>,
    #[serde(default)]
    pub casks: Vec<RawCask>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawVersions {
    #[serde(default)]
    pub stable: Option<String>,
    #[serde(default)]
    pub head: Option<String>,
}

/// One installed keg of a formula
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawInstalled {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default, alias = "installed_time")]
    pub time: Option<i64>,
    #[serde(default)]
    pub installed_on_request: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawFormula {
    pub name: String,
    #[serde(default)]
    pub tap: Option<String>,
    #[serde(default)]
    pub desc: Option<String>,
    #[serde(default)]
    pub versions: RawVersions,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub recommended_dependencies: Vec<String>,
    #[serde(default)]
    pub optional_dependencies: Vec<String>,
    #[serde(default)]
    pub build_dependencies: Vec<String>,
    #[serde(default)]
    pub test_dependencies: Vec<String>,
    #[serde(default)]
    pub installed: Vec<RawInstalled>,
    #[serde(default)]
    pub linked_keg: Option<String>,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub outdated: bool,
    #[serde(default)]
    pub keg_only: bool,
    #[serde(default)]
    pub service: Option<Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawCaskDependsOn {
    #[serde(default)]
    pub formula: Vec<String>,
    #[serde(default)]
    pub cask: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawCask {
    pub token: String,
    #[serde(default)]
    pub name: Vec<String>,
    #[serde(default)]
    pub tap: Option<String>,
    #[serde(default)]
    pub desc: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub installed: Option<String>,
    #[serde(default)]
    pub installed_time: Option<i64>,
    #[serde(default)]
    pub outdated: bool,
    #[serde(default)]
    pub depends_on: Option<RawCaskDependsOn>,
}

fn timestamp(secs: Option<i64>) -> Option<DateTime<Utc>> {
    secs.and_then(|t| DateTime::from_timestamp(t, 0))
}

fn service_defined(service: &Option<Value>) -> bool {
    match service {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Object(o)) => !o.is_empty(),
        Some(Value::Array(a)) => !a.is_empty(),
        Some(_) => true,
    }
}

/// Installed versions followed by `latest` when it is not already last
fn version_list(installed: impl IntoIterator<Item = String>, latest: Option<&str>) -> Vec<String> {
    let mut versions: Vec<String> = installed.into_iter().collect();
    if let Some(latest) = latest
        && versions.last().map(String::as_str) != Some(latest)
    {
        versions.push(latest.to_string());
    }
    versions
}

impl RawFormula {
    pub fn latest(&self) -> Option<&str> {
        self.versions
            .stable
            .as_deref()
            .or(self.versions.head.as_deref())
    }

    pub fn status_fields(&self) -> StatusFields<'_> {
        StatusFields {
            outdated: self.outdated,
            pinned: self.pinned,
            keg_only: self.keg_only,
            linked_keg: self.linked_keg.as_deref(),
            installed: !self.installed.is_empty(),
            head: self
                .installed
                .iter()
                .filter_map(|i| i.version.as_deref())
                .any(|v| v.starts_with("HEAD")),
            has_service: service_defined(&self.service),
        }
    }

    fn dependency_list(&self) -> Vec<Dependency> {
        let mut deps = Vec::new();
        let mut push = |names: &[String], optional: bool, build: bool, test: bool| {
            for name in names {
                deps.push(Dependency {
                    name: name.clone(),
                    optional,
                    build,
                    test,
                });
            }
        };
        push(&self.dependencies, false, false, false);
        push(&self.recommended_dependencies, false, false, false);
        push(&self.optional_dependencies, true, false, false);
        push(&self.build_dependencies, false, true, false);
        push(&self.test_dependencies, false, false, true);
        deps
    }

    /// Convert into a [`Package`]; `cellar` locates the newest keg
    pub fn into_package(self, cellar: &Path) -> Package {
        let mut pkg = Package::new(self.name.clone(), PackageKind::Formula);
        let latest = self.latest().map(str::to_string);

        pkg.status = derive_status(&self.status_fields());
        pkg.dependencies = self.dependency_list();
        pkg.versions = version_list(
            self.installed.iter().filter_map(|i| i.version.clone()),
            latest.as_deref(),
        );
        pkg.installed_on = timestamp(self.installed.last().and_then(|i| i.time));
        pkg.path = self
            .installed
            .last()
            .and_then(|i| i.version.as_deref())
            .map(|v| cellar.join(&self.name).join(v).display().to_string());
        pkg.description = self.desc;
        pkg.tap = self.tap.clone();

        if let Some(latest) = latest {
            pkg.metadata.insert(LATEST_VERSION.to_string(), latest);
        }
        if let Some(tap) = self.tap {
            pkg.metadata.insert(TAP.to_string(), tap);
        }
        pkg
    }
}

impl RawCask {
    pub fn status_fields(&self) -> StatusFields<'_> {
        // Casks are never linked into the prefix, so NOT_LINKED does not apply
        StatusFields {
            outdated: self.outdated,
            ..StatusFields::default()
        }
    }

    /// Convert into a [`Package`]; `caskroom` locates the install
    pub fn into_package(self, caskroom: &Path) -> Package {
        let mut pkg = Package::new(self.token.clone(), PackageKind::Cask);

        pkg.status = derive_status(&self.status_fields());
        pkg.versions = version_list(self.installed.clone(), self.version.as_deref());
        pkg.installed_on = timestamp(self.installed_time);
        pkg.path = self
            .installed
            .as_ref()
            .map(|_| caskroom.join(&self.token).display().to_string());
        pkg.description = self.desc.or_else(|| self.name.first().cloned());
        pkg.tap = self.tap.clone();

        if let Some(depends_on) = self.depends_on {
            pkg.dependencies = depends_on
                .formula
                .into_iter()
                .chain(depends_on.cask)
                .map(Dependency::runtime)
                .collect();
        }
        if let Some(version) = self.version {
            pkg.metadata.insert(LATEST_VERSION.to_string(), version);
        }
        if let Some(tap) = self.tap {
            pkg.metadata.insert(TAP.to_string(), tap);
        }
        pkg
    }
}
