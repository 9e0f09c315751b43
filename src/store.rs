//! In-memory package state for interactive consumers.
//!
//! The store holds the last loaded package list and the active
//! [`Filters`]; views ask it for the filtered, name-sorted rows.

use crate::error::Result;
use crate::package::{Package, PackageKind, PackageStatus};
use crate::repository::Repository;
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filters {
    /// Case-insensitive substring of name or description
    pub query: Option<String>,
    pub kind: Option<PackageKind>,
    pub outdated: bool,
    pub pinned: bool,
    pub not_linked: bool,
}

impl Filters {
    pub fn accepts(&self, pkg: &Package) -> bool {
        if let Some(kind) = self.kind
            && pkg.kind != kind
        {
            return false;
        }
        let flags = [
            (self.outdated, PackageStatus::OUTDATED),
            (self.pinned, PackageStatus::PINNED),
            (self.not_linked, PackageStatus::NOT_LINKED),
        ];
        if flags
            .iter()
            .any(|(wanted, flag)| *wanted && !pkg.status.contains(*flag))
        {
            return false;
        }
        match self.query.as_deref().map(str::trim) {
            Some(q) if !q.is_empty() => pkg.matches(q),
            _ => true,
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Filters::default()
    }
}

/// Loaded packages plus filter state
pub struct PackageStore {
    repository: Arc<Repository>,
    packages: Vec<Package>,
    filters: Filters,
}

impl PackageStore {
    pub fn new(repository: Arc<Repository>) -> Self {
        Self {
            repository,
            packages: Vec::new(),
            filters: Filters::default(),
        }
    }

    /// Load every installed package, served from cache when possible
    pub async fn load(&mut self) -> Result<usize> {
        self.packages = self.repository.get_all_installed(None).await?;
        Ok(self.packages.len())
    }

    /// Bypass the repository caches and query the backend again
    pub async fn refresh(&mut self) -> Result<usize> {
        self.packages = self.repository.refresh(None).await?;
        Ok(self.packages.len())
    }

    pub fn packages(&self) -> &[Package] {
        &self.packages
    }

    pub fn filters(&self) -> &Filters {
        &self.filters
    }

    pub fn set_filters(&mut self, filters: Filters) {
        self.filters = filters;
    }

    pub fn set_query(&mut self, query: impl Into<String>) {
        let query = query.into();
        self.filters.query = if query.trim().is_empty() {
            None
        } else {
            Some(query)
        };
    }

    /// Rows passing the filters, sorted by lower-cased name
    pub fn filtered(&self) -> Vec<&Package> {
        let mut rows: Vec<&Package> = self
            .packages
            .iter()
            .filter(|p| self.filters.accepts(p))
            .collect();
        rows.sort_by_cached_key(|p| (p.name.to_lowercase(), p.kind));
        rows
    }

    pub fn find(&self, name: &str, kind: PackageKind) -> Option<&Package> {
        self.packages
            .iter()
            .find(|p| p.kind == kind && p.name == name)
    }

    /// Installed names closest to `name`, best first
    pub fn similar_names(&self, name: &str, limit: usize) -> Vec<String> {
        similar_names(self.packages.iter().map(|p| p.name.as_str()), name, limit)
    }

    pub async fn details(&self, name: &str, kind: PackageKind) -> Result<Package> {
        self.repository.get_details(name, kind).await
    }
}

/// Names from `candidates` within a small edit distance of `name`
pub fn similar_names<'a>(
    candidates: impl IntoIterator<Item = &'a str>,
    name: &str,
    limit: usize,
) -> Vec<String> {
    let target = name.to_lowercase();
    let mut scored: Vec<(f64, &str)> = candidates
        .into_iter()
        .map(|c| (strsim::jaro_winkler(&target, &c.to_lowercase()), c))
        .filter(|(score, _)| *score >= 0.8)
        .collect();
    scored.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.cmp(b.1)));
    scored.dedup_by(|a, b| a.1 == b.1);
    scored
        .into_iter()
        .take(limit)
        .map(|(_, c)| c.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pkg(name: &str, kind: PackageKind, status: PackageStatus) -> Package {
        let mut p = Package::new(name, kind);
        p.status = status;
        p
    }

    fn sample() -> Vec<Package> {
        let mut wget = pkg("wget", PackageKind::Formula, PackageStatus::OUTDATED);
        wget.description = Some("Internet file retriever".into());
        vec![
            wget,
            pkg("Zlib", PackageKind::Formula, PackageStatus::PINNED),
            pkg("openssl@3", PackageKind::Formula, PackageStatus::NOT_LINKED | PackageStatus::KEG_ONLY),
            pkg("firefox", PackageKind::Cask, PackageStatus::OUTDATED),
            pkg("alacritty", PackageKind::Cask, PackageStatus::NONE),
        ]
    }

    fn apply<'a>(filters: &Filters, packages: &'a [Package]) -> Vec<&'a str> {
        let mut names: Vec<&str> = packages
            .iter()
            .filter(|p| filters.accepts(p))
            .map(|p| p.name.as_str())
            .collect();
        names.sort_by_key(|n| n.to_lowercase());
        names
    }

    #[test]
    fn test_empty_filters_accept_everything() {
        let packages = sample();
        assert!(Filters::default().is_empty());
        assert_eq!(apply(&Filters::default(), &packages).len(), packages.len());
    }

    #[test]
    fn test_flag_filters_combine() {
        let packages = sample();
        let outdated = Filters {
            outdated: true,
            ..Filters::default()
        };
        assert_eq!(apply(&outdated, &packages), vec!["firefox", "wget"]);

        let outdated_formulae = Filters {
            outdated: true,
            kind: Some(PackageKind::Formula),
            ..Filters::default()
        };
        assert_eq!(apply(&outdated_formulae, &packages), vec!["wget"]);

        let not_linked = Filters {
            not_linked: true,
            ..Filters::default()
        };
        assert_eq!(apply(&not_linked, &packages), vec!["openssl@3"]);

        let pinned = Filters {
            pinned: true,
            ..Filters::default()
        };
        assert_eq!(apply(&pinned, &packages), vec!["Zlib"]);
    }

    #[test]
    fn test_query_matches_name_and_description() {
        let packages = sample();
        let by_desc = Filters {
            query: Some("RETRIEVER".into()),
            ..Filters::default()
        };
        assert_eq!(apply(&by_desc, &packages), vec!["wget"]);

        let blank = Filters {
            query: Some("   ".into()),
            ..Filters::default()
        };
        assert_eq!(apply(&blank, &packages).len(), packages.len());
    }

    #[test]
    fn test_similar_names() {
        let names = ["wget", "openssl@3", "firefox", "git"];
        assert_eq!(similar_names(names, "wgte", 3), vec!["wget"]);
        assert!(similar_names(names, "zzzzzz", 3).is_empty());
    }
}
