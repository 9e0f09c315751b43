//! Package repository: the single entry point consumers query.
//!
//! Two cache namespaces sit in front of the backend:
//!
//! - `repository` holds the sorted list of installed packages and a
//!   name-indexed map derived from the same fetch, one pair per kind filter
//!   (`installed_formula`, `installed_cask`, `installed_all` and their
//!   `installed_map_*` twins). Reads use the token-only [`Cache::get`].
//! - `backend` holds raw per-kind listings behind a TTL with stale
//!   fallback, so a failing `brew` still serves the last good answer.
//!
//! [`Repository::get_details`] falls through the map, then the list, then a
//! refresh and finally a direct backend query before giving up.

use crate::backend::Backend;
use crate::cache::{Cache, CacheStats, Lookup};
use crate::clock::Clock;
use crate::error::{BreweryError, Result};
use crate::package::{Package, PackageKind};
use crate::token::UpdateTokens;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

pub const REPOSITORY_NAMESPACE: &str = "repository";
pub const BACKEND_NAMESPACE: &str = "backend";

/// Default lifetime of backend listings
pub const DEFAULT_LIST_TTL: Duration = Duration::from_secs(3600);

/// Detail queries remembered per process, across every token seen
const DETAIL_MEMO_CAPACITY: u64 = 1000;

/// Name-indexed view of a package list
pub type PackageMap = BTreeMap<String, Package>;

fn scope(kind: Option<PackageKind>) -> &'static str {
    kind.map_or("all", PackageKind::as_str)
}

/// Cache key of the flat list for a kind filter
pub fn list_key(kind: Option<PackageKind>) -> String {
    format!("installed_{}", scope(kind))
}

/// Cache key of the name-indexed map for a kind filter
pub fn map_key(kind: Option<PackageKind>) -> String {
    format!("installed_map_{}", scope(kind))
}

fn backend_key(kind: PackageKind) -> String {
    format!("list_{kind}")
}

/// Map entry name: bare for per-kind maps, `kind:name` in the all-kinds map
fn entry_name(filter: Option<PackageKind>, kind: PackageKind, name: &str) -> String {
    match filter {
        Some(_) => name.to_string(),
        None => format!("{kind}:{name}"),
    }
}

fn index(filter: Option<PackageKind>, packages: &[Package]) -> PackageMap {
    packages
        .iter()
        .map(|p| (entry_name(filter, p.kind, &p.name), p.clone()))
        .collect()
}

/// Fill `used_by` from the runtime dependencies of every other package
pub fn fill_used_by(packages: &mut [Package]) {
    let formulae: HashMap<String, usize> = packages
        .iter()
        .enumerate()
        .filter(|(_, p)| p.kind == PackageKind::Formula)
        .map(|(i, p)| (p.name.clone(), i))
        .collect();

    let mut edges = Vec::new();
    for pkg in packages.iter() {
        for dep in pkg.dependencies.iter().filter(|d| !d.build && !d.test) {
            if let Some(&target) = formulae.get(&dep.name)
                && packages[target].name != pkg.name
            {
                edges.push((target, pkg.name.clone()));
            }
        }
    }

    for pkg in packages.iter_mut() {
        pkg.used_by.clear();
    }
    for (target, dependent) in edges {
        packages[target].used_by.insert(dependent);
    }
}

/// Outcome of one backend refresh
struct Fetched {
    packages: Vec<Package>,
    /// `false` when a requested kind failed or was served stale
    complete: bool,
}

pub struct Repository {
    cache: Cache,
    backend_cache: Cache,
    backend: Arc<dyn Backend>,
    list_ttl: Duration,
    /// Keyed by update token so an install retires earlier answers
    details: moka::future::Cache<(String, PackageKind, String), Package>,
}

impl Repository {
    pub fn new(
        cache_root: &Path,
        tokens: Arc<UpdateTokens>,
        clock: Arc<dyn Clock>,
        backend: Arc<dyn Backend>,
    ) -> Self {
        Self {
            cache: Cache::new(cache_root, REPOSITORY_NAMESPACE, tokens.clone(), clock.clone()),
            backend_cache: Cache::new(cache_root, BACKEND_NAMESPACE, tokens, clock),
            backend,
            list_ttl: DEFAULT_LIST_TTL,
            details: moka::future::Cache::builder()
                .max_capacity(DETAIL_MEMO_CAPACITY)
                .build(),
        }
    }

    pub fn with_list_ttl(mut self, ttl: Duration) -> Self {
        self.list_ttl = ttl;
        self
    }

    pub fn list_ttl(&self) -> Duration {
        self.list_ttl
    }

    /// The `repository` namespace cache
    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    /// The `backend` namespace cache
    pub fn backend_cache(&self) -> &Cache {
        &self.backend_cache
    }

    /// Installed packages of `kind` (or of every kind), sorted by kind then
    /// lower-cased name.
    ///
    /// A non-empty cached list written under the current update token is
    /// returned without touching the backend. Anything else, including an
    /// unreadable cache file, triggers [`Repository::refresh`].
    pub async fn get_all_installed(&self, kind: Option<PackageKind>) -> Result<Vec<Package>> {
        let key = list_key(kind);
        match self.cache.get::<Vec<Package>>(&key) {
            Lookup::Hit(packages) if !packages.is_empty() => {
                tracing::debug!(event = "packages_from_cache", key = %key, count = packages.len());
                return Ok(packages);
            }
            Lookup::Hit(_) | Lookup::Miss => {}
            Lookup::Failed(e) => {
                tracing::warn!(event = "cache_read_failed", key = %key, error = %e, context = %e.context());
            }
        }
        self.reload(kind, false).await
    }

    /// Query the backend for `kind` (both kinds concurrently when `None`),
    /// then rewrite the list and map caches.
    ///
    /// The backend is always asked again, even when its last listing is
    /// younger than the list TTL; that listing is only served if the query
    /// fails with a transient error.
    ///
    /// If every requested kind fails the first error is returned. If only
    /// one of two kinds fails, or a kind is answered from a stale backend
    /// listing, the packages are returned but the caches are left untouched.
    pub async fn refresh(&self, kind: Option<PackageKind>) -> Result<Vec<Package>> {
        self.reload(kind, true).await
    }

    async fn reload(&self, kind: Option<PackageKind>, force: bool) -> Result<Vec<Package>> {
        let start = Instant::now();
        tracing::info!(event = "fetch_packages_start", scope = scope(kind), force);

        let Fetched {
            mut packages,
            complete,
        } = self.fetch(kind, force).await?;

        packages.sort_by_key(Package::sort_key);
        match kind {
            None => fill_used_by(&mut packages),
            Some(k) => self.fill_used_by_with_cached(k, &mut packages),
        }

        if complete {
            self.store(kind, &packages)?;
            if kind.is_none() {
                for k in PackageKind::ALL {
                    let subset: Vec<Package> =
                        packages.iter().filter(|p| p.kind == k).cloned().collect();
                    self.store(Some(k), &subset)?;
                }
            }
        }

        tracing::info!(
            event = "fetch_packages_complete",
            scope = scope(kind),
            count = packages.len(),
            complete,
            duration_ms = start.elapsed().as_millis() as u64,
        );
        Ok(packages)
    }

    async fn fetch(&self, kind: Option<PackageKind>, force: bool) -> Result<Fetched> {
        match kind {
            Some(k) => {
                let (packages, fresh) = self.fetch_kind(k, force).await?;
                Ok(Fetched {
                    packages,
                    complete: fresh,
                })
            }
            None => {
                let (formulae, casks) = tokio::join!(
                    self.fetch_kind(PackageKind::Formula, force),
                    self.fetch_kind(PackageKind::Cask, force)
                );
                match (formulae, casks) {
                    (Ok((mut formulae, formulae_fresh)), Ok((casks, casks_fresh))) => {
                        formulae.extend(casks);
                        Ok(Fetched {
                            packages: formulae,
                            complete: formulae_fresh && casks_fresh,
                        })
                    }
                    (Ok((packages, _)), Err(e)) | (Err(e), Ok((packages, _))) => {
                        tracing::warn!(
                            event = "fetch_packages_partial",
                            error = %e,
                            context = %e.context(),
                            returned = packages.len(),
                        );
                        Ok(Fetched {
                            packages,
                            complete: false,
                        })
                    }
                    (Err(formula_err), Err(cask_err)) => {
                        tracing::error!(
                            event = "fetch_packages_failed",
                            formula_error = %formula_err,
                            cask_error = %cask_err,
                        );
                        Err(formula_err)
                    }
                }
            }
        }
    }

    /// Backend listing for one kind and whether it is fresh. A listing
    /// is stale when the backend failed and the cache fell back to the
    /// previous value.
    ///
    /// Unless `force` is set, a listing younger than the list TTL and
    /// written under the current token is reused. A zero TTL expires every
    /// entry, so forced loads always reach the backend.
    async fn fetch_kind(&self, kind: PackageKind, force: bool) -> Result<(Vec<Package>, bool)> {
        let ttl = if force { Duration::ZERO } else { self.list_ttl };
        let failed = AtomicBool::new(false);
        let packages = self
            .backend_cache
            .get_or_set(&backend_key(kind), Some(ttl), true, || async {
                let result = self.backend.list_installed(kind).await;
                if result.is_err() {
                    failed.store(true, Ordering::Relaxed);
                }
                result
            })
            .await?;

        let fresh = !failed.load(Ordering::Relaxed);
        if !fresh {
            tracing::warn!(event = "serving_stale_listing", kind = %kind, count = packages.len());
        }
        Ok((packages, fresh))
    }

    /// Fill `used_by` for a single-kind listing, counting dependents of the
    /// other kinds from their current backend listings when cached. With
    /// both listings cached under one token this matches what an all-kinds
    /// refresh computes.
    fn fill_used_by_with_cached(&self, kind: PackageKind, packages: &mut Vec<Package>) {
        let own = packages.len();
        for other in PackageKind::ALL.into_iter().filter(|k| *k != kind) {
            match self.backend_cache.get::<Vec<Package>>(&backend_key(other)) {
                Lookup::Hit(listing) => packages.extend(listing),
                Lookup::Miss => {}
                Lookup::Failed(e) => {
                    tracing::warn!(event = "cache_read_failed", kind = %other, error = %e, context = %e.context());
                }
            }
        }
        fill_used_by(packages);
        packages.truncate(own);
    }

    fn store(&self, kind: Option<PackageKind>, packages: &[Package]) -> Result<()> {
        self.cache.set(&list_key(kind), &packages)?;
        self.cache.set(&map_key(kind), &index(kind, packages))?;
        Ok(())
    }

    /// Look up one package, falling through progressively more expensive
    /// sources. Cache errors are logged and skipped; the last failure seen
    /// becomes the cause of the final [`BreweryError::PackageNotFound`].
    pub async fn get_details(&self, name: &str, kind: PackageKind) -> Result<Package> {
        let start = Instant::now();
        tracing::info!(event = "fetch_package_details_start", package = name, kind = %kind);
        let mut cause: Option<BreweryError> = None;

        let found = match self.from_maps(name, kind, &mut cause) {
            Some(pkg) => Some((pkg, "map")),
            None => match self.from_lists(name, kind, &mut cause) {
                Some(pkg) => Some((pkg, "list")),
                None => match self.from_refresh(name, kind, &mut cause).await {
                    Some(pkg) => Some((pkg, "refresh")),
                    None => self
                        .from_backend(name, kind, &mut cause)
                        .await
                        .map(|pkg| (pkg, "backend")),
                },
            },
        };

        match found {
            Some((pkg, source)) => {
                tracing::info!(
                    event = "fetch_package_details_complete",
                    package = name,
                    kind = %kind,
                    source,
                    duration_ms = start.elapsed().as_millis() as u64,
                );
                Ok(pkg)
            }
            None => {
                let err = match cause {
                    Some(cause) => BreweryError::not_found_caused_by(name, kind, cause),
                    None => BreweryError::not_found(name, kind),
                };
                Err(err.with_context("operation", "get_details"))
            }
        }
    }

    fn note_failure(cause: &mut Option<BreweryError>, layer: &str, e: BreweryError) {
        tracing::warn!(event = "details_layer_failed", layer, error = %e, context = %e.context());
        *cause = Some(e);
    }

    fn from_maps(&self, name: &str, kind: PackageKind, cause: &mut Option<BreweryError>) -> Option<Package> {
        for filter in [Some(kind), None] {
            match self.cache.get::<PackageMap>(&map_key(filter)) {
                Lookup::Hit(mut map) => {
                    if let Some(pkg) = map.remove(&entry_name(filter, kind, name)) {
                        return Some(pkg);
                    }
                }
                Lookup::Miss => {}
                Lookup::Failed(e) => Self::note_failure(cause, "map", e),
            }
        }
        None
    }

    fn from_lists(&self, name: &str, kind: PackageKind, cause: &mut Option<BreweryError>) -> Option<Package> {
        for filter in [Some(kind), None] {
            match self.cache.get::<Vec<Package>>(&list_key(filter)) {
                Lookup::Hit(list) => {
                    if let Some(pkg) = list.into_iter().find(|p| p.kind == kind && p.name == name) {
                        return Some(pkg);
                    }
                }
                Lookup::Miss => {}
                Lookup::Failed(e) => Self::note_failure(cause, "list", e),
            }
        }
        None
    }

    async fn from_refresh(
        &self,
        name: &str,
        kind: PackageKind,
        cause: &mut Option<BreweryError>,
    ) -> Option<Package> {
        match self.refresh(Some(kind)).await {
            Ok(list) => list.into_iter().find(|p| p.name == name),
            Err(e) => {
                Self::note_failure(cause, "refresh", e);
                None
            }
        }
    }

    async fn from_backend(
        &self,
        name: &str,
        kind: PackageKind,
        cause: &mut Option<BreweryError>,
    ) -> Option<Package> {
        let memo_key = (self.cache.token(), kind, name.to_string());
        if let Some(pkg) = self.details.get(&memo_key).await {
            return Some(pkg);
        }
        match self.backend.info(name, kind).await {
            Ok(Some(pkg)) => {
                self.details.insert(memo_key, pkg.clone()).await;
                Some(pkg)
            }
            Ok(None) => None,
            Err(e) => {
                Self::note_failure(cause, "backend", e);
                None
            }
        }
    }

    /// Entry counts for both namespaces
    pub fn stats(&self) -> Result<Vec<(String, CacheStats)>> {
        Ok(vec![
            (REPOSITORY_NAMESPACE.to_string(), self.cache.stats()?),
            (BACKEND_NAMESPACE.to_string(), self.backend_cache.stats()?),
        ])
    }

    /// Drop every cached entry and the in-process detail memo
    pub fn clear(&self) -> Result<usize> {
        let removed = self.cache.clear()? + self.backend_cache.clear()?;
        self.details.invalidate_all();
        tracing::info!(event = "cache_cleared", removed);
        Ok(removed)
    }
}
