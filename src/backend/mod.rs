//! Data sources for installed packages.
//!
//! A [`Backend`] answers two questions: which packages of a kind are
//! installed, and what is known about one named package. [`BrewBackend`]
//! answers them by shelling out to `brew` and decoding its JSON output.
//! Tests substitute scripted backends.

pub mod raw;

use crate::error::{BreweryError, ErrorKind, Result};
use crate::package::{Package, PackageKind};
use crate::shell::Shell;
use async_trait::async_trait;
use raw::InfoDocument;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Casks are queried in chunks so the command line stays short
pub const CASK_BATCH_SIZE: usize = 30;

#[async_trait]
pub trait Backend: Send + Sync {
    /// Every installed package of `kind`, in no particular order
    async fn list_installed(&self, kind: PackageKind) -> Result<Vec<Package>>;

    /// Full record for one package, `None` when brew does not know it
    async fn info(&self, name: &str, kind: PackageKind) -> Result<Option<Package>>;
}

/// Backend driving the `brew` executable
#[derive(Debug, Clone)]
pub struct BrewBackend {
    shell: Shell,
    brew: String,
    cellar: PathBuf,
    caskroom: PathBuf,
}

impl BrewBackend {
    pub fn new(
        shell: Shell,
        brew: impl Into<String>,
        cellar: impl Into<PathBuf>,
        caskroom: impl Into<PathBuf>,
    ) -> Self {
        Self {
            shell,
            brew: brew.into(),
            cellar: cellar.into(),
            caskroom: caskroom.into(),
        }
    }

    async fn info_document(&self, args: &[&str]) -> Result<InfoDocument> {
        let mut argv = vec![self.brew.as_str()];
        argv.extend_from_slice(args);
        let value = self.shell.run_json(&argv).await?;
        serde_json::from_value(value.clone())
            .map_err(|e| BreweryError::malformed_output(argv.join(" "), &value.to_string(), e))
    }

    async fn installed_formulae(&self) -> Result<Vec<Package>> {
        let doc = self.info_document(&["info", "--json=v2", "--installed"]).await?;
        Ok(doc
            .formulae
            .into_iter()
            .map(|f| f.into_package(&self.cellar))
            .collect())
    }

    async fn installed_casks(&self) -> Result<Vec<Package>> {
        let tokens = self
            .shell
            .run_lines(&[self.brew.as_str(), "list", "--cask"])
            .await?;
        if tokens.is_empty() {
            return Ok(Vec::new());
        }

        let mut packages = Vec::with_capacity(tokens.len());
        for batch in tokens.chunks(CASK_BATCH_SIZE) {
            let mut args = vec!["info", "--json=v2", "--cask"];
            args.extend(batch.iter().map(String::as_str));
            let doc = self.info_document(&args).await?;
            packages.extend(doc.casks.into_iter().map(|c| c.into_package(&self.caskroom)));
        }
        Ok(packages)
    }
}

#[async_trait]
impl Backend for BrewBackend {
    async fn list_installed(&self, kind: PackageKind) -> Result<Vec<Package>> {
        let packages = match kind {
            PackageKind::Formula => self.installed_formulae().await,
            PackageKind::Cask => self.installed_casks().await,
        }
        .map_err(|e| e.with_context("kind", kind))?;

        tracing::debug!(event = "backend_listed", kind = %kind, count = packages.len());
        Ok(packages)
    }

    async fn info(&self, name: &str, kind: PackageKind) -> Result<Option<Package>> {
        let flag = match kind {
            PackageKind::Formula => "--formula",
            PackageKind::Cask => "--cask",
        };
        let doc = match self.info_document(&["info", "--json=v2", flag, name]).await {
            Ok(doc) => doc,
            Err(e @ BreweryError::Command { .. }) if e.kind() == ErrorKind::User => {
                tracing::debug!(event = "backend_unknown_package", package = name, kind = %kind);
                return Ok(None);
            }
            Err(e) => return Err(e.with_context("package", name)),
        };

        let mut pkg = match kind {
            PackageKind::Formula => doc
                .formulae
                .into_iter()
                .find(|f| f.name == name)
                .map(|f| f.into_package(&self.cellar)),
            PackageKind::Cask => doc
                .casks
                .into_iter()
                .find(|c| c.token == name)
                .map(|c| c.into_package(&self.caskroom)),
        };

        if let Some(pkg) = pkg.as_mut()
            && let Some(path) = pkg.path.clone()
        {
            pkg.size_kb = installed_size_kb(PathBuf::from(path)).await;
        }
        Ok(pkg)
    }
}

/// Disk usage of an install directory in KiB, `None` if it does not exist
pub async fn installed_size_kb(path: PathBuf) -> Option<u64> {
    tokio::task::spawn_blocking(move || dir_size_kb(&path))
        .await
        .ok()
        .flatten()
}

fn dir_size_kb(path: &Path) -> Option<u64> {
    if !path.exists() {
        return None;
    }
    let bytes: u64 = WalkDir::new(path)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum();
    Some(bytes.div_ceil(1024))
}
