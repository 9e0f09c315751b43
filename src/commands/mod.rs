//! Command implementations for the brewery CLI
//!
//! - **list**: installed packages, filtered by kind, status and text
//! - **info**: one package's details
//! - **search**: text search over installed packages
//! - **cache**: cache statistics and cleanup
//! - **completions**: shell completion scripts

pub mod cache;
pub mod completions;
pub mod info;
pub mod list;
pub mod search;

pub use cache::cache;
pub use completions::completions;
pub use info::info;
pub use list::{ListOptions, list};
pub use search::search;

use crate::cache::Lookup;
use crate::error::{BreweryError, Result};
use crate::package::Package;
use crate::repository::{Repository, list_key};
use crate::store::similar_names;
use serde::Serialize;

/// Pretty-print `value` as JSON on stdout
pub(crate) fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| BreweryError::io("encoding JSON output", std::io::Error::other(e)))?;
    println!("{}", json);
    Ok(())
}

/// Installed names resembling `name`, read from the cached listing only
pub fn suggestions(repo: &Repository, name: &str) -> Vec<String> {
    match repo.cache().get::<Vec<Package>>(&list_key(None)) {
        Lookup::Hit(packages) => similar_names(packages.iter().map(|p| p.name.as_str()), name, 3),
        _ => Vec::new(),
    }
}
