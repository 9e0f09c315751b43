//! Library interface for brewery
//!
//! brewery presents installed Homebrew formulae and casks from a local,
//! fingerprinted cache so repeated queries do not pay for slow `brew`
//! invocations.
//!
//! The layers, leaves first:
//!
//! - [`shell`]: async command execution with timeouts
//! - [`error`]: transient / user / system error taxonomy
//! - [`retry`]: bounded exponential backoff for transient failures
//! - [`cache`]: per-key JSON files validated by TTL and an update token
//! - [`repository`]: list and detail queries composed over cache and backend
//!
//! # Examples
//!
//! ```no_run
//! use brewery::{BrewBackend, Config, Repository, SystemClock, UpdateTokens};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::discover().await?;
//!     let clock = Arc::new(SystemClock);
//!     let tokens = Arc::new(UpdateTokens::new(&config.cellar, &config.caskroom, clock.clone()));
//!     let backend = Arc::new(BrewBackend::new(
//!         config.shell(),
//!         &config.brew,
//!         &config.cellar,
//!         &config.caskroom,
//!     ));
//!     let repo = Repository::new(&config.cache_root, tokens, clock, backend);
//!
//!     for pkg in repo.get_all_installed(None).await? {
//!         println!("{} {}", pkg.name, pkg.installed_version().unwrap_or("?"));
//!     }
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod cache;
pub mod clock;
pub mod commands;
pub mod config;
pub mod error;
pub mod logging;
pub mod package;
pub mod render;
pub mod repository;
pub mod retry;
pub mod shell;
pub mod status;
pub mod store;
pub mod token;

// Re-export commonly used types
pub use backend::{Backend, BrewBackend};
pub use cache::{Cache, Lookup};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use error::{BreweryError, ErrorKind, Result};
pub use package::{Dependency, Package, PackageKind, PackageStatus};
pub use repository::Repository;
pub use store::{Filters, PackageStore};
pub use token::UpdateTokens;
