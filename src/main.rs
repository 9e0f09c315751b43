use anyhow::Context;
use brewery::clock::{Clock, SystemClock};
use brewery::commands::{self, ListOptions};
use brewery::config::{self, Config};
use brewery::error::{BreweryError, EXIT_SYSTEM_ERROR};
use brewery::{BrewBackend, PackageKind, Repository, UpdateTokens, logging, render};
use clap::{CommandFactory, Parser, Subcommand};
use colored::Colorize;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "brewery")]
#[command(author, version, about = "Fast, cached views of installed Homebrew packages", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List installed formulae and casks
    List {
        /// Only show this kind
        #[arg(short, long, value_enum)]
        kind: Option<PackageKind>,

        /// Only show outdated packages
        #[arg(long)]
        outdated: bool,

        /// Filter by name or description
        #[arg(short, long)]
        search: Option<String>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show details of one package
    Info {
        /// Formula or cask name
        name: String,

        /// Package kind
        #[arg(short, long, value_enum, default_value_t = PackageKind::Formula)]
        kind: PackageKind,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Search installed packages by name or description
    Search {
        /// Search term
        term: String,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show cache statistics or clear the cache
    Cache {
        /// Remove every cached entry
        #[arg(long)]
        clean: bool,
    },

    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Commands::Completions { shell } = cli.command {
        commands::completions(&mut Cli::command(), shell);
        return ExitCode::SUCCESS;
    }

    render::init_colors();
    let home = config::state_home(|key| std::env::var(key).ok());
    logging::init(Some(&config::log_file(&home)), cli.verbose);

    let repo = match build_repository().await {
        Ok(repo) => repo,
        Err(e) => return report(&e, None),
    };

    match dispatch(cli.command, &repo).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => report(&e, Some(&repo)),
    }
}

async fn build_repository() -> anyhow::Result<Repository> {
    let config = Config::discover()
        .await
        .context("Failed to resolve configuration")?;
    config.ensure_dirs()?;
    tracing::debug!(
        event = "config_resolved",
        prefix = %config.prefix.display(),
        cache_root = %config.cache_root.display(),
        timeout = config.timeout.as_secs(),
        list_ttl = config.list_ttl.as_secs(),
    );

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let tokens = Arc::new(UpdateTokens::new(
        &config.cellar,
        &config.caskroom,
        clock.clone(),
    ));
    let backend = Arc::new(BrewBackend::new(
        config.shell(),
        &config.brew,
        &config.cellar,
        &config.caskroom,
    ));

    Ok(Repository::new(&config.cache_root, tokens, clock, backend).with_list_ttl(config.list_ttl))
}

async fn dispatch(command: Commands, repo: &Repository) -> anyhow::Result<()> {
    match command {
        Commands::List {
            kind,
            outdated,
            search,
            json,
        } => {
            let opts = ListOptions {
                kind,
                outdated,
                search,
                json,
            };
            commands::list(repo, &opts).await?;
        }
        Commands::Info { name, kind, json } => {
            commands::info(repo, &name, kind, json).await?;
        }
        Commands::Search { term, json } => {
            commands::search(repo, &term, json).await?;
        }
        Commands::Cache { clean } => {
            commands::cache(repo, clean)?;
        }
        Commands::Completions { .. } => {}
    }
    Ok(())
}

/// Print a user-facing error and pick the exit code for it
fn report(err: &anyhow::Error, repo: Option<&Repository>) -> ExitCode {
    let Some(e) = err.downcast_ref::<BreweryError>() else {
        tracing::error!(event = "unexpected_error", error = %format!("{err:#}"));
        eprintln!("\n{} Unexpected error occurred: {:#}\n", "⚠".yellow(), err);
        return ExitCode::from(EXIT_SYSTEM_ERROR);
    };

    tracing::error!(
        event = "cli_error",
        kind = %e.kind(),
        error = %e,
        context = %e.context(),
    );
    eprintln!("\n{}\n", render::error_message(e).bold());

    if let BreweryError::PackageNotFound { package, .. } = e {
        let similar = repo
            .map(|r| commands::suggestions(r, package))
            .unwrap_or_default();
        eprintln!("{}", render::search_suggestion(package, &similar).dimmed());
    }
    ExitCode::from(e.exit_code())
}
