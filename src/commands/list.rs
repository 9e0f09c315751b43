use crate::commands::print_json;
use crate::error::Result;
use crate::package::{Package, PackageKind};
use crate::render;
use crate::repository::Repository;
use crate::store::Filters;
use colored::Colorize;

#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    pub kind: Option<PackageKind>,
    pub outdated: bool,
    pub search: Option<String>,
    pub json: bool,
}

impl ListOptions {
    pub fn filters(&self) -> Filters {
        Filters {
            query: self.search.clone(),
            kind: self.kind,
            outdated: self.outdated,
            ..Filters::default()
        }
    }
}

pub async fn list(repo: &Repository, opts: &ListOptions) -> Result<()> {
    let is_tty = std::io::IsTerminal::is_terminal(&std::io::stdout());
    let spinner = render::spinner("Loading installed packages...", is_tty && !opts.json);

    let packages = repo.get_all_installed(opts.kind).await;
    spinner.finish_and_clear();
    let packages = packages?;

    let filters = opts.filters();
    let rows: Vec<&Package> = packages.iter().filter(|p| filters.accepts(p)).collect();
    show(&rows, opts.json, is_tty)
}

/// Print `rows` as JSON or as a table with a summary line
pub(crate) fn show(rows: &[&Package], json: bool, is_tty: bool) -> Result<()> {
    if json {
        return print_json(&rows);
    }
    if rows.is_empty() {
        if is_tty {
            println!("{} No matching packages", "✓".green());
        }
        return Ok(());
    }

    print!("{}", render::package_table(rows, render::terminal_width()));

    if is_tty {
        let outdated = rows.iter().filter(|p| p.is_outdated()).count();
        println!();
        println!(
            "{} packages, {} outdated",
            rows.len().to_string().bold(),
            if outdated > 0 {
                outdated.to_string().red().bold()
            } else {
                outdated.to_string().green()
            }
        );
    }
    Ok(())
}
