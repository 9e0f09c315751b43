use crate::commands::list::show;
use crate::error::Result;
use crate::package::Package;
use crate::render;
use crate::repository::Repository;

/// Installed packages whose name or description contains `term`
pub async fn search(repo: &Repository, term: &str, json: bool) -> Result<()> {
    let is_tty = std::io::IsTerminal::is_terminal(&std::io::stdout());
    let spinner = render::spinner(format!("Searching for {}...", term), is_tty && !json);

    let packages = repo.get_all_installed(None).await;
    spinner.finish_and_clear();
    let packages = packages?;

    let rows: Vec<&Package> = packages.iter().filter(|p| p.matches(term)).collect();
    show(&rows, json, is_tty)
}
