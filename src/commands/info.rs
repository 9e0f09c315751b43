use crate::backend::installed_size_kb;
use crate::commands::print_json;
use crate::error::Result;
use crate::package::PackageKind;
use crate::render;
use crate::repository::Repository;
use std::path::PathBuf;

pub async fn info(repo: &Repository, name: &str, kind: PackageKind, json: bool) -> Result<()> {
    let is_tty = std::io::IsTerminal::is_terminal(&std::io::stdout());
    let spinner = render::spinner(format!("Fetching info for {}...", name), is_tty && !json);

    let result = repo.get_details(name, kind).await;
    let mut pkg = match result {
        Ok(pkg) => pkg,
        Err(e) => {
            spinner.finish_and_clear();
            return Err(e);
        }
    };

    // Cached listings carry no disk usage; measure it on demand
    if pkg.size_kb.is_none()
        && let Some(path) = pkg.path.clone()
    {
        pkg.size_kb = installed_size_kb(PathBuf::from(path)).await;
    }
    spinner.finish_and_clear();

    if json {
        print_json(&pkg)
    } else {
        print!("{}", render::package_details(&pkg));
        Ok(())
    }
}
