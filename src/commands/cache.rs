use crate::error::Result;
use crate::repository::Repository;
use colored::Colorize;

pub fn cache(repo: &Repository, clean: bool) -> Result<()> {
    if clean {
        println!("Cleaning package cache...");

        let before: u64 = repo.stats()?.iter().map(|(_, s)| s.bytes).sum();
        let removed = repo.clear()?;
        if removed == 0 {
            println!("{} Cache is already empty", "✓".green());
            return Ok(());
        }

        println!(
            "{} Removed {} entries, freed {}",
            "✓".green().bold(),
            removed.to_string().bold(),
            format_size(before).bold()
        );
        return Ok(());
    }

    println!("{}", "==> Package Cache".bold().green());
    println!();

    let mut total_entries = 0;
    for (namespace, stats) in repo.stats()? {
        total_entries += stats.entries;
        let dir = if namespace == crate::repository::REPOSITORY_NAMESPACE {
            repo.cache().dir()
        } else {
            repo.backend_cache().dir()
        };
        println!(
            "{}: {} ({} entries, {})",
            namespace.bold(),
            dir.display().to_string().cyan(),
            stats.entries,
            format_size(stats.bytes)
        );
    }
    println!(
        "{}: {}s",
        "List TTL".bold(),
        repo.list_ttl().as_secs().to_string().cyan()
    );

    if total_entries > 0 {
        println!();
        println!("Run {} to clean the cache", "brewery cache --clean".dimmed());
    }
    Ok(())
}

pub(crate) fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}
