//! Terminal rendering for packages and errors.
//!
//! Layout is computed on plain text and colour is applied afterwards, so
//! column alignment never depends on escape sequences.

use crate::error::{BreweryError, ErrorKind};
use crate::package::{LATEST_VERSION, Package, PackageStatus};
use chrono::{DateTime, Utc};
use colored::{Color, Colorize, control};
use indicatif::{ProgressBar, ProgressStyle};
use std::fmt::Write as _;
use std::time::Duration;

/// Column headers of the package table
pub const TABLE_HEADERS: [&str; 7] = [
    "Kind",
    "Name",
    "Installed",
    "Latest",
    "Status",
    "Size (MB)",
    "Installed On",
];

const DEFAULT_WIDTH: usize = 100;
const MIN_NAME_WIDTH: usize = 12;

/// Configure colour output from `NO_COLOR`, `CLICOLOR_FORCE`, `CLICOLOR`
/// and whether stdout is a terminal, in that order of precedence.
pub fn init_colors() {
    let env = |key: &str| std::env::var(key).ok();
    let is_tty = std::io::IsTerminal::is_terminal(&std::io::stdout());
    control::set_override(color_enabled(env("NO_COLOR"), env("CLICOLOR_FORCE"), env("CLICOLOR"), is_tty));
}

fn color_enabled(
    no_color: Option<String>,
    force: Option<String>,
    clicolor: Option<String>,
    is_tty: bool,
) -> bool {
    if no_color.is_some() {
        return false;
    }
    if force.is_some_and(|v| v != "0") {
        return true;
    }
    if clicolor.is_some_and(|v| v == "0") {
        return false;
    }
    is_tty
}

/// Terminal width, or a default when not attached to a terminal
pub fn terminal_width() -> usize {
    term_size::dimensions().map_or(DEFAULT_WIDTH, |(w, _)| w)
}

/// Display name and colour of each status flag, in display order
const FLAG_STYLES: [(PackageStatus, &str, Color); 6] = [
    (PackageStatus::OUTDATED, "Outdated", Color::Red),
    (PackageStatus::PINNED, "Pinned", Color::Yellow),
    (PackageStatus::NOT_LINKED, "Not Linked", Color::Blue),
    (PackageStatus::KEG_ONLY, "Keg-Only", Color::Magenta),
    (PackageStatus::HEAD, "HEAD", Color::Cyan),
    (PackageStatus::HAS_SERVICE, "Service", Color::Green),
];

fn status_flags(status: PackageStatus) -> impl Iterator<Item = (&'static str, Color)> {
    FLAG_STYLES
        .into_iter()
        .filter(move |(flag, _, _)| status.contains(*flag))
        .map(|(_, name, color)| (name, color))
}

/// Plain status text, e.g. `Outdated, Pinned` or `Up-to-date`
pub fn status_text(status: PackageStatus) -> String {
    if status.is_empty() {
        return "Up-to-date".to_string();
    }
    status_flags(status)
        .map(|(name, _)| name)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Coloured status text
pub fn status_label(status: PackageStatus) -> String {
    if status.is_empty() {
        return "Up-to-date".green().to_string();
    }
    status_flags(status)
        .map(|(name, color)| name.color(color).to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Size in megabytes with two decimals, empty when unknown
pub fn format_size_mb(size_kb: Option<u64>) -> String {
    size_kb.map_or_else(String::new, |kb| format!("{:.2}", kb as f64 / 1024.0))
}

pub fn format_date(ts: Option<DateTime<Utc>>) -> String {
    ts.map_or_else(String::new, |t| t.format("%Y-%m-%d %H:%M").to_string())
}

fn latest(pkg: &Package) -> String {
    pkg.metadata
        .get(LATEST_VERSION)
        .map(String::as_str)
        .or_else(|| pkg.versions.last().map(String::as_str))
        .unwrap_or_default()
        .to_string()
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let keep = width.saturating_sub(1);
    let mut out: String = text.chars().take(keep).collect();
    out.push('…');
    out
}

fn pad(text: &str, width: usize) -> String {
    let len = text.chars().count();
    format!("{text}{}", " ".repeat(width.saturating_sub(len)))
}

/// One table row as plain cells, in [`TABLE_HEADERS`] order
pub fn table_row(pkg: &Package) -> [String; 7] {
    [
        pkg.kind.to_string(),
        pkg.name.clone(),
        pkg.installed_version().unwrap_or_default().to_string(),
        latest(pkg),
        status_text(pkg.status),
        format_size_mb(pkg.size_kb),
        format_date(pkg.installed_on),
    ]
}

/// Render `packages` as an aligned table no wider than `width` where possible.
///
/// Only the name column shrinks; other columns keep their natural width.
pub fn package_table(packages: &[&Package], width: usize) -> String {
    let rows: Vec<([String; 7], PackageStatus)> =
        packages.iter().map(|p| (table_row(p), p.status)).collect();

    let mut widths: Vec<usize> = TABLE_HEADERS.iter().map(|h| h.chars().count()).collect();
    for (cells, _) in &rows {
        for (i, cell) in cells.iter().enumerate() {
            widths[i] = widths[i].max(cell.chars().count());
        }
    }

    let separators = 2 * (widths.len() - 1);
    let total: usize = widths.iter().sum::<usize>() + separators;
    if total > width {
        let excess = total - width;
        widths[1] = widths[1].saturating_sub(excess).max(MIN_NAME_WIDTH);
    }

    let mut out = String::new();
    let header: Vec<String> = TABLE_HEADERS
        .iter()
        .zip(&widths)
        .map(|(h, w)| pad(h, *w))
        .collect();
    let _ = writeln!(out, "{}", header.join("  ").trim_end().bold());

    for (cells, status) in &rows {
        let mut line = Vec::with_capacity(cells.len());
        for (i, cell) in cells.iter().enumerate() {
            let text = truncate(cell, widths[i]);
            let padded = if i == 5 {
                format!("{text:>w$}", w = widths[i])
            } else {
                pad(&text, widths[i])
            };
            let styled = match i {
                1 => padded.bold().to_string(),
                // Colour per flag unless the label had to be cut
                4 if text == *cell => {
                    let trailing = &padded[text.len()..];
                    format!("{}{trailing}", status_label(*status))
                }
                6 => padded.dimmed().to_string(),
                _ => padded,
            };
            line.push(styled);
        }
        let _ = writeln!(out, "{}", line.join("  ").trim_end());
    }
    out
}

/// Field/value view of one package
pub fn package_details(pkg: &Package) -> String {
    let mut fields: Vec<(&str, String)> = vec![
        ("Name", pkg.name.bold().to_string()),
        ("Kind", pkg.kind.to_string()),
        ("Description", pkg.description.clone().unwrap_or_default()),
        ("Installed Versions", pkg.versions.join(", ")),
        ("Latest", latest(pkg)),
        ("Status", status_label(pkg.status)),
        ("Size (MB)", format_size_mb(pkg.size_kb)),
    ];
    if pkg.installed_on.is_some() {
        fields.push(("Installed On", format_date(pkg.installed_on)));
    }
    if !pkg.dependencies.is_empty() {
        let deps: Vec<String> = pkg
            .dependencies
            .iter()
            .map(|d| {
                let mut tags = Vec::new();
                if d.build {
                    tags.push("build");
                }
                if d.test {
                    tags.push("test");
                }
                if d.optional {
                    tags.push("optional");
                }
                if tags.is_empty() {
                    d.name.clone()
                } else {
                    format!("{} ({})", d.name, tags.join(", "))
                }
            })
            .collect();
        fields.push(("Depends on", deps.join(", ")));
    }
    if !pkg.used_by.is_empty() {
        fields.push(("Used by", pkg.used_by.iter().cloned().collect::<Vec<_>>().join(", ")));
    }
    if let Some(tap) = &pkg.tap {
        fields.push(("Tap", tap.clone()));
    }
    if let Some(path) = &pkg.path {
        fields.push(("Path", path.dimmed().to_string()));
    }

    let label_width = fields.iter().map(|(l, _)| l.len()).max().unwrap_or(0);
    let mut out = format!("{}\n", format!("==> {}", pkg.name).bold().green());
    for (label, value) in fields {
        let _ = writeln!(out, "{}  {}", pad(label, label_width).bold(), value);
    }
    out
}

/// User-facing message for an error, one template per variant
pub fn error_message(err: &BreweryError) -> String {
    match err {
        BreweryError::PackageNotFound { package, kind, .. } => format!(
            "{} Package not found: {kind} '{package}'\n   Suggestion: try 'brewery search {package}' to find similar packages",
            "✗".red()
        ),
        BreweryError::Timeout { command, timeout, .. } => format!(
            "{} Command timed out after {}s: {command}\n   The operation took too long, raise BREWERY_TIMEOUT or try again",
            "⚠".yellow(),
            timeout.as_secs_f64()
        ),
        BreweryError::Command {
            command,
            code,
            output,
            kind,
            ..
        } => {
            let mut msg = format!("{} Brew command failed: {command}", "⚠".yellow());
            if let Some(code) = code {
                let _ = write!(msg, "\n   Exit code: {code}");
            }
            if !output.is_empty() {
                let _ = write!(msg, "\n   Error: {}", truncate(output, 500));
            } else {
                let _ = write!(msg, "\n   Error: {err}");
            }
            if *kind == ErrorKind::Transient {
                msg.push_str("\n   This may resolve itself, try again in a moment");
            }
            msg
        }
        BreweryError::Spawn { command, source, .. } => format!(
            "{} Could not run '{command}': {source}\n   Check that Homebrew is installed and on PATH",
            "⚠".yellow()
        ),
        BreweryError::Cache { path, source, .. } => {
            let detail = source
                .as_ref()
                .map_or_else(|| err.to_string(), |s| format!("{err}: {s}"));
            format!(
                "{} Cache error: {detail}\n   Location: {}\n   Fix: check file permissions or run 'brewery cache --clean'",
                "⚠".yellow(),
                path.display()
            )
        }
        BreweryError::Io { what, source, .. } => format!(
            "{} System error: {what}: {source}\n   Check your system configuration and try again",
            "⚠".yellow()
        ),
    }
}

/// Closing hint for not-found errors
pub fn search_suggestion(package: &str, similar: &[String]) -> String {
    let mut out = String::from("Suggestions:\n");
    let _ = writeln!(out, "   • Try 'brewery search {package}'");
    if !similar.is_empty() {
        let _ = writeln!(out, "   • Did you mean: {}", similar.join(", "));
    }
    out.push_str("   • Check the spelling and try again\n");
    out
}

/// Steady spinner on stderr, hidden when `enabled` is false
pub fn spinner(message: impl Into<String>, enabled: bool) -> ProgressBar {
    if !enabled {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message.into());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}
