use crate::display;
use anyhow::Result;
use colored::Colorize;
use rewind_core::{CommitLog, Reverter};
use std::path::Path;

pub fn run(root: &Path) -> Result<()> {
    let repo = super::open_repo(root)?;
    if repo.maintenance.is_active() {
        println!("{}", "Waiting for a running revert to finish...".yellow());
    }
    let _read = repo.maintenance.read()?;
    let changes = repo.storage.uncommitted_changes()?;
    let head = repo.storage.head()?;
    let initial = repo.storage.initial_commit()?;

    println!("{}", "Repository Status".bold().cyan());
    println!("  {}: {}", "Root".bold(), root.display());
    println!(
        "  {}: {}",
        "HEAD".bold(),
        head.as_ref().map(|c| c.short_hash()).unwrap_or("(no commits)")
    );
    println!(
        "  {}: {}",
        "Initial commit".bold(),
        initial.as_ref().map(|c| c.short_hash()).unwrap_or("(not yet)")
    );
    println!("  {}: {}", "Commits".bold(), repo.storage.commit_count()?);
    println!();

    if changes.is_empty() {
        println!("{}", "No uncommitted changes".green());
    } else {
        println!(
            "{} {}",
            "Uncommitted changes:".bold(),
            format!("({})", changes.len()).yellow()
        );
        println!();

        for change in changes.iter().take(10) {
            println!("  {} {}", display::status_icon(change.status), change.path);
        }

        if changes.len() > 10 {
            println!();
            println!(
                "  {} and {} more...",
                "...".dimmed(),
                (changes.len() - 10).to_string().yellow()
            );
        }

        println!();
        println!(
            "Run {} to commit these changes",
            "rewind commit \"message\"".cyan()
        );
    }

    let reverter = Reverter::new(&repo.storage, &repo.schema);
    if !reverter.can_revert()? {
        println!(
            "{}",
            "Undo and rollback are blocked until these changes are committed".dimmed()
        );
    }

    Ok(())
}
