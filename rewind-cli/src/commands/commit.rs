use anyhow::Result;
use colored::Colorize;
use rewind_core::matcher;
use std::path::Path;

pub fn run(repo: &Path, message: String, author: String) -> Result<()> {
    let repo = super::open_repo(repo)?;

    let commit = repo.maintenance.with_exclusive(|| {
        let changes = repo.storage.uncommitted_changes()?;
        if changes.is_empty() {
            return Ok(None);
        }

        println!("{}", "Creating commit...".bold());
        println!("  {}: {}", "Changes".bold(), changes.len());
        println!();

        repo.storage.commit(&message, &author)
    })?;

    let Some(commit) = commit else {
        println!("{}", "No changes to commit".yellow());
        return Ok(());
    };

    println!("{}", "✓ Commit created successfully!".green().bold());
    println!("  {}: {}", "Commit".bold(), commit.hash);
    println!(
        "  {}: {}",
        "Change".bold(),
        matcher::parse(&commit.message).description()
    );
    println!("  {}: {}", "Author".bold(), commit.author);
    println!("  {}: {}", "Files changed".bold(), commit.changed_files.len());

    Ok(())
}
