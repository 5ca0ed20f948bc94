use crate::display;
use anyhow::Result;
use colored::Colorize;
use dialoguer::Confirm;
use indicatif::{ProgressBar, ProgressStyle};
use rewind_core::{matcher, CommitLog, RevertKind, RevertStatus, Reverter};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

pub fn run(root: &Path, kind: RevertKind, commit: String, yes: bool) -> Result<()> {
    let repo = super::open_repo(root)?;
    let commit = repo.storage.get_commit(&commit)?;

    let title = match kind {
        RevertKind::Undo => "Undo Preview",
        RevertKind::Rollback => "Rollback Preview",
    };
    println!("{}", title.bold().cyan());
    println!("  {}: {}", "Target Commit".bold(), commit.hash);
    println!(
        "  {}: {}",
        "Change".bold(),
        matcher::parse(&commit.message).description()
    );
    println!("  {}: {}", "Author".bold(), commit.author);
    println!(
        "  {}: {}",
        "Date".bold(),
        commit.timestamp.format("%Y-%m-%d %H:%M:%S")
    );
    println!();

    let prompt = match kind {
        RevertKind::Undo => format!("Undo commit {}?", commit.short_hash()),
        RevertKind::Rollback => format!(
            "Roll back to {}? Every later change will be reverted.",
            commit.short_hash()
        ),
    };
    if !yes && !Confirm::new().with_prompt(prompt).default(false).interact()? {
        println!("{}", "Aborted".yellow());
        return Ok(());
    }

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::with_template("{spinner:.cyan} {msg}")?);
    spinner.set_message("Reverting...");
    spinner.enable_steady_tick(Duration::from_millis(100));

    debug!(operation = kind.as_str(), commit = %commit.hash, "Entering maintenance");
    let result = repo.maintenance.with_exclusive(|| {
        let reverter = Reverter::new(&repo.storage, &repo.schema);
        match kind {
            RevertKind::Undo => reverter.undo(&commit.hash),
            RevertKind::Rollback => reverter.rollback(&commit.hash),
        }
    });
    spinner.finish_and_clear();

    let status = result?;
    println!("{}", display::revert_outcome(status));

    if status == RevertStatus::Ok {
        if let Some(head) = repo.storage.head()? {
            println!("  {}: {}", "New commit".bold(), head.hash);
        }
    }

    Ok(())
}
