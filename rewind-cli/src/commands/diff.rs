use crate::display;
use anyhow::Result;
use colored::Colorize;
use rewind_core::{CommitLog, Error, History};
use std::path::Path;

pub fn run(root: &Path, commit: String) -> Result<()> {
    let repo = super::open_repo(root)?;
    let _read = repo.maintenance.read()?;
    let commit = repo.storage.get_commit(&commit)?;

    println!("{}", format!("Diff for commit {}", commit.hash).bold().cyan());
    println!("{}: {}", "Message".bold(), commit.subject());
    println!();

    // same cap as the API
    let history = History::new(&repo.storage, &repo.schema)
        .with_max_diff_bytes(repo.config.diff.max_bytes);
    match history.diff(&commit.hash) {
        Ok(text) => display::print_unified(&text),
        Err(Error::PayloadTooLarge { size, limit }) => {
            println!(
                "{}",
                format!(
                    "The diff is too large to show here (at least {} bytes, limit {}).",
                    size, limit
                )
                .yellow()
            );
        }
        Err(e) => return Err(e.into()),
    }

    Ok(())
}
