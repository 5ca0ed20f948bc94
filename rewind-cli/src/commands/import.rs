use anyhow::{Context, Result};
use colored::Colorize;
use rewind_core::Tree;
use std::path::{Path, PathBuf};

pub fn run(repo: &Path, snapshot: PathBuf) -> Result<()> {
    let repo = super::open_repo(repo)?;

    let text = std::fs::read_to_string(&snapshot)
        .with_context(|| format!("Failed to read snapshot {:?}", snapshot))?;
    let tree: Tree = serde_json::from_str(&text)
        .with_context(|| format!("Snapshot {:?} is not a {{path: content}} map", snapshot))?;

    let changes = repo.maintenance.with_exclusive(|| {
        repo.storage.import_tree(&tree)?;
        repo.storage.uncommitted_changes()
    })?;

    println!(
        "{} {} file(s), {} changed",
        "✓ Imported".green().bold(),
        tree.len(),
        changes.len().to_string().yellow()
    );

    Ok(())
}
