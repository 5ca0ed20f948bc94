use anyhow::Result;
use colored::Colorize;
use rewind_core::config::{database_path, state_dir, CONFIG_FILE};
use rewind_core::{CommitLog, Config, Storage};
use std::path::PathBuf;

pub fn run(path: PathBuf) -> Result<()> {
    if database_path(&path).exists() {
        println!(
            "{} in {:?}",
            "Repository already initialised".yellow(),
            state_dir(&path)
        );
        return Ok(());
    }

    std::fs::create_dir_all(state_dir(&path))?;

    if !state_dir(&path).join(CONFIG_FILE).exists() {
        Config::default().save(&path)?;
    }

    let storage = Storage::new(database_path(&path))?;
    storage.begin_tracking()?;

    println!("{}", "✓ Repository initialised".green().bold());
    println!("   {}: {:?}", "State".bold(), state_dir(&path));

    match storage.head()? {
        Some(head) => println!(
            "   {}: after {}",
            "Tracking".bold(),
            head.short_hash().yellow()
        ),
        None => println!("   {}: from the first commit", "Tracking".bold()),
    }

    Ok(())
}
