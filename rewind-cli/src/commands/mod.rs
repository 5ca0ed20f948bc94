pub mod commit;
pub mod diff;
pub mod import;
pub mod init;
pub mod log;
pub mod revert;
pub mod serve;
pub mod status;

use anyhow::{Context, Result};
use rewind_core::config::{database_path, state_dir};
use rewind_core::{Config, Maintenance, Schema, Storage};
use std::path::Path;

/// An opened repository: its store and the settings it was opened with.
///
/// Writes go through `maintenance.with_exclusive`, reads hold `maintenance.read()`.
pub struct Repo {
    pub storage: Storage,
    pub config: Config,
    pub schema: Schema,
    pub maintenance: Maintenance,
}

pub fn open_repo(root: &Path) -> Result<Repo> {
    let db_path = database_path(root);

    if !db_path.exists() {
        anyhow::bail!(
            "No rewind repository found in {}. Run 'rewind init' first.",
            root.display()
        );
    }

    let config = Config::load(root).context("Failed to load config")?;
    let storage = Storage::new(&db_path)?;
    let schema = config.schema();

    Ok(Repo {
        storage,
        config,
        schema,
        maintenance: Maintenance::new(&state_dir(root)),
    })
}
