use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod display;

use commands::{commit, diff, import, init, log, revert, serve, status};
use rewind_core::RevertKind;

#[derive(Parser)]
#[command(name = "rewind")]
#[command(version, about = "Revertible history for mirrored site content", long_about = None)]
struct Cli {
    /// Repository root
    #[arg(short, long, global = true, default_value = ".")]
    repo: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a repository and begin tracking
    Init {
        /// Directory to initialise (defaults to --repo)
        path: Option<PathBuf>,
    },

    /// Replace the live tree with a JSON snapshot of {path: content}
    Import {
        /// Snapshot file
        snapshot: PathBuf,
    },

    /// Commit the live tree
    Commit {
        /// Commit message
        message: String,

        /// Author recorded on the commit
        #[arg(short, long, default_value = "cli-user")]
        author: String,
    },

    /// Show uncommitted changes
    Status,

    /// Show a page of history
    Log {
        /// Page number, starting at 0
        #[arg(short, long, default_value = "0")]
        page: usize,
    },

    /// Show the diff of a commit
    Diff {
        /// Commit hash or prefix
        commit: String,
    },

    /// Undo the changes of one commit
    Undo {
        /// Commit hash or prefix
        commit: String,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Roll back to the state of a commit
    Rollback {
        /// Commit hash or prefix
        commit: String,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Serve the HTTP API
    Serve {
        /// Port for the API server
        #[arg(short, long, default_value = "3030")]
        port: u16,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let repo = cli.repo;

    match cli.command {
        Commands::Init { path } => {
            init::run(path.unwrap_or(repo))?;
        }
        Commands::Import { snapshot } => {
            import::run(&repo, snapshot)?;
        }
        Commands::Commit { message, author } => {
            commit::run(&repo, message, author)?;
        }
        Commands::Status => {
            status::run(&repo)?;
        }
        Commands::Log { page } => {
            log::run(&repo, page)?;
        }
        Commands::Diff { commit } => {
            diff::run(&repo, commit)?;
        }
        Commands::Undo { commit, yes } => {
            revert::run(&repo, RevertKind::Undo, commit, yes)?;
        }
        Commands::Rollback { commit, yes } => {
            revert::run(&repo, RevertKind::Rollback, commit, yes)?;
        }
        Commands::Serve { port } => {
            serve::run(repo, port).await?;
        }
    }

    Ok(())
}
