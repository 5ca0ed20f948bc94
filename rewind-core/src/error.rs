use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("Config write error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("Commit not found: {0}")]
    CommitNotFound(String),

    #[error("Ambiguous revision: {0}")]
    AmbiguousRevision(String),

    #[error("Commit {0} cannot be reverted: {1}")]
    NotRevertible(String, String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Invalid entity at {path}: {reason}")]
    InvalidEntity { path: String, reason: String },

    #[error("Diff is {size} bytes, over the {limit} byte limit")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("The live tree has uncommitted changes")]
    DirtyWorktree,

    #[error("HEAD moved from {expected} to {actual}")]
    StaleBase { expected: String, actual: String },

    #[error("Could not acquire lock: {0}")]
    LockFailed(String),

    #[error("Log store is corrupted: {0}")]
    Corrupted(String),
}
