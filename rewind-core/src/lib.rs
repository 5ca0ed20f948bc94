//! # rewind-core
//!
//! Core library for rewind - a linear, revertible history of a mirrored
//! database.
//!
//! This crate provides the commit log store, the classification of commit
//! messages into change records, the history view, and the undo/rollback
//! engine that guards referential integrity.

pub mod changeinfo;
pub mod config;
pub mod diff;
pub mod eligibility;
pub mod error;
pub mod history;
pub mod integrity;
pub mod lock;
pub mod log;
pub mod matcher;
pub mod models;
pub mod paginator;
pub mod reverter;
pub mod storage;

pub use changeinfo::{ChangeInfo, ChangeSummary, RevertKind};
pub use config::Config;
pub use error::{Error, Result};
pub use history::{History, HistoryEntry, HistoryPage};
pub use integrity::{IntegrityChecker, Schema};
pub use lock::Maintenance;
pub use log::{CommitLog, Dataset};
pub use models::{Commit, Entity, EntityRef, FileChange, FileStatus, Tree};
pub use reverter::{Reverter, RevertStatus};
pub use storage::Storage;
