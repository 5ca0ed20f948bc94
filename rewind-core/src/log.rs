//! Seams between the engine and the store that holds history.
//!
//! [`CommitLog`] is the read side of the linear, hash-addressed log;
//! [`Dataset`] reads and replaces the tracked tree. [`crate::Storage`]
//! implements both.

use crate::error::Result;
use crate::models::{Commit, FileChange, Tree};

pub trait CommitLog {
    /// Resolves `HEAD`, a full hash or a unique prefix to a full hash.
    fn resolve(&self, rev: &str) -> Result<String>;

    fn get_commit(&self, rev: &str) -> Result<Commit>;

    fn head(&self) -> Result<Option<Commit>>;

    /// The first commit ever recorded.
    fn root_commit(&self) -> Result<Option<Commit>>;

    /// The first commit made after tracking began; nothing older is revertible.
    fn initial_commit(&self) -> Result<Option<Commit>>;

    fn parent_commit(&self, hash: &str) -> Result<Option<String>>;

    fn child_commit(&self, hash: &str) -> Result<Option<String>>;

    fn commit_count(&self) -> Result<usize>;

    /// Up to `limit` commits, newest first, after skipping the `skip` newest.
    fn commits(&self, skip: usize, limit: usize) -> Result<Vec<Commit>>;

    /// Commits after `from` (exclusive) up to `to` (inclusive), newest first.
    fn range(&self, from: &str, to: &str) -> Result<Vec<Commit>>;

    fn changes(&self, hash: &str) -> Result<Vec<FileChange>>;

    /// True when `rev` is a strict descendant of `ancestor`.
    fn was_created_after(&self, rev: &str, ancestor: &str) -> Result<bool>;
}

pub trait Dataset {
    /// The tree recorded by HEAD.
    fn head_tree(&self) -> Result<Tree>;

    /// The live tree, including changes not yet committed.
    fn live_tree(&self) -> Result<Tree>;

    /// The tree as of `hash`.
    fn tree_at(&self, hash: &str) -> Result<Tree>;

    fn is_clean(&self) -> Result<bool>;

    fn stage_file(&self, path: &str, content: &str) -> Result<()>;

    fn remove_file(&self, path: &str) -> Result<()>;

    /// Makes `tree` both live and committed, appending one commit on top of `base`.
    ///
    /// Fails with `StaleBase` when HEAD is no longer `base` and with
    /// `DirtyWorktree` when the live tree has uncommitted changes, both checked
    /// atomically with the write. Returns `None` without touching the log when
    /// `tree` equals HEAD.
    fn commit_tree(
        &self,
        tree: &Tree,
        base: Option<&str>,
        message: &str,
        author: &str,
    ) -> Result<Option<Commit>>;
}
