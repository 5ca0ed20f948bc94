//! Undo and rollback.
//!
//! Each operation runs `Idle -> Staging -> Validating -> Committing -> Idle`
//! and either appends exactly one compensating commit or leaves the log
//! untouched. Callers hold the maintenance lock for the whole run.

use crate::changeinfo::{ChangeInfo, RevertKind};
use crate::error::{Error, Result};
use crate::integrity::{parse_fields, IntegrityChecker, Schema};
use crate::log::{CommitLog, Dataset};
use crate::matcher;
use crate::models::{FileChange, Tree};
use crate::paginator::HistoryPaginator;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

pub const DEFAULT_REVERT_AUTHOR: &str = "rewind";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RevertStatus {
    Ok,
    /// The target cannot be applied cleanly over later or uncommitted changes.
    MergeConflict,
    /// The target equals the current state.
    NothingToCommit,
    /// The target would leave references dangling.
    ViolatedReferentialIntegrity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevertPhase {
    Idle,
    Staging,
    Validating,
    Committing,
}

/// Tracks one operation through its phases.
struct Run {
    kind: RevertKind,
    commit: String,
    phase: RevertPhase,
}

impl Run {
    fn start(kind: RevertKind, commit: &str) -> Self {
        let mut run = Self {
            kind,
            commit: commit.to_string(),
            phase: RevertPhase::Idle,
        };
        run.advance(RevertPhase::Staging);
        run
    }

    fn advance(&mut self, next: RevertPhase) {
        debug!(
            operation = self.kind.as_str(),
            commit = %self.commit,
            from = ?self.phase,
            to = ?next,
            "Revert phase"
        );
        self.phase = next;
    }

    fn finish(mut self, status: RevertStatus) -> RevertStatus {
        info!(
            operation = self.kind.as_str(),
            commit = %self.commit,
            phase = ?self.phase,
            status = ?status,
            "Revert finished"
        );
        self.phase = RevertPhase::Idle;
        status
    }
}

impl Drop for Run {
    fn drop(&mut self) {
        if self.phase != RevertPhase::Idle {
            warn!(
                operation = self.kind.as_str(),
                commit = %self.commit,
                phase = ?self.phase,
                "Revert aborted by an error; log left unchanged"
            );
        }
    }
}

pub struct Reverter<'a, S: CommitLog + Dataset> {
    store: &'a S,
    schema: &'a Schema,
    author: String,
}

impl<'a, S: CommitLog + Dataset> Reverter<'a, S> {
    pub fn new(store: &'a S, schema: &'a Schema) -> Self {
        Self {
            store,
            schema,
            author: DEFAULT_REVERT_AUTHOR.to_string(),
        }
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    /// Cheap pre-check: reverting needs a live tree without uncommitted changes.
    pub fn can_revert(&self) -> Result<bool> {
        self.store.is_clean()
    }

    /// Removes the effect of one commit while keeping everything after it.
    pub fn undo(&self, rev: &str) -> Result<RevertStatus> {
        let commit = self.store.get_commit(rev)?;
        self.ensure_after_initial(&commit.hash, false)?;

        let run = Run::start(RevertKind::Undo, &commit.hash);

        if self.already_undone(&commit.hash)? {
            debug!(commit = %commit.hash, "Commit was already undone");
            return Ok(run.finish(RevertStatus::NothingToCommit));
        }

        let base = self.head_hash()?;
        let mut target = self.store.head_tree()?;
        for change in self.store.changes(&commit.hash)? {
            if !self.merge_inverse(&change, &mut target)? {
                debug!(commit = %commit.hash, path = %change.path, "Later changes conflict with undo");
                return Ok(run.finish(RevertStatus::MergeConflict));
            }
        }

        self.validate_and_commit(
            run,
            base,
            target,
            ChangeInfo::revert(RevertKind::Undo, commit.hash),
        )
    }

    /// Resets the tracked state to `rev`, recorded as a new commit.
    pub fn rollback(&self, rev: &str) -> Result<RevertStatus> {
        let commit = self.store.get_commit(rev)?;
        self.ensure_after_initial(&commit.hash, true)?;

        let run = Run::start(RevertKind::Rollback, &commit.hash);
        let base = self.head_hash()?;
        let target = self.store.tree_at(&commit.hash)?;

        self.validate_and_commit(
            run,
            base,
            target,
            ChangeInfo::revert(RevertKind::Rollback, commit.hash),
        )
    }

    fn head_hash(&self) -> Result<Option<String>> {
        Ok(self.store.head()?.map(|head| head.hash))
    }

    fn ensure_after_initial(&self, hash: &str, allow_initial: bool) -> Result<()> {
        let initial = self.store.initial_commit()?.ok_or_else(|| {
            Error::NotRevertible(hash.to_string(), "no commit has been tracked yet".to_string())
        })?;

        if allow_initial && initial.hash == hash {
            return Ok(());
        }
        if !self.store.was_created_after(hash, &initial.hash)? {
            let reason = if initial.hash == hash {
                "the initial commit cannot be undone"
            } else {
                "it precedes the initial commit"
            };
            return Err(Error::NotRevertible(hash.to_string(), reason.to_string()));
        }
        Ok(())
    }

    fn validate_and_commit(
        &self,
        mut run: Run,
        base: Option<String>,
        target: Tree,
        change_info: ChangeInfo,
    ) -> Result<RevertStatus> {
        run.advance(RevertPhase::Validating);
        let head = self.store.head_tree()?;

        let violations = IntegrityChecker::new(self.schema).check(&target, &head)?;
        if !violations.is_empty() {
            for violation in &violations {
                warn!(%violation, "Revert would leave a dangling reference");
            }
            return Ok(run.finish(RevertStatus::ViolatedReferentialIntegrity));
        }

        if target == head {
            return Ok(run.finish(RevertStatus::NothingToCommit));
        }

        run.advance(RevertPhase::Committing);
        if !self.store.is_clean()? {
            warn!("Uncommitted changes would be overwritten");
            return Ok(run.finish(RevertStatus::MergeConflict));
        }

        let message = change_info.to_commit_message();
        match self
            .store
            .commit_tree(&target, base.as_deref(), &message, &self.author)
        {
            Ok(Some(commit)) => {
                info!(hash = %commit.short_hash(), message = %commit.subject(), "Recorded revert");
                Ok(run.finish(RevertStatus::Ok))
            }
            Ok(None) => Ok(run.finish(RevertStatus::NothingToCommit)),
            Err(e @ (Error::DirtyWorktree | Error::StaleBase { .. })) => {
                warn!(error = %e, "Site changed while the revert was prepared");
                Ok(run.finish(RevertStatus::MergeConflict))
            }
            Err(e) => Err(e),
        }
    }

    /// True when a newer, still effective undo commit already reverted `hash`.
    fn already_undone(&self, hash: &str) -> Result<bool> {
        let mut undos: Vec<(String, String)> = Vec::new();
        // while set, commits newer than this rollback target were discarded
        let mut rolled_back_to: Option<String> = None;

        for commit in HistoryPaginator::new(self.store).walk() {
            let commit = commit?;
            if rolled_back_to.as_deref() == Some(commit.hash.as_str()) {
                rolled_back_to = None;
            }
            if commit.hash == hash {
                return Ok(rolled_back_to.is_none() && Self::undone_by(hash, &undos));
            }
            if rolled_back_to.is_some() {
                continue;
            }

            for entry in matcher::parse(&commit.message).entries() {
                if let ChangeInfo::Revert { kind, commit: target } = entry {
                    match kind {
                        RevertKind::Undo => undos.push((commit.hash.clone(), target.clone())),
                        RevertKind::Rollback => rolled_back_to = Some(target.clone()),
                    }
                }
            }
        }

        Ok(false)
    }

    fn undone_by(hash: &str, undos: &[(String, String)]) -> bool {
        undos
            .iter()
            .any(|(undo, target)| target == hash && !Self::undone_by(undo, undos))
    }

    /// Applies the inverse of `change` on top of `target`. Returns false on conflict.
    fn merge_inverse(&self, change: &FileChange, target: &mut Tree) -> Result<bool> {
        let path = &change.path;
        let current = target.get(path).cloned();

        let clean = match (&change.content_before, &change.content_after, current) {
            (None, None, _) => true,
            (None, Some(_), None) => true,
            (None, Some(after), Some(current)) => {
                if &current == after {
                    target.remove(path);
                    true
                } else {
                    false
                }
            }
            (Some(before), None, None) => {
                target.insert(path.clone(), before.clone());
                true
            }
            (Some(before), None, Some(current)) => &current == before,
            (Some(_), Some(_), None) => false,
            (Some(before), Some(after), Some(current)) => {
                if &current == after {
                    target.insert(path.clone(), before.clone());
                    true
                } else if &current == before {
                    true
                } else {
                    match self.merge_fields(path, before, after, &current)? {
                        Some(merged) => {
                            target.insert(path.clone(), merged);
                            true
                        }
                        None => false,
                    }
                }
            }
        };

        Ok(clean)
    }

    /// Field-level three-way merge for entities: every field the undone commit
    /// changed must still hold that commit's value, or already hold the old one.
    fn merge_fields(
        &self,
        path: &str,
        before: &str,
        after: &str,
        current: &str,
    ) -> Result<Option<String>> {
        if self.schema.entity_ref(path).is_none() {
            return Ok(None);
        }

        let before = parse_fields(path, before)?;
        let after = parse_fields(path, after)?;
        let live = parse_fields(path, current)?;
        let mut merged = live.clone();

        let keys: std::collections::BTreeSet<&String> = before.keys().chain(after.keys()).collect();
        for key in keys {
            let old = before.get(key);
            let new = after.get(key);
            if old == new {
                continue;
            }

            let now = merged.get(key);
            if now == new {
                match old {
                    Some(value) => merged.insert(key.clone(), value.clone()),
                    None => merged.remove(key),
                };
            } else if now != old {
                return Ok(None);
            }
        }

        if merged == live {
            return Ok(Some(current.to_string()));
        }
        Ok(Some(serde_json::to_string_pretty(&merged)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrity::DEFAULT_MIRROR_DIR;
    use crate::models::Entity;
    use crate::storage::Storage;

    struct Fixture {
        storage: Storage,
        schema: Schema,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                storage: Storage::in_memory().unwrap(),
                schema: Schema::wordpress(DEFAULT_MIRROR_DIR),
            }
        }

        fn put(&self, entity: &Entity) -> &Self {
            let (path, content) = self.schema.entity_file(entity).unwrap();
            self.storage.stage_file(&path, &content).unwrap();
            self
        }

        fn commit(&self, message: &str) -> String {
            self.storage.commit(message, "tester").unwrap().unwrap().hash
        }

        fn reverter(&self) -> Reverter<'_, Storage> {
            Reverter::new(&self.storage, &self.schema)
        }

        fn field(&self, entity_type: &str, id: &str, field: &str) -> Option<String> {
            let path = self
                .schema
                .entity_path(&crate::models::EntityRef::new(entity_type, id));
            let tree = self.storage.head_tree().unwrap();
            let content = tree.get(&path)?;
            parse_fields(&path, content).unwrap().get(field).cloned()
        }
    }

    fn post(title: &str, status: &str) -> Entity {
        Entity::new("post", "1")
            .with_field("post_title", title)
            .with_field("post_status", status)
    }

    #[test]
    fn test_undo_keeps_later_edits_to_other_fields() {
        let fx = Fixture::new();
        fx.put(&post("First", "draft")).commit("create");
        let retitle = fx.put(&post("Second", "draft")).commit("retitle");
        fx.put(&post("Second", "publish")).commit("publish");

        assert_eq!(fx.reverter().undo(&retitle).unwrap(), RevertStatus::Ok);
        assert_eq!(fx.field("post", "1", "post_title").as_deref(), Some("First"));
        assert_eq!(fx.field("post", "1", "post_status").as_deref(), Some("publish"));
    }

    #[test]
    fn test_undo_conflicts_with_later_edit_of_same_field() {
        let fx = Fixture::new();
        fx.put(&post("First", "draft")).commit("create");
        let retitle = fx.put(&post("Second", "draft")).commit("retitle");
        fx.put(&post("Third", "draft")).commit("retitle again");
        let before = fx.storage.commit_count().unwrap();

        assert_eq!(
            fx.reverter().undo(&retitle).unwrap(),
            RevertStatus::MergeConflict
        );
        assert_eq!(fx.storage.commit_count().unwrap(), before);
    }

    #[test]
    fn test_undo_twice_is_nothing_to_commit() {
        let fx = Fixture::new();
        fx.put(&post("First", "draft")).commit("create");
        let retitle = fx.put(&post("Second", "draft")).commit("retitle");

        assert_eq!(fx.reverter().undo(&retitle).unwrap(), RevertStatus::Ok);
        assert_eq!(
            fx.reverter().undo(&retitle).unwrap(),
            RevertStatus::NothingToCommit
        );
    }

    #[test]
    fn test_undoing_an_undo_reapplies_the_change() {
        let fx = Fixture::new();
        fx.put(&post("First", "draft")).commit("create");
        let retitle = fx.put(&post("Second", "draft")).commit("retitle");

        fx.reverter().undo(&retitle).unwrap();
        let undo_commit = fx.storage.head().unwrap().unwrap().hash;
        assert_eq!(fx.reverter().undo(&undo_commit).unwrap(), RevertStatus::Ok);
        assert_eq!(fx.field("post", "1", "post_title").as_deref(), Some("Second"));

        // the retitle is effective again, so it can be undone once more
        assert_eq!(fx.reverter().undo(&retitle).unwrap(), RevertStatus::Ok);
        assert_eq!(fx.field("post", "1", "post_title").as_deref(), Some("First"));
    }

    #[test]
    fn test_undo_of_initial_commit_is_rejected() {
        let fx = Fixture::new();
        let initial = fx.put(&post("First", "draft")).commit("create");

        assert!(matches!(
            fx.reverter().undo(&initial),
            Err(Error::NotRevertible(_, _))
        ));
    }

    #[test]
    fn test_commits_before_tracking_are_not_revertible() {
        let fx = Fixture::new();
        let untracked = fx.put(&post("First", "draft")).commit("before tracking");
        fx.storage.begin_tracking().unwrap();
        fx.put(&post("Second", "draft")).commit("tracked");

        assert!(matches!(
            fx.reverter().rollback(&untracked),
            Err(Error::NotRevertible(_, _))
        ));
    }

    #[test]
    fn test_unknown_commit_is_an_error() {
        let fx = Fixture::new();
        fx.put(&post("First", "draft")).commit("create");
        assert!(matches!(
            fx.reverter().undo("ffffffff"),
            Err(Error::CommitNotFound(_))
        ));
    }

    #[test]
    fn test_dirty_tree_blocks_revert() {
        let fx = Fixture::new();
        let initial = fx.put(&post("First", "draft")).commit("create");
        fx.put(&post("Second", "draft")).commit("retitle");
        fx.storage.stage_file("wp-content/uploads/a.txt", "pending").unwrap();

        assert!(!fx.reverter().can_revert().unwrap());
        assert_eq!(
            fx.reverter().rollback(&initial).unwrap(),
            RevertStatus::MergeConflict
        );
        assert_eq!(fx.storage.commit_count().unwrap(), 2);
    }

    #[test]
    fn test_rollback_records_revert_change_info() {
        let fx = Fixture::new();
        let initial = fx.put(&post("First", "draft")).commit("create");
        fx.put(&post("Second", "draft")).commit("retitle");

        assert_eq!(fx.reverter().rollback(&initial).unwrap(), RevertStatus::Ok);

        let head = fx.storage.head().unwrap().unwrap();
        assert_eq!(
            matcher::parse(&head.message),
            ChangeInfo::revert(RevertKind::Rollback, initial.clone())
        );
        assert_eq!(head.author, DEFAULT_REVERT_AUTHOR);
        assert_eq!(fx.storage.commit_count().unwrap(), 3);
        assert_eq!(
            fx.storage.head_tree().unwrap(),
            fx.storage.tree_at(&initial).unwrap()
        );
    }

    #[test]
    fn test_non_entity_files_conflict_on_any_later_edit() {
        let fx = Fixture::new();
        fx.storage.stage_file("wp-config.php", "v1").unwrap();
        fx.commit("one");
        fx.storage.stage_file("wp-config.php", "v2").unwrap();
        let second = fx.commit("two");
        fx.storage.stage_file("wp-config.php", "v3").unwrap();
        fx.commit("three");

        assert_eq!(
            fx.reverter().undo(&second).unwrap(),
            RevertStatus::MergeConflict
        );
    }

    #[test]
    fn test_undo_after_rollback_past_the_undo_is_not_short_circuited() {
        let fx = Fixture::new();
        fx.put(&post("First", "draft")).commit("create");
        let retitle = fx.put(&post("Second", "draft")).commit("retitle");
        fx.reverter().undo(&retitle).unwrap();
        assert_eq!(fx.field("post", "1", "post_title").as_deref(), Some("First"));

        // rolling back to the retitle discards the undo
        assert_eq!(fx.reverter().rollback(&retitle).unwrap(), RevertStatus::Ok);
        assert_eq!(fx.field("post", "1", "post_title").as_deref(), Some("Second"));

        assert_eq!(fx.reverter().undo(&retitle).unwrap(), RevertStatus::Ok);
        assert_eq!(fx.field("post", "1", "post_title").as_deref(), Some("First"));
    }

    #[test]
    fn test_undo_of_file_already_restored_is_nothing_to_commit() {
        let fx = Fixture::new();
        fx.storage.stage_file("wp-config.php", "v1").unwrap();
        fx.commit("one");
        fx.storage.stage_file("wp-config.php", "v2").unwrap();
        let second = fx.commit("two");
        fx.storage.stage_file("wp-config.php", "v1").unwrap();
        fx.commit("restored by hand");

        assert_eq!(
            fx.reverter().undo(&second).unwrap(),
            RevertStatus::NothingToCommit
        );
        assert_eq!(fx.storage.commit_count().unwrap(), 3);
    }

    #[test]
    fn test_compact_entity_with_restored_fields_is_nothing_to_commit() {
        let fx = Fixture::new();
        fx.put(&post("First", "draft")).commit("create");
        let retitle = fx.put(&post("Second", "draft")).commit("retitle");

        let path = fx
            .schema
            .entity_path(&crate::models::EntityRef::new("post", "1"));
        fx.storage
            .stage_file(&path, r#"{"post_status":"draft","post_title":"First"}"#)
            .unwrap();
        fx.commit("imported");

        assert_eq!(
            fx.reverter().undo(&retitle).unwrap(),
            RevertStatus::NothingToCommit
        );
        assert_eq!(fx.storage.commit_count().unwrap(), 3);
    }

    #[test]
    fn test_commit_tree_rejects_moved_head() {
        let fx = Fixture::new();
        let first = fx.put(&post("First", "draft")).commit("create");
        fx.put(&post("Second", "draft")).commit("retitle");

        let target = fx.storage.tree_at(&first).unwrap();
        assert!(matches!(
            fx.storage.commit_tree(&target, Some(first.as_str()), "stale", "tester"),
            Err(Error::StaleBase { .. })
        ));
        assert_eq!(fx.storage.commit_count().unwrap(), 2);
    }
}
