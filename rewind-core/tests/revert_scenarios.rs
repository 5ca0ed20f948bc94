use rewind_core::config::{database_path, state_dir};
use rewind_core::{
    ChangeInfo, Commit, CommitLog, Config, Dataset, Entity, Error, FileChange, History,
    Maintenance, Reverter, RevertStatus, Schema, Storage, Tree,
};
use std::path::PathBuf;
use tempfile::TempDir;

struct Site {
    dir: TempDir,
    storage: Storage,
    schema: Schema,
}

impl Site {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(state_dir(dir.path())).unwrap();
        let storage = Storage::new(database_path(dir.path())).unwrap();
        let schema = Config::load(dir.path()).unwrap().schema();
        Self {
            dir,
            storage,
            schema,
        }
    }

    fn put(&self, entity: &Entity) {
        let (path, content) = self.schema.entity_file(entity).unwrap();
        self.storage.stage_file(&path, &content).unwrap();
    }

    fn delete(&self, entity_type: &str, id: &str) {
        let path = self
            .schema
            .entity_path(&rewind_core::EntityRef::new(entity_type, id));
        self.storage.remove_file(&path).unwrap();
    }

    fn commit(&self, info: ChangeInfo) -> String {
        self.storage
            .commit(&info.to_commit_message(), "admin")
            .unwrap()
            .unwrap()
            .hash
    }

    fn has(&self, entity_type: &str, id: &str) -> bool {
        let path = self
            .schema
            .entity_path(&rewind_core::EntityRef::new(entity_type, id));
        self.storage.head_tree().unwrap().contains_key(&path)
    }

    fn reverter(&self) -> Reverter<'_, Storage> {
        Reverter::new(&self.storage, &self.schema)
    }
}

fn post(title: &str) -> Entity {
    Entity::new("post", "1")
        .with_field("post_title", title)
        .with_field("post_author", "0")
}

fn comment() -> Entity {
    Entity::new("comment", "7")
        .with_field("comment_post_ID", "1")
        .with_field("comment_content", "Nice post")
}

/// C0 creates a post, C1 retitles it, C2 adds a comment on it.
fn blog() -> (Site, [String; 3]) {
    let site = Site::new();
    site.put(&post("Hello"));
    let c0 = site.commit(ChangeInfo::entity("post", "create", "1").with_tag("Post-Title", "Hello"));
    site.put(&post("Hello again"));
    let c1 = site.commit(ChangeInfo::entity("post", "edit", "1").with_tag("Post-Title", "Hello again"));
    site.put(&comment());
    let c2 = site.commit(ChangeInfo::entity("comment", "create", "7"));
    (site, [c0, c1, c2])
}

#[test]
fn undo_keeps_later_commits_and_rollback_restores_initial_state() {
    let (site, [c0, c1, _c2]) = blog();

    assert_eq!(site.reverter().undo(&c1).unwrap(), RevertStatus::Ok);
    assert!(site.has("comment", "7"));
    let page = History::new(&site.storage, &site.schema).page(0).unwrap();
    assert_eq!(page.commits[0].message, format!("Reverted change {}", &c1[..7]));

    assert_eq!(site.reverter().rollback(&c0).unwrap(), RevertStatus::Ok);
    assert!(!site.has("comment", "7"));
    similar_asserts::assert_eq!(site.storage.head_tree().unwrap(), site.storage.tree_at(&c0).unwrap());
    assert_eq!(site.storage.commit_count().unwrap(), 5);
}

#[test]
fn integrity_violation_leaves_log_and_dataset_untouched() {
    let site = Site::new();
    site.put(&Entity::new("user", "1").with_field("user_login", "admin"));
    site.commit(ChangeInfo::entity("user", "create", "1"));
    site.put(&post("Hello"));
    let created = site.commit(ChangeInfo::entity("post", "create", "1"));
    site.put(&comment());
    site.commit(ChangeInfo::entity("comment", "create", "7"));

    let count = site.storage.commit_count().unwrap();
    let tree = site.storage.head_tree().unwrap();

    assert_eq!(
        site.reverter().undo(&created).unwrap(),
        RevertStatus::ViolatedReferentialIntegrity
    );
    assert_eq!(site.storage.commit_count().unwrap(), count);
    similar_asserts::assert_eq!(site.storage.head_tree().unwrap(), tree);
    similar_asserts::assert_eq!(site.storage.live_tree().unwrap(), tree);
}

#[test]
fn restoring_a_deleted_comment_needs_its_post() {
    let (site, [_, _, c2]) = blog();
    site.delete("comment", "7");
    site.commit(ChangeInfo::entity("comment", "delete", "7"));
    site.delete("post", "1");
    site.commit(ChangeInfo::entity("post", "delete", "1"));

    assert_eq!(
        site.reverter().rollback(&c2).unwrap(),
        RevertStatus::Ok,
        "rolling back restores the post together with the comment"
    );

    site.delete("comment", "7");
    let comment_deleted = site.commit(ChangeInfo::entity("comment", "delete", "7"));
    site.delete("post", "1");
    site.commit(ChangeInfo::entity("post", "delete", "1"));

    assert_eq!(
        site.reverter().undo(&comment_deleted).unwrap(),
        RevertStatus::ViolatedReferentialIntegrity
    );
}

#[test]
fn rollback_is_idempotent() {
    let (site, [c0, _, _]) = blog();

    assert_eq!(site.reverter().rollback(&c0).unwrap(), RevertStatus::Ok);
    let count = site.storage.commit_count().unwrap();
    assert_eq!(
        site.reverter().rollback(&c0).unwrap(),
        RevertStatus::NothingToCommit
    );
    assert_eq!(site.storage.commit_count().unwrap(), count);
}

#[test]
fn reverts_run_under_maintenance() {
    let (site, [_, c1, _]) = blog();
    let maintenance = Maintenance::new(&state_dir(site.dir.path()));

    let status = maintenance
        .with_exclusive(|| {
            assert!(maintenance.is_active());
            site.reverter().undo(&c1)
        })
        .unwrap();

    assert_eq!(status, RevertStatus::Ok);
    assert!(!maintenance.is_active());
}

#[test]
fn oversized_diff_is_refused() {
    let site = Site::new();
    let body = "lorem ipsum dolor sit amet\n".repeat(3000);
    site.put(&post("Hello").with_field("post_content", body));
    let hash = site.commit(ChangeInfo::entity("post", "create", "1"));

    let history = History::new(&site.storage, &site.schema);
    assert!(matches!(
        history.diff(&hash),
        Err(Error::PayloadTooLarge { .. })
    ));
}

#[test]
fn history_pages_report_eligibility() {
    let (site, [c0, c1, c2]) = blog();
    let history = History::new(&site.storage, &site.schema).with_commits_per_page(2);

    let first = history.page(0).unwrap();
    assert_eq!(first.pages, vec![0, 1]);
    assert_eq!(first.commits[0].hash, c2);
    assert!(first.commits[0].eligibility.can_undo);
    assert!(!first.commits[0].eligibility.can_rollback);
    assert_eq!(first.commits[1].hash, c1);
    assert!(first.commits[1].eligibility.can_rollback);

    let second = history.page(1).unwrap();
    assert_eq!(second.commits.len(), 1);
    assert_eq!(second.commits[0].hash, c0);
    assert!(second.commits[0].eligibility.is_initial);
    assert!(!second.commits[0].eligibility.can_undo);

    assert!(history.page(2).unwrap().is_exhausted());
}

/// Delegates to a storage, letting another writer stage a file on the same
/// database right before the revert commits.
struct Interleaved<'a> {
    inner: &'a Storage,
    db: PathBuf,
}

impl CommitLog for Interleaved<'_> {
    fn resolve(&self, rev: &str) -> rewind_core::Result<String> {
        self.inner.resolve(rev)
    }
    fn get_commit(&self, rev: &str) -> rewind_core::Result<Commit> {
        self.inner.get_commit(rev)
    }
    fn head(&self) -> rewind_core::Result<Option<Commit>> {
        self.inner.head()
    }
    fn root_commit(&self) -> rewind_core::Result<Option<Commit>> {
        self.inner.root_commit()
    }
    fn initial_commit(&self) -> rewind_core::Result<Option<Commit>> {
        self.inner.initial_commit()
    }
    fn parent_commit(&self, hash: &str) -> rewind_core::Result<Option<String>> {
        self.inner.parent_commit(hash)
    }
    fn child_commit(&self, hash: &str) -> rewind_core::Result<Option<String>> {
        self.inner.child_commit(hash)
    }
    fn commit_count(&self) -> rewind_core::Result<usize> {
        self.inner.commit_count()
    }
    fn commits(&self, skip: usize, limit: usize) -> rewind_core::Result<Vec<Commit>> {
        self.inner.commits(skip, limit)
    }
    fn range(&self, from: &str, to: &str) -> rewind_core::Result<Vec<Commit>> {
        self.inner.range(from, to)
    }
    fn changes(&self, hash: &str) -> rewind_core::Result<Vec<FileChange>> {
        self.inner.changes(hash)
    }
    fn was_created_after(&self, rev: &str, ancestor: &str) -> rewind_core::Result<bool> {
        self.inner.was_created_after(rev, ancestor)
    }
}

impl Dataset for Interleaved<'_> {
    fn head_tree(&self) -> rewind_core::Result<Tree> {
        self.inner.head_tree()
    }
    fn live_tree(&self) -> rewind_core::Result<Tree> {
        self.inner.live_tree()
    }
    fn tree_at(&self, hash: &str) -> rewind_core::Result<Tree> {
        self.inner.tree_at(hash)
    }
    fn is_clean(&self) -> rewind_core::Result<bool> {
        self.inner.is_clean()
    }
    fn stage_file(&self, path: &str, content: &str) -> rewind_core::Result<()> {
        self.inner.stage_file(path, content)
    }
    fn remove_file(&self, path: &str) -> rewind_core::Result<()> {
        self.inner.remove_file(path)
    }
    fn commit_tree(
        &self,
        tree: &Tree,
        base: Option<&str>,
        message: &str,
        author: &str,
    ) -> rewind_core::Result<Option<Commit>> {
        let other = Storage::new(&self.db)?;
        other.stage_file("wp-content/uploads/new.png", "binary")?;
        self.inner.commit_tree(tree, base, message, author)
    }
}

#[test]
fn live_change_landing_mid_revert_is_a_conflict() {
    let (site, [c0, _, _]) = blog();
    let count = site.storage.commit_count().unwrap();
    let store = Interleaved {
        inner: &site.storage,
        db: database_path(site.dir.path()),
    };

    let status = Reverter::new(&store, &site.schema).rollback(&c0).unwrap();

    assert_eq!(status, RevertStatus::MergeConflict);
    assert_eq!(site.storage.commit_count().unwrap(), count);
    assert_eq!(
        site.storage
            .live_tree()
            .unwrap()
            .get("wp-content/uploads/new.png")
            .map(String::as_str),
        Some("binary")
    );
    assert!(!site.storage.is_clean().unwrap());
}
