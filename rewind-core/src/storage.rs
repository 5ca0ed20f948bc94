use crate::error::{Error, Result};
use crate::log::{CommitLog, Dataset};
use crate::models::{ChangedFile, Commit, FileChange, FileStatus, Tree};
use chrono::DateTime;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

const SCHEMA_VERSION: i32 = 1;
const PRE_ACTIVATION_KEY: &str = "pre_activation_hash";
const MIN_PREFIX_LEN: usize = 4;
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub struct Storage {
    conn: Connection,
}

impl Storage {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let mut storage = Self { conn };
        storage.initialize()?;
        Ok(storage)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let mut storage = Self { conn };
        storage.initialize()?;
        Ok(storage)
    }

    fn initialize(&mut self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS metadata (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS commits (
                hash TEXT PRIMARY KEY,
                seq INTEGER NOT NULL UNIQUE,
                parent TEXT,
                timestamp TEXT NOT NULL,
                author TEXT NOT NULL,
                message TEXT NOT NULL,
                FOREIGN KEY (parent) REFERENCES commits(hash)
            );

            CREATE TABLE IF NOT EXISTS commit_changes (
                commit_hash TEXT NOT NULL,
                path TEXT NOT NULL,
                status TEXT NOT NULL,
                content_before TEXT,
                content_after TEXT,
                PRIMARY KEY (commit_hash, path),
                FOREIGN KEY (commit_hash) REFERENCES commits(hash)
            );

            CREATE TABLE IF NOT EXISTS head_tree (
                path TEXT PRIMARY KEY,
                content TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS worktree (
                path TEXT PRIMARY KEY,
                content TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_commits_parent ON commits(parent);
            "#,
        )?;

        if self.get_metadata("schema_version")?.is_none() {
            self.set_metadata("schema_version", &SCHEMA_VERSION.to_string())?;
        }

        Ok(())
    }

    pub fn get_metadata(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .conn
            .query_row(
                "SELECT value FROM metadata WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?)
    }

    pub fn set_metadata(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO metadata (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    /// Marks the current HEAD as the last untracked commit, so the next commit
    /// becomes the initial one.
    pub fn begin_tracking(&self) -> Result<()> {
        match self.head()? {
            Some(head) => {
                info!(hash = %head.hash, "Tracking begins after existing history");
                self.set_metadata(PRE_ACTIVATION_KEY, &head.hash)
            }
            None => {
                self.conn.execute(
                    "DELETE FROM metadata WHERE key = ?1",
                    params![PRE_ACTIVATION_KEY],
                )?;
                Ok(())
            }
        }
    }

    /// Records the difference between the live tree and HEAD as a new commit.
    pub fn commit(&self, message: &str, author: &str) -> Result<Option<Commit>> {
        self.record(None, message, author)
    }

    /// Replaces the whole live tree in one transaction.
    pub fn import_tree(&self, tree: &Tree) -> Result<()> {
        for path in tree.keys() {
            check_path(path)?;
        }
        let tx = self.conn.unchecked_transaction()?;
        Self::replace_tree(&tx, "worktree", tree)?;
        tx.commit()?;
        debug!(files = tree.len(), "Imported live tree");
        Ok(())
    }

    pub fn uncommitted_changes(&self) -> Result<Vec<FileChange>> {
        Ok(FileChange::diff_trees(&self.head_tree()?, &self.live_tree()?))
    }

    fn load_tree(conn: &Connection, table: &str) -> Result<Tree> {
        let mut stmt = conn.prepare(&format!("SELECT path, content FROM {} ORDER BY path", table))?;

        let tree = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Tree>>()?;

        Ok(tree)
    }

    fn replace_tree(tx: &Transaction, table: &str, tree: &Tree) -> Result<()> {
        tx.execute(&format!("DELETE FROM {}", table), [])?;
        let mut stmt = tx.prepare(&format!(
            "INSERT INTO {} (path, content) VALUES (?1, ?2)",
            table
        ))?;
        for (path, content) in tree {
            stmt.execute(params![path, content])?;
        }
        Ok(())
    }

    fn worktree_matches_head(conn: &Connection) -> Result<bool> {
        let dirty: i64 = conn.query_row(
            "SELECT
                (SELECT COUNT(*) FROM (SELECT path, content FROM worktree
                                       EXCEPT SELECT path, content FROM head_tree))
              + (SELECT COUNT(*) FROM (SELECT path, content FROM head_tree
                                       EXCEPT SELECT path, content FROM worktree))",
            [],
            |row| row.get(0),
        )?;
        Ok(dirty == 0)
    }

    /// Appends one commit inside a write transaction.
    ///
    /// With a `(tree, base)` replacement, HEAD must still be `base` and the live
    /// tree must still equal HEAD once the write lock is held. Otherwise
    /// `StaleBase` or `DirtyWorktree` is returned and nothing is written.
    /// Without one, the live tree is committed as is.
    fn record(
        &self,
        replacement: Option<(&Tree, Option<&str>)>,
        message: &str,
        author: &str,
    ) -> Result<Option<Commit>> {
        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?;

        let head: Option<(String, i64)> = tx
            .query_row(
                "SELECT hash, seq FROM commits ORDER BY seq DESC LIMIT 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let head_tree = Self::load_tree(&tx, "head_tree")?;
        let target = match replacement {
            Some((tree, base)) => {
                let current = head.as_ref().map(|(hash, _)| hash.as_str());
                if current != base {
                    return Err(Error::StaleBase {
                        expected: base.unwrap_or("<empty>").to_string(),
                        actual: current.unwrap_or("<empty>").to_string(),
                    });
                }
                if !Self::worktree_matches_head(&tx)? {
                    return Err(Error::DirtyWorktree);
                }
                tree.clone()
            }
            None => Self::load_tree(&tx, "worktree")?,
        };

        let changes = FileChange::diff_trees(&head_tree, &target);
        if changes.is_empty() {
            return Ok(None);
        }

        let (parent, seq) = match head {
            Some((hash, seq)) => (Some(hash), seq + 1),
            None => (None, 0),
        };

        let commit = Commit::new(parent, author.to_string(), message.to_string(), &changes);

        tx.execute(
            "INSERT INTO commits (hash, seq, parent, timestamp, author, message)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                commit.hash,
                seq,
                commit.parent,
                commit.timestamp.to_rfc3339(),
                commit.author,
                commit.message,
            ],
        )?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO commit_changes (commit_hash, path, status, content_before, content_after)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for change in &changes {
                stmt.execute(params![
                    commit.hash,
                    change.path,
                    change.status.as_str(),
                    change.content_before,
                    change.content_after,
                ])?;
            }
        }

        Self::replace_tree(&tx, "head_tree", &target)?;
        if replacement.is_some() {
            Self::replace_tree(&tx, "worktree", &target)?;
        }
        tx.commit()?;

        info!(hash = %commit.short_hash(), files = changes.len(), "Recorded commit");
        Ok(Some(commit))
    }

    fn seq_of(&self, hash: &str) -> Result<i64> {
        self.conn
            .query_row(
                "SELECT seq FROM commits WHERE hash = ?1",
                params![hash],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| Error::CommitNotFound(hash.to_string()))
    }

    fn query_commits<P: rusqlite::Params>(&self, sql: &str, params: P) -> Result<Vec<Commit>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt
            .query_map(params, commit_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut commits = Vec::with_capacity(rows.len());
        for row in rows {
            let mut commit = row?;
            commit.changed_files = self.changed_files(&commit.hash)?;
            commits.push(commit);
        }
        Ok(commits)
    }

    fn query_commit<P: rusqlite::Params>(&self, sql: &str, params: P) -> Result<Option<Commit>> {
        Ok(self.query_commits(sql, params)?.into_iter().next())
    }

    fn changed_files(&self, hash: &str) -> Result<Vec<ChangedFile>> {
        let mut stmt = self.conn.prepare(
            "SELECT path, status FROM commit_changes WHERE commit_hash = ?1 ORDER BY path",
        )?;

        let rows = stmt
            .query_map(params![hash], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|(path, status)| {
                Ok(ChangedFile {
                    path,
                    status: parse_status(&status)?,
                })
            })
            .collect()
    }
}

const COMMIT_COLUMNS: &str = "hash, parent, timestamp, author, message";

fn commit_from_row(row: &Row) -> rusqlite::Result<Result<Commit>> {
    let hash: String = row.get(0)?;
    let parent: Option<String> = row.get(1)?;
    let timestamp: String = row.get(2)?;
    let author: String = row.get(3)?;
    let message: String = row.get(4)?;

    let timestamp = match DateTime::parse_from_rfc3339(&timestamp) {
        Ok(dt) => dt.into(),
        Err(e) => {
            return Ok(Err(Error::Corrupted(format!(
                "commit {} has an invalid timestamp: {}",
                hash, e
            ))))
        }
    };

    Ok(Ok(Commit {
        hash,
        parent,
        timestamp,
        author,
        message,
        changed_files: Vec::new(),
    }))
}

fn check_path(path: &str) -> Result<()> {
    if path.is_empty() || path.starts_with('/') || path.split('/').any(|s| s == "..") {
        return Err(Error::InvalidPath(path.to_string()));
    }
    Ok(())
}

fn parse_status(status: &str) -> Result<FileStatus> {
    FileStatus::parse(status)
        .ok_or_else(|| Error::Corrupted(format!("unknown file status '{}'", status)))
}

impl CommitLog for Storage {
    fn resolve(&self, rev: &str) -> Result<String> {
        let rev = rev.trim();
        if rev == "HEAD" {
            return self
                .head()?
                .map(|c| c.hash)
                .ok_or_else(|| Error::CommitNotFound(rev.to_string()));
        }

        if rev.len() < MIN_PREFIX_LEN || !rev.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::CommitNotFound(rev.to_string()));
        }

        let mut stmt = self
            .conn
            .prepare("SELECT hash FROM commits WHERE hash LIKE ?1 || '%' LIMIT 2")?;
        let matches = stmt
            .query_map(params![rev.to_ascii_lowercase()], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        match matches.as_slice() {
            [] => Err(Error::CommitNotFound(rev.to_string())),
            [hash] => Ok(hash.clone()),
            _ => Err(Error::AmbiguousRevision(rev.to_string())),
        }
    }

    fn get_commit(&self, rev: &str) -> Result<Commit> {
        let hash = self.resolve(rev)?;
        let commit = self.query_commit(
            &format!("SELECT {} FROM commits WHERE hash = ?1", COMMIT_COLUMNS),
            params![hash],
        )?;
        commit.ok_or(Error::CommitNotFound(hash))
    }

    fn head(&self) -> Result<Option<Commit>> {
        self.query_commit(
            &format!("SELECT {} FROM commits ORDER BY seq DESC LIMIT 1", COMMIT_COLUMNS),
            [],
        )
    }

    fn root_commit(&self) -> Result<Option<Commit>> {
        self.query_commit(
            &format!("SELECT {} FROM commits ORDER BY seq ASC LIMIT 1", COMMIT_COLUMNS),
            [],
        )
    }

    fn initial_commit(&self) -> Result<Option<Commit>> {
        match self.get_metadata(PRE_ACTIVATION_KEY)? {
            Some(pre_activation) => match self.child_commit(&pre_activation)? {
                Some(child) => self.get_commit(&child).map(Some),
                None => Ok(None),
            },
            None => self.root_commit(),
        }
    }

    fn parent_commit(&self, hash: &str) -> Result<Option<String>> {
        Ok(self.get_commit(hash)?.parent)
    }

    fn child_commit(&self, hash: &str) -> Result<Option<String>> {
        let seq = self.seq_of(hash)?;
        Ok(self
            .conn
            .query_row(
                "SELECT hash FROM commits WHERE seq > ?1 ORDER BY seq ASC LIMIT 1",
                params![seq],
                |row| row.get(0),
            )
            .optional()?)
    }

    fn commit_count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM commits", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn commits(&self, skip: usize, limit: usize) -> Result<Vec<Commit>> {
        let (Ok(skip), Ok(limit)) = (i64::try_from(skip), i64::try_from(limit)) else {
            return Ok(Vec::new());
        };
        self.query_commits(
            &format!(
                "SELECT {} FROM commits ORDER BY seq DESC LIMIT ?1 OFFSET ?2",
                COMMIT_COLUMNS
            ),
            params![limit, skip],
        )
    }

    fn range(&self, from: &str, to: &str) -> Result<Vec<Commit>> {
        let from_seq = self.seq_of(&self.resolve(from)?)?;
        let to_seq = self.seq_of(&self.resolve(to)?)?;
        self.query_commits(
            &format!(
                "SELECT {} FROM commits WHERE seq > ?1 AND seq <= ?2 ORDER BY seq DESC",
                COMMIT_COLUMNS
            ),
            params![from_seq, to_seq],
        )
    }

    fn changes(&self, hash: &str) -> Result<Vec<FileChange>> {
        let hash = self.resolve(hash)?;
        let mut stmt = self.conn.prepare(
            "SELECT path, status, content_before, content_after
             FROM commit_changes WHERE commit_hash = ?1 ORDER BY path",
        )?;

        let rows = stmt
            .query_map(params![hash], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<String>>(3)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|(path, status, content_before, content_after)| {
                Ok(FileChange {
                    path,
                    status: parse_status(&status)?,
                    content_before,
                    content_after,
                })
            })
            .collect()
    }

    fn was_created_after(&self, rev: &str, ancestor: &str) -> Result<bool> {
        let rev_seq = self.seq_of(&self.resolve(rev)?)?;
        let ancestor_seq = self.seq_of(&self.resolve(ancestor)?)?;
        Ok(rev_seq > ancestor_seq)
    }
}

impl Dataset for Storage {
    fn head_tree(&self) -> Result<Tree> {
        Self::load_tree(&self.conn, "head_tree")
    }

    fn live_tree(&self) -> Result<Tree> {
        Self::load_tree(&self.conn, "worktree")
    }

    fn tree_at(&self, hash: &str) -> Result<Tree> {
        let target = self.resolve(hash)?;
        let target_seq = self.seq_of(&target)?;
        let mut tree = self.head_tree()?;

        let mut stmt = self
            .conn
            .prepare("SELECT hash FROM commits WHERE seq > ?1 ORDER BY seq DESC")?;
        let newer = stmt
            .query_map(params![target_seq], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        for commit in &newer {
            for change in self.changes(commit)? {
                change.unapply(&mut tree);
            }
        }

        debug!(target = %target, undone = newer.len(), "Reconstructed historical tree");
        Ok(tree)
    }

    fn is_clean(&self) -> Result<bool> {
        Self::worktree_matches_head(&self.conn)
    }

    fn stage_file(&self, path: &str, content: &str) -> Result<()> {
        check_path(path)?;
        self.conn.execute(
            "INSERT INTO worktree (path, content) VALUES (?1, ?2)
             ON CONFLICT(path) DO UPDATE SET content = excluded.content",
            params![path, content],
        )?;
        Ok(())
    }

    fn remove_file(&self, path: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM worktree WHERE path = ?1", params![path])?;
        Ok(())
    }

    fn commit_tree(
        &self,
        tree: &Tree,
        base: Option<&str>,
        message: &str,
        author: &str,
    ) -> Result<Option<Commit>> {
        self.record(Some((tree, base)), message, author)
    }
}
