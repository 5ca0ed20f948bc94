use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The tracked dataset at one point in history: path -> text content.
pub type Tree = BTreeMap<String, String>;

/// Field map of a single mirrored entity.
pub type Fields = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileStatus {
    Added,
    Modified,
    Deleted,
}

impl FileStatus {
    pub fn as_str(&self) -> &str {
        match self {
            FileStatus::Added => "A",
            FileStatus::Modified => "M",
            FileStatus::Deleted => "D",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "A" => Some(FileStatus::Added),
            "M" => Some(FileStatus::Modified),
            "D" => Some(FileStatus::Deleted),
            _ => None,
        }
    }

    /// Verb used by the history view for non-entity files.
    pub fn action(&self) -> &str {
        match self {
            FileStatus::Added => "add",
            FileStatus::Modified => "modify",
            FileStatus::Deleted => "delete",
        }
    }
}

/// Path and status of one file touched by a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangedFile {
    pub path: String,
    pub status: FileStatus,
}

/// A changed file together with its content on both sides of the commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub path: String,
    pub status: FileStatus,
    pub content_before: Option<String>,
    pub content_after: Option<String>,
}

impl FileChange {
    /// Builds the change that turns `before` into `after`, or `None` when they are equal.
    pub fn between(path: &str, before: Option<&String>, after: Option<&String>) -> Option<Self> {
        let status = match (before, after) {
            (None, None) => return None,
            (None, Some(_)) => FileStatus::Added,
            (Some(_), None) => FileStatus::Deleted,
            (Some(b), Some(a)) if b == a => return None,
            (Some(_), Some(_)) => FileStatus::Modified,
        };

        Some(Self {
            path: path.to_string(),
            status,
            content_before: before.cloned(),
            content_after: after.cloned(),
        })
    }

    /// Lists the changes between two trees, ordered by path.
    pub fn diff_trees(before: &Tree, after: &Tree) -> Vec<FileChange> {
        let mut changes: Vec<FileChange> = before
            .iter()
            .filter_map(|(path, content)| FileChange::between(path, Some(content), after.get(path)))
            .collect();

        changes.extend(
            after
                .iter()
                .filter(|(path, _)| !before.contains_key(*path))
                .filter_map(|(path, content)| FileChange::between(path, None, Some(content))),
        );

        changes.sort_by(|a, b| a.path.cmp(&b.path));
        changes
    }

    pub fn changed_file(&self) -> ChangedFile {
        ChangedFile {
            path: self.path.clone(),
            status: self.status,
        }
    }

    /// Applies the inverse of this change to `tree`.
    pub fn unapply(&self, tree: &mut Tree) {
        match &self.content_before {
            Some(content) => {
                tree.insert(self.path.clone(), content.clone());
            }
            None => {
                tree.remove(&self.path);
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Commit {
    pub hash: String,
    pub parent: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub author: String,
    pub message: String,
    pub changed_files: Vec<ChangedFile>,
}

impl Commit {
    pub fn new(
        parent: Option<String>,
        author: String,
        message: String,
        changes: &[FileChange],
    ) -> Self {
        let timestamp = Utc::now();
        let hash = Self::compute_hash(parent.as_deref(), &timestamp, &author, &message, changes);

        Self {
            hash,
            parent,
            timestamp,
            author,
            message,
            changed_files: changes.iter().map(FileChange::changed_file).collect(),
        }
    }

    pub fn short_hash(&self) -> &str {
        &self.hash[..self.hash.len().min(7)]
    }

    pub fn subject(&self) -> &str {
        self.message.lines().next().unwrap_or("")
    }

    fn compute_hash(
        parent: Option<&str>,
        timestamp: &DateTime<Utc>,
        author: &str,
        message: &str,
        changes: &[FileChange],
    ) -> String {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(parent.unwrap_or("").as_bytes());
        hasher.update([0]);
        hasher.update(timestamp.to_rfc3339().as_bytes());
        hasher.update([0]);
        hasher.update(author.as_bytes());
        hasher.update([0]);
        hasher.update(message.as_bytes());

        for change in changes {
            hasher.update([0]);
            hasher.update(change.path.as_bytes());
            hasher.update(change.status.as_str().as_bytes());
            if let Some(after) = &change.content_after {
                hasher.update(Sha256::digest(after.as_bytes()));
            }
        }

        hex::encode(hasher.finalize())
    }
}

/// Type and identifier of a mirrored entity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub entity_type: String,
    pub id: String,
}

impl EntityRef {
    pub fn new(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }
}

impl std::fmt::Display for EntityRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.entity_type, self.id)
    }
}

/// A mirrored database row stored as a JSON file in the tracked tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    pub reference: EntityRef,
    pub fields: Fields,
}

impl Entity {
    pub fn new(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            reference: EntityRef::new(entity_type, id),
            fields: Fields::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn to_content(&self) -> crate::Result<String> {
        Ok(serde_json::to_string_pretty(&self.fields)?)
    }
}
