//! The history view: pages of commits with their descriptions, change lists
//! and undo/rollback eligibility.

use crate::changeinfo::ChangeSummary;
use crate::diff::{render_commit_diff, MAX_DIFF_BYTES};
use crate::eligibility::{self, CommitEligibility};
use crate::error::{Error, Result};
use crate::integrity::Schema;
use crate::log::CommitLog;
use crate::matcher;
use crate::models::{ChangedFile, Commit};
use crate::paginator::{HistoryPaginator, DEFAULT_COMMITS_PER_PAGE};
use serde::{Deserialize, Serialize};

const FILE_CHANGE_TYPE: &str = "file";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub hash: String,
    /// RFC 3339 commit time.
    pub date: String,
    pub message: String,
    #[serde(flatten)]
    pub eligibility: CommitEligibility,
    pub changes: Vec<ChangeSummary>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryPage {
    pub pages: Vec<usize>,
    pub commits: Vec<HistoryEntry>,
}

impl HistoryPage {
    /// True when the requested page lies past the end of the log.
    pub fn is_exhausted(&self) -> bool {
        self.commits.is_empty()
    }
}

pub struct History<'a, L: CommitLog> {
    log: &'a L,
    schema: &'a Schema,
    commits_per_page: usize,
    max_diff_bytes: usize,
}

impl<'a, L: CommitLog> History<'a, L> {
    pub fn new(log: &'a L, schema: &'a Schema) -> Self {
        Self {
            log,
            schema,
            commits_per_page: DEFAULT_COMMITS_PER_PAGE,
            max_diff_bytes: MAX_DIFF_BYTES,
        }
    }

    pub fn with_commits_per_page(mut self, commits_per_page: usize) -> Self {
        self.commits_per_page = commits_per_page;
        self
    }

    pub fn with_max_diff_bytes(mut self, max_diff_bytes: usize) -> Self {
        self.max_diff_bytes = max_diff_bytes;
        self
    }

    pub fn page(&self, page: usize) -> Result<HistoryPage> {
        let paginator = HistoryPaginator::new(self.log).with_commits_per_page(self.commits_per_page);
        let commits = paginator.page(page)?;
        let Some(newest) = commits.first() else {
            return Ok(HistoryPage::default());
        };

        let initial = self.log.initial_commit()?.map(|c| c.hash);
        let newest_after_initial = match &initial {
            Some(initial) => self.log.was_created_after(&newest.hash, initial)?,
            None => false,
        };

        let flags = eligibility::scan(
            commits.iter().map(|c| c.hash.as_str()),
            initial.as_deref(),
            page == 0,
            newest_after_initial,
        );

        let entries = commits
            .iter()
            .zip(flags)
            .map(|(commit, eligibility)| self.entry(commit, eligibility))
            .collect();

        Ok(HistoryPage {
            pages: paginator.pretty_steps(page)?,
            commits: entries,
        })
    }

    fn entry(&self, commit: &Commit, eligibility: CommitEligibility) -> HistoryEntry {
        let info = matcher::parse(&commit.message);
        let mut changes = info.summaries();
        changes.extend(
            commit
                .changed_files
                .iter()
                .filter(|file| !self.schema.is_mirrored(&file.path))
                .map(file_summary),
        );

        HistoryEntry {
            hash: commit.hash.clone(),
            date: commit.timestamp.to_rfc3339(),
            message: info.description(),
            eligibility,
            changes,
        }
    }

    /// Unified diff of one commit, refused once it outgrows the size cap.
    pub fn diff(&self, rev: &str) -> Result<String> {
        let hash = self.log.resolve(rev)?;
        render_commit_diff(&self.log.changes(&hash)?, self.max_diff_bytes)
    }

    /// Whether the log moved past `latest`, the newest commit a client has seen.
    /// A hash the log does not know counts as stale.
    pub fn should_update(&self, latest: &str) -> Result<bool> {
        if self.log.head()?.is_none() {
            return Ok(false);
        }
        match self.log.was_created_after("HEAD", latest) {
            Ok(newer) => Ok(newer),
            Err(Error::CommitNotFound(_)) => Ok(true),
            Err(e) => Err(e),
        }
    }
}

fn file_summary(file: &ChangedFile) -> ChangeSummary {
    ChangeSummary {
        change_type: FILE_CHANGE_TYPE.to_string(),
        action: file.status.action().to_string(),
        name: file.path.clone(),
        tags: Default::default(),
    }
}
