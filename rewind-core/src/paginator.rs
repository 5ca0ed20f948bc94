use crate::error::Result;
use crate::log::CommitLog;
use crate::models::Commit;

pub const DEFAULT_COMMITS_PER_PAGE: usize = 25;

/// Pages through the log from HEAD backwards without loading it whole.
pub struct HistoryPaginator<'a, L: CommitLog> {
    log: &'a L,
    commits_per_page: usize,
}

impl<'a, L: CommitLog> HistoryPaginator<'a, L> {
    pub fn new(log: &'a L) -> Self {
        Self {
            log,
            commits_per_page: DEFAULT_COMMITS_PER_PAGE,
        }
    }

    pub fn with_commits_per_page(mut self, commits_per_page: usize) -> Self {
        self.commits_per_page = commits_per_page.max(1);
        self
    }

    pub fn commits_per_page(&self) -> usize {
        self.commits_per_page
    }

    /// Commits of page `page`, newest first. Page 0 starts at HEAD; pages past
    /// the end of the log are empty.
    pub fn page(&self, page: usize) -> Result<Vec<Commit>> {
        let Some(skip) = page.checked_mul(self.commits_per_page) else {
            return Ok(Vec::new());
        };
        self.log.commits(skip, self.commits_per_page)
    }

    pub fn page_count(&self) -> Result<usize> {
        Ok(self.log.commit_count()?.div_ceil(self.commits_per_page))
    }

    /// Page indices worth offering around `current`: the first and last few
    /// pages plus a window around the current one, ascending and deduplicated.
    pub fn pretty_steps(&self, current: usize) -> Result<Vec<usize>> {
        let page_count = self.page_count()?;
        if page_count == 0 {
            return Ok(Vec::new());
        }

        let last = page_count - 1;
        let current = current.min(last);

        let mut steps: Vec<usize> = (0..=2.min(last))
            .chain(current.saturating_sub(2)..=(current + 2).min(last))
            .chain(last.saturating_sub(2)..=last)
            .collect();
        steps.sort_unstable();
        steps.dedup();
        Ok(steps)
    }

    /// Iterates every commit, newest first, fetching one page at a time.
    pub fn walk(&self) -> Walk<'_, 'a, L> {
        Walk {
            paginator: self,
            page: 0,
            buffer: Vec::new().into_iter(),
            done: false,
        }
    }
}

pub struct Walk<'p, 'a, L: CommitLog> {
    paginator: &'p HistoryPaginator<'a, L>,
    page: usize,
    buffer: std::vec::IntoIter<Commit>,
    done: bool,
}

impl<L: CommitLog> Iterator for Walk<'_, '_, L> {
    type Item = Result<Commit>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(commit) = self.buffer.next() {
                return Some(Ok(commit));
            }
            if self.done {
                return None;
            }

            match self.paginator.page(self.page) {
                Ok(commits) => {
                    self.done = commits.len() < self.paginator.commits_per_page;
                    self.page += 1;
                    self.buffer = commits.into_iter();
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}
