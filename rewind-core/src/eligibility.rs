//! Undo/rollback affordances for a page of history.
//!
//! Eligibility decays monotonically from newest to oldest: once the scan
//! passes the initial commit nothing older can be undone again.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitEligibility {
    pub can_undo: bool,
    pub can_rollback: bool,
    pub is_enabled: bool,
    pub is_initial: bool,
}

/// Computes eligibility for `hashes`, ordered newest first.
///
/// * `initial` - hash of the initial commit, if tracking has produced one
/// * `first_page` - whether the first hash is HEAD; rolling back to HEAD is meaningless
/// * `newest_after_initial` - whether the first hash is strictly newer than `initial`
pub fn scan<'h>(
    hashes: impl IntoIterator<Item = &'h str>,
    initial: Option<&str>,
    first_page: bool,
    newest_after_initial: bool,
) -> Vec<CommitEligibility> {
    hashes
        .into_iter()
        .scan(
            (newest_after_initial, first_page),
            |(revertible, is_head), hash| {
                let is_initial = initial == Some(hash);
                *revertible = *revertible && !is_initial;
                let can_rollback = !*is_head && (*revertible || is_initial);
                *is_head = false;

                Some(CommitEligibility {
                    can_undo: *revertible,
                    can_rollback,
                    is_enabled: *revertible || can_rollback || is_initial,
                    is_initial,
                })
            },
        )
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flags(result: &[CommitEligibility]) -> Vec<(bool, bool, bool)> {
        result
            .iter()
            .map(|e| (e.can_undo, e.can_rollback, e.is_enabled))
            .collect()
    }

    #[test]
    fn test_first_page_with_initial_commit() {
        let hashes = ["c3", "c2", "c1", "c0"];
        let result = scan(hashes, Some("c1"), true, true);

        assert_eq!(
            flags(&result),
            vec![
                (true, false, true),
                (true, true, true),
                (false, true, true),
                (false, false, false),
            ]
        );
        assert!(result[2].is_initial);
        assert!(!result[3].is_initial);
    }

    #[test]
    fn test_later_page_can_roll_back_to_its_first_commit() {
        let result = scan(["c5", "c4"], Some("c0"), false, true);
        assert_eq!(flags(&result), vec![(true, true, true), (true, true, true)]);
    }

    #[test]
    fn test_page_older_than_initial_is_disabled() {
        let result = scan(["b2", "b1"], Some("c0"), false, false);
        assert!(result.iter().all(|e| !e.is_enabled));
    }

    #[test]
    fn test_no_initial_commit_disables_everything() {
        let result = scan(["a", "b"], None, true, false);
        assert!(result.iter().all(|e| !e.can_undo && !e.can_rollback));
    }

    #[test]
    fn test_undo_eligibility_never_recovers() {
        let hashes: Vec<String> = (0..30).rev().map(|i| format!("h{}", i)).collect();
        for initial in [0, 7, 15, 29] {
            for first_page in [true, false] {
                let initial_hash = format!("h{}", initial);
                let result = scan(
                    hashes.iter().map(String::as_str),
                    Some(&initial_hash),
                    first_page,
                    true,
                );

                let first_blocked = result.iter().position(|e| !e.can_undo);
                if let Some(index) = first_blocked {
                    assert!(result[index..].iter().all(|e| !e.can_undo));
                    assert!(result[index + 1..].iter().all(|e| !e.is_enabled));
                }
            }
        }
    }
}
