use crate::error::{Error, Result};
use crate::models::{FileChange, FileStatus};
use similar::TextDiff;

/// Largest diff payload served in one piece.
pub const MAX_DIFF_BYTES: usize = 50 * 1024;

const CONTEXT_LINES: usize = 3;

/// Git-style unified diff of one changed file.
pub fn unified(change: &FileChange, context_lines: usize) -> String {
    let old = change.content_before.as_deref().unwrap_or("");
    let new = change.content_after.as_deref().unwrap_or("");

    let old_header = match change.content_before {
        Some(_) => format!("a/{}", change.path),
        None => "/dev/null".to_string(),
    };
    let new_header = match change.content_after {
        Some(_) => format!("b/{}", change.path),
        None => "/dev/null".to_string(),
    };

    let mut output = format!("diff --git a/{0} b/{0}\n", change.path);
    match change.status {
        FileStatus::Added => output.push_str("new file\n"),
        FileStatus::Deleted => output.push_str("deleted file\n"),
        FileStatus::Modified => {}
    }

    let diff = TextDiff::from_lines(old, new);
    output.push_str(
        &diff
            .unified_diff()
            .context_radius(context_lines)
            .header(&old_header, &new_header)
            .to_string(),
    );
    output
}

/// Bytes the rendered diff of `change` takes at least, known without diffing.
///
/// Every line of an added or deleted file appears once with a one-byte prefix.
fn lower_bound(change: &FileChange) -> usize {
    match change.status {
        FileStatus::Added => change.content_after.as_ref().map_or(0, String::len),
        FileStatus::Deleted => change.content_before.as_ref().map_or(0, String::len),
        FileStatus::Modified => 0,
    }
}

/// Renders the unified diff of a whole commit, giving up as soon as the
/// output grows past `limit` bytes.
pub fn render_commit_diff(changes: &[FileChange], limit: usize) -> Result<String> {
    let mut output = String::new();

    for change in changes {
        let at_least = output.len() + lower_bound(change);
        if at_least > limit {
            return Err(Error::PayloadTooLarge {
                size: at_least,
                limit,
            });
        }

        output.push_str(&unified(change, CONTEXT_LINES));
        if output.len() > limit {
            return Err(Error::PayloadTooLarge {
                size: output.len(),
                limit,
            });
        }
    }

    Ok(output)
}
