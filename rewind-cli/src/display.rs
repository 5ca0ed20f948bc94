use colored::{ColoredString, Colorize};
use rewind_core::eligibility::CommitEligibility;
use rewind_core::{FileStatus, RevertStatus};

pub fn status_icon(status: FileStatus) -> ColoredString {
    match status {
        FileStatus::Added => "+".green(),
        FileStatus::Modified => "~".yellow(),
        FileStatus::Deleted => "-".red(),
    }
}

/// Two-letter marker: `U` when undoable, `R` when rollback is possible.
pub fn eligibility_marker(eligibility: &CommitEligibility) -> String {
    if !eligibility.is_enabled {
        return "  ".dimmed().to_string();
    }
    let undo = if eligibility.can_undo { "U".green() } else { "·".dimmed() };
    let rollback = if eligibility.can_rollback {
        "R".cyan()
    } else {
        "·".dimmed()
    };
    format!("{}{}", undo, rollback)
}

/// Prints a rendered unified diff with a rule above each file.
pub fn print_unified(text: &str) {
    for line in text.lines() {
        if line.starts_with("diff --git") {
            println!("{}", "━".repeat(80).bright_black());
            println!("{}", line.white().bold());
        } else if line.starts_with("+++")
            || line.starts_with("---")
            || line == "new file"
            || line == "deleted file"
        {
            println!("{}", line.bold());
        } else if line.starts_with("@@") {
            println!("{}", line.cyan());
        } else if line.starts_with('+') {
            println!("{}", line.green());
        } else if line.starts_with('-') {
            println!("{}", line.red());
        } else {
            println!("{}", line);
        }
    }
}

pub fn revert_outcome(status: RevertStatus) -> ColoredString {
    match status {
        RevertStatus::Ok => "✓ Done".green().bold(),
        RevertStatus::NothingToCommit => {
            "Nothing to commit: the current state already matches".yellow()
        }
        RevertStatus::MergeConflict => {
            "✗ Overwritten changes can not be reverted".red().bold()
        }
        RevertStatus::ViolatedReferentialIntegrity => {
            "✗ Objects with missing references cannot be restored".red().bold()
        }
    }
}
