use crate::display;
use anyhow::Result;
use colored::Colorize;
use rewind_core::History;
use std::path::Path;

pub fn run(root: &Path, page: usize) -> Result<()> {
    let repo = super::open_repo(root)?;
    let _read = repo.maintenance.read()?;
    let history = History::new(&repo.storage, &repo.schema)
        .with_commits_per_page(repo.config.history.commits_per_page);

    let result = history.page(page)?;

    if result.is_exhausted() {
        if page == 0 {
            println!("{}", "No commits yet".yellow());
        } else {
            println!("{}", "No more commits to show.".yellow());
        }
        return Ok(());
    }

    println!("{}", "Commit History".bold().cyan());
    println!();

    for entry in &result.commits {
        let short: String = entry.hash.chars().take(7).collect();
        let initial = if entry.eligibility.is_initial {
            format!(" {}", "(initial)".magenta())
        } else {
            String::new()
        };

        println!(
            "{} {} {}{}",
            display::eligibility_marker(&entry.eligibility),
            short.yellow(),
            entry.message,
            initial
        );
        println!("      {}", entry.date.dimmed());

        for change in entry.changes.iter().take(5) {
            println!(
                "      • {} {} {}",
                change.action.dimmed(),
                change.change_type.dimmed(),
                change.name.dimmed()
            );
        }
        if entry.changes.len() > 5 {
            println!(
                "      {} and {} more...",
                "...".dimmed(),
                (entry.changes.len() - 5).to_string().dimmed()
            );
        }
        println!();
    }

    let steps: Vec<String> = result
        .pages
        .iter()
        .map(|&p| {
            if p == page {
                format!("[{}]", p).bold().to_string()
            } else {
                p.to_string()
            }
        })
        .collect();
    println!("{}: {}", "Pages".bold(), steps.join(" "));
    println!(
        "{}",
        "U = can undo, R = can roll back to. Use --page N to see more".dimmed()
    );

    Ok(())
}
