use anyhow::Result;
use colored::Colorize;
use rewind_server::RewindServer;
use std::path::PathBuf;

pub async fn run(path: PathBuf, port: u16) -> Result<()> {
    let abs_path = std::fs::canonicalize(&path)?;
    super::open_repo(&abs_path)?;

    println!("{}", "🚀 Starting rewind server...".bold().cyan());
    println!("   {}: {:?}", "Repository".bold(), abs_path);

    let server = RewindServer::new(abs_path)?;

    println!(
        "   {}: {}",
        "API Server".bold(),
        format!("http://localhost:{}", port).green()
    );
    println!();
    println!("{}", "Press Ctrl+C to stop".dimmed());
    println!();

    let addr = format!("0.0.0.0:{}", port).parse()?;
    server.serve(addr).await?;

    Ok(())
}
