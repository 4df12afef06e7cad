//! Re-validate saved mystery sessions.
//!
//! Usage: `check_save <save.json | save-directory>`
//!
//! For a file, prints the save's summary and every violation grouped by
//! check, exiting with status 1 if the save is inconsistent. For a
//! directory, lists the saves found there.

use adventure_core::persist::{list_saves, SavedGame};
use std::path::Path;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let Some(path) = std::env::args().nth(1) else {
        eprintln!("Usage: check_save <save.json | save-directory>");
        return ExitCode::from(2);
    };
    let path = Path::new(&path);

    if path.is_dir() {
        return list(path).await;
    }
    check(path).await
}

async fn list(dir: &Path) -> ExitCode {
    let saves = match list_saves(dir).await {
        Ok(saves) => saves,
        Err(e) => {
            eprintln!("Error reading {}: {e}", dir.display());
            return ExitCode::from(2);
        }
    };

    if saves.is_empty() {
        println!("No saves found in {}", dir.display());
    }
    for save in saves {
        let s = save.summary;
        println!(
            "{}  {} - {} in '{}', {} clue(s), saved {}",
            save.path.display(),
            s.title,
            s.player_name,
            s.current_scene,
            s.clues_found,
            s.saved_at.format("%Y-%m-%d %H:%M UTC")
        );
    }
    ExitCode::SUCCESS
}

async fn check(path: &Path) -> ExitCode {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) => {
            eprintln!("Error reading {}: {e}", path.display());
            return ExitCode::from(2);
        }
    };

    let saved = match SavedGame::decode(&content) {
        Ok(saved) => saved,
        Err(e) => {
            eprintln!("Error decoding {}: {e}", path.display());
            return ExitCode::from(2);
        }
    };

    let summary = saved.summary();
    println!("=== {} ===", summary.title);
    println!("Session: {}", saved.session_id);
    println!("Player:  {}", summary.player_name);
    println!("Scene:   {}", summary.current_scene);
    println!("Clues:   {}", summary.clues_found);
    println!("Saved:   {}", summary.saved_at.to_rfc3339());
    println!();

    let report = saved.verify();
    if report.is_consistent() {
        println!("Consistent.");
        return ExitCode::SUCCESS;
    }

    println!("{} violation(s):", report.len());
    for (check, descriptions) in report.by_check() {
        println!("  {check}:");
        for description in descriptions {
            println!("    - {description}");
        }
    }
    ExitCode::from(1)
}
