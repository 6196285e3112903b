//! Import Games
//!
//! Posts every record of a harvested checkpoint file to the application
//! backend.
//!
//! Usage:
//!   import_games --input games_dto.json --api-url http://localhost:8080/api/games --yes

use anyhow::{Context, Result};
use clap::Parser;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

use rawg_harvest::importer::{GameImporter, DEFAULT_IMPORT_URL};
use rawg_harvest::models::DEFAULT_OUTPUT_PATH;
use rawg_harvest::CheckpointStore;

#[derive(Parser, Debug)]
#[command(name = "import_games")]
#[command(about = "Post harvested games to the backend API")]
struct Args {
    /// Harvested checkpoint file
    #[arg(short, long, env = "HARVEST_OUTPUT_PATH", default_value = DEFAULT_OUTPUT_PATH)]
    input: PathBuf,

    /// Endpoint receiving one game per POST
    #[arg(long, env = "IMPORT_API_URL", default_value = DEFAULT_IMPORT_URL)]
    api_url: String,

    /// Pause between requests in milliseconds
    #[arg(long, default_value = "100")]
    delay_ms: u64,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    yes: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "import_games=info,rawg_harvest=info".into()),
        )
        .init();

    dotenv::dotenv().ok();
    let args = Args::parse();

    let games = CheckpointStore::new(&args.input)
        .load()
        .with_context(|| format!("Failed to read {}", args.input.display()))?;
    info!("Found {} games to import", games.len());

    if games.is_empty() {
        return Ok(());
    }

    if !args.yes && !confirm(games.len(), &args.api_url)? {
        println!("Operation cancelled by user.");
        return Ok(());
    }

    let importer = GameImporter::new(args.api_url, Duration::from_millis(args.delay_ms))?;
    let summary = importer.import_all(&games).await;

    println!(
        "\nImport completed. Successfully imported {} out of {} games.",
        summary.succeeded, summary.total
    );

    if !summary.all_succeeded() {
        std::process::exit(1);
    }
    Ok(())
}

fn confirm(count: usize, api_url: &str) -> Result<bool> {
    println!("\nWARNING: This will post {} games to {}", count, api_url);
    print!("Do you want to continue? (yes/no): ");
    io::stdout().flush()?;

    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(answer.trim().eq_ignore_ascii_case("yes"))
}
