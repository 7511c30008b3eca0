use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use meter_ingest::config::{init_tracing, load_env, DatabaseArgs, DEFAULT_LOG_FILTER};
use meter_ingest::{handle_upload, seed_accounts_from_csv, IngestService, UploadOutcome};

#[derive(Parser)]
#[command(name = "meter-ingest", version, about = "Validate and import meter reading CSV files")]
struct Cli {
    #[command(flatten)]
    db: DatabaseArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the database and schema
    Init,
    /// Load accounts from AccountId,FirstName,LastName CSV (empty store only)
    SeedAccounts { csv: PathBuf },
    /// Validate a meter reading CSV and commit it if every row passes
    Import { csv: PathBuf },
    /// Show account and reading counts
    Count,
}

fn main() -> Result<()> {
    load_env();
    init_tracing(DEFAULT_LOG_FILTER);

    let cli = Cli::parse();
    let service = IngestService::open(&cli.db)?;

    match cli.command {
        Command::Init => {
            println!("✓ Database ready: {}", cli.db.path.display());
        }
        Command::SeedAccounts { csv } => {
            let inserted = seed_accounts_from_csv(&service.store, &csv)?;
            service.accounts_changed();
            if inserted == 0 {
                println!("✓ Accounts already present, nothing seeded");
            } else {
                println!("✓ Seeded {} accounts", inserted);
            }
        }
        Command::Import { csv } => run_import(&service, &csv)?,
        Command::Count => {
            println!("Accounts: {}", service.store.account_count()?);
            println!("Readings: {}", service.store.reading_count()?);
        }
    }

    Ok(())
}

fn run_import(service: &IngestService, csv_path: &Path) -> Result<()> {
    let content = std::fs::read(csv_path)
        .with_context(|| format!("Failed to read {}", csv_path.display()))?;
    let file_name = csv_path.file_name().and_then(|n| n.to_str());

    match handle_upload(&service.pipeline, file_name, content) {
        UploadOutcome::Processed(result) => {
            println!("{}", serde_json::to_string_pretty(&result)?);
            if result.is_committed() {
                println!("✅ Committed {} readings", result.committed);
            } else {
                println!("❌ Nothing committed ({} failed)", result.failed);
                std::process::exit(1);
            }
        }
        UploadOutcome::Rejected(message) | UploadOutcome::Failed(message) => {
            eprintln!("❌ {}", message);
            std::process::exit(2);
        }
    }

    Ok(())
}
