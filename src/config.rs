// Configuration & Logging - shared by the CLI and the server
//
// Every option can come from the command line, the environment, or a .env file.

use clap::Args;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub const DEFAULT_DB_PATH: &str = "meter_readings.db";
pub const DEFAULT_LOG_FILTER: &str = "meter_ingest=info";

#[derive(Debug, Clone, Args)]
pub struct DatabaseArgs {
    /// SQLite database file
    #[arg(long = "database", env = "METER_DB_PATH", default_value = DEFAULT_DB_PATH)]
    pub path: PathBuf,

    /// Account seed CSV (AccountId,FirstName,LastName), applied only to an empty store
    #[arg(long = "accounts-csv", env = "METER_ACCOUNTS_CSV")]
    pub accounts_csv: Option<PathBuf>,
}

/// Load `.env` if present. Missing file is not an error.
pub fn load_env() {
    let _ = dotenv::dotenv();
}

/// Install the global tracing subscriber. `RUST_LOG` overrides `default_filter`.
pub fn init_tracing(default_filter: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
