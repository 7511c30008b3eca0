// Account Seeding - load account holders from CSV into an empty store
//
// Seed file format: AccountId,FirstName,LastName (header names case-insensitive).
// Unlike uploads, a bad seed row aborts the whole seed.

use crate::domain::{Account, AccountId};
use crate::store::SqliteStore;
use crate::validation::validate_person_name;
use anyhow::{anyhow, Context, Result};
use csv::ReaderBuilder;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::info;

const SEED_HEADERS: [&str; 3] = ["AccountId", "FirstName", "LastName"];

/// Seed accounts from `path` unless the store already has accounts.
/// Returns the number of accounts inserted.
pub fn seed_accounts_from_csv(store: &SqliteStore, path: &Path) -> Result<usize> {
    let existing = store.account_count()?;
    if existing > 0 {
        info!(existing, "accounts already present, seed skipped");
        return Ok(0);
    }

    let file = File::open(path)
        .with_context(|| format!("Failed to open account seed file: {}", path.display()))?;
    let accounts = read_accounts(file)
        .with_context(|| format!("Invalid account seed file: {}", path.display()))?;

    store.insert_accounts(&accounts)
}

pub fn read_accounts<R: Read>(source: R) -> Result<Vec<Account>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(source);

    let headers = reader.headers().context("Failed to read seed header row")?.clone();
    let column = |name: &str| {
        headers
            .iter()
            .position(|h| h.trim().trim_start_matches('\u{feff}').eq_ignore_ascii_case(name))
            .ok_or_else(|| anyhow!("missing {} column", name))
    };
    let id_col = column(SEED_HEADERS[0])?;
    let first_col = column(SEED_HEADERS[1])?;
    let last_col = column(SEED_HEADERS[2])?;

    let mut accounts = Vec::new();
    for (index, result) in reader.records().enumerate() {
        let line = index + 2; // 1-indexed + header row
        let record = result.with_context(|| format!("Failed to parse seed line {}", line))?;

        let raw_id = record.get(id_col).unwrap_or("").trim();
        let id: i32 = raw_id
            .parse()
            .with_context(|| format!("line {}: invalid AccountId '{}'", line, raw_id))?;

        let person = validate_person_name(
            record.get(first_col).unwrap_or(""),
            record.get(last_col).unwrap_or(""),
        )
        .into_result()
        .map_err(|message| anyhow!("line {}: {}", line, message))?;

        accounts.push(Account {
            account_id: AccountId(id),
            person,
        });
    }

    Ok(accounts)
}
