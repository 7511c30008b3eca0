// Record Store - accounts and meter readings in SQLite (WAL)
//
// The store owns all durable data. Uniqueness of (account, reading time) and
// the account foreign key are enforced here, not by the pipeline.

use crate::domain::{Account, AccountId, MeterReadValue, MeterReading, MeterReadingId, MAX_NAME_LENGTH};
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, TransactionBehavior};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

// ============================================================================
// STORE CONTRACT
// ============================================================================

/// What the ingestion core needs from persistent storage
pub trait RecordStore: Send + Sync {
    /// Every account id currently in the store
    fn query_account_ids(&self) -> Result<HashSet<AccountId>>;

    /// Is there already a committed reading for this account at this instant?
    fn reading_exists(&self, account_id: AccountId, reading_time: DateTime<Utc>) -> Result<bool>;

    /// Insert all readings in one transaction and return them with their
    /// assigned ids. On error nothing is written.
    fn insert_all(&self, readings: &[MeterReading]) -> Result<Vec<MeterReading>>;
}

// ============================================================================
// SQLITE STORE
// ============================================================================

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

enum Backing {
    /// WAL file: every operation checks out its own connection
    File {
        path: PathBuf,
        idle: Mutex<Vec<Connection>>,
    },
    /// A private in-memory database only exists on one connection
    Memory(Mutex<Connection>),
}

pub struct SqliteStore {
    backing: Backing,
}

impl SqliteStore {
    /// Open (or create) a database file with WAL enabled and the schema in place
    pub fn open(path: &Path) -> Result<Self> {
        let conn = open_session(path)?;

        // Enable WAL mode for crash recovery
        conn.pragma_update(None, "journal_mode", "WAL")?;
        setup_database(&conn)?;

        info!(path = %path.display(), "opened meter reading database");
        Ok(SqliteStore {
            backing: Backing::File {
                path: path.to_path_buf(),
                idle: Mutex::new(vec![conn]),
            },
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", true)?;
        setup_database(&conn)?;
        Ok(SqliteStore {
            backing: Backing::Memory(Mutex::new(conn)),
        })
    }

    /// Run `f` on a connection no other caller is using. File connections go
    /// back to the idle list afterwards; an open transaction has already been
    /// committed or rolled back by then.
    fn with_conn<T>(&self, f: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        match &self.backing {
            Backing::Memory(conn) => f(&mut conn.lock()),
            Backing::File { path, idle } => {
                let pooled = idle.lock().pop();
                let mut conn = match pooled {
                    Some(conn) => conn,
                    None => open_session(path)?,
                };
                let result = f(&mut conn);
                idle.lock().push(conn);
                result
            }
        }
    }

    pub fn account_count(&self) -> Result<i64> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM accounts", [], |row| row.get(0))?;
            Ok(count)
        })
    }

    pub fn reading_count(&self) -> Result<i64> {
        self.with_conn(|conn| {
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM meter_readings", [], |row| row.get(0))?;
            Ok(count)
        })
    }

    /// Insert accounts in one transaction. Used by seeding and tests.
    pub fn insert_accounts(&self, accounts: &[Account]) -> Result<usize> {
        self.with_conn(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO accounts (account_id, first_name, last_name) VALUES (?1, ?2, ?3)",
                )?;
                for account in accounts {
                    stmt.execute(params![
                        account.account_id.value(),
                        account.person.first_name,
                        account.person.last_name,
                    ])
                    .with_context(|| format!("Failed to insert account {}", account.account_id))?;
                }
            }
            tx.commit()?;
            Ok(())
        })?;

        info!(count = accounts.len(), "inserted accounts");
        Ok(accounts.len())
    }

    /// All readings for one account, oldest first
    pub fn readings_for_account(&self, account_id: AccountId) -> Result<Vec<MeterReading>> {
        let rows = self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, account_id, reading_time, read_value
                 FROM meter_readings
                 WHERE account_id = ?1
                 ORDER BY reading_time ASC",
            )?;

            let rows = stmt
                .query_map(params![account_id.value()], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i32>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, i32>(3)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;

        rows.into_iter()
            .map(|(id, account, time, value)| {
                let reading_time = DateTime::parse_from_rfc3339(&time)
                    .with_context(|| format!("Corrupt reading_time on reading {}", id))?
                    .with_timezone(&Utc);
                Ok(MeterReading {
                    id: MeterReadingId(id),
                    account_id: AccountId(account),
                    reading_time,
                    value: MeterReadValue::new_unchecked(value),
                })
            })
            .collect()
    }
}

fn open_session(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)
        .with_context(|| format!("Failed to open database: {}", path.display()))?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.pragma_update(None, "foreign_keys", true)?;
    Ok(conn)
}

impl RecordStore for SqliteStore {
    fn query_account_ids(&self) -> Result<HashSet<AccountId>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT account_id FROM accounts")?;
            let ids = stmt
                .query_map([], |row| row.get::<_, i32>(0).map(AccountId))?
                .collect::<Result<HashSet<_>, _>>()?;
            Ok(ids)
        })
    }

    fn reading_exists(&self, account_id: AccountId, reading_time: DateTime<Utc>) -> Result<bool> {
        self.with_conn(|conn| {
            let exists: bool = conn.query_row(
                "SELECT EXISTS(
                    SELECT 1 FROM meter_readings WHERE account_id = ?1 AND reading_time = ?2
                 )",
                params![account_id.value(), reading_time.to_rfc3339()],
                |row| row.get(0),
            )?;
            Ok(exists)
        })
    }

    fn insert_all(&self, readings: &[MeterReading]) -> Result<Vec<MeterReading>> {
        let stored = self.with_conn(|conn| {
            // Dropping an uncommitted rusqlite Transaction rolls it back
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let mut stored = Vec::with_capacity(readings.len());
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO meter_readings (account_id, reading_time, read_value)
                     VALUES (?1, ?2, ?3)",
                )?;
                for reading in readings {
                    if reading.id.is_assigned() {
                        return Err(anyhow!("Reading {} is already persisted", reading.id.value()));
                    }
                    stmt.execute(params![
                        reading.account_id.value(),
                        reading.reading_time.to_rfc3339(),
                        reading.value.value(),
                    ])
                    .with_context(|| {
                        format!(
                            "Failed to insert reading for account {} at {}",
                            reading.account_id,
                            reading.reading_time.to_rfc3339()
                        )
                    })?;
                    stored.push(reading.clone().with_id(MeterReadingId(tx.last_insert_rowid())));
                }
            }
            tx.commit().context("Failed to commit meter readings")?;
            Ok(stored)
        })?;

        debug!(count = stored.len(), "meter reading batch committed");
        Ok(stored)
    }
}

// ============================================================================
// SCHEMA
// ============================================================================

pub fn setup_database(conn: &Connection) -> Result<()> {
    conn.execute(
        &format!(
            "CREATE TABLE IF NOT EXISTS accounts (
                account_id INTEGER PRIMARY KEY,
                first_name TEXT NOT NULL CHECK (length(first_name) BETWEEN 1 AND {max}),
                last_name TEXT NOT NULL CHECK (length(last_name) BETWEEN 1 AND {max})
            )",
            max = MAX_NAME_LENGTH
        ),
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS meter_readings (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            account_id INTEGER NOT NULL REFERENCES accounts(account_id),
            reading_time TEXT NOT NULL,
            read_value INTEGER NOT NULL CHECK (read_value BETWEEN 0 AND 99999),
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // One reading per account per instant
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_readings_account_time
         ON meter_readings(account_id, reading_time)",
        [],
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Person;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn account(id: i32) -> Account {
        Account {
            account_id: AccountId(id),
            person: Person {
                first_name: "Tommy".to_string(),
                last_name: "Test".to_string(),
            },
        }
    }

    fn reading(account_id: i32, minute: u32, value: i32) -> MeterReading {
        MeterReading::pending(
            AccountId(account_id),
            Utc.with_ymd_and_hms(2019, 4, 22, 9, minute, 0).unwrap(),
            MeterReadValue::new_unchecked(value),
        )
    }

    fn seeded_store() -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert_accounts(&[account(1), account(2)]).unwrap();
        store
    }

    #[test]
    fn test_query_account_ids() {
        let store = seeded_store();
        let ids = store.query_account_ids().unwrap();
        assert_eq!(ids, [AccountId(1), AccountId(2)].into_iter().collect::<HashSet<_>>());
        assert_eq!(store.account_count().unwrap(), 2);
    }

    #[test]
    fn test_insert_all_assigns_ids() {
        let store = seeded_store();
        let stored = store
            .insert_all(&[reading(1, 24, 100), reading(2, 25, 200)])
            .unwrap();

        assert_eq!(stored.len(), 2);
        assert!(stored.iter().all(|r| r.id.is_assigned()));
        assert_ne!(stored[0].id, stored[1].id);
        assert_eq!(store.reading_count().unwrap(), 2);

        let back = store.readings_for_account(AccountId(1)).unwrap();
        assert_eq!(back, vec![stored[0].clone()]);
    }

    #[test]
    fn test_reading_exists() {
        let store = seeded_store();
        let r = reading(1, 24, 100);
        assert!(!store.reading_exists(r.account_id, r.reading_time).unwrap());

        store.insert_all(&[r.clone()]).unwrap();
        assert!(store.reading_exists(r.account_id, r.reading_time).unwrap());
        assert!(!store.reading_exists(AccountId(2), r.reading_time).unwrap());
    }

    #[test]
    fn test_insert_all_rolls_back_on_duplicate() {
        let store = seeded_store();
        let result = store.insert_all(&[reading(1, 24, 100), reading(2, 30, 5), reading(1, 24, 300)]);

        assert!(result.is_err());
        assert_eq!(store.reading_count().unwrap(), 0, "no partial commit");
    }

    #[test]
    fn test_insert_all_rejects_unknown_account() {
        let store = seeded_store();
        let result = store.insert_all(&[reading(1, 24, 100), reading(42, 24, 100)]);

        assert!(result.is_err());
        assert_eq!(store.reading_count().unwrap(), 0);
    }

    #[test]
    fn test_concurrent_batches_on_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SqliteStore::open(&dir.path().join("readings.db")).unwrap());
        store.insert_accounts(&[account(1), account(2)]).unwrap();

        // Four distinct batches plus two racing on the same (account, time)
        let batches: Vec<Vec<MeterReading>> = vec![
            (0..10).map(|m| reading(1, m, 1)).collect(),
            (10..20).map(|m| reading(1, m, 2)).collect(),
            (0..10).map(|m| reading(2, m, 3)).collect(),
            (10..20).map(|m| reading(2, m, 4)).collect(),
            vec![reading(1, 45, 5)],
            vec![reading(1, 45, 6)],
        ];

        let workers: Vec<_> = batches
            .into_iter()
            .map(|batch| {
                let store = store.clone();
                std::thread::spawn(move || store.insert_all(&batch).is_ok())
            })
            .collect();
        let outcomes: Vec<bool> = workers.into_iter().map(|w| w.join().unwrap()).collect();

        assert!(outcomes[..4].iter().all(|ok| *ok), "disjoint batches all commit");
        assert_eq!(outcomes[4..].iter().filter(|ok| **ok).count(), 1, "one racer wins");
        assert_eq!(store.reading_count().unwrap(), 41);
    }

    #[test]
    fn test_file_database_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("readings.db");

        {
            let store = SqliteStore::open(&path).unwrap();
            store.insert_accounts(&[account(7)]).unwrap();
            store.insert_all(&[reading(7, 1, 42)]).unwrap();
        }

        let reopened = SqliteStore::open(&path).unwrap();
        assert_eq!(reopened.account_count().unwrap(), 1);
        assert_eq!(reopened.reading_count().unwrap(), 1);
    }
}
