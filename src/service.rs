// Service Wiring - store, cache, fault logger and pipeline in one place

use crate::cache::AccountCache;
use crate::config::DatabaseArgs;
use crate::faults::{FaultLogger, TracingFaultLogger};
use crate::pipeline::IngestionPipeline;
use crate::seed::seed_accounts_from_csv;
use crate::store::SqliteStore;
use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn};

pub struct IngestService {
    pub store: Arc<SqliteStore>,
    pub pipeline: IngestionPipeline,
}

impl IngestService {
    /// Open the database, apply the optional account seed and warm the cache
    pub fn open(args: &DatabaseArgs) -> Result<Self> {
        let store = Arc::new(SqliteStore::open(&args.path)?);

        if let Some(seed) = &args.accounts_csv {
            let seeded = seed_accounts_from_csv(&store, seed)?;
            info!(seeded, file = %seed.display(), "account seed applied");
        }

        Ok(Self::from_store(store))
    }

    pub fn from_store(store: Arc<SqliteStore>) -> Self {
        let faults: Arc<dyn FaultLogger> = Arc::new(TracingFaultLogger);
        let cache = Arc::new(AccountCache::new(store.clone(), faults.clone()));

        if !cache.refresh() {
            warn!("account cache could not be loaded; uploads will see no accounts until refreshed");
        }

        let pipeline = IngestionPipeline::new(store.clone(), cache, faults);
        IngestService { store, pipeline }
    }

    /// Re-read account ids after accounts change outside the pipeline
    pub fn accounts_changed(&self) -> bool {
        self.pipeline.cache().refresh()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upload::{handle_upload, UploadOutcome};
    use std::io::Write;

    #[test]
    fn test_open_seeds_and_accepts_uploads() {
        let dir = tempfile::tempdir().unwrap();
        let seed_path = dir.path().join("accounts.csv");
        let mut seed = std::fs::File::create(&seed_path).unwrap();
        writeln!(seed, "AccountId,FirstName,LastName\n1239,Noddy,Test").unwrap();

        let args = DatabaseArgs {
            path: dir.path().join("readings.db"),
            accounts_csv: Some(seed_path),
        };
        let service = IngestService::open(&args).unwrap();
        assert_eq!(service.pipeline.cache().len(), 1);

        let outcome = handle_upload(
            &service.pipeline,
            Some("readings.csv"),
            b"AccountId,MeterReadingDateTime,MeterReadValue\n1239,17/05/2019 09:24,45522".to_vec(),
        );
        match outcome {
            UploadOutcome::Processed(result) => assert_eq!(result.committed, 1),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(service.store.reading_count().unwrap(), 1);
    }
}
