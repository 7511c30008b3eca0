// Account Cache - lock-free snapshot of known account ids
//
// Readers load an Arc to an immutable set. Refresh builds a fresh set and
// swaps the pointer, so a snapshot taken before a refresh stays intact.

use crate::domain::AccountId;
use crate::faults::FaultLogger;
use crate::store::RecordStore;
use anyhow::Context;
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

pub type AccountSnapshot = Arc<HashSet<AccountId>>;

pub struct AccountCache {
    store: Arc<dyn RecordStore>,
    faults: Arc<dyn FaultLogger>,
    ids: ArcSwap<HashSet<AccountId>>,
    // Held from query to swap so refreshes publish in the order they read
    refresh_lock: Mutex<()>,
}

impl AccountCache {
    /// Starts empty; call `refresh` once the store has accounts
    pub fn new(store: Arc<dyn RecordStore>, faults: Arc<dyn FaultLogger>) -> Self {
        AccountCache {
            store,
            faults,
            ids: ArcSwap::from_pointee(HashSet::new()),
            refresh_lock: Mutex::new(()),
        }
    }

    /// Current set as of the last successful refresh. Never blocks, never refreshes.
    pub fn snapshot(&self) -> AccountSnapshot {
        self.ids.load_full()
    }

    /// Reload every account id from the store and swap it in.
    ///
    /// Returns `false` if the store query failed; the previous snapshot is
    /// kept and the error goes to the fault logger.
    pub fn refresh(&self) -> bool {
        let _guard = self.refresh_lock.lock();
        match self
            .store
            .query_account_ids()
            .context("Failed to refresh account cache")
        {
            Ok(ids) => {
                let count = ids.len();
                self.ids.store(Arc::new(ids));
                info!(accounts = count, "account cache refreshed");
                true
            }
            Err(e) => {
                self.faults.log_exception(&e, Some("account cache refresh"));
                false
            }
        }
    }

    pub fn len(&self) -> usize {
        self.ids.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
