use crate::config::Config;
use crate::errors::AppError;
use crate::ledger::VisitLedgerStore;
use crate::storage::FileStore;
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub ledger: Arc<Mutex<VisitLedgerStore<FileStore>>>,
}

impl AppState {
    pub fn new(config: Config, ledger: VisitLedgerStore<FileStore>) -> Self {
        Self {
            config: Arc::new(config),
            ledger: Arc::new(Mutex::new(ledger)),
        }
    }

    /// Runs `work` against the ledger on the blocking pool; ledger calls do synchronous file i/o.
    pub async fn with_ledger<T, F>(&self, work: F) -> Result<T, AppError>
    where
        F: FnOnce(&mut VisitLedgerStore<FileStore>) -> T + Send + 'static,
        T: Send + 'static,
    {
        let ledger = Arc::clone(&self.ledger);
        tokio::task::spawn_blocking(move || {
            // Every operation re-reads the persisted record, so a poisoned guard holds no stale state.
            let mut guard = ledger.lock().unwrap_or_else(PoisonError::into_inner);
            work(&mut guard)
        })
        .await
        .map_err(AppError::internal)
    }
}
