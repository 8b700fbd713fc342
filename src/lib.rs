pub mod app;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod ledger;
pub mod models;
pub mod stats;
pub mod storage;
pub mod ui;
pub mod state;

pub use app::router;
pub use config::Config;
pub use errors::{LedgerError, StorageError};
pub use ledger::{RetentionPolicy, VisitLedgerStore};
pub use models::{History, VisitEvent, VisitLedger};
pub use state::AppState;
pub use storage::{FileStore, KeyValueStore, MemoryStore, UnavailableStore};
