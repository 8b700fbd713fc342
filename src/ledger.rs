//! The visit ledger service.
//!
//! The whole ledger lives in one storage key as JSON. Every append reads
//! the record, mutates it and writes it back in full. A missing record is
//! created empty on first access. When the substrate is unavailable, reads
//! come back empty and writes do nothing.

use crate::errors::{LedgerError, StorageError};
use crate::models::{History, VisitEvent, VisitLedger};
use crate::stats;
use crate::storage::KeyValueStore;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, error, info, warn};

pub const STORAGE_KEY: &str = "userHistory";
pub const CORRUPT_KEY: &str = "userHistory.corrupt";

const EMPTY_LEDGER: &str = "{}";

/// Bounds on ledger growth. Both limits are off by default.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Events at or before `now - max_age` are dropped.
    pub max_age: Option<Duration>,
    /// Each user keeps at most this many of their newest events.
    pub max_events_per_user: Option<usize>,
}

impl RetentionPolicy {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn is_unbounded(&self) -> bool {
        self.max_age.is_none() && self.max_events_per_user.is_none()
    }

    /// Returns how many events were removed.
    pub fn apply(&self, ledger: &mut VisitLedger, now: DateTime<Utc>) -> usize {
        if self.is_unbounded() {
            return 0;
        }
        let before = ledger.event_count();
        let cutoff = self.max_age.and_then(|age| now.checked_sub_signed(age));
        ledger.prune_users(|events| {
            if let Some(cutoff) = cutoff {
                events.retain(|event| event.timestamp > cutoff);
            }
            if let Some(max) = self.max_events_per_user {
                if events.len() > max {
                    let excess = events.len() - max;
                    events.drain(..excess);
                }
            }
        });
        before - ledger.event_count()
    }
}

pub struct VisitLedgerStore<S> {
    store: S,
    retention: RetentionPolicy,
}

impl<S: KeyValueStore> VisitLedgerStore<S> {
    pub fn new(store: S) -> Self {
        Self::with_retention(store, RetentionPolicy::unbounded())
    }

    pub fn with_retention(store: S, retention: RetentionPolicy) -> Self {
        Self { store, retention }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn retention(&self) -> &RetentionPolicy {
        &self.retention
    }

    pub fn record_visit(&mut self, email: &str, action: &str) -> Result<Option<VisitEvent>, LedgerError> {
        self.record_visit_at(email, action, Utc::now())
    }

    /// Appends a visit stamped `now`. Returns `None` when storage is unavailable.
    pub fn record_visit_at(
        &mut self,
        email: &str,
        action: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<VisitEvent>, LedgerError> {
        let mut ledger = match self.load() {
            Ok(ledger) => ledger,
            Err(StorageError::Unavailable) => {
                debug!(email, "storage unavailable, visit not recorded");
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        };

        let event = VisitEvent::new(email, action, now);
        ledger.append(event.clone());

        let pruned = self.retention.apply(&mut ledger, now);
        if pruned > 0 {
            debug!(pruned, "retention dropped visit events");
        }

        self.persist(&ledger)?;
        debug!(email, page = action, id = %event.id, "visit recorded");
        Ok(Some(event))
    }

    /// One user's events when `email` is given, otherwise the whole ledger.
    pub fn history(&mut self, email: Option<&str>) -> History {
        match email {
            Some(email) => History::User(self.history_for(email)),
            None => History::All(self.ledger()),
        }
    }

    pub fn history_for(&mut self, email: &str) -> Vec<VisitEvent> {
        self.ledger().events_for(email).to_vec()
    }

    pub fn ledger(&mut self) -> VisitLedger {
        match self.load() {
            Ok(ledger) => ledger,
            Err(StorageError::Unavailable) => VisitLedger::default(),
            Err(err) => {
                error!("failed to read visit ledger: {err}");
                VisitLedger::default()
            }
        }
    }

    pub fn all_visits(&mut self) -> Vec<VisitEvent> {
        self.ledger().events().cloned().collect()
    }

    pub fn unique_visitor_count(&mut self) -> usize {
        stats::unique_visitors(&self.ledger())
    }

    pub fn active_user_count(&mut self, window: Duration) -> usize {
        self.active_user_count_at(window, Utc::now())
    }

    pub fn active_user_count_at(&mut self, window: Duration, now: DateTime<Utc>) -> usize {
        stats::active_users(&self.ledger(), window, now)
    }

    pub fn clear(&mut self) -> Result<(), LedgerError> {
        match self.store.set(STORAGE_KEY, EMPTY_LEDGER) {
            Ok(()) => {
                info!("visit ledger cleared");
                Ok(())
            }
            Err(StorageError::Unavailable) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn load(&mut self) -> Result<VisitLedger, StorageError> {
        match self.store.get(STORAGE_KEY)? {
            Some(raw) => match serde_json::from_str(&raw) {
                Ok(ledger) => Ok(ledger),
                Err(err) => {
                    error!("failed to parse visit ledger: {err}");
                    self.quarantine(&raw)?;
                    Ok(VisitLedger::default())
                }
            },
            None => {
                debug!("initializing empty visit ledger");
                self.store.set(STORAGE_KEY, EMPTY_LEDGER)?;
                Ok(VisitLedger::default())
            }
        }
    }

    // Keeps the unreadable record under CORRUPT_KEY; the next access starts empty.
    fn quarantine(&mut self, raw: &str) -> Result<(), StorageError> {
        warn!(key = CORRUPT_KEY, bytes = raw.len(), "moving unreadable visit ledger aside");
        self.store.set(CORRUPT_KEY, raw)?;
        self.store.remove(STORAGE_KEY)
    }

    fn persist(&mut self, ledger: &VisitLedger) -> Result<(), LedgerError> {
        let payload = serde_json::to_string(ledger)?;
        self.store.set(STORAGE_KEY, &payload)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{FileStore, MemoryStore, UnavailableStore};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 5, 12, 0, 0).unwrap()
    }

    fn memory_ledger() -> VisitLedgerStore<MemoryStore> {
        VisitLedgerStore::new(MemoryStore::new())
    }

    #[test]
    fn records_and_counts_the_reference_scenario() {
        let mut ledger = memory_ledger();
        ledger.record_visit("u1", "Home page").unwrap();
        ledger.record_visit("u1", "About page").unwrap();
        ledger.record_visit("u2", "Home page").unwrap();

        assert_eq!(ledger.unique_visitor_count(), 2);
        assert_eq!(ledger.all_visits().len(), 3);
        let pages: Vec<String> = ledger.history_for("u1").into_iter().map(|e| e.page).collect();
        assert_eq!(pages, vec!["Home page", "About page"]);
    }

    #[test]
    fn history_keeps_append_order() {
        let mut ledger = memory_ledger();
        let actions = ["Login", "Home page", "Maharashtra", "Logout", "Home page"];
        for (offset, action) in actions.iter().enumerate() {
            ledger
                .record_visit_at("a@x.com", action, now() + Duration::seconds(offset as i64))
                .unwrap();
        }

        let history = ledger.history_for("a@x.com");
        assert_eq!(history.len(), actions.len());
        for (event, action) in history.iter().zip(actions) {
            assert_eq!(event.page, action);
            assert_eq!(event.email, "a@x.com");
        }
    }

    #[test]
    fn users_are_isolated() {
        let mut ledger = memory_ledger();
        ledger.record_visit("a@x.com", "Home page").unwrap();
        ledger.record_visit("a@x.com", "About page").unwrap();

        assert!(ledger.history_for("b@x.com").is_empty());
        ledger.record_visit("b@x.com", "Contact").unwrap();
        let history = ledger.history_for("b@x.com");
        assert_eq!(history.len(), 1);
        assert!(history.iter().all(|event| event.email == "b@x.com"));
    }

    #[test]
    fn history_without_email_returns_the_ledger() {
        let mut ledger = memory_ledger();
        ledger.record_visit("u1", "Home page").unwrap();

        match ledger.history(None) {
            History::All(all) => assert_eq!(all.user_count(), 1),
            other => panic!("expected full ledger, got {other:?}"),
        }
        match ledger.history(Some("nobody")) {
            History::User(events) => assert!(events.is_empty()),
            other => panic!("expected user history, got {other:?}"),
        }
    }

    #[test]
    fn event_ids_are_unique() {
        let mut ledger = memory_ledger();
        for _ in 0..200 {
            ledger.record_visit("u1", "Home page").unwrap();
        }
        let mut ids: Vec<String> = ledger.all_visits().into_iter().map(|e| e.id).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 200);
    }

    #[test]
    fn first_read_initializes_the_record() {
        let mut ledger = memory_ledger();
        assert_eq!(ledger.store().get(STORAGE_KEY).unwrap(), None);

        assert!(ledger.all_visits().is_empty());
        assert_eq!(ledger.store().get(STORAGE_KEY).unwrap().as_deref(), Some("{}"));
    }

    #[test]
    fn clear_is_idempotent() {
        let mut ledger = memory_ledger();
        ledger.record_visit("u1", "Home page").unwrap();
        ledger.record_visit("u2", "Home page").unwrap();

        ledger.clear().unwrap();
        assert!(ledger.all_visits().is_empty());
        assert_eq!(ledger.unique_visitor_count(), 0);

        ledger.clear().unwrap();
        assert!(ledger.all_visits().is_empty());
        assert_eq!(ledger.store().get(STORAGE_KEY).unwrap().as_deref(), Some("{}"));
    }

    #[test]
    fn unique_visitors_reset_after_clear() {
        let mut ledger = memory_ledger();
        ledger.record_visit("u1", "Home page").unwrap();
        ledger.clear().unwrap();
        ledger.record_visit("u3", "Home page").unwrap();
        ledger.record_visit("u3", "About page").unwrap();
        assert_eq!(ledger.unique_visitor_count(), 1);
    }

    #[test]
    fn active_users_window_at_fixed_instant() {
        let mut ledger = memory_ledger();
        ledger.record_visit_at("u1", "Home page", now() - Duration::hours(25)).unwrap();
        ledger.record_visit_at("u1", "About page", now() - Duration::hours(1)).unwrap();
        ledger.record_visit_at("u2", "Home page", now() - Duration::hours(24)).unwrap();

        assert_eq!(ledger.active_user_count_at(Duration::hours(24), now()), 1);
        assert_eq!(ledger.active_user_count_at(Duration::hours(48), now()), 2);
    }

    #[test]
    fn unavailable_storage_degrades_silently() {
        let mut ledger = VisitLedgerStore::new(UnavailableStore);
        assert!(ledger.record_visit("u1", "Home page").unwrap().is_none());
        assert!(ledger.all_visits().is_empty());
        assert!(ledger.history_for("u1").is_empty());
        assert_eq!(ledger.unique_visitor_count(), 0);
        assert_eq!(ledger.active_user_count(Duration::hours(24)), 0);
        ledger.clear().unwrap();
    }

    #[test]
    fn corrupt_record_is_moved_aside() {
        let mut store = MemoryStore::new();
        store.set(STORAGE_KEY, "{not json").unwrap();
        let mut ledger = VisitLedgerStore::new(store);

        assert!(ledger.all_visits().is_empty());
        assert_eq!(ledger.store().get(CORRUPT_KEY).unwrap().as_deref(), Some("{not json"));

        ledger.record_visit("u1", "Home page").unwrap();
        assert_eq!(ledger.all_visits().len(), 1);
        assert_eq!(ledger.store().get(CORRUPT_KEY).unwrap().as_deref(), Some("{not json"));
    }

    #[test]
    fn retention_caps_events_per_user() {
        let retention = RetentionPolicy {
            max_age: None,
            max_events_per_user: Some(2),
        };
        let mut ledger = VisitLedgerStore::with_retention(MemoryStore::new(), retention);
        for page in ["one", "two", "three"] {
            ledger.record_visit("u1", page).unwrap();
        }
        ledger.record_visit("u2", "solo").unwrap();

        let pages: Vec<String> = ledger.history_for("u1").into_iter().map(|e| e.page).collect();
        assert_eq!(pages, vec!["two", "three"]);
        assert_eq!(ledger.history_for("u2").len(), 1);
    }

    #[test]
    fn retention_drops_expired_events_and_users() {
        let retention = RetentionPolicy {
            max_age: Some(Duration::days(30)),
            max_events_per_user: None,
        };
        let mut ledger = VisitLedgerStore::with_retention(MemoryStore::new(), retention);
        ledger.record_visit_at("old", "Home page", now() - Duration::days(40)).unwrap();
        ledger.record_visit_at("u1", "Home page", now() - Duration::days(31)).unwrap();
        ledger.record_visit_at("u1", "About page", now()).unwrap();

        assert_eq!(ledger.unique_visitor_count(), 1);
        let pages: Vec<String> = ledger.history_for("u1").into_iter().map(|e| e.page).collect();
        assert_eq!(pages, vec!["About page"]);
    }

    #[test]
    fn recorded_event_matches_what_is_read_back() {
        let mut ledger = memory_ledger();
        let precise = now() + Duration::nanoseconds(123_456_789);
        let recorded = ledger.record_visit_at("u1", "Home page", precise).unwrap().unwrap();

        assert_eq!(ledger.history_for("u1"), vec![recorded.clone()]);
        assert_eq!(recorded.timestamp, now() + Duration::milliseconds(123));

        let live = ledger.record_visit("u1", "About page").unwrap().unwrap();
        assert_eq!(ledger.history_for("u1")[1], live);
    }

    #[test]
    fn retention_cutoff_drops_the_boundary_event() {
        let policy = RetentionPolicy {
            max_age: Some(Duration::days(30)),
            max_events_per_user: None,
        };
        let mut ledger = VisitLedger::new();
        ledger.append(VisitEvent::new("edge", "Home page", now() - Duration::days(30)));
        ledger.append(VisitEvent::new(
            "inside",
            "Home page",
            now() - Duration::days(30) + Duration::milliseconds(1),
        ));

        assert_eq!(policy.apply(&mut ledger, now()), 1);
        assert!(ledger.events_for("edge").is_empty());
        assert_eq!(ledger.events_for("inside").len(), 1);
        assert_eq!(ledger.user_count(), 1);
    }

    #[test]
    fn unbounded_retention_keeps_everything() {
        let mut ledger = VisitLedger::new();
        ledger.append(VisitEvent::new("u1", "Home page", now() - Duration::days(3650)));
        assert_eq!(RetentionPolicy::unbounded().apply(&mut ledger, now()), 0);
        assert_eq!(ledger.event_count(), 1);
    }

    #[test]
    fn file_backed_ledger_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut ledger = VisitLedgerStore::new(FileStore::new(dir.path()));
            ledger.record_visit("u1", "Home page").unwrap();
            ledger.record_visit("u2", "About page").unwrap();
        }

        let mut reopened = VisitLedgerStore::new(FileStore::new(dir.path()));
        let all = reopened.all_visits();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].email, "u1");
        assert_eq!(all[1].page, "About page");
    }
}
