use chrono::{DateTime, SubsecRound, Utc};
use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use uuid::Uuid;

/// A single recorded page view or action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitEvent {
    pub id: String,
    pub email: String,
    pub page: String,
    #[serde(with = "iso_millis")]
    pub timestamp: DateTime<Utc>,
}

impl VisitEvent {
    /// The timestamp is cut to whole milliseconds, the precision it is stored at.
    pub fn new(email: impl Into<String>, page: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: email.into(),
            page: page.into(),
            timestamp: timestamp.trunc_subsecs(3),
        }
    }
}

/// Per-user visit history keyed by email.
///
/// Users keep the order in which they were first seen, and each user's
/// events keep append order. The JSON form is a plain object
/// `{ "<email>": [event, ...] }` whose key order follows the same rule.
#[derive(Debug, Clone, Default)]
pub struct VisitLedger {
    users: Vec<(String, Vec<VisitEvent>)>,
    index: HashMap<String, usize>,
}

impl VisitLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    pub fn event_count(&self) -> usize {
        self.users.iter().map(|(_, events)| events.len()).sum()
    }

    /// Appends under the event's own email, creating the user if needed.
    pub fn append(&mut self, event: VisitEvent) {
        match self.index.get(&event.email) {
            Some(&slot) => self.users[slot].1.push(event),
            None => {
                self.index.insert(event.email.clone(), self.users.len());
                self.users.push((event.email.clone(), vec![event]));
            }
        }
    }

    pub fn events_for(&self, email: &str) -> &[VisitEvent] {
        self.index
            .get(email)
            .map(|&slot| self.users[slot].1.as_slice())
            .unwrap_or(&[])
    }

    pub fn users(&self) -> impl Iterator<Item = (&str, &[VisitEvent])> {
        self.users
            .iter()
            .map(|(email, events)| (email.as_str(), events.as_slice()))
    }

    /// All events, users in insertion order then events in append order.
    pub fn events(&self) -> impl Iterator<Item = &VisitEvent> {
        self.users.iter().flat_map(|(_, events)| events.iter())
    }

    /// Rewrites each user's events in place; users left with none are dropped.
    pub(crate) fn prune_users<F>(&mut self, mut prune: F)
    where
        F: FnMut(&mut Vec<VisitEvent>),
    {
        for (_, events) in &mut self.users {
            prune(events);
        }
        let before = self.users.len();
        self.users.retain(|(_, events)| !events.is_empty());
        if self.users.len() != before {
            self.reindex();
        }
    }

    fn reindex(&mut self) {
        self.index = self
            .users
            .iter()
            .enumerate()
            .map(|(slot, (email, _))| (email.clone(), slot))
            .collect();
    }
}

impl PartialEq for VisitLedger {
    fn eq(&self, other: &Self) -> bool {
        self.users == other.users
    }
}

impl Eq for VisitLedger {}

impl Serialize for VisitLedger {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.users.len()))?;
        for (email, events) in &self.users {
            map.serialize_entry(email, events)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for VisitLedger {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(LedgerVisitor)
    }
}

struct LedgerVisitor;

impl<'de> Visitor<'de> for LedgerVisitor {
    type Value = VisitLedger;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a map of email to visit events")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<VisitLedger, A::Error> {
        let mut ledger = VisitLedger::default();
        while let Some((email, events)) = access.next_entry::<String, Vec<VisitEvent>>()? {
            if let Some(stray) = events.iter().find(|event| event.email != email) {
                return Err(de::Error::custom(format!(
                    "event {} belongs to {} but is stored under {email}",
                    stray.id, stray.email
                )));
            }
            if ledger.index.contains_key(&email) {
                return Err(de::Error::custom(format!("duplicate ledger key {email}")));
            }
            ledger.index.insert(email.clone(), ledger.users.len());
            ledger.users.push((email, events));
        }
        Ok(ledger)
    }
}

/// Either one user's events or the whole ledger.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum History {
    User(Vec<VisitEvent>),
    All(VisitLedger),
}

#[derive(Debug, Deserialize)]
pub struct VisitRequest {
    pub email: String,
    #[serde(alias = "page")]
    pub action: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardSummary {
    pub total_visitors: usize,
    pub active_users: usize,
    pub total_page_views: usize,
    pub page_visit_counts: BTreeMap<String, u64>,
    pub recent_visits: Vec<VisitEvent>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TimelinePoint {
    pub index: usize,
    #[serde(with = "iso_millis")]
    pub timestamp: DateTime<Utc>,
    pub email: String,
    pub page: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserSummary {
    pub email: String,
    pub visit_count: usize,
    #[serde(with = "iso_millis::option")]
    pub first_visit: Option<DateTime<Utc>>,
    #[serde(with = "iso_millis::option")]
    pub last_visit: Option<DateTime<Utc>>,
    pub last_page: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct VisitorCountResponse {
    pub unique_visitors: usize,
}

#[derive(Debug, Serialize)]
pub struct ActiveUsersResponse {
    pub window_hours: f64,
    pub active_users: usize,
}

/// ISO-8601 timestamps with millisecond precision and a `Z` suffix.
pub mod iso_millis {
    use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
    use serde::{Deserialize, Deserializer, Serializer, de};

    pub fn format(timestamp: &DateTime<Utc>) -> String {
        timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    pub fn parse(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
        DateTime::parse_from_rfc3339(raw).map(|parsed| parsed.with_timezone(&Utc).trunc_subsecs(3))
    }

    pub fn serialize<S: Serializer>(timestamp: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format(timestamp))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).map_err(de::Error::custom)
    }

    pub mod option {
        use chrono::{DateTime, Utc};
        use serde::Serializer;

        pub fn serialize<S: Serializer>(
            timestamp: &Option<DateTime<Utc>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match timestamp {
                Some(timestamp) => super::serialize(timestamp, serializer),
                None => serializer.serialize_none(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, hour, 0, 0).unwrap()
    }

    #[test]
    fn ledger_round_trips_through_json_keeping_user_order() {
        let mut ledger = VisitLedger::new();
        ledger.append(VisitEvent::new("zed@x.com", "Home page", at(9)));
        ledger.append(VisitEvent::new("amy@x.com", "About page", at(10)));
        ledger.append(VisitEvent::new("zed@x.com", "Login", at(11)));

        let json = serde_json::to_string(&ledger).unwrap();
        assert!(json.find("zed@x.com").unwrap() < json.find("amy@x.com").unwrap());

        let decoded: VisitLedger = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, ledger);
        let users: Vec<&str> = decoded.users().map(|(email, _)| email).collect();
        assert_eq!(users, vec!["zed@x.com", "amy@x.com"]);
        assert_eq!(decoded.events_for("zed@x.com").len(), 2);
    }

    #[test]
    fn sub_millisecond_timestamps_survive_a_round_trip() {
        let precise = at(12) + chrono::Duration::nanoseconds(123_456_789);
        let mut ledger = VisitLedger::new();
        ledger.append(VisitEvent::new("u1", "Home page", precise));
        ledger.append(VisitEvent::new("u2", "About page", Utc::now()));

        let stamp = ledger.events_for("u1")[0].timestamp;
        assert_eq!(iso_millis::format(&stamp), "2024-05-01T12:00:00.123Z");
        assert_eq!(stamp.timestamp_subsec_nanos(), 123_000_000);

        let json = serde_json::to_string(&ledger).unwrap();
        let decoded: VisitLedger = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, ledger);
    }

    #[test]
    fn timestamps_use_iso_millis() {
        let event = VisitEvent::new("u1", "Home page", at(10));
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["timestamp"], "2024-05-01T10:00:00.000Z");
    }

    #[test]
    fn reads_records_written_by_browsers() {
        let raw = r#"{"u1":[{"id":"k3j9x0a1b","email":"u1","page":"Home page","timestamp":"2024-05-01T10:00:00.123Z"}]}"#;
        let ledger: VisitLedger = serde_json::from_str(raw).unwrap();
        let events = ledger.events_for("u1");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, "k3j9x0a1b");
        assert_eq!(iso_millis::format(&events[0].timestamp), "2024-05-01T10:00:00.123Z");
    }

    #[test]
    fn rejects_events_filed_under_another_user() {
        let raw = r#"{"u1":[{"id":"a","email":"u2","page":"Home page","timestamp":"2024-05-01T10:00:00.000Z"}]}"#;
        assert!(serde_json::from_str::<VisitLedger>(raw).is_err());
    }

    #[test]
    fn prune_users_drops_emptied_users_and_reindexes() {
        let mut ledger = VisitLedger::new();
        ledger.append(VisitEvent::new("a", "Home page", at(1)));
        ledger.append(VisitEvent::new("b", "Home page", at(2)));
        ledger.prune_users(|events| events.retain(|event| event.email != "a"));

        assert_eq!(ledger.user_count(), 1);
        assert!(ledger.events_for("a").is_empty());
        ledger.append(VisitEvent::new("b", "About page", at(3)));
        assert_eq!(ledger.events_for("b").len(), 2);
    }

    #[test]
    fn visit_request_accepts_page_alias() {
        let request: VisitRequest =
            serde_json::from_str(r#"{"email":"u1","page":"Home page"}"#).unwrap();
        assert_eq!(request.action, "Home page");
    }
}
