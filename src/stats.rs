use crate::models::{DashboardSummary, TimelinePoint, UserSummary, VisitEvent, VisitLedger};
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;

// Dashboard defaults; the service overrides them through `Config`.
pub const DEFAULT_ACTIVE_WINDOW_HOURS: i64 = 24;
pub const SUMMARY_RECENT_LIMIT: usize = 10;
pub const TIMELINE_LIMIT: usize = 50;

pub fn default_active_window() -> Duration {
    Duration::hours(DEFAULT_ACTIVE_WINDOW_HOURS)
}

pub fn unique_visitors(ledger: &VisitLedger) -> usize {
    ledger.user_count()
}

/// Users with at least one event strictly after `now - window`.
pub fn active_users(ledger: &VisitLedger, window: Duration, now: DateTime<Utc>) -> usize {
    let Some(cutoff) = now.checked_sub_signed(window) else {
        return ledger.users().filter(|(_, events)| !events.is_empty()).count();
    };
    ledger
        .users()
        .filter(|(_, events)| events.iter().any(|event| event.timestamp > cutoff))
        .count()
}

pub fn page_visit_counts(ledger: &VisitLedger) -> BTreeMap<String, u64> {
    let mut counts = BTreeMap::new();
    for event in ledger.events() {
        let count = counts.entry(event.page.clone()).or_insert(0u64);
        *count = count.saturating_add(1);
    }
    counts
}

/// Every event, newest timestamp first. Equal timestamps come out in reverse ledger order.
pub fn visits_most_recent_first(ledger: &VisitLedger) -> Vec<VisitEvent> {
    let mut visits: Vec<VisitEvent> = ledger.events().cloned().collect();
    visits.reverse();
    visits.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    visits
}

pub fn recent_visits(ledger: &VisitLedger, limit: usize) -> Vec<VisitEvent> {
    let mut visits = visits_most_recent_first(ledger);
    visits.truncate(limit);
    visits
}

/// The `limit` newest events, oldest first, numbered from 1.
pub fn visit_timeline(ledger: &VisitLedger, limit: usize) -> Vec<TimelinePoint> {
    recent_visits(ledger, limit)
        .into_iter()
        .rev()
        .enumerate()
        .map(|(offset, event)| TimelinePoint {
            index: offset + 1,
            timestamp: event.timestamp,
            email: event.email,
            page: event.page,
        })
        .collect()
}

pub fn user_summaries(ledger: &VisitLedger) -> Vec<UserSummary> {
    ledger
        .users()
        .map(|(email, events)| UserSummary {
            email: email.to_string(),
            visit_count: events.len(),
            first_visit: events.iter().map(|event| event.timestamp).min(),
            last_visit: events.iter().map(|event| event.timestamp).max(),
            last_page: events.last().map(|event| event.page.clone()),
        })
        .collect()
}

pub fn compute_dashboard_summary(
    ledger: &VisitLedger,
    now: DateTime<Utc>,
    active_window: Duration,
    recent_limit: usize,
) -> DashboardSummary {
    DashboardSummary {
        total_visitors: unique_visitors(ledger),
        active_users: active_users(ledger, active_window, now),
        total_page_views: ledger.event_count(),
        page_visit_counts: page_visit_counts(ledger),
        recent_visits: recent_visits(ledger, recent_limit),
    }
}
