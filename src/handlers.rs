use crate::errors::AppError;
use crate::models::{
    ActiveUsersResponse, DashboardSummary, History, TimelinePoint, UserSummary, VisitEvent, VisitLedger,
    VisitRequest, VisitorCountResponse,
};
use crate::state::AppState;
use crate::stats::{
    active_users, compute_dashboard_summary, unique_visitors, user_summaries, visit_timeline,
    visits_most_recent_first,
};
use crate::ui::render_index;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use chrono::{Duration, Utc};
use serde::Deserialize;
use tracing::info;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisitOrder {
    #[default]
    Ledger,
    Recent,
}

#[derive(Debug, Deserialize)]
pub struct VisitsQuery {
    #[serde(default)]
    pub order: VisitOrder,
}

#[derive(Debug, Deserialize)]
pub struct ActiveQuery {
    pub window_hours: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

pub async fn index(State(state): State<AppState>) -> Result<Html<String>, AppError> {
    let ledger = state.with_ledger(|ledger| ledger.ledger()).await?;
    let summary = summarize(&state, &ledger, state.config.recent_limit);
    Ok(Html(render_index(&summary, state.config.active_window.num_hours())))
}

pub async fn record_visit(
    State(state): State<AppState>,
    Json(payload): Json<VisitRequest>,
) -> Result<Response, AppError> {
    let recorded = state
        .with_ledger(move |ledger| ledger.record_visit(&payload.email, &payload.action))
        .await??;

    Ok(match recorded {
        Some(event) => (StatusCode::CREATED, Json(event)).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    })
}

pub async fn list_visits(
    State(state): State<AppState>,
    Query(query): Query<VisitsQuery>,
) -> Result<Json<Vec<VisitEvent>>, AppError> {
    let visits = state
        .with_ledger(move |ledger| match query.order {
            VisitOrder::Ledger => ledger.all_visits(),
            VisitOrder::Recent => visits_most_recent_first(&ledger.ledger()),
        })
        .await?;
    Ok(Json(visits))
}

pub async fn clear_visits(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    state.with_ledger(|ledger| ledger.clear()).await??;
    info!("visit history reset through the admin api");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_history(State(state): State<AppState>) -> Result<Json<History>, AppError> {
    let history = state.with_ledger(|ledger| ledger.history(None)).await?;
    Ok(Json(history))
}

pub async fn get_user_history(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> Result<Json<History>, AppError> {
    let history = state
        .with_ledger(move |ledger| ledger.history(Some(email.as_str())))
        .await?;
    Ok(Json(history))
}

pub async fn get_unique_visitors(
    State(state): State<AppState>,
) -> Result<Json<VisitorCountResponse>, AppError> {
    let ledger = state.with_ledger(|ledger| ledger.ledger()).await?;
    Ok(Json(VisitorCountResponse {
        unique_visitors: unique_visitors(&ledger),
    }))
}

pub async fn get_active_users(
    State(state): State<AppState>,
    Query(query): Query<ActiveQuery>,
) -> Result<Json<ActiveUsersResponse>, AppError> {
    let window = match query.window_hours {
        Some(hours) => hours_to_window(hours)?,
        None => state.config.active_window,
    };
    let ledger = state.with_ledger(|ledger| ledger.ledger()).await?;

    Ok(Json(ActiveUsersResponse {
        window_hours: window.num_milliseconds() as f64 / 3_600_000.0,
        active_users: active_users(&ledger, window, Utc::now()),
    }))
}

pub async fn get_summary(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<DashboardSummary>, AppError> {
    let ledger = state.with_ledger(|ledger| ledger.ledger()).await?;
    let limit = query.limit.unwrap_or(state.config.recent_limit);
    Ok(Json(summarize(&state, &ledger, limit)))
}

pub async fn get_timeline(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<TimelinePoint>>, AppError> {
    let ledger = state.with_ledger(|ledger| ledger.ledger()).await?;
    let limit = query.limit.unwrap_or(state.config.timeline_limit);
    Ok(Json(visit_timeline(&ledger, limit)))
}

pub async fn get_users(State(state): State<AppState>) -> Result<Json<Vec<UserSummary>>, AppError> {
    let ledger = state.with_ledger(|ledger| ledger.ledger()).await?;
    Ok(Json(user_summaries(&ledger)))
}

fn summarize(state: &AppState, ledger: &VisitLedger, recent_limit: usize) -> DashboardSummary {
    compute_dashboard_summary(ledger, Utc::now(), state.config.active_window, recent_limit)
}

fn hours_to_window(hours: f64) -> Result<Duration, AppError> {
    if !hours.is_finite() || hours < 0.0 {
        return Err(AppError::bad_request("window_hours must be a non-negative number"));
    }
    let millis = (hours * 3_600_000.0).round();
    if millis > i64::MAX as f64 {
        return Err(AppError::bad_request("window_hours is too large"));
    }
    Duration::try_milliseconds(millis as i64)
        .ok_or_else(|| AppError::bad_request("window_hours is too large"))
}
