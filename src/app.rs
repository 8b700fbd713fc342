use crate::handlers;
use crate::state::AppState;
use axum::{routing::{get, post}, Router};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route(
            "/api/visits",
            post(handlers::record_visit)
                .get(handlers::list_visits)
                .delete(handlers::clear_visits),
        )
        .route("/api/history", get(handlers::get_history))
        .route("/api/history/:email", get(handlers::get_user_history))
        .route("/api/stats/visitors", get(handlers::get_unique_visitors))
        .route("/api/stats/active", get(handlers::get_active_users))
        .route("/api/summary", get(handlers::get_summary))
        .route("/api/timeline", get(handlers::get_timeline))
        .route("/api/users", get(handlers::get_users))
        .with_state(state)
}
