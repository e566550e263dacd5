//! Axum router configuration with middleware.
//!
//! The chat socket lives at `/ws`, REST routes under `/api/v1/`.
//! Middleware: CORS, HTTP tracing.

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::http::handlers;
use crate::state::AppState;

/// Build the complete router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/sessions", get(handlers::session::list_sessions))
        .route("/sessions/{id}", get(handlers::session::get_session));

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/ws", get(handlers::ws::ws_handler))
        .route("/health", get(health_check))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health - Liveness plus a database check (no auth required).
async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let database_ok = state.db_pool.ping().await;

    let status = if database_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(serde_json::json!({
            "status": if database_ok { "ok" } else { "degraded" },
            "version": env!("CARGO_PKG_VERSION"),
            "database": database_ok,
            "connections": state.hub.len(),
        })),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::testing::test_state;

    #[tokio::test]
    async fn test_health_reports_ok() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path()).await;

        let (status, Json(body)) = health_check(State(state)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["connections"], 0);
    }

    #[tokio::test]
    async fn test_router_builds() {
        let dir = tempfile::tempdir().unwrap();
        let _router = build_router(test_state(dir.path()).await);
    }
}
