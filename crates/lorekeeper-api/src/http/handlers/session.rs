//! Session history HTTP handlers.
//!
//! Endpoints:
//! - GET /api/v1/sessions      - List the caller's live sessions
//! - GET /api/v1/sessions/{id} - Turns of one session owned by the caller

use std::time::Instant;

use axum::extract::{Path, Query, State};
use serde::{Deserialize, Serialize};

use lorekeeper_core::chat::history::ChatHistoryStore;
use lorekeeper_types::chat::{SessionSummary, Turn, session_belongs_to};

use crate::http::error::AppError;
use crate::http::extractors::auth::AuthUser;
use crate::http::response::ApiResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SessionListQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

#[derive(Debug, Serialize)]
pub struct SessionDetail {
    pub session_id: String,
    pub turns: Vec<Turn>,
}

/// GET /api/v1/sessions - List sessions, most recently updated first.
pub async fn list_sessions(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<SessionListQuery>,
) -> Result<ApiResponse<Vec<SessionSummary>>, AppError> {
    let start = Instant::now();

    let mut sessions = state.history.list_sessions(&user.user_id).await?;
    sessions.truncate(query.limit);

    tracing::debug!(user_id = %user.user_id, count = sessions.len(), "sessions listed");
    Ok(ApiResponse::success(sessions, start).with_link("self", "/api/v1/sessions"))
}

/// GET /api/v1/sessions/{id} - Fetch one session's turns.
///
/// A session owned by someone else answers exactly like a missing one.
pub async fn get_session(
    State(state): State<AppState>,
    user: AuthUser,
    Path(session_id): Path<String>,
) -> Result<ApiResponse<SessionDetail>, AppError> {
    let start = Instant::now();

    if !session_belongs_to(&session_id, &user.user_id) {
        tracing::warn!(
            user_id = %user.user_id,
            session_id = %session_id,
            "session fetch for foreign session id"
        );
        return Err(session_not_found(&session_id));
    }

    let turns = state.history.load(&session_id).await?;
    if turns.is_empty() {
        return Err(session_not_found(&session_id));
    }

    let href = format!("/api/v1/sessions/{session_id}");
    Ok(ApiResponse::success(SessionDetail { session_id, turns }, start)
        .with_link("self", &href)
        .with_link("sessions", "/api/v1/sessions"))
}

fn session_not_found(session_id: &str) -> AppError {
    AppError::NotFound(format!("Session '{session_id}' not found"))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    use super::*;
    use crate::state::testing::test_state;

    fn caller(user_id: &str) -> AuthUser {
        AuthUser {
            user_id: user_id.to_string(),
        }
    }

    async fn seeded_state(dir: &std::path::Path) -> AppState {
        let state = test_state(dir).await;
        let session = "u1-morning";
        state
            .history
            .append(
                session,
                "u1",
                &[
                    Turn::user(session, "Who runs the inn?"),
                    Turn::assistant(session, "Mira keeps the Wicker Goat."),
                ],
                3600,
            )
            .await
            .unwrap();
        state
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_list_sessions_only_returns_callers_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let state = seeded_state(dir.path()).await;

        let mine = list_sessions(
            State(state.clone()),
            caller("u1"),
            Query(SessionListQuery { limit: 50 }),
        )
        .await
        .unwrap();
        let json = body_json(mine.into_response()).await;
        assert_eq!(json["data"][0]["session_id"], "u1-morning");
        assert_eq!(json["data"][0]["message_count"], 2);

        let theirs = list_sessions(
            State(state),
            caller("u2"),
            Query(SessionListQuery { limit: 50 }),
        )
        .await
        .unwrap();
        let json = body_json(theirs.into_response()).await;
        assert_eq!(json["data"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_get_own_session_returns_turns() {
        let dir = tempfile::tempdir().unwrap();
        let state = seeded_state(dir.path()).await;

        let response = get_session(State(state), caller("u1"), Path("u1-morning".to_string()))
            .await
            .unwrap();
        let json = body_json(response.into_response()).await;
        assert_eq!(json["data"]["turns"][1]["content"], "Mira keeps the Wicker Goat.");
        assert_eq!(json["_links"]["self"], "/api/v1/sessions/u1-morning");
    }

    #[tokio::test]
    async fn test_foreign_session_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let state = seeded_state(dir.path()).await;

        let err = get_session(State(state), caller("u2"), Path("u1-morning".to_string()))
            .await
            .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unknown_session_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let state = seeded_state(dir.path()).await;

        let err = get_session(State(state), caller("u1"), Path("u1-evening".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
