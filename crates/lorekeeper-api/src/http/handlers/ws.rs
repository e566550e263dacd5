//! Chat WebSocket handler.
//!
//! `GET /ws?token=<jwt>` is authorized before the upgrade. Each socket gets
//! a connection id, a hub outbox drained by a writer task, and a persisted
//! connection record for as long as it stays open. Chat messages run in
//! their own task so a long turn never blocks pings on the same socket.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use lorekeeper_core::agent::OrchestratorError;
use lorekeeper_core::auth::ConnectionRequest;
use lorekeeper_core::connection::{ConnectionLifecycle, ConnectionStore};
use lorekeeper_core::delivery::StreamingDelivery;
use lorekeeper_types::chat::session_belongs_to;
use lorekeeper_types::message::{ChatRequest, InboundFrame, OutboundFrame};

use crate::http::error::AppError;
use crate::http::extractors::auth::authorize;
use crate::hub::ConnectionHub;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct WsParams {
    pub token: Option<String>,
}

/// GET /ws - Authorize, then upgrade to the chat socket.
pub async fn ws_handler(
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<Response, AppError> {
    let authorization = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    let request = ConnectionRequest {
        query_token: params.token.as_deref(),
        authorization,
    };
    let user = authorize(&state, &request).await?;

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, user.user_id)))
}

async fn handle_socket(socket: WebSocket, state: AppState, user_id: String) {
    let connection_id = Uuid::now_v7().to_string();
    let (mut sink, mut stream) = socket.split();

    let mut outbox = open_connection(state.lifecycle.as_ref(), &state.hub, &connection_id, &user_id).await;

    let writer_id = connection_id.clone();
    let writer = tokio::spawn(async move {
        while let Some(frame) = outbox.recv().await {
            let text = match serde_json::to_string(&frame) {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!(connection_id = %writer_id, error = %e, "frame serialization failed");
                    continue;
                }
            };
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => {
                handle_frame(&state, &user_id, &connection_id, text.as_str()).await;
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(%connection_id, error = %e, "socket read failed");
                break;
            }
        }
    }

    state.hub.unregister(&connection_id);
    writer.abort();
    if let Err(e) = state.lifecycle.on_disconnect(&connection_id).await {
        tracing::warn!(%connection_id, error = %e, "connection record not removed");
    }
}

/// Register the socket with the hub and record it in the connection store.
///
/// The socket is already authorized and upgraded at this point, so a store
/// failure only leaves it out of `session_updated` fan-out.
async fn open_connection<C: ConnectionStore>(
    lifecycle: &ConnectionLifecycle<C>,
    hub: &ConnectionHub,
    connection_id: &str,
    user_id: &str,
) -> mpsc::UnboundedReceiver<OutboundFrame> {
    let outbox = hub.register(connection_id);
    if let Err(e) = lifecycle.on_connect(connection_id, user_id).await {
        tracing::warn!(
            connection_id,
            user_id,
            error = %e,
            "connection record not stored, socket stays open without fan-out"
        );
    }
    outbox
}

/// Decode one inbound text frame, or the error frame to answer it with.
pub fn parse_frame(raw: &str) -> Result<InboundFrame, OutboundFrame> {
    let frame: InboundFrame = serde_json::from_str(raw)
        .map_err(|_| OutboundFrame::Error("Invalid message format".to_string()))?;

    if let InboundFrame::Chat(request) = &frame {
        let missing = request.missing_fields();
        if !missing.is_empty() {
            return Err(OutboundFrame::Error(format!(
                "Missing required fields: {}",
                missing.join(", ")
            )));
        }
    }
    Ok(frame)
}

async fn handle_frame(state: &AppState, user_id: &str, connection_id: &str, raw: &str) {
    match parse_frame(raw) {
        Ok(InboundFrame::Ping) => reply(state, connection_id, OutboundFrame::Pong).await,
        Ok(InboundFrame::Chat(request)) => {
            // Rejected before touching the session lock, so a foreign id
            // never queues behind its owner's turn.
            if !session_belongs_to(&request.session_id, user_id) {
                tracing::warn!(
                    user_id,
                    session_id = %request.session_id,
                    "message rejected: session does not belong to caller"
                );
                let err = OrchestratorError::SessionUnauthorized {
                    session_id: request.session_id,
                };
                reply(state, connection_id, OutboundFrame::Error(err.client_message().to_string()))
                    .await;
                return;
            }
            tokio::spawn(run_chat(
                state.clone(),
                user_id.to_string(),
                connection_id.to_string(),
                request,
            ));
        }
        Err(frame) => {
            tracing::debug!(%connection_id, "rejected inbound frame");
            reply(state, connection_id, frame).await;
        }
    }
}

async fn reply(state: &AppState, connection_id: &str, frame: OutboundFrame) {
    if let Err(e) = state.hub.send(connection_id, frame).await {
        tracing::debug!(%connection_id, error = %e, "reply not delivered");
    }
}

/// Run one chat turn under the session lock and the invocation timeout.
async fn run_chat(state: AppState, user_id: String, connection_id: String, request: ChatRequest) {
    let lock = state.session_lock(&request.session_id);
    {
        let _guard = lock.lock().await;
        let turn = tokio::time::timeout(
            state.invocation_timeout,
            state.orchestrator.handle_message(
                &user_id,
                &connection_id,
                &request,
                state.hub.as_ref(),
            ),
        )
        .await;

        match turn {
            Ok(Ok(outcome)) => {
                tracing::info!(
                    %user_id,
                    session_id = %request.session_id,
                    tools = outcome.tool_invocations.len(),
                    answer_len = outcome.answer.len(),
                    "chat turn completed"
                );
                notify_other_connections(&state, &user_id, &connection_id, &request.session_id)
                    .await;
            }
            // The orchestrator already sent the error frame.
            Ok(Err(e)) => {
                tracing::debug!(session_id = %request.session_id, reason = ?e.reason(), "chat turn failed");
            }
            Err(_) => {
                tracing::warn!(
                    %user_id,
                    session_id = %request.session_id,
                    timeout_secs = state.invocation_timeout.as_secs(),
                    "chat turn timed out"
                );
                reply(
                    &state,
                    &connection_id,
                    OutboundFrame::Error("The request timed out. Please try again.".to_string()),
                )
                .await;
            }
        }
    }
    state.release_session_lock(&request.session_id, lock);
}

/// Tell the user's other open sockets that `session_id` has a new turn.
async fn notify_other_connections(
    state: &AppState,
    user_id: &str,
    connection_id: &str,
    session_id: &str,
) {
    let connections = match state.lifecycle.lookup_by_user(user_id).await {
        Ok(connections) => connections,
        Err(e) => {
            tracing::warn!(user_id, error = %e, "session update fan-out skipped");
            return;
        }
    };

    for other in connections.iter().filter(|c| c.as_str() != connection_id) {
        let frame = OutboundFrame::SessionUpdated {
            session_id: session_id.to_string(),
        };
        reply(state, other, frame).await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use chrono::{DateTime, Utc};
    use lorekeeper_types::connection::ConnectionRecord;
    use lorekeeper_types::error::RepositoryError;

    use super::*;
    use crate::state::testing::test_state;

    /// A connection store whose writes always fail.
    #[derive(Default)]
    struct BrokenStore {
        writes: AtomicUsize,
    }

    impl ConnectionStore for BrokenStore {
        async fn put(&self, _record: &ConnectionRecord) -> Result<(), RepositoryError> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            Err(RepositoryError::Connection)
        }

        async fn delete(&self, _connection_id: &str) -> Result<bool, RepositoryError> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            Err(RepositoryError::Connection)
        }

        async fn get(&self, _connection_id: &str) -> Result<Option<ConnectionRecord>, RepositoryError> {
            Ok(None)
        }

        async fn lookup_by_user(
            &self,
            _user_id: &str,
            _now: DateTime<Utc>,
        ) -> Result<Vec<String>, RepositoryError> {
            Ok(Vec::new())
        }

        async fn purge_expired(&self, _now: DateTime<Utc>) -> Result<u64, RepositoryError> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn test_store_failure_keeps_connection_serving() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path()).await;
        let lifecycle = ConnectionLifecycle::new(BrokenStore::default());

        let mut outbox = open_connection(&lifecycle, &state.hub, "c1", "u1").await;
        assert_eq!(lifecycle.store().writes.load(Ordering::SeqCst), 2);
        assert!(lifecycle.lookup_by_user("u1").await.unwrap().is_empty());

        handle_frame(&state, "u1", "c1", r#"{"action":"ping"}"#).await;
        assert_eq!(outbox.recv().await, Some(OutboundFrame::Pong));
    }

    #[tokio::test]
    async fn test_open_connection_records_and_registers() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path()).await;

        let _outbox = open_connection(state.lifecycle.as_ref(), &state.hub, "c1", "u1").await;
        assert_eq!(state.hub.len(), 1);
        assert_eq!(
            state.lifecycle.lookup_by_user("u1").await.unwrap(),
            vec!["c1".to_string()]
        );
    }

    #[tokio::test]
    async fn test_foreign_session_rejected_without_waiting_on_owner() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path()).await;
        let mut rx = state.hub.register("c1");

        // The owner has a turn in flight on this session.
        let owner_lock = state.session_lock("u2-xyz");
        let _owner_turn = owner_lock.lock().await;

        let frame = r#"{"action":"chat","sessionId":"u2-xyz","campaign":"saltmarsh","message":"hi"}"#;
        tokio::time::timeout(Duration::from_secs(1), handle_frame(&state, "u1", "c1", frame))
            .await
            .unwrap();

        assert_eq!(
            rx.recv().await,
            Some(OutboundFrame::Error("Invalid session".to_string()))
        );
        assert_eq!(Arc::strong_count(&owner_lock), 2);
    }

    #[test]
    fn test_parse_ping() {
        assert_eq!(parse_frame(r#"{"action":"ping"}"#), Ok(InboundFrame::Ping));
    }

    #[test]
    fn test_parse_chat() {
        let frame = parse_frame(
            r#"{"action":"chat","sessionId":"u1-a","campaign":"saltmarsh","message":"hi"}"#,
        )
        .unwrap();
        let InboundFrame::Chat(request) = frame else {
            panic!("expected chat frame");
        };
        assert_eq!(request.session_id, "u1-a");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(
            parse_frame("not json"),
            Err(OutboundFrame::Error("Invalid message format".to_string()))
        );
        assert!(parse_frame(r#"{"action":"shout"}"#).is_err());
    }

    #[test]
    fn test_parse_reports_missing_fields() {
        let err = parse_frame(
            r#"{"action":"chat","sessionId":"u1-a","campaign":"","message":"  "}"#,
        )
        .unwrap_err();
        assert_eq!(
            err,
            OutboundFrame::Error("Missing required fields: campaign, message".to_string())
        );
    }

    #[tokio::test]
    async fn test_ping_answers_pong() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path()).await;
        let mut rx = state.hub.register("c1");

        handle_frame(&state, "u1", "c1", r#"{"action":"ping"}"#).await;
        assert_eq!(rx.recv().await, Some(OutboundFrame::Pong));
    }

    #[tokio::test]
    async fn test_invalid_frame_answers_error() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path()).await;
        let mut rx = state.hub.register("c1");

        handle_frame(&state, "u1", "c1", "{").await;
        assert_eq!(rx.recv().await.map(|f| f.kind()), Some("error"));
    }

    #[tokio::test]
    async fn test_session_update_reaches_other_connections_only() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path()).await;

        let mut origin = state.hub.register("c1");
        let mut sibling = state.hub.register("c2");
        let mut stranger = state.hub.register("c3");
        state.lifecycle.on_connect("c1", "u1").await.unwrap();
        state.lifecycle.on_connect("c2", "u1").await.unwrap();
        state.lifecycle.on_connect("c3", "u2").await.unwrap();

        notify_other_connections(&state, "u1", "c1", "u1-a").await;

        assert_eq!(
            sibling.recv().await,
            Some(OutboundFrame::SessionUpdated {
                session_id: "u1-a".to_string()
            })
        );
        assert!(origin.try_recv().is_err());
        assert!(stranger.try_recv().is_err());
    }
}
