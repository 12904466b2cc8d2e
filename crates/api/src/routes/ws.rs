//! The WebSocket Hub (spec §4.3, C3): `GET /ws?token={jwt}`.
//!
//! Grounded on the teacher's `routes/subscribe.rs` two-phase model, adapted
//! to a single persistent connection instead of a create-then-poll
//! subscription: each connection runs three paired tasks (spec §9 "paired
//! connection tasks" over one giant select loop) — a reader translating
//! inbound envelopes into `TopicManager`/`TaskRunner` calls, a writer
//! draining the client's `ClientQueue` onto the socket, and a heartbeat
//! task enforcing the spec's ping/pong liveness contract. Any task exiting
//! tears down all three, via the shared `CancellationToken`.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use jsonwebtoken::{DecodingKey, Validation};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use zerg_common::events::Envelope;
use zerg_common::{RunTrigger, ThreadId, ThreadType, UserId};
use zerg_runtime::task_runner::RunRequest;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    token: String,
}

#[derive(Debug, Deserialize)]
struct Claims {
    sub: Uuid,
    #[allow(dead_code)]
    exp: usize,
}

const INVALID_TOKEN_CLOSE_CODE: u16 = 4401;
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(60);

#[instrument(skip(ws, state, query))]
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let key = DecodingKey::from_secret(state.config.websocket.jwt_secret.as_bytes());
    match jsonwebtoken::decode::<Claims>(&query.token, &key, &Validation::new(jsonwebtoken::Algorithm::HS256)) {
        Ok(token) => {
            let user_id = UserId(token.claims.sub);
            ws.on_upgrade(move |socket| handle_socket(socket, state, user_id))
        }
        Err(e) => {
            warn!(error = %e, "rejecting websocket handshake: invalid or expired token");
            ws.on_upgrade(|socket| reject_with_4401(socket))
        }
    }
}

async fn reject_with_4401(mut socket: WebSocket) {
    let _ = socket
        .send(Message::Close(Some(CloseFrame { code: INVALID_TOKEN_CLOSE_CODE, reason: "invalid token".into() })))
        .await;
}

async fn handle_socket(socket: WebSocket, state: AppState, user_id: UserId) {
    let client_id = Uuid::new_v4();
    let queue = state.topics.register_client(client_id, user_id).await;
    let cancel = CancellationToken::new();
    let last_pong = std::sync::Arc::new(Mutex::new(Instant::now()));

    let (mut sender, mut receiver) = socket.split();

    let writer_cancel = cancel.clone();
    let writer = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = writer_cancel.cancelled() => break,
                envelope = queue.pop() => {
                    let Ok(json) = serde_json::to_string(&envelope) else { continue };
                    if sender.send(Message::Text(json)).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    let heartbeat_cancel = cancel.clone();
    let heartbeat_topics = state.topics.clone();
    let heartbeat_last_pong = last_pong.clone();
    let heartbeat = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = heartbeat_cancel.cancelled() => break,
                _ = tokio::time::sleep(HEARTBEAT_INTERVAL) => {
                    let elapsed = heartbeat_last_pong.lock().unwrap().elapsed();
                    if elapsed >= HEARTBEAT_TIMEOUT {
                        warn!(%client_id, "no pong within timeout, closing connection");
                        heartbeat_cancel.cancel();
                        break;
                    }
                    heartbeat_topics
                        .send_direct(client_id, Envelope::new("ping", "system", serde_json::json!({ "ts": now_millis() })))
                        .await;
                }
            }
        }
    });

    let reader_cancel = cancel.clone();
    let topics = state.topics.clone();
    let store = state.store.clone();
    let task_runner = state.task_runner.clone();
    let reader_last_pong = last_pong.clone();
    let reader = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = reader_cancel.cancelled() => break,
                msg = receiver.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            handle_inbound(&topics, &store, &task_runner, client_id, user_id, &text, &reader_last_pong).await;
                        }
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            warn!(error = %e, "websocket read error");
                            break;
                        }
                    }
                }
            }
        }
    });

    let _ = tokio::join!(reader, writer, heartbeat);
    cancel.cancel();
    state.topics.deregister_client(client_id).await;
    info!(%client_id, "websocket connection closed");
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Sends a standalone `error` envelope to one client, echoing `req_id` as
/// `message_id` so the client can correlate it to its request.
async fn send_error(
    topics: &zerg_runtime::topics::TopicManager,
    client_id: Uuid,
    req_id: Option<String>,
    message: impl Into<String>,
) {
    topics
        .send_direct(
            client_id,
            Envelope::new("error", "system", serde_json::json!({ "message_id": req_id, "error": message.into() })),
        )
        .await;
}

async fn handle_inbound(
    topics: &zerg_runtime::topics::TopicManager,
    store: &std::sync::Arc<dyn zerg_storage::PersistenceStore>,
    task_runner: &std::sync::Arc<zerg_runtime::task_runner::TaskRunner>,
    client_id: Uuid,
    user_id: UserId,
    text: &str,
    last_pong: &std::sync::Arc<Mutex<Instant>>,
) {
    let envelope = match serde_json::from_str::<Envelope>(text) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!(%client_id, error = %e, "dropping malformed websocket envelope");
            send_error(topics, client_id, None, format!("malformed envelope: {e}")).await;
            return;
        }
    };

    if envelope.v != 1 {
        send_error(topics, client_id, envelope.req_id.clone(), format!("unsupported envelope version: {}", envelope.v)).await;
        return;
    }

    match envelope.ty.as_str() {
        "ping" => {
            topics
                .send_direct(client_id, Envelope::new("pong", "system", serde_json::json!({ "ts": now_millis() })))
                .await;
        }
        "pong" => {
            *last_pong.lock().unwrap() = Instant::now();
        }
        "subscribe" => {
            for topic in topic_list(&envelope.data) {
                topics.subscribe(client_id, topic, envelope.req_id.clone()).await;
            }
        }
        "unsubscribe" => {
            for topic in topic_list(&envelope.data) {
                topics.unsubscribe(client_id, &topic).await;
            }
        }
        "send_message" => {
            handle_send_message(store, task_runner, topics, client_id, user_id, envelope).await;
        }
        other => {
            warn!(%client_id, ty = %other, "unrecognized envelope type");
            send_error(topics, client_id, envelope.req_id.clone(), format!("unrecognized type: {other}")).await;
        }
    }
}

fn topic_list(data: &serde_json::Value) -> Vec<String> {
    data.get("topics")
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}

#[derive(Debug, Deserialize)]
struct SendMessagePayload {
    thread_id: Uuid,
    content: String,
}

/// `send_message{thread_id, content}` (spec §4.3): appends a user message
/// to an existing chat thread and dispatches the owning agent, the
/// WebSocket-native equivalent of `POST /threads/{id}/messages`. Dispatch
/// runs on its own task so a long-running agent turn doesn't block this
/// connection's reader from handling further inbound frames (e.g. `ping`).
async fn handle_send_message(
    store: &std::sync::Arc<dyn zerg_storage::PersistenceStore>,
    task_runner: &std::sync::Arc<zerg_runtime::task_runner::TaskRunner>,
    topics: &zerg_runtime::topics::TopicManager,
    client_id: Uuid,
    user_id: UserId,
    envelope: Envelope,
) {
    let payload: SendMessagePayload = match serde_json::from_value(envelope.data.clone()) {
        Ok(payload) => payload,
        Err(e) => {
            send_error(topics, client_id, envelope.req_id.clone(), format!("invalid send_message payload: {e}")).await;
            return;
        }
    };
    let thread_id = ThreadId(payload.thread_id);

    let thread = match store.get_thread(thread_id).await {
        Ok(thread) => thread,
        Err(e) => {
            send_error(topics, client_id, envelope.req_id.clone(), e.to_string()).await;
            return;
        }
    };
    let owns_thread = matches!(store.get_agent(thread.agent_id).await, Ok(agent) if agent.owner_id == user_id);
    if !owns_thread {
        send_error(topics, client_id, envelope.req_id.clone(), "not authorized for this thread").await;
        return;
    }

    let task_runner = task_runner.clone();
    let req = RunRequest {
        agent_id: thread.agent_id,
        thread_id: Some(thread_id),
        thread_type: ThreadType::Chat,
        trigger: RunTrigger::Api,
        task_override: Some(payload.content),
    };
    tokio::spawn(async move {
        if let Err(e) = task_runner.dispatch(req, CancellationToken::new()).await {
            warn!(error = %e, "send_message dispatch failed");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_list_reads_the_data_array_not_the_top_level_topic_field() {
        let data = serde_json::json!({ "topics": ["agent:1", "thread:2"] });
        assert_eq!(topic_list(&data), vec!["agent:1".to_string(), "thread:2".to_string()]);
    }

    #[test]
    fn topic_list_is_empty_for_a_missing_or_malformed_field() {
        assert!(topic_list(&serde_json::json!({})).is_empty());
        assert!(topic_list(&serde_json::json!({ "topics": "agent:1" })).is_empty());
    }

    #[test]
    fn send_message_payload_requires_thread_id_and_content() {
        let ok: SendMessagePayload =
            serde_json::from_value(serde_json::json!({ "thread_id": Uuid::new_v4(), "content": "hi" })).unwrap();
        assert_eq!(ok.content, "hi");

        let missing_content: Result<SendMessagePayload, _> =
            serde_json::from_value(serde_json::json!({ "thread_id": Uuid::new_v4() }));
        assert!(missing_content.is_err());
    }
}
