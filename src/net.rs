//! HTTP/WebSocket scaffolding (§2.1, §6): a thin axum layer that decodes
//! and encodes wire frames and calls straight into the core. It owns no
//! business rules — admission decisions, sequence evaluation, and action
//! resolution all happen in [`crate::admission`] and [`crate::room`]; this
//! module only translates between their types and JSON/WebSocket frames.

use crate::admission::{AdmissionOutcome, AdmissionRequest};
use crate::error;
use crate::health::DegradedStatus;
use crate::lobby::{CreateOrJoinRequest, LobbyMode};
use crate::reconnect_service::CreateSessionInput;
use crate::room::{JoinOptions, RoomBroadcast, SubmitOutcome};
use crate::server::ServerState;
use crate::session_store::SessionStore;
use crate::types::{
    ActionRequest, Direction, InstanceId, PlayerStateSnapshot, Session, SessionId, SessionStatus,
};
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, Query, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/instances/{id}/connect", post(connect))
        .route("/instances/{id}/queue/status", get(queue_status))
        .route("/api/session/bootstrap", post(session_bootstrap))
        .route("/ws", get(ws_upgrade))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

// ---------------------------------------------------------------------
// §6.1 Admission HTTP
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConnectRequest {
    character_id: Uuid,
    client_version: String,
    #[serde(default)]
    reconnection_token: Option<String>,
    #[serde(default)]
    replace_existing: bool,
    #[serde(default)]
    confirmation_token: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ConnectionConfig {
    heartbeat_interval: u64,
    reconnect_delay: u64,
    max_reconnect_attempts: u32,
}

const HEARTBEAT_INTERVAL_MS: u64 = 15_000;
const RECONNECT_DELAY_MS: u64 = 1_000;
const MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Bearer auth and character ownership are external-collaborator concerns
/// (§1); this layer trusts the header is a user id so the admission
/// pipeline has a subject to key on.
fn bearer_user_id(headers: &axum::http::HeaderMap) -> Option<Uuid> {
    let raw = headers.get(axum::http::header::AUTHORIZATION)?.to_str().ok()?;
    let token = raw.strip_prefix("Bearer ")?;
    Uuid::parse_str(token).ok()
}

async fn connect(
    State(state): State<Arc<ServerState>>,
    Path(instance_id): Path<InstanceId>,
    headers: axum::http::HeaderMap,
    Json(body): Json<ConnectRequest>,
) -> impl IntoResponse {
    let client_ip = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("0.0.0.0")
        .to_string();

    let Some(user_id) = bearer_user_id(&headers) else {
        return admission_error_response(StatusCode::UNAUTHORIZED, "authentication_required", None);
    };

    let outcome = state
        .admission
        .attempt(AdmissionRequest {
            user_id,
            character_id: body.character_id,
            instance_id,
            client_ip,
            client_version: body.client_version,
            auth_valid: true,
            character_owned: true,
            replace_existing: body.replace_existing,
            confirmation_token: body.confirmation_token,
            is_queued_promotion: false,
        })
        .await;

    match outcome {
        AdmissionOutcome::Success { session_id, .. } => {
            state
                .sessions
                .create_or_update(Session {
                    session_id,
                    user_id,
                    character_id: body.character_id,
                    instance_id,
                    protocol_version: "1.0.0".to_string(),
                    status: SessionStatus::Active,
                    last_sequence_number: 0,
                    last_heartbeat_at: Utc::now(),
                    grace_expires_at: None,
                })
                .await;

            let token = state
                .reconnect
                .create_session(CreateSessionInput {
                    session_id,
                    instance_id,
                    player_state: PlayerStateSnapshot {
                        last_action_tick: 0,
                        initiative: 0,
                        position: None,
                    },
                    grace_period_ms: state.config.reconnect.grace_ms,
                })
                .await;

            (
                StatusCode::OK,
                Json(serde_json::json!({
                    "outcome": "success",
                    "sessionId": session_id,
                    "reconnectionToken": token.token,
                    "uiState": "CONNECTED",
                    "websocketUrl": format!("/ws?sessionId={session_id}&instanceId={instance_id}"),
                    "connectionConfig": ConnectionConfig {
                        heartbeat_interval: HEARTBEAT_INTERVAL_MS,
                        reconnect_delay: RECONNECT_DELAY_MS,
                        max_reconnect_attempts: MAX_RECONNECT_ATTEMPTS,
                    },
                })),
            )
                .into_response()
        }
        AdmissionOutcome::Queued {
            position,
            estimated_wait_ms,
            ..
        } => (
            StatusCode::ACCEPTED,
            Json(serde_json::json!({
                "outcome": "queued",
                "position": position,
                "estimatedWait": estimated_wait_ms,
            })),
        )
            .into_response(),
        AdmissionOutcome::Failed {
            reason,
            retry_after_ms,
            existing_session,
            ..
        } => {
            let status = status_for_reason(reason);
            let mut body = serde_json::json!({
                "outcome": "failed",
                "reason": reason,
            });
            if let Some(existing) = existing_session {
                body["existingSession"] = serde_json::json!({
                    "sessionId": existing.session_id,
                    "instanceId": existing.instance_id,
                });
            }
            let mut response = (status, Json(body)).into_response();
            if let Some(retry_after_ms) = retry_after_ms {
                response.headers_mut().insert(
                    axum::http::header::RETRY_AFTER,
                    (retry_after_ms / 1_000).max(1).into(),
                );
            }
            response
        }
    }
}

fn admission_error_response(status: StatusCode, reason: &'static str, retry_after_ms: Option<u64>) -> axum::response::Response {
    let mut response = (
        status,
        Json(serde_json::json!({"outcome": "failed", "reason": reason})),
    )
        .into_response();
    if let Some(retry_after_ms) = retry_after_ms {
        response
            .headers_mut()
            .insert(axum::http::header::RETRY_AFTER, (retry_after_ms / 1_000).max(1).into());
    }
    response
}

fn status_for_reason(reason: &str) -> StatusCode {
    match error::lookup_by_reason(reason) {
        Some(entry) => match entry.category {
            error::ErrorCategory::Validation => StatusCode::BAD_REQUEST,
            error::ErrorCategory::Conflict => StatusCode::CONFLICT,
            error::ErrorCategory::Capacity => StatusCode::SERVICE_UNAVAILABLE,
            error::ErrorCategory::RateLimit => StatusCode::TOO_MANY_REQUESTS,
            error::ErrorCategory::State => StatusCode::GONE,
            error::ErrorCategory::Security => StatusCode::FORBIDDEN,
            error::ErrorCategory::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        },
        None => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

async fn queue_status(State(state): State<Arc<ServerState>>, Path(instance_id): Path<InstanceId>) -> impl IntoResponse {
    let position = state.admission.queue_length(instance_id);
    Json(serde_json::json!({
        "position": position,
        "estimatedWait": position as u64 * 1_000,
        "queueLength": position,
        "serverCapacity": state.config.board.max_players,
        "activeConnections": state.sessions.list_by_instance(instance_id).await.len(),
        "drainMode": state.config.drain.drain_mode_enabled,
    }))
}

// ---------------------------------------------------------------------
// §6.2 Session Bootstrap
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BootstrapRequest {
    #[serde(default)]
    reconnect_token: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
}

async fn session_bootstrap(
    State(state): State<Arc<ServerState>>,
    headers: axum::http::HeaderMap,
    Json(body): Json<BootstrapRequest>,
) -> impl IntoResponse {
    let Some(_user_id) = bearer_user_id(&headers) else {
        return admission_error_response(StatusCode::UNAUTHORIZED, "authentication_required", None);
    };

    let ready = match state.lobby.create_or_join(CreateOrJoinRequest {
        mode: LobbyMode::Matchmaking,
        ruleset_version: None,
        request_id: Uuid::new_v4().to_string(),
    }) {
        Ok(ready) => ready,
        Err(_) => return admission_error_response(StatusCode::NOT_FOUND, "not_found", None),
    };

    let session_id = Uuid::new_v4();
    let Some(Ok(view)) = ready
        .room
        .join(
            session_id,
            JoinOptions {
                user_id: session_id,
                display_name: body.display_name.unwrap_or_else(|| "Player".to_string()),
                initiative: 0,
            },
        )
        .await
    else {
        return admission_error_response(StatusCode::SERVICE_UNAVAILABLE, "internal_error", None);
    };

    state
        .sessions
        .create_or_update(Session {
            session_id,
            user_id: session_id,
            character_id: session_id,
            instance_id: ready.instance_id,
            protocol_version: "1.0.0".to_string(),
            status: SessionStatus::Active,
            last_sequence_number: 0,
            last_heartbeat_at: Utc::now(),
            grace_expires_at: None,
        })
        .await;

    let token = state
        .reconnect
        .create_session(CreateSessionInput {
            session_id,
            instance_id: ready.instance_id,
            player_state: PlayerStateSnapshot {
                last_action_tick: 0,
                initiative: 0,
                position: None,
            },
            grace_period_ms: state.config.reconnect.grace_ms,
        })
        .await;

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "version": ready.ruleset_version.to_string(),
            "issuedAt": Utc::now(),
            "session": {
                "sessionId": session_id,
                "userId": session_id,
                "status": "active",
                "protocolVersion": "1.0.0",
                "lastSequenceNumber": 0,
            },
            "state": { "character": view.players.get(&session_id) },
            "reconnect": { "token": token.token, "expiresAt": token.expires_at() },
            "realtime": { "room": ready.instance_id, "roomId": ready.instance_id },
        })),
    )
        .into_response()
}

// ---------------------------------------------------------------------
// §6.3 Realtime Message Protocol
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct WsQuery {
    #[serde(rename = "sessionId")]
    session_id: SessionId,
    #[serde(rename = "instanceId")]
    instance_id: InstanceId,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
enum InboundEnvelope {
    #[serde(rename = "intent.move")]
    Move {
        sequence: u64,
        direction: WireDirection,
        magnitude: i32,
    },
    #[serde(rename = "intent.chat")]
    Chat { sequence: u64, message: String },
    #[serde(rename = "intent.action")]
    Action {
        sequence: u64,
        #[serde(rename = "actionId")]
        action_id: Option<Uuid>,
        kind: String,
        target: Option<String>,
        metadata: Option<serde_json::Value>,
    },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum WireDirection {
    North,
    South,
    East,
    West,
}

impl From<WireDirection> for Direction {
    fn from(value: WireDirection) -> Self {
        match value {
            WireDirection::North => Direction::North,
            WireDirection::South => Direction::South,
            WireDirection::East => Direction::East,
            WireDirection::West => Direction::West,
        }
    }
}

async fn ws_upgrade(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, query.session_id, query.instance_id))
}

async fn handle_socket(socket: WebSocket, state: Arc<ServerState>, session_id: SessionId, instance_id: InstanceId) {
    let Some(room) = state.lobby.room(instance_id) else {
        return;
    };
    let mut broadcasts = room.subscribe();
    let mut degraded = state.health.subscribe();
    let (mut sender, mut receiver) = futures_util::StreamExt::split(socket);
    use futures_util::SinkExt;

    let handshake = serde_json::json!({
        "type": "event.ack",
        "payload": {
            "reason": "handshake",
            "sessionId": session_id,
            "sequence": 0,
            "version": "1.0.0",
            "acknowledgedIntents": [],
            "acknowledgedAt": Utc::now(),
        },
    });
    if sender.send(Message::Text(handshake.to_string().into())).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            incoming = receiver.next_message() => {
                match incoming {
                    Some(Message::Text(text)) => {
                        if let Some(event) = handle_intent(&room, &state.sessions, session_id, &text).await {
                            if sender.send(Message::Text(event.to_string().into())).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Message::Close(_)) | None => break,
                    _ => {}
                }
            }
            broadcast = broadcasts.recv() => {
                match broadcast {
                    Ok(event) => {
                        let frame = render_broadcast(event);
                        if sender.send(Message::Text(frame.to_string().into())).await.is_err() {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                }
            }
            signal = degraded.recv() => {
                if let Ok(signal) = signal {
                    let frame = serde_json::json!({
                        "type": "event.degraded",
                        "payload": {
                            "dependency": signal.dependency,
                            "status": if signal.status == DegradedStatus::Degraded { "degraded" } else { "recovered" },
                            "observedAt": signal.observed_at,
                            "message": signal.message,
                        },
                    });
                    if sender.send(Message::Text(frame.to_string().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    }

    let _ = room.leave(session_id, false).await;
}

/// Thin `StreamExt::next` wrapper so the select arm above reads as one
/// call regardless of the underlying `Result`/`Option` nesting.
trait NextMessage {
    async fn next_message(&mut self) -> Option<Message>;
}

impl NextMessage for futures_util::stream::SplitStream<WebSocket> {
    async fn next_message(&mut self) -> Option<Message> {
        use futures_util::StreamExt;
        loop {
            match self.next().await {
                Some(Ok(message)) => return Some(message),
                Some(Err(_)) => return None,
                None => return None,
            }
        }
    }
}

async fn handle_intent(
    room: &crate::room::BattleRoom,
    sessions: &Arc<SessionStore>,
    session_id: SessionId,
    text: &str,
) -> Option<serde_json::Value> {
    let envelope: InboundEnvelope = serde_json::from_str(text).ok()?;
    sessions.record_heartbeat(session_id, Utc::now()).await;

    let (sequence, action) = match envelope {
        InboundEnvelope::Move {
            sequence,
            direction,
            magnitude,
        } => (
            sequence,
            ActionRequest::Move {
                id: Uuid::new_v4(),
                instance_id: room.instance_id,
                timestamp: Utc::now(),
                requested_tick: None,
                player_id: session_id,
                direction: direction.into(),
                magnitude,
            },
        ),
        InboundEnvelope::Chat { sequence, message } => (
            sequence,
            ActionRequest::Chat {
                id: Uuid::new_v4(),
                instance_id: room.instance_id,
                timestamp: Utc::now(),
                requested_tick: None,
                player_id: session_id,
                message,
            },
        ),
        InboundEnvelope::Action {
            sequence,
            action_id,
            kind,
            target,
            metadata,
        } => (
            sequence,
            ActionRequest::Action {
                id: action_id.unwrap_or_else(Uuid::new_v4),
                instance_id: room.instance_id,
                timestamp: Utc::now(),
                requested_tick: None,
                player_id: session_id,
                kind,
                target,
                metadata,
            },
        ),
    };

    let outcome = room.submit_action(sequence, action, session_id.to_string()).await;
    Some(render_submit_outcome(sequence, outcome))
}

fn render_submit_outcome(sequence: u64, outcome: Option<SubmitOutcome>) -> serde_json::Value {
    match outcome {
        Some(SubmitOutcome::Queued { .. }) | None => serde_json::json!({
            "type": "event.ack",
            "payload": {
                "sequence": sequence,
                "status": "applied",
                "acknowledgedAt": Utc::now(),
            },
        }),
        Some(SubmitOutcome::Duplicate {
            prior_action_id,
            persisted_at,
            ..
        }) => serde_json::json!({
            "type": "event.ack",
            "payload": {
                "sequence": sequence,
                "status": "duplicate",
                "acknowledgedAt": Utc::now(),
                "durability": {
                    "persisted": true,
                    "actionEventId": prior_action_id,
                    "persistedAt": persisted_at,
                },
            },
        }),
        Some(SubmitOutcome::Rejected { reason, retry_after_ms, .. }) => serde_json::json!({
            "type": "event.error",
            "payload": {
                "sequence": sequence,
                "code": reason,
                "category": category_for_reason(reason),
                "retryable": retry_after_ms.is_some(),
                "message": error::lookup_by_reason(reason).map(|e| e.human_message).unwrap_or("request rejected"),
            },
        }),
    }
}

fn category_for_reason(reason: &str) -> &'static str {
    match reason {
        "sequence_gap" | "session_not_found" => "CONSISTENCY",
        "rate_limited" | "chat_rate_limit_exceeded" => "RATE_LIMIT",
        "invalid_request" | "duplicate" => "VALIDATION",
        _ => "SYSTEM",
    }
}

fn render_broadcast(event: RoomBroadcast) -> serde_json::Value {
    match event {
        RoomBroadcast::ActionApplied {
            tick,
            effects,
            request_id,
            ..
        } => serde_json::json!({
            "type": "event.state_delta",
            "payload": {
                "sequence": tick,
                "issuedAt": Utc::now(),
                "effects": effects,
                "requestId": request_id,
            },
        }),
        RoomBroadcast::ActionRejected { reason, error, .. } => serde_json::json!({
            "type": "event.error",
            "payload": {
                "code": error,
                "category": reject_reason_category(reason),
                "retryable": false,
                "message": crate::error::lookup_by_reason(error).map(|e| e.human_message).unwrap_or("action rejected"),
            },
        }),
    }
}

fn reject_reason_category(reason: crate::types::RejectReason) -> &'static str {
    use crate::types::RejectReason::*;
    match reason {
        Validation => "VALIDATION",
        Conflict | State => "CONSISTENCY",
        RateLimit => "RATE_LIMIT",
        Internal => "SYSTEM",
    }
}
