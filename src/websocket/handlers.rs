use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::HeaderMap,
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use crate::middleware::auth::{resolve_bearer, AuthUser};
use crate::services::conversation_service::ConversationService;
use crate::services::message_service::MessageService;
use crate::services::notification_service::NotificationService;
use crate::services::participant_service::ParticipantService;
use crate::state::AppState;
use crate::websocket::events::broadcast_with_echo;
use crate::websocket::message_types::{WsInboundEvent, WsOutboundEvent};
use tracing::warn;

#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub token: Option<String>,
}

fn bearer_from(params: &WsParams, headers: &HeaderMap) -> Option<String> {
    params.token.clone().or_else(|| {
        headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.strip_prefix("Bearer "))
            .map(|s| s.to_string())
    })
}

/// Handshake: the bearer credential is verified and the subject resolved to
/// an active user before any event is processed. Failure closes the
/// connection with 401.
pub async fn ws_handler(
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let Some(token) = bearer_from(&params, &headers) else {
        return axum::http::StatusCode::UNAUTHORIZED.into_response();
    };
    let user = match resolve_bearer(&state, &token).await {
        Ok(user) => user,
        Err(e) => {
            warn!(error = %e, "websocket handshake rejected");
            return axum::http::StatusCode::UNAUTHORIZED.into_response();
        }
    };

    ws.on_upgrade(move |socket| handle_socket(state, user, socket))
}

async fn handle_socket(state: AppState, user: AuthUser, socket: WebSocket) {
    // Connection-scoped channel: the registry holds the sender, the select
    // loop below pumps the receiver into the socket sink.
    let connection_id = Uuid::new_v4();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<Message>();
    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            maybe = rx.recv() => {
                match maybe {
                    Some(msg) => {
                        if sink.send(msg).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        handle_client_event(&state, &user, connection_id, &tx, &text).await;
                    }
                    Some(Ok(Message::Ping(_))) => {
                        // Pong is handled by the framework.
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }

    // Implicit room cleanup; participant rows are unaffected by disconnects.
    state.registry.leave_all(connection_id).await;
}

async fn handle_client_event(
    state: &AppState,
    user: &AuthUser,
    connection_id: Uuid,
    tx: &UnboundedSender<Message>,
    text: &str,
) {
    let event = match serde_json::from_str::<WsInboundEvent>(text) {
        Ok(event) => event,
        Err(_) => {
            send_error(tx, "invalid event payload");
            return;
        }
    };

    match event {
        WsInboundEvent::JoinConversation { conversation_id } => {
            match ParticipantService::is_active_participant(&state.db, conversation_id, user.id)
                .await
            {
                Ok(true) => {
                    state
                        .registry
                        .join(conversation_id, connection_id, user.id, tx.clone())
                        .await;
                }
                Ok(false) => send_error(tx, "not a participant of this conversation"),
                Err(e) => {
                    warn!(%conversation_id, error = %e, "join membership check failed");
                    send_error(tx, "failed to join conversation");
                }
            }
        }
        WsInboundEvent::SendMessage { payload } => {
            match MessageService::create_message(
                &state.db,
                state.users.as_ref(),
                user.id,
                user.role,
                &payload,
            )
            .await
            {
                Ok(message) => {
                    // Fan-out reaches every room member plus the sender's
                    // own connection even if it never joined; the failed
                    // path never reaches the room.
                    let conversation_id = message.conversation_id;
                    broadcast_with_echo(
                        &state.registry,
                        conversation_id,
                        connection_id,
                        tx,
                        &WsOutboundEvent::NewMessage {
                            message: message.clone(),
                        },
                    )
                    .await;
                    tokio::spawn(NotificationService::notify_new_message(
                        state.clone(),
                        message,
                    ));
                }
                Err(e) => send_error(tx, &e.to_string()),
            }
        }
        WsInboundEvent::MarkAsRead { conversation_id } => {
            match ConversationService::mark_as_read(&state.db, conversation_id, user.id).await {
                Ok(last_read_at) => {
                    // Emitted to the caller and the room alike so peers can
                    // reflect delivery state.
                    broadcast_with_echo(
                        &state.registry,
                        conversation_id,
                        connection_id,
                        tx,
                        &WsOutboundEvent::MessageRead {
                            conversation_id,
                            user_id: user.id,
                            last_read_at,
                        },
                    )
                    .await;
                }
                Err(e) => send_error(tx, &e.to_string()),
            }
        }
    }
}

/// Scoped error event: delivered to the caller's own connection only.
fn send_error(tx: &UnboundedSender<Message>, message: &str) {
    let event = WsOutboundEvent::Error {
        message: message.to_string(),
    };
    if let Ok(payload) = serde_json::to_string(&event) {
        let _ = tx.send(Message::Text(payload));
    }
}
