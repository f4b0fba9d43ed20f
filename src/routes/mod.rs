use axum::{
    middleware,
    routing::{delete, get, patch, post, put},
    Router,
};

use crate::state::AppState;

pub mod conversations;
use conversations::{
    add_participant, create_conversation, get_conversation, leave_conversation,
    list_conversations, mark_conversation_read,
};
pub mod messages;
use messages::{
    bulk_delete_messages, delete_message, get_message_history, mark_message_read, send_message,
    update_message,
};
pub mod offers;
use offers::{get_offer, respond_to_offer};
pub mod files;
use files::{get_file, register_file};

use crate::websocket::handlers::ws_handler;

pub fn build_router(state: AppState) -> Router<AppState> {
    // Introspection stays open for load balancer healthchecks.
    let introspection = Router::new().route("/health", get(|| async { "OK" }));

    let chat = Router::new()
        // Conversations
        .route("/conversations", post(create_conversation))
        .route("/conversations", get(list_conversations))
        .route("/conversations/:conversation_id", get(get_conversation))
        .route(
            "/conversations/:conversation_id/read",
            patch(mark_conversation_read),
        )
        .route(
            "/conversations/:conversation_id/participants",
            post(add_participant),
        )
        .route(
            "/conversations/:conversation_id/participants/me",
            delete(leave_conversation),
        )
        // Messages
        .route("/messages", post(send_message))
        .route(
            "/messages/conversation/:conversation_id",
            get(get_message_history),
        )
        .route("/messages/bulk-delete", post(bulk_delete_messages))
        .route(
            "/messages/conversation/:conversation_id/read/:message_id",
            post(mark_message_read),
        )
        .route("/messages/:message_id", put(update_message))
        .route("/messages/:message_id", delete(delete_message))
        // Offers
        .route("/offers/:offer_id", get(get_offer))
        .route("/offers/:offer_id", patch(respond_to_offer))
        // Attachment metadata
        .route("/files", post(register_file))
        .route("/files/:file_id", get(get_file));

    // route_layer keeps unmatched paths as plain 404s instead of 401s.
    let secured_chat = chat.route_layer(middleware::from_fn_with_state(
        state,
        crate::middleware::auth::auth_middleware,
    ));

    // The websocket endpoint runs its own bearer check during the handshake
    // so query-param tokens work for browser clients.
    let chat_ws = Router::new().route("/ws", get(ws_handler));

    let router = introspection.merge(Router::new().nest("/chat", secured_chat.merge(chat_ws)));

    crate::middleware::with_defaults(router)
}
