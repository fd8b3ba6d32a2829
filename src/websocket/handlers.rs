//! WebSocket gateway: handshake authentication, the per-connection event
//! loop, and dispatch of inbound events to the service layer.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use sqlx::{Pool, Postgres, Row};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::{bearer_token, verify_jwt};
use crate::models::user::{User, UserRole};
use crate::state::AppState;
use crate::websocket::events::{event, Envelope, WsInboundEvent};
use crate::websocket::outbound_frame;

#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub token: Option<String>,
}

pub async fn ws_handler(
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(state, params, headers, socket))
}

async fn handle_socket(state: AppState, params: WsParams, headers: HeaderMap, socket: WebSocket) {
    let (mut sink, stream) = socket.split();

    // Authentication happens on the socket itself so the client always gets
    // a structured reason before the close, not just a failed upgrade.
    let user = match authenticate(&state, &headers, params.token.as_deref()).await {
        Ok(user) => user,
        Err(err) => {
            let _ = sink
                .send(Message::Text(Envelope::err(err.to_string()).to_json()))
                .await;
            let _ = sink.send(Message::Close(None)).await;
            return;
        }
    };

    let user_id = user.id;
    let (subscriber_id, mut push_rx) = state.registry.register(user_id);
    info!(%user_id, "websocket connected");

    let profile = match serde_json::to_value(user.public_profile()) {
        Ok(value) => value,
        Err(err) => {
            warn!(%user_id, error = %err, "failed to encode profile");
            state.registry.unregister(user_id, subscriber_id);
            return;
        }
    };
    if sink
        .send(Message::Text(outbound_frame(event::CONNECTED, &profile)))
        .await
        .is_err()
    {
        state.registry.unregister(user_id, subscriber_id);
        return;
    }

    run_event_loop(&state, user_id, &mut sink, stream, &mut push_rx).await;

    // Unregister exactly this connection; other live connections of the same
    // user are untouched.
    state.registry.unregister(user_id, subscriber_id);
    info!(%user_id, "websocket disconnected");
}

async fn run_event_loop(
    state: &AppState,
    user_id: Uuid,
    sink: &mut SplitSink<WebSocket, Message>,
    mut stream: SplitStream<WebSocket>,
    push_rx: &mut tokio::sync::mpsc::UnboundedReceiver<String>,
) {
    loop {
        tokio::select! {
            frame = push_rx.recv() => {
                match frame {
                    Some(frame) => {
                        if sink.send(Message::Text(frame)).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            inbound = stream.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(reply) = dispatch(state, user_id, &text).await {
                            if sink.send(Message::Text(reply)).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {} // ping/pong/binary, nothing to do
                    Some(Err(err)) => {
                        debug!(%user_id, error = %err, "websocket read error");
                        break;
                    }
                }
            }
        }
    }
}

/// Decode and route one inbound frame. Returns an error envelope to send
/// directly on this connection when something went wrong; successful results
/// travel back as pushes through the registry.
async fn dispatch(state: &AppState, user_id: Uuid, text: &str) -> Option<String> {
    let event: WsInboundEvent = match serde_json::from_str(text) {
        Ok(event) => event,
        Err(err) => {
            debug!(%user_id, error = %err, "malformed inbound event");
            return Some(Envelope::err("Invalid event payload").to_json());
        }
    };

    match handle_event(state, user_id, event).await {
        Ok(()) => None,
        Err(err) => Some(Envelope::err(err.to_string()).to_json()),
    }
}

async fn handle_event(state: &AppState, user_id: Uuid, event: WsInboundEvent) -> AppResult<()> {
    use crate::services::ConversationService as Svc;

    let db = &state.db;
    let pushes = match event {
        WsInboundEvent::ConversationLoadList { page, limit, search } => {
            Svc::list_conversations(db, user_id, page, limit, search).await?.1
        }
        WsInboundEvent::ConversationLoad {
            conversation_id,
            page,
            limit,
        } => {
            Svc::load_conversation(db, user_id, conversation_id, page, limit).await?.1
        }
        WsInboundEvent::ConversationInitiate { user_id: target } => {
            Svc::initiate_conversation(db, user_id, target).await?.1
        }
        WsInboundEvent::ConversationDelete { conversation_id } => {
            Svc::delete_conversation(db, user_id, conversation_id).await?.1
        }
        WsInboundEvent::ConversationArchive { conversation_id } => {
            Svc::archive_conversation(db, user_id, conversation_id).await?.1
        }
        WsInboundEvent::ConversationBlock { conversation_id } => {
            Svc::block_conversation(db, user_id, conversation_id).await?.1
        }
        WsInboundEvent::ConversationUnblock { conversation_id } => {
            Svc::unblock_conversation(db, user_id, conversation_id).await?.1
        }
    };

    state.registry.execute(&pushes);
    Ok(())
}

/// Resolve the handshake credential to a live user row.
///
/// All failures surface as unauthorized with one of three fixed reasons, so
/// a probing client learns nothing about which step failed beyond that.
async fn authenticate(
    state: &AppState,
    headers: &HeaderMap,
    query_token: Option<&str>,
) -> AppResult<User> {
    let token = bearer_token(headers, query_token)
        .ok_or_else(|| AppError::Unauthorized("Missing token".into()))?;

    let claims = verify_jwt(&token, &state.config.jwt_secret)?;
    let user_id = Uuid::parse_str(&claims.sub)
        .map_err(|_| AppError::Unauthorized("Invalid token".into()))?;

    fetch_user(&state.db, user_id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("User not found".into()))
}

async fn fetch_user(db: &Pool<Postgres>, user_id: Uuid) -> AppResult<Option<User>> {
    let row = sqlx::query(
        "SELECT id, display_name, email, role, created_at, updated_at FROM users WHERE id = $1",
    )
    .bind(user_id)
    .fetch_optional(db)
    .await?;

    Ok(row.map(|row| {
        let role: String = row.get("role");
        User {
            id: row.get("id"),
            display_name: row.get("display_name"),
            email: row.get("email"),
            role: UserRole::from_str(&role),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }))
}
