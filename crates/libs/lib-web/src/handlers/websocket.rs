//! # WebSocket Handlers
//!
//! The chat connection. One socket per logged-in browser tab.
//!
//! ## Endpoints
//!
//! - `GET /api/ws/chat?token=<jwt>` - Authenticated chat connection
//!
//! Frames are JSON text messages shaped `{"event": "...", "data": {...}}` in
//! both directions. Outgoing frames are queued on the connection's mailbox by
//! the chat service and drained here by a dedicated send task.

use crate::chat::{ChatAppState, ChatService, ConnectionHandle, Outbound};
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use futures_util::{SinkExt, StreamExt};
use lib_core::dto::ServerEvent;
use lib_core::AppError;
use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

#[derive(Debug, Deserialize)]
pub struct WsAuthQuery {
    pub token: Option<String>,
}

/// WebSocket handler for the chat.
///
/// **Route**: `GET /api/ws/chat?token=<jwt>`
///
/// The token is checked before the upgrade, so a bad credential gets a plain
/// `401` instead of an opened-then-closed socket.
///
/// # Example
///
/// ```javascript
/// const ws = new WebSocket(`ws://localhost:3001/api/ws/chat?token=${jwt}`);
/// ws.onopen = () => ws.send(JSON.stringify({
///   event: 'chat_request',
///   data: { targetUsername: 'bob' },
/// }));
/// ```
pub async fn chat_websocket(
    State(state): State<ChatAppState>,
    Query(query): Query<WsAuthQuery>,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let token = query.token.as_deref().unwrap_or_default();
    let username = match state.verifier.verify(token) {
        Ok(username) => username,
        Err(e) => {
            warn!(error = %e, "[WS] AUTH_FAILED - Rejecting chat connection");
            return AppError::from(e).into_response();
        }
    };

    let ws = match upgrade {
        Ok(ws) => ws,
        Err(rejection) => {
            warn!(
                username = %username,
                error = %rejection,
                "[WS] UPGRADE_REJECTED user={} error={}",
                username,
                rejection
            );
            return rejection.into_response();
        }
    };

    info!(username = %username, "[WS] UPGRADE_START user={}", username);
    let service = state.service.clone();
    ws.on_upgrade(move |socket| handle_chat_socket(socket, service, username))
}

/// Drive one chat connection until either side goes away.
async fn handle_chat_socket(socket: WebSocket, service: Arc<ChatService>, username: String) {
    let (handle, mut mailbox) = ConnectionHandle::new();
    let connection_id = handle.id();
    let connection_start = Instant::now();
    let frames_sent = Arc::new(AtomicU64::new(0));
    let frames_received = Arc::new(AtomicU64::new(0));

    service.connect(&username, handle.clone()).await;
    info!(
        username = %username,
        connection_id = %connection_id,
        "[WS] CONNECTED user={} connection_id={}",
        username,
        connection_id
    );

    let (mut sender, mut receiver) = socket.split();

    // Mailbox -> socket
    let send_user = username.clone();
    let frames_sent_send = Arc::clone(&frames_sent);
    let mut send_task = tokio::spawn(async move {
        while let Some(item) = mailbox.recv().await {
            match item {
                Outbound::Event(event) => {
                    let frame = match event.to_frame() {
                        Ok(frame) => frame,
                        Err(e) => {
                            error!(
                                username = %send_user,
                                event = event.name(),
                                error = %e,
                                "[WS] SERIALIZE_ERROR user={} error={}",
                                send_user,
                                e
                            );
                            continue;
                        }
                    };
                    if let Err(e) = sender.send(Message::Text(frame.into())).await {
                        debug!(
                            username = %send_user,
                            error = %e,
                            "[WS] SEND_ERROR user={} error={}",
                            send_user,
                            e
                        );
                        break;
                    }
                    frames_sent_send.fetch_add(1, Ordering::Relaxed);
                }
                Outbound::Close(reason) => {
                    info!(
                        username = %send_user,
                        reason = %reason,
                        "[WS] CLOSING user={} reason={}",
                        send_user,
                        reason
                    );
                    let frame = CloseFrame {
                        code: close_code::NORMAL,
                        reason: reason.into(),
                    };
                    if let Err(e) = sender.send(Message::Close(Some(frame))).await {
                        debug!(username = %send_user, error = %e, "[WS] Close frame not delivered");
                    }
                    break;
                }
            }
        }
    });

    // Socket -> dispatcher
    let recv_user = username.clone();
    let recv_service = Arc::clone(&service);
    let frames_received_recv = Arc::clone(&frames_received);
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    frames_received_recv.fetch_add(1, Ordering::Relaxed);
                    debug!(
                        username = %recv_user,
                        size = text.len(),
                        "[WS] FRAME_RECEIVED user={} size={}",
                        recv_user,
                        text.len()
                    );
                    let dispatch = recv_service.spawn_dispatch(recv_user.clone(), handle.clone(), text.as_str().to_string());
                    if let Err(e) = dispatch.await {
                        error!(
                            username = %recv_user,
                            error = ?e,
                            "[WS] DISPATCH_PANIC user={} error={:?}",
                            recv_user,
                            e
                        );
                    }
                }
                Ok(Message::Binary(data)) => {
                    debug!(username = %recv_user, size = data.len(), "[WS] Ignoring binary frame");
                    handle.send(ServerEvent::error("Binary frames are not supported"));
                }
                Ok(Message::Close(frame)) => {
                    let code = frame
                        .as_ref()
                        .map(|f| f.code.to_string())
                        .unwrap_or_else(|| "none".to_string());
                    info!(
                        username = %recv_user,
                        code = %code,
                        "[WS] CLOSE_RECEIVED user={} code={}",
                        recv_user,
                        code
                    );
                    break;
                }
                // Ping/pong replies are handled by axum.
                Ok(_) => {}
                Err(e) => {
                    warn!(
                        username = %recv_user,
                        error = %e,
                        "[WS] RECV_ERROR user={} error={}",
                        recv_user,
                        e
                    );
                    break;
                }
            }
        }
    });

    tokio::select! {
        result = &mut send_task => {
            recv_task.abort();
            if let Err(e) = result {
                error!(username = %username, error = ?e, "[WS] SEND_TASK_ERROR user={} error={:?}", username, e);
            }
        }
        result = &mut recv_task => {
            send_task.abort();
            if let Err(e) = result {
                error!(username = %username, error = ?e, "[WS] RECV_TASK_ERROR user={} error={:?}", username, e);
            }
        }
    }

    service.disconnect(&username, connection_id).await;

    let duration = connection_start.elapsed();
    info!(
        username = %username,
        connection_id = %connection_id,
        duration_ms = duration.as_millis(),
        frames_sent = frames_sent.load(Ordering::Relaxed),
        frames_received = frames_received.load(Ordering::Relaxed),
        "[WS] DISCONNECTED user={} duration={:.2}s",
        username,
        duration.as_secs_f64()
    );
}
