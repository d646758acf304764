//! Connection handlers for the Confab server.
//!
//! This module owns the transport side of the engine: the WebSocket
//! lifecycle, the identity handshake, and the pump that moves queued
//! deliveries onto the wire. All routing decisions stay in `confab-core`;
//! the handlers only decode events, invoke the engine, and push the
//! deliveries it returns.

use crate::config::Config;
use crate::metrics::{self, ConnectionMetricsGuard};
use anyhow::Result;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use confab_core::{
    ConnectionHandle, ConnectionRegistry, CoreError, Delivery, HistoryStore, MemoryHistory,
    MessageRouter, PresenceBroadcaster, RoomManager, TypingIndicatorRouter, TypingTarget,
    UserDirectory, UserId,
};
use confab_protocol::{codec, ClientEvent, ClientHello, ErrorCode, ServerEvent};
use futures_util::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

/// Shared server state: the engine components plus configuration.
pub struct AppState {
    pub directory: Arc<UserDirectory>,
    pub registry: Arc<ConnectionRegistry>,
    pub rooms: Arc<RoomManager>,
    pub router: MessageRouter,
    pub presence: PresenceBroadcaster,
    pub typing: TypingIndicatorRouter,
    pub config: Config,
}

impl AppState {
    /// Assemble the engine from configuration.
    #[must_use]
    pub fn new(config: Config) -> Self {
        let directory = Arc::new(UserDirectory::new());
        let registry = Arc::new(ConnectionRegistry::new());
        let rooms = Arc::new(RoomManager::new());
        let history: Arc<dyn HistoryStore> =
            Arc::new(MemoryHistory::with_capacity(config.limits.history_capacity));

        let router = MessageRouter::new(
            directory.clone(),
            registry.clone(),
            rooms.clone(),
            history,
        );
        let presence = PresenceBroadcaster::new(directory.clone(), registry.clone());
        let typing =
            TypingIndicatorRouter::new(directory.clone(), registry.clone(), rooms.clone());

        Self {
            directory,
            registry,
            rooms,
            router,
            presence,
            typing,
            config,
        }
    }
}

/// Run the HTTP/WebSocket server.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    let state = Arc::new(AppState::new(config.clone()));

    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let app = Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state);

    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr).await?;

    info!("Confab server listening on {}", addr);
    info!("WebSocket endpoint: ws://{}/ws", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check handler.
async fn health_handler() -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_websocket(socket, state))
}

/// Handle a WebSocket connection from handshake to teardown.
async fn handle_websocket(socket: WebSocket, state: Arc<AppState>) {
    let _metrics_guard = ConnectionMetricsGuard::new();
    let (mut sender, mut receiver) = socket.split();

    if state.registry.online_count() >= state.config.limits.max_connections {
        warn!("Connection rejected: at capacity");
        let _ = send_event(
            &mut sender,
            &ServerEvent::Error {
                code: ErrorCode::Auth,
                message: "server at capacity".into(),
            },
        )
        .await;
        return;
    }

    // First frame must be the identity handshake.
    let Some(hello) = read_hello(&mut sender, &mut receiver).await else {
        return;
    };
    let ClientHello::Hello {
        username,
        status,
        avatar,
    } = hello;

    let user_id = state.directory.intern(&username);
    if let Some(status) = status {
        state.directory.set_status(user_id, status);
    }
    if avatar.is_some() {
        state.directory.set_avatar(user_id, avatar);
    }
    state.directory.touch_last_seen(user_id);

    let (handle, mut outbound) = ConnectionHandle::new(user_id);
    if let Some(displaced) = state.registry.register(handle.clone()) {
        // The older session learns it was replaced and closes itself.
        displaced.send(ServerEvent::SessionReplaced);
    }
    metrics::set_online_users(state.registry.online_count());

    debug!(user = %username, connection = handle.id(), "Connected");

    if send_event(
        &mut sender,
        &ServerEvent::Connected {
            user_id,
            username: username.clone(),
        },
    )
    .await
    .is_err()
    {
        state.registry.unregister(user_id, handle.id());
        return;
    }
    push_deliveries(state.presence.refresh());

    // Event loop: pump queued deliveries out, dispatch inbound events.
    loop {
        tokio::select! {
            biased;

            Some(event) = outbound.recv() => {
                let replaced = matches!(event, ServerEvent::SessionReplaced);
                if send_event(&mut sender, &event).await.is_err() {
                    break;
                }
                if replaced {
                    debug!(user = %username, connection = handle.id(), "Session replaced");
                    break;
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let start = Instant::now();
                        metrics::record_message("inbound");
                        handle_text(&state, user_id, &handle, &text).await;
                        metrics::record_routing_latency(start.elapsed().as_secs_f64());
                    }
                    Some(Ok(Message::Binary(_))) => {
                        warn!(user = %username, "Ignoring binary frame");
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        // Ignore pongs
                    }
                    Some(Ok(Message::Close(_))) => {
                        debug!(user = %username, "Received close frame");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(user = %username, error = %e, "WebSocket error");
                        metrics::record_error("websocket");
                        break;
                    }
                    None => {
                        debug!(user = %username, "WebSocket stream ended");
                        break;
                    }
                }
            }
        }
    }

    // Teardown. A displaced session's unregister is a no-op and must not
    // trigger a presence rebroadcast for the newer connection.
    if state.registry.unregister(user_id, handle.id()) {
        state.directory.touch_last_seen(user_id);
        push_deliveries(state.presence.refresh());
    }
    metrics::set_online_users(state.registry.online_count());

    debug!(user = %username, connection = handle.id(), "Disconnected");
}

/// Read frames until the `hello` handshake arrives or the socket closes.
async fn read_hello(
    sender: &mut SplitSink<WebSocket, Message>,
    receiver: &mut SplitStream<WebSocket>,
) -> Option<ClientHello> {
    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => match codec::decode_hello(&text) {
                Ok(hello) => return Some(hello),
                Err(e) => {
                    metrics::record_error("handshake");
                    let _ = send_event(
                        sender,
                        &ServerEvent::Error {
                            code: ErrorCode::Auth,
                            message: format!("expected hello: {e}"),
                        },
                    )
                    .await;
                    return None;
                }
            },
            Ok(Message::Ping(data)) => {
                if sender.send(Message::Pong(data)).await.is_err() {
                    return None;
                }
            }
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(_) => {}
        }
    }
    None
}

/// Decode one inbound text frame and run it through the engine.
///
/// Failures are reported to the originating connection as `error` events;
/// nothing here propagates.
async fn handle_text(state: &Arc<AppState>, user_id: UserId, handle: &ConnectionHandle, text: &str) {
    if text.len() > state.config.limits.max_message_size {
        report(handle, ErrorCode::Validation, "event too large");
        return;
    }

    let event = match codec::decode_client(text) {
        Ok(event) => event,
        Err(e) => {
            report(handle, ErrorCode::Validation, &e.to_string());
            return;
        }
    };

    match dispatch(state, user_id, event).await {
        Ok(deliveries) => push_deliveries(deliveries),
        Err(e) => {
            debug!(user = user_id, error = %e, "Request failed");
            report(handle, e.code(), &e.to_string());
        }
    }
    metrics::set_active_rooms(state.rooms.room_count());
}

/// Map a client event onto the engine operation it names.
async fn dispatch(
    state: &Arc<AppState>,
    user_id: UserId,
    event: ClientEvent,
) -> Result<Vec<Delivery>, CoreError> {
    match event {
        ClientEvent::SendPrivate {
            to,
            message,
            file_data,
        } => {
            state
                .router
                .route_private(user_id, &to, message, file_data)
                .await
        }
        ClientEvent::SendGroup {
            room_id,
            message,
            file_data,
        } => {
            state
                .router
                .route_group(user_id, room_id, message, file_data)
                .await
        }
        ClientEvent::CreateGroup {
            group_name,
            members,
        } => state.router.create_group(user_id, &group_name, &members),
        ClientEvent::JoinRoom { room_id } => state.router.join_room(user_id, room_id).await,
        ClientEvent::LeaveRoom { room_id } => state.router.leave_room(user_id, room_id),
        ClientEvent::Typing { to, room_id } => {
            let target = typing_target(to, room_id)?;
            state.typing.notify(user_id, target, true)
        }
        ClientEvent::StopTyping { to, room_id } => {
            let target = typing_target(to, room_id)?;
            state.typing.notify(user_id, target, false)
        }
        ClientEvent::UpdateStatus { status } => {
            state.directory.set_status(user_id, status);
            Ok(state.presence.refresh())
        }
        ClientEvent::SearchMessages { query } => {
            state.router.search_messages(user_id, &query).await
        }
    }
}

/// A typing indicator addresses exactly one of a user or a room.
fn typing_target(to: Option<String>, room_id: Option<u64>) -> Result<TypingTarget, CoreError> {
    match (to, room_id) {
        (Some(username), None) => Ok(TypingTarget::User(username)),
        (None, Some(room_id)) => Ok(TypingTarget::Room(room_id)),
        _ => Err(CoreError::Validation(
            "typing needs exactly one of `to` or `room_id`".into(),
        )),
    }
}

/// Queue an `error` event on a connection.
fn report(handle: &ConnectionHandle, code: ErrorCode, message: &str) {
    metrics::record_error(error_label(code));
    handle.send(ServerEvent::Error {
        code,
        message: message.to_string(),
    });
}

fn error_label(code: ErrorCode) -> &'static str {
    match code {
        ErrorCode::Validation => "validation",
        ErrorCode::NotFound => "not_found",
        ErrorCode::Forbidden => "forbidden",
        ErrorCode::Persistence => "persistence",
        ErrorCode::Auth => "auth",
    }
}

/// Push engine deliveries onto their per-connection queues.
fn push_deliveries(deliveries: Vec<Delivery>) {
    for delivery in deliveries {
        if delivery.push() {
            metrics::record_message("outbound");
        }
    }
}

/// Encode and send one event on the wire.
async fn send_event(
    sender: &mut SplitSink<WebSocket, Message>,
    event: &ServerEvent,
) -> Result<()> {
    let text = codec::encode_server(event)?;
    sender.send(Message::Text(text)).await?;
    Ok(())
}
