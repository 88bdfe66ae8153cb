//! WebSocket connection handlers.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{
        State,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade, close_code},
    },
    http::HeaderValue,
    response::Response,
};
use futures_util::{
    sink::SinkExt,
    stream::{SplitSink, StreamExt},
};
use uuid::Uuid;

use crate::{
    domain::{FrameSink, PushError, User},
    infrastructure::fanout::Connection,
    ui::{
        auth::{AuthUser, SESSION_HEADER},
        error::ApiError,
        state::AppState,
    },
};

/// Outbound half of an axum websocket.
struct WebSocketSink {
    sender: SplitSink<WebSocket, Message>,
}

#[async_trait]
impl FrameSink for WebSocketSink {
    async fn send_text(&mut self, payload: &str) -> Result<(), PushError> {
        self.sender
            .send(Message::Text(payload.to_string().into()))
            .await
            .map_err(|e| PushError::SendFailed(e.to_string()))
    }

    async fn send_ping(&mut self) -> Result<(), PushError> {
        self.sender
            .send(Message::Ping(Default::default()))
            .await
            .map_err(|e| PushError::SendFailed(e.to_string()))
    }

    async fn close(&mut self, reason: &str) -> Result<(), PushError> {
        let frame = CloseFrame {
            code: close_code::NORMAL,
            reason: reason.to_string().into(),
        };
        self.sender
            .send(Message::Close(Some(frame)))
            .await
            .map_err(|e| PushError::SendFailed(e.to_string()))
    }
}

/// Upgrade to a live message stream.
///
/// The response carries the new session id in the `Session-Id` header.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> Result<Response, ApiError> {
    state.connect_listener_usecase.authorize(&user)?;

    let session_id = Uuid::new_v4().to_string();
    let header = HeaderValue::from_str(&session_id)
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    let mut response = ws.on_upgrade(move |socket| handle_socket(socket, state, user, session_id));
    response.headers_mut().insert(SESSION_HEADER, header);
    Ok(response)
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, user: Arc<User>, session_id: String) {
    let (sender, mut receiver) = socket.split();
    let conn = Arc::new(Connection::new(
        session_id.clone(),
        Box::new(WebSocketSink { sender }),
        state.liveness,
    ));

    if let Err(e) = state
        .connect_listener_usecase
        .execute(&user, conn.clone())
        .await
    {
        tracing::warn!(session = %session_id, "Failed to register listener: {}", e);
        conn.close(&e.to_string()).await;
        return;
    }

    // Inbound frames only matter for liveness; clients post over HTTP.
    while let Some(frame) = receiver.next().await {
        match frame {
            Ok(Message::Pong(_)) => conn.pong_received(),
            Ok(Message::Close(_)) => {
                tracing::info!(session = %session_id, "Client requested close");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(session = %session_id, "WebSocket error: {}", e);
                break;
            }
        }
    }

    conn.close("Connection closed").await;
    tracing::info!(user = %user.name, session = %session_id, "Listener disconnected");
}
