//! WebSocket upgrade: bridges one `EventBus` client to a real Axum
//! WebSocket connection, splitting the socket into a forward task fed
//! by the bus and a read loop handling control frames.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use uuid::Uuid;

use foliofox_model::event::{Event, EventKind};
use foliofox_model::ids::UserId;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct WebSocketQuery {
    pub user_id: Option<Uuid>,
}

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WebSocketQuery>,
) -> Response {
    let user_id = query.user_id.map(UserId::from_uuid);
    ws.on_upgrade(move |socket| handle_socket(socket, state, user_id))
}

async fn handle_socket(socket: WebSocket, state: AppState, user_id: Option<UserId>) {
    let (client_id, mut rx) = state.events.register(user_id);
    let (mut sink, mut stream) = socket.split();

    if let Some(user_id) = user_id {
        let _ = sink
            .send(to_ws_message(&Event::for_user(user_id, EventKind::Authenticated { user_id })))
            .await;
    }

    let forward = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if sink.send(to_ws_message(&event)).await.is_err() {
                break;
            }
        }
    });

    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Pong(_)) => state.events.touch_pong(client_id),
            Ok(Message::Text(text)) if text.trim() == "pong" => state.events.touch_pong(client_id),
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(err) => {
                tracing::debug!(%client_id, error = %err, "websocket read error");
                break;
            }
        }
    }

    forward.abort();
    state.events.unregister(client_id);
}

fn to_ws_message(event: &Event) -> Message {
    match serde_json::to_string(event) {
        Ok(json) => Message::Text(json.into()),
        Err(err) => {
            tracing::error!(error = %err, "failed to serialize event");
            Message::Text("{}".to_string().into())
        }
    }
}
