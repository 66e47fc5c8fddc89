//! `GET /ws` upgrade and the subscribe/unsubscribe/publish envelope
//! protocol carried over it.

use axum::extract::ws::{CloseFrame, Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use uuid::Uuid;

use computor_core::ApiError;
use computor_realtime::{Channel, ChannelParseError, ConnectionSender};

use crate::realtime::publish_to_redis;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/ws", get(upgrade))
}

/// Browsers cannot set an `Authorization` header on the WebSocket
/// handshake, so the access token travels as a query parameter instead.
#[derive(Debug, Deserialize)]
pub struct WsAuthQuery {
    pub token: String,
}

async fn upgrade(
    State(state): State<AppState>,
    Query(query): Query<WsAuthQuery>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let user_id = state.sessions.validate_access(&query.token).await?;
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, user_id)))
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientEnvelope {
    Subscribe { channel: String },
    Unsubscribe { channel: String },
    Publish { channel: String, payload: serde_json::Value },
    Ping,
}

async fn handle_socket(socket: WebSocket, state: AppState, user_id: Uuid) {
    let connection_id = match state.realtime.connect(user_id).await {
        Ok(id) => id,
        Err(err) => {
            let (mut sender, _) = socket.split();
            let frame = CloseFrame {
                code: err.close_code(),
                reason: err.to_string().into(),
            };
            let _ = sender.send(WsMessage::Close(Some(frame))).await;
            return;
        }
    };

    let (sender, mut receiver) = socket.split();
    state.connection_sender.register(connection_id, sender);

    while let Some(Ok(message)) = receiver.next().await {
        match message {
            WsMessage::Text(text) => {
                if let Err(err) = handle_client_message(&state, connection_id, user_id, &text).await {
                    let envelope = serde_json::json!({"type": "error", "message": err.to_string()});
                    let _ = state.connection_sender.send(connection_id, envelope).await;
                }
            }
            WsMessage::Close(_) => break,
            _ => {}
        }
    }

    state.connection_sender.deregister(connection_id);
    for action in state.realtime.disconnect(connection_id, user_id).await {
        let _ = state.bridge.send(action);
    }
}

async fn handle_client_message(
    state: &AppState,
    connection_id: Uuid,
    user_id: Uuid,
    text: &str,
) -> Result<(), ApiError> {
    let envelope: ClientEnvelope = serde_json::from_str(text)
        .map_err(|e| ApiError::validation(format!("malformed websocket frame: {e}")))?;

    match envelope {
        ClientEnvelope::Subscribe { channel } => {
            let bridge_action = state.realtime.subscribe(connection_id, user_id, &channel).await?;
            if let Some(action) = bridge_action {
                let _ = state.bridge.send(action);
            }
            let reply = serde_json::json!({"type": "subscribed", "channel": channel});
            state.connection_sender.send(connection_id, reply).await?;
        }
        ClientEnvelope::Unsubscribe { channel } => {
            let parsed = parse_channel(&channel)?;
            if let Some(action) = state.realtime.unsubscribe(connection_id, parsed) {
                let _ = state.bridge.send(action);
            }
            let reply = serde_json::json!({"type": "unsubscribed", "channel": channel});
            state.connection_sender.send(connection_id, reply).await?;
        }
        ClientEnvelope::Publish { channel, payload } => {
            let parsed = parse_channel(&channel)?;
            publish_to_redis(&state.redis, parsed, &payload).await?;
        }
        ClientEnvelope::Ping => {
            state.connection_sender.send(connection_id, serde_json::json!({"type": "pong"})).await?;
        }
    }
    Ok(())
}

fn parse_channel(raw: &str) -> Result<Channel, ApiError> {
    raw.parse().map_err(|e: ChannelParseError| ApiError::validation(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_channel_accepts_well_formed_names() {
        let id = Uuid::new_v4();
        assert_eq!(parse_channel(&format!("course:{id}")).unwrap(), Channel::Course(id));
    }

    #[test]
    fn parse_channel_rejects_unknown_kind() {
        assert!(parse_channel(&format!("workspace:{}", Uuid::new_v4())).is_err());
    }

    #[test]
    fn client_envelope_parses_subscribe() {
        let raw = r#"{"type": "subscribe", "channel": "course:123"}"#;
        let envelope: ClientEnvelope = serde_json::from_str(raw).unwrap();
        assert!(matches!(envelope, ClientEnvelope::Subscribe { channel } if channel == "course:123"));
    }

    #[test]
    fn client_envelope_parses_publish() {
        let raw = r#"{"type": "publish", "channel": "course:123", "payload": {"hello": "world"}}"#;
        let envelope: ClientEnvelope = serde_json::from_str(raw).unwrap();
        assert!(matches!(envelope, ClientEnvelope::Publish { channel, .. } if channel == "course:123"));
    }

    #[test]
    fn client_envelope_parses_ping() {
        let envelope: ClientEnvelope = serde_json::from_str(r#"{"type": "ping"}"#).unwrap();
        assert!(matches!(envelope, ClientEnvelope::Ping));
    }

    #[test]
    fn client_envelope_rejects_unknown_type() {
        assert!(serde_json::from_str::<ClientEnvelope>(r#"{"type": "explode"}"#).is_err());
    }
}
