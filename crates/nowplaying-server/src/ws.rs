//! Push transport: one subscriber per WebSocket connection.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::{Sink, SinkExt, StreamExt};
use serde::Serialize;
use tokio::time::Instant;
use tracing::debug;

use nowplaying_core::CurrentMediaSnapshot;

use crate::http::{AppState, MediaPayload};

#[derive(Debug, Serialize)]
struct PushMessage<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(flatten)]
    payload: MediaPayload<'a>,
}

#[derive(Debug, Serialize)]
struct PingMessage {
    #[serde(rename = "type")]
    kind: &'static str,
}

pub async fn handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| session(socket, state))
}

async fn session(socket: WebSocket, state: AppState) {
    let (mut handle, current) = state.hub.subscribe();
    let id = handle.id();
    let (mut sender, mut receiver) = socket.split();
    debug!(id, "WebSocket client connected");

    if send_snapshot(&mut sender, &state, "connected", &current).await.is_ok() {
        let idle = tokio::time::sleep(state.ping_interval);
        tokio::pin!(idle);

        loop {
            tokio::select! {
                _ = state.shutdown.cancelled() => {
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
                update = handle.recv() => {
                    let Some(snapshot) = update else { break };
                    if send_snapshot(&mut sender, &state, "media_update", &snapshot).await.is_err() {
                        break;
                    }
                }
                incoming = receiver.next() => {
                    match incoming {
                        Some(Ok(Message::Text(text))) if text.as_str() == "ping" => {
                            if sender.send(Message::Text("pong".into())).await.is_err() {
                                break;
                            }
                        }
                        Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                        Some(Ok(_)) => {}
                    }
                    idle.as_mut().reset(Instant::now() + state.ping_interval);
                }
                _ = &mut idle => {
                    if send_json(&mut sender, &PingMessage { kind: "ping" }).await.is_err() {
                        break;
                    }
                    idle.as_mut().reset(Instant::now() + state.ping_interval);
                }
            }
        }
    }

    state.hub.unsubscribe(handle);
    debug!(id, "WebSocket client disconnected");
}

async fn send_snapshot<S>(
    sender: &mut S,
    state: &AppState,
    kind: &'static str,
    snapshot: &CurrentMediaSnapshot,
) -> Result<(), axum::Error>
where
    S: Sink<Message, Error = axum::Error> + Unpin,
{
    let message = PushMessage {
        kind,
        payload: MediaPayload::new(state, snapshot),
    };
    send_json(sender, &message).await
}

async fn send_json<S, T>(sender: &mut S, value: &T) -> Result<(), axum::Error>
where
    S: Sink<Message, Error = axum::Error> + Unpin,
    T: Serialize,
{
    let text = serde_json::to_string(value).map_err(axum::Error::new)?;
    sender.send(Message::Text(text.into())).await
}
