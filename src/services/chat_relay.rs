use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::broadcast::{self, error::RecvError};
use uuid::Uuid;

pub const RELAY_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
struct RelayFrame {
    sender: Uuid,
    data: Value,
}

#[derive(Debug, Deserialize)]
struct ClientFrame {
    event: String,
    #[serde(default)]
    data: Value,
}

/// Fan-out hub for the chat socket. Nothing is persisted; a receiver that
/// falls behind skips what it missed.
#[derive(Clone)]
pub struct ChatRelay {
    tx: broadcast::Sender<RelayFrame>,
}

impl Default for ChatRelay {
    fn default() -> Self {
        Self::new(RELAY_CAPACITY)
    }
}

impl ChatRelay {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> ChatSubscriber {
        ChatSubscriber {
            id: Uuid::new_v4(),
            rx: self.tx.subscribe(),
        }
    }

    /// Broadcast to every subscriber except `sender`. Returns how many
    /// subscribers were listening, the sender included.
    pub fn publish(&self, sender: Uuid, data: Value) -> usize {
        self.tx.send(RelayFrame { sender, data }).unwrap_or(0)
    }

    pub fn connections(&self) -> usize {
        self.tx.receiver_count()
    }
}

pub struct ChatSubscriber {
    pub id: Uuid,
    rx: broadcast::Receiver<RelayFrame>,
}

impl ChatSubscriber {
    /// Next message from another client, `None` once the relay is gone.
    pub async fn next(&mut self) -> Option<Value> {
        loop {
            match self.rx.recv().await {
                Ok(frame) if frame.sender == self.id => continue,
                Ok(frame) => return Some(frame.data),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Chat client {} lagged, skipped {} messages", self.id, skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

/// Payload of a `sendMessage` frame; other events are ignored.
pub fn parse_client_frame(text: &str) -> Option<Value> {
    let frame: ClientFrame = serde_json::from_str(text).ok()?;
    (frame.event == "sendMessage").then_some(frame.data)
}

pub fn outgoing_frame(data: &Value) -> String {
    json!({ "event": "receiveMessage", "data": data }).to_string()
}

/// Drive one websocket until either side hangs up.
pub async fn handle_socket(socket: WebSocket, relay: ChatRelay) {
    let mut subscriber = relay.subscribe();
    let id = subscriber.id;
    tracing::info!("Chat client connected: {} ({} online)", id, relay.connections());

    let (mut sink, mut stream) = socket.split();

    let mut send_task = tokio::spawn(async move {
        while let Some(data) = subscriber.next().await {
            if sink.send(Message::Text(outgoing_frame(&data).into())).await.is_err() {
                break;
            }
        }
    });

    let inbound = relay.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = stream.next().await {
            match msg {
                Ok(Message::Text(text)) => match parse_client_frame(text.as_str()) {
                    Some(data) => {
                        inbound.publish(id, data);
                    }
                    None => tracing::debug!("Ignoring chat frame from {}: {}", id, text.as_str()),
                },
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!("Chat recv error from {}: {}", id, e);
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    tracing::info!("Chat client disconnected: {}", id);
}
