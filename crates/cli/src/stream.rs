//! Tails the `zerg-api` WebSocket hub and prints each envelope, grounded on
//! the teacher's `acp-tui/src/websocket.rs` `connect_async` usage, stripped
//! down to a one-shot read loop instead of a reconnecting background task
//! (there's no TUI event loop here to feed).

use anyhow::{Context, Result};
use futures::StreamExt;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::warn;
use zerg_common::events::Envelope;

pub async fn tail(ws_url: &str, token: &str, topic: &str) -> Result<()> {
    let url = format!("{}?token={}", ws_url, token);
    let (ws_stream, _) = connect_async(&url).await.context("failed to connect to websocket hub")?;
    let (mut sender, mut receiver) = ws_stream.split();

    let subscribe = Envelope {
        v: 1,
        ty: "subscribe".to_string(),
        topic: topic.to_string(),
        req_id: None,
        ts: 0,
        data: serde_json::Value::Null,
    };
    use futures::SinkExt;
    sender.send(Message::Text(serde_json::to_string(&subscribe)?)).await?;

    println!("subscribed to {topic}, streaming... (ctrl-c to stop)");
    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => match serde_json::from_str::<Envelope>(&text) {
                Ok(envelope) => println!("[{}] {}", envelope.ty, envelope.data),
                Err(e) => warn!(error = %e, "malformed envelope from hub"),
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "websocket read error");
                break;
            }
        }
    }
    Ok(())
}
