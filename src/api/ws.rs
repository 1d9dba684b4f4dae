//! Websocket push of UI events
//!
//! Push only: the first frame is the current state, then every `UiEvent` as
//! JSON text. Anything the client sends is ignored apart from close.

use crate::broadcast::UiEvent;
use crate::state_machine::CoreState;
use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast::{self, error::RecvError};

pub async fn push_events(socket: WebSocket, current: CoreState, mut rx: broadcast::Receiver<UiEvent>) {
    let (mut sink, mut incoming) = socket.split();

    if send(&mut sink, &UiEvent::StateChange { state: current }).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Ok(event) => {
                    if send(&mut sink, &event).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Websocket observer lagged");
                }
                Err(RecvError::Closed) => break,
            },
            message = incoming.next() => match message {
                Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
    tracing::debug!("Websocket observer disconnected");
}

async fn send<S>(sink: &mut S, event: &UiEvent) -> Result<(), axum::Error>
where
    S: SinkExt<Message, Error = axum::Error> + Unpin,
{
    let text = serde_json::to_string(event).unwrap_or_default();
    sink.send(Message::Text(text)).await
}
