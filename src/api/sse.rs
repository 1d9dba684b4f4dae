//! Server-Sent Events support

use crate::broadcast::UiEvent;
use crate::state_machine::CoreState;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

/// Convert the UI event stream to SSE, starting with the current state
pub fn sse_stream(
    current: CoreState,
    broadcast_rx: tokio::sync::broadcast::Receiver<UiEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let init = UiEvent::StateChange { state: current };
    let init = futures::stream::once(async move { Ok(ui_event_to_axum(&init)) });

    let broadcasts = BroadcastStream::new(broadcast_rx).filter_map(|result| match result {
        Ok(event) => Some(Ok(ui_event_to_axum(&event))),
        Err(_) => None, // Skip lagged messages
    });

    Sse::new(init.chain(broadcasts)).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}

fn ui_event_to_axum(event: &UiEvent) -> Event {
    let event_type = match event {
        UiEvent::StateChange { .. } => "state_change",
        UiEvent::Transcription { .. } => "transcription",
        UiEvent::Reply { .. } => "reply",
        UiEvent::Skill { .. } => "skill",
    };
    let data = serde_json::to_string(event).unwrap_or_default();
    Event::default().event(event_type).data(data)
}
