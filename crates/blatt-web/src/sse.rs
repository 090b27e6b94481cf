//! Server-Sent Events (SSE) streaming of pipeline progress.

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_core::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use crate::state::{AppEvent, SharedState};

/// SSE endpoint. Server events and controller stage events share one stream;
/// lagged receivers skip what they missed.
pub async fn sse_handler(State(state): State<SharedState>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let app = BroadcastStream::new(state.subscribe()).filter_map(|r| r.ok());
    let pipeline = BroadcastStream::new(state.subscribe_pipeline()).filter_map(|r| r.ok().map(AppEvent::from));

    let stream = app.merge(pipeline).filter_map(|event| {
        serde_json::to_string(&event).ok().map(|data| Ok(Event::default().data(data)))
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)).text("ping"))
}
