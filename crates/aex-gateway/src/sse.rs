// Path: crates/aex-gateway/src/sse.rs
//! Adapts `aex_core::dispatch::StreamFrame` (raw SSE `data:` payload
//! strings) onto an axum `Sse` response body.

use aex_core::StreamFrame;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use std::convert::Infallible;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

pub fn stream_response(rx: mpsc::Receiver<StreamFrame>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let events = ReceiverStream::new(rx).map(|frame| match frame {
        Ok(payload) => Ok(Event::default().data(payload)),
        Err(e) => Ok(Event::default().event("error").data(e.to_string())),
    });
    Sse::new(events).keep_alive(KeepAlive::default())
}
