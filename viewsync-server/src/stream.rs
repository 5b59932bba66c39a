//! Change notifications via Server-Sent Events.
//!
//! `GET /rpc/subscribeToChanges` streams one SSE event per change:
//!
//! ```text
//! event: time_point_changed
//! data: {"kind":"time_point_changed"}
//! ```
//!
//! Events carry no values. Clients call the matching getter to read the new
//! state. The stream ends when the client disconnects, when the change bus
//! closes, or within one poll interval of server shutdown.

use std::{convert::Infallible, time::Duration};

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::Stream;
use serde_json::json;
use viewsync_core::{ChangeEvent, Poll};

use crate::metrics;
use crate::service::ViewService;
use crate::AppState;

/// How long the stream waits for an event before checking for shutdown.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Keeps the active-subscriber gauge in step with live streams.
struct SubscriberGauge;

impl SubscriberGauge {
    fn new() -> Self {
        metrics::inc_stream_subscribers();
        Self
    }
}

impl Drop for SubscriberGauge {
    fn drop(&mut self) {
        metrics::dec_stream_subscribers();
    }
}

/// Build the SSE event for one change.
#[must_use]
pub fn sse_event(event: ChangeEvent) -> Event {
    Event::default()
        .event(event.as_str())
        .data(json!({ "kind": event }).to_string())
}

/// Stream of change events for one subscriber.
///
/// The subscription is taken immediately, so every change published after
/// this call is delivered even if the stream is polled later.
pub fn change_stream(
    service: &ViewService,
    poll: Duration,
) -> impl Stream<Item = Result<Event, Infallible>> {
    let mut subscription = service.subscribe();
    let shutdown = service.shutdown().clone();
    let id = subscription.id();
    tracing::info!(subscriber = %id, "Change stream opened");

    async_stream::stream! {
        let _gauge = SubscriberGauge::new();
        loop {
            match subscription.recv_timeout(poll).await {
                Poll::Event(event) => yield Ok(sse_event(event)),
                Poll::Timeout => {}
                Poll::Closed => break,
            }
            // A steady flow of events must not hold the stream open.
            if shutdown.is_triggered() {
                break;
            }
        }
        tracing::info!(subscriber = %id, "Change stream ended");
    }
}

/// SSE handler for `subscribeToChanges`.
///
/// # Example
///
/// ```text
/// curl -N http://localhost:50846/rpc/subscribeToChanges
/// ```
#[tracing::instrument(name = "subscribe_to_changes", skip(state))]
pub async fn subscribe_handler(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    Sse::new(change_stream(&state.service, POLL_INTERVAL)).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("heartbeat"),
    )
}
