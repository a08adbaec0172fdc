//! Push channel: server-sent seat snapshots.
//!
//! The booking backend streams `update` events whose data is the full seat list as JSON.
//! [`SseDecoder`] turns raw bytes into events, [`seat_snapshots`] turns a byte stream into
//! decoded snapshots, and [`SeatFeed`] keeps a channel open, reconnecting when it drops.

use crate::api::{BookingApi, SeatStream};
use crate::error::ApiError;
use crate::types::Seat;
use async_stream::stream;
use futures::stream::{Stream, StreamExt};
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Event name carrying seat snapshots
pub const UPDATE_EVENT: &str = "update";

const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(3);

/// One dispatched server-sent event
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SseEvent {
    /// Event name (`message` when the server sent none)
    pub event: String,
    /// Data lines joined with `\n`
    pub data: String,
}

/// Incremental `text/event-stream` parser
///
/// Bytes may be split anywhere, including inside a UTF-8 sequence or a line ending.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    /// Create an empty decoder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every event it completes
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\n', '\r']);

            if let Some(event) = self.line(line) {
                events.push(event);
            }
        }
        events
    }

    fn line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            _ => {},
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseEvent {
            event: event.unwrap_or_else(|| "message".to_string()),
            data,
        })
    }
}

/// Decode a push channel byte stream into seat snapshots
///
/// Only `update` events are forwarded. A payload that does not decode is logged and
/// skipped. A transport error is yielded once as [`ApiError::StreamFailed`] and ends the
/// stream.
pub fn seat_snapshots<S, B, E>(bytes: S) -> SeatStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    Box::pin(stream! {
        let mut decoder = SseDecoder::new();

        for await chunk in bytes {
            match chunk {
                Ok(chunk) => {
                    for event in decoder.feed(chunk.as_ref()) {
                        if event.event != UPDATE_EVENT {
                            tracing::trace!(event = %event.event, "Ignoring push event");
                            continue;
                        }
                        match serde_json::from_str::<Vec<Seat>>(&event.data) {
                            Ok(seats) => yield Ok(seats),
                            Err(e) => {
                                tracing::warn!(error = %e, "Skipping undecodable seat update");
                            },
                        }
                    }
                },
                Err(e) => {
                    yield Err(ApiError::StreamFailed(e.to_string()));
                    break;
                },
            }
        }
    })
}

/// Long-lived subscription to the push channel
///
/// Opens the channel, hands every snapshot to the sink and reopens the channel after a
/// fixed delay whenever it fails or closes.
pub struct SeatFeed {
    api: Arc<dyn BookingApi>,
    reconnect_delay: Duration,
}

impl SeatFeed {
    /// Create a feed with the default 3 second reconnect delay
    #[must_use]
    pub fn new(api: Arc<dyn BookingApi>) -> Self {
        Self {
            api,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }

    /// Override the reconnect delay
    #[must_use]
    pub const fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Run until the sink returns `false`
    ///
    /// Connection errors are logged; the feed itself never gives up.
    pub async fn run<F, Fut>(self, mut sink: F)
    where
        F: FnMut(Vec<Seat>) -> Fut,
        Fut: Future<Output = bool>,
    {
        let mut connection = 0_u64;

        loop {
            connection += 1;
            tracing::debug!(connection, "Opening push channel");

            match self.api.seat_updates().await {
                Ok(mut updates) => {
                    tracing::info!(connection, "Push channel connected");
                    while let Some(update) = updates.next().await {
                        match update {
                            Ok(seats) => {
                                tracing::debug!(seats = seats.len(), "Seat snapshot received");
                                if !sink(seats).await {
                                    tracing::debug!("Seat feed sink closed, stopping");
                                    return;
                                }
                            },
                            Err(e) => {
                                tracing::warn!(error = %e, "Push channel failed");
                                break;
                            },
                        }
                    }
                },
                Err(e) => {
                    tracing::warn!(error = %e, "Could not open push channel");
                },
            }

            tracing::info!(
                delay_ms = u64::try_from(self.reconnect_delay.as_millis()).unwrap_or(u64::MAX),
                "Reconnecting push channel"
            );
            tokio::time::sleep(self.reconnect_delay).await;
        }
    }
}
