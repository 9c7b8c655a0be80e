//! Decoding of the listen channel's Server-Sent Events stream.
//!
//! # Design
//! `EventDecoder` is fed raw body chunks as they arrive and hands back every
//! complete frame. Chunk boundaries can fall anywhere, including inside a
//! multi-byte character, so bytes are buffered until a blank line ends the
//! frame. Comment lines (keep-alives) and frames without data are dropped.

use tracing::debug;

use crate::client::ErrorBody;
use crate::error::StoreError;
use crate::types::Snapshot;

/// One decoded SSE frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerEvent {
    /// Value of the `event:` field, `"message"` when absent.
    pub event: String,
    pub data: String,
}

#[derive(Debug, Default)]
pub struct EventDecoder {
    buffer: Vec<u8>,
}

impl EventDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and collect every frame it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<ServerEvent> {
        self.buffer.extend(chunk.iter().copied().filter(|b| *b != b'\r'));

        let mut events = Vec::new();
        while let Some(end) = find_frame_end(&self.buffer) {
            let frame: Vec<u8> = self.buffer.drain(..end + 2).collect();
            if let Some(event) = parse_frame(&String::from_utf8_lossy(&frame[..end])) {
                events.push(event);
            }
        }
        events
    }
}

fn find_frame_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|w| w == b"\n\n")
}

fn parse_frame(frame: &str) -> Option<ServerEvent> {
    let mut event = None;
    let mut data: Option<String> = None;

    for line in frame.lines() {
        if line.starts_with(':') {
            continue;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => event = Some(value.to_string()),
            "data" => match data.as_mut() {
                Some(existing) => {
                    existing.push('\n');
                    existing.push_str(value);
                }
                None => data = Some(value.to_string()),
            },
            _ => {}
        }
    }

    Some(ServerEvent {
        event: event.unwrap_or_else(|| "message".to_string()),
        data: data?,
    })
}

/// Interpret a listen frame. `None` for event kinds this client ignores.
pub fn decode_listen_event(event: &ServerEvent) -> Option<Result<Snapshot, StoreError>> {
    match event.event.as_str() {
        "snapshot" => Some(
            serde_json::from_str(&event.data)
                .map_err(|e| StoreError::DeserializationError(e.to_string())),
        ),
        "error" => Some(Err(match serde_json::from_str::<ErrorBody>(&event.data) {
            Ok(body) => body.into_store_error(None),
            Err(e) => StoreError::DeserializationError(e.to_string()),
        })),
        other => {
            debug!(event = other, "ignoring listen event");
            None
        }
    }
}
