//! Chat source contract and the NDJSON relay client.
//!
//! The ingestion session only sees the `ChatSource` trait: room metadata
//! lookup plus a channel of typed events that closes on graceful stream end
//! or yields one final `Err` on transport failure. The production
//! implementation streams newline-delimited JSON from a relay endpoint;
//! tests substitute a scripted mock.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::config::SourceConfig;

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("chat relay request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("chat relay returned status {0}")]
    Status(reqwest::StatusCode),
    #[error("chat stream broke: {0}")]
    Stream(String),
}

/// Room metadata from the source. The nickname lookup is best-effort; the
/// session falls back to the room identifier when it is missing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RoomInfo {
    pub nickname: Option<String>,
}

fn one() -> u64 {
    1
}

/// One typed occurrence delivered by the chat source.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    Comment {
        user: String,
        text: String,
    },
    Gift {
        user: String,
        #[serde(default)]
        gift_name: String,
        #[serde(default = "one")]
        quantity: u64,
        #[serde(default)]
        unit_value: u64,
    },
    Join {
        user: String,
    },
    Follow {
        user: String,
    },
    Share {
        user: String,
    },
    Like {
        user: String,
        #[serde(default = "one")]
        count: u64,
    },
    Subscribe {
        user: String,
    },
    Question {
        user: String,
        text: String,
    },
    Poll {
        #[serde(default)]
        question: String,
    },
    StreamEnd,
}

/// A live chat feed. `connect` resolves once the stream is established;
/// events then arrive on the returned channel until it closes (graceful end)
/// or delivers an `Err` (unrecoverable failure).
#[async_trait]
pub trait ChatSource: Send + Sync {
    async fn room_info(&self, room: &str) -> Result<RoomInfo, SourceError>;

    async fn connect(
        &self,
        room: &str,
    ) -> Result<mpsc::Receiver<Result<ChatEvent, SourceError>>, SourceError>;
}

/// Production source: streams NDJSON events from a chat relay over HTTP.
pub struct RelaySource {
    base_url: String,
    client: Client,
}

impl RelaySource {
    pub fn new(config: &SourceConfig) -> Self {
        // Connect timeout only — the event stream itself is long-lived.
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
        }
    }
}

#[async_trait]
impl ChatSource for RelaySource {
    async fn room_info(&self, room: &str) -> Result<RoomInfo, SourceError> {
        let url = format!("{}/rooms/{room}", self.base_url);
        let resp = self.client.get(&url).send().await?;
        if !resp.status().is_success() {
            return Err(SourceError::Status(resp.status()));
        }
        Ok(resp.json().await?)
    }

    async fn connect(
        &self,
        room: &str,
    ) -> Result<mpsc::Receiver<Result<ChatEvent, SourceError>>, SourceError> {
        let url = format!("{}/rooms/{room}/events", self.base_url);
        let resp = self.client.get(&url).send().await?;
        if !resp.status().is_success() {
            return Err(SourceError::Status(resp.status()));
        }

        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            let mut stream = resp.bytes_stream();
            let mut lines = LineAssembler::new();

            while let Some(chunk) = stream.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        let _ = tx.send(Err(SourceError::Stream(e.to_string()))).await;
                        return;
                    }
                };

                for event in lines.push(&chunk) {
                    if tx.send(Ok(event)).await.is_err() {
                        // Session went away; stop reading.
                        return;
                    }
                }
            }
            debug!("Chat stream ended");
        });

        Ok(rx)
    }
}

const MAX_LINE_BYTES: usize = 64 * 1024;

/// Reassembles NDJSON lines from arbitrary chunk boundaries. A line that
/// exceeds `MAX_LINE_BYTES` without a newline is discarded wholesale, so a
/// relay that stops sending newlines cannot grow the buffer without bound.
struct LineAssembler {
    buffer: Vec<u8>,
    discarding: bool,
}

impl LineAssembler {
    fn new() -> Self {
        Self {
            buffer: Vec::new(),
            discarding: false,
        }
    }

    fn push(&mut self, chunk: &[u8]) -> Vec<ChatEvent> {
        let mut events = Vec::new();
        self.buffer.extend_from_slice(chunk);

        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if self.discarding {
                // Tail of an oversized line; resume with the next one.
                self.discarding = false;
                continue;
            }
            if let Some(event) = parse_line(&line[..line.len() - 1]) {
                events.push(event);
            }
        }

        if self.buffer.len() > MAX_LINE_BYTES {
            warn!(
                "Discarding oversized chat line ({} bytes buffered)",
                self.buffer.len()
            );
            self.buffer.clear();
            self.discarding = true;
        }
        events
    }
}

fn parse_line(line: &[u8]) -> Option<ChatEvent> {
    let line = std::str::from_utf8(line).ok()?.trim();
    if line.is_empty() {
        return None;
    }
    match serde_json::from_str(line) {
        Ok(event) => Some(event),
        Err(e) => {
            warn!("Skipping malformed chat event: {e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tagged_events() {
        let event = parse_line(br#"{"type": "comment", "user": "ana", "text": "hi"}"#).unwrap();
        assert_eq!(
            event,
            ChatEvent::Comment {
                user: "ana".into(),
                text: "hi".into()
            }
        );

        let event =
            parse_line(br#"{"type": "gift", "user": "ben", "gift_name": "rose", "unit_value": 5, "quantity": 3}"#)
                .unwrap();
        assert_eq!(
            event,
            ChatEvent::Gift {
                user: "ben".into(),
                gift_name: "rose".into(),
                quantity: 3,
                unit_value: 5
            }
        );
    }

    #[test]
    fn gift_defaults_apply() {
        let event = parse_line(br#"{"type": "gift", "user": "cy"}"#).unwrap();
        assert_eq!(
            event,
            ChatEvent::Gift {
                user: "cy".into(),
                gift_name: String::new(),
                quantity: 1,
                unit_value: 0
            }
        );
    }

    #[test]
    fn malformed_and_unknown_lines_are_skipped() {
        assert!(parse_line(b"not json").is_none());
        assert!(parse_line(b"").is_none());
        assert!(parse_line(br#"{"type": "hologram", "user": "x"}"#).is_none());
    }

    #[test]
    fn lines_split_across_chunks_reassemble() {
        let mut lines = LineAssembler::new();
        assert!(lines.push(br#"{"type": "comment", "user""#).is_empty());
        let events = lines.push(b": \"ana\", \"text\": \"hi\"}\n");
        assert_eq!(
            events,
            vec![ChatEvent::Comment {
                user: "ana".into(),
                text: "hi".into()
            }]
        );
    }

    #[test]
    fn oversized_line_is_dropped_and_stream_recovers() {
        let mut lines = LineAssembler::new();

        let junk = vec![b'x'; MAX_LINE_BYTES + 1];
        assert!(lines.push(&junk).is_empty());
        assert!(lines.buffer.is_empty());

        // Tail of the oversized line is skipped; the next line parses.
        let events = lines.push(b"xxxx\n{\"type\": \"join\", \"user\": \"ana\"}\n");
        assert_eq!(events, vec![ChatEvent::Join { user: "ana".into() }]);
    }

    #[test]
    fn stream_end_has_no_fields() {
        assert_eq!(
            parse_line(br#"{"type": "stream_end"}"#).unwrap(),
            ChatEvent::StreamEnd
        );
    }
}
