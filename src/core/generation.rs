//! Streaming text-generation client.
//!
//! The generation service receives the bounded conversation history and
//! streams the reply back as incremental text deltas over SSE, terminated by
//! an explicit stop marker. The concrete provider is the Anthropic Messages
//! API; the [`GenerationStream`] trait is the seam the turn machine and the
//! tests plug into.

use async_trait::async_trait;
use futures::StreamExt;
use serde::Serialize;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::history::{HistoryEntry, Role};

pub const ANTHROPIC_MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Persona prompt for the wellness companion, including the mood-tag
/// contract the segmenter strips back out of every reply.
pub const SYSTEM_PROMPT: &str = "You are Maya, a warm and caring wellness companion for seniors. You speak in short, clear sentences. Keep responses to 2-3 sentences maximum — this is a spoken conversation, not written text. Be encouraging, patient, and positive. Never use markdown, bullet points, or special formatting. Speak naturally as if talking to a friend.\n\nIMPORTANT: Begin every response with a mood tag [MOOD:xxx] where xxx is one of: neutral, happy, angry, sad, fear, disgust, love, sleep.\n\nChoose the mood that best serves the user emotionally:\n- User is happy or positive → [MOOD:happy]\n- User is angry or frustrated → [MOOD:neutral] (stay calm, de-escalate)\n- User is sad or lonely → [MOOD:love] (warm, empathetic)\n- User is fearful or anxious → [MOOD:neutral] (calm, reassuring)\n- User is disgusted or annoyed → [MOOD:neutral] (understanding, non-judgmental)\n- User expresses love or gratitude → [MOOD:love]\n- User seems tired or sleepy → [MOOD:happy] (gently encouraging)\n- Default or unclear → [MOOD:neutral]\n\nThe tag must be the very first text, followed by a space, then your spoken words. Example: [MOOD:happy] That sounds wonderful!";

/// One message of generation request history.
#[derive(Debug, Clone, Serialize, serde::Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl From<&HistoryEntry> for ChatMessage {
    fn from(entry: &HistoryEntry) -> Self {
        let role = match entry.role {
            Role::User => "user",
            Role::Assistant => "assistant",
        };
        Self {
            role: role.to_string(),
            content: entry.text.clone(),
        }
    }
}

/// Generation-side errors. All of them are fatal to the turn, never to the
/// session.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GenerationError {
    #[error("generation request failed: {0}")]
    Request(String),

    #[error("generation service returned {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("generation stream error: {0}")]
    Stream(String),
}

/// One event on the reply stream.
#[derive(Debug, Clone)]
pub enum GenerationEvent {
    /// Incremental reply text.
    Delta(String),
    /// Explicit end marker; no further events follow.
    Done,
    /// Inline stream error; the turn aborts.
    Failed(GenerationError),
}

/// Streaming reply source.
#[async_trait]
pub trait GenerationStream: Send + Sync {
    /// Start a reply for the given history and return the event stream.
    ///
    /// An `Err` here means the request never started; errors after that
    /// arrive in-band as [`GenerationEvent::Failed`].
    async fn stream_reply(
        &self,
        messages: Vec<ChatMessage>,
    ) -> Result<mpsc::Receiver<GenerationEvent>, GenerationError>;
}

/// Anthropic Messages API streaming client.
pub struct AnthropicGeneration {
    client: reqwest::Client,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl AnthropicGeneration {
    pub fn new(client: reqwest::Client, api_key: String, model: String, max_tokens: u32) -> Self {
        Self {
            client,
            api_key,
            model,
            max_tokens,
        }
    }
}

#[async_trait]
impl GenerationStream for AnthropicGeneration {
    async fn stream_reply(
        &self,
        messages: Vec<ChatMessage>,
    ) -> Result<mpsc::Receiver<GenerationEvent>, GenerationError> {
        let body = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "system": SYSTEM_PROMPT,
            "messages": messages,
            "stream": true,
        });

        let response = self
            .client
            .post(ANTHROPIC_MESSAGES_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerationError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(GenerationError::Upstream {
                status: status.as_u16(),
                message,
            });
        }

        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(pump_sse_stream(response, tx));
        Ok(rx)
    }
}

/// Read the SSE body line by line and forward decoded events.
async fn pump_sse_stream(response: reqwest::Response, tx: mpsc::Sender<GenerationEvent>) {
    let mut stream = response.bytes_stream();
    let mut lines = SseLineBuffer::new();

    while let Some(chunk) = stream.next().await {
        let bytes = match chunk {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Generation stream read error: {e}");
                let _ = tx
                    .send(GenerationEvent::Failed(GenerationError::Stream(
                        e.to_string(),
                    )))
                    .await;
                return;
            }
        };

        for event in lines.push(&bytes) {
            let terminal = matches!(
                event,
                GenerationEvent::Done | GenerationEvent::Failed(_)
            );
            if tx.send(event).await.is_err() {
                debug!("Generation event receiver dropped; abandoning stream");
                return;
            }
            if terminal {
                return;
            }
        }
    }

    // Stream ended without an explicit stop marker; treat it as completion.
    let _ = tx.send(GenerationEvent::Done).await;
}

/// Byte-accurate SSE line accumulator.
///
/// Network chunks arrive on arbitrary byte boundaries, so a multi-byte
/// character can be split across two of them. Bytes are buffered raw and only
/// decoded once a full line is present, which keeps split code points intact.
struct SseLineBuffer {
    buf: Vec<u8>,
}

impl SseLineBuffer {
    fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Append one chunk and decode every event it completed.
    fn push(&mut self, chunk: &[u8]) -> Vec<GenerationEvent> {
        self.buf.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim();
            let Some(payload) = line.strip_prefix("data:") else {
                continue;
            };
            if let Some(event) = decode_sse_payload(payload.trim()) {
                events.push(event);
            }
        }
        events
    }
}

/// Decode one SSE data payload into a stream event.
///
/// Unknown event types (message_start, ping, content_block_start, …) and
/// malformed payloads decode to `None` and are skipped silently.
fn decode_sse_payload(payload: &str) -> Option<GenerationEvent> {
    let value: serde_json::Value = serde_json::from_str(payload).ok()?;
    match value.get("type")?.as_str()? {
        "content_block_delta" => value
            .get("delta")?
            .get("text")?
            .as_str()
            .map(|text| GenerationEvent::Delta(text.to_string())),
        "message_stop" => Some(GenerationEvent::Done),
        "error" => {
            let message = value
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .unwrap_or("unknown generation error")
                .to_string();
            Some(GenerationEvent::Failed(GenerationError::Stream(message)))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_text_deltas() {
        let event = decode_sse_payload(
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hello"}}"#,
        );
        match event {
            Some(GenerationEvent::Delta(text)) => assert_eq!(text, "Hello"),
            other => panic!("expected delta, got {other:?}"),
        }
    }

    #[test]
    fn decodes_stop_marker() {
        assert!(matches!(
            decode_sse_payload(r#"{"type":"message_stop"}"#),
            Some(GenerationEvent::Done)
        ));
    }

    #[test]
    fn decodes_inline_errors() {
        let event = decode_sse_payload(
            r#"{"type":"error","error":{"type":"overloaded_error","message":"try later"}}"#,
        );
        match event {
            Some(GenerationEvent::Failed(GenerationError::Stream(msg))) => {
                assert_eq!(msg, "try later")
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn skips_bookkeeping_events_and_garbage() {
        assert!(decode_sse_payload(r#"{"type":"message_start"}"#).is_none());
        assert!(decode_sse_payload(r#"{"type":"ping"}"#).is_none());
        assert!(decode_sse_payload("not json").is_none());
    }

    #[test]
    fn multibyte_character_split_across_chunks_stays_intact() {
        let payload = r#"data: {"type":"content_block_delta","delta":{"type":"text_delta","text":"café"}}"#;
        let mut bytes = payload.as_bytes().to_vec();
        bytes.push(b'\n');
        // Split inside the two-byte encoding of 'é'.
        let split = payload.find('é').unwrap() + 1;

        let mut lines = SseLineBuffer::new();
        assert!(lines.push(&bytes[..split]).is_empty());
        let events = lines.push(&bytes[split..]);
        match &events[..] {
            [GenerationEvent::Delta(text)] => assert_eq!(text, "café"),
            other => panic!("expected one intact delta, got {other:?}"),
        }
    }

    #[test]
    fn chunk_with_several_lines_decodes_every_event() {
        let mut lines = SseLineBuffer::new();
        let events = lines.push(
            b"data: {\"type\":\"content_block_delta\",\"delta\":{\"text\":\"Hi\"}}\n\
              data: {\"type\":\"message_stop\"}\n",
        );

        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], GenerationEvent::Delta(text) if text == "Hi"));
        assert!(matches!(events[1], GenerationEvent::Done));
    }

    #[test]
    fn incomplete_line_is_held_until_its_newline_arrives() {
        let mut lines = SseLineBuffer::new();
        assert!(lines.push(b"data: {\"type\":\"mess").is_empty());
        let events = lines.push(b"age_stop\"}\n");
        assert!(matches!(&events[..], [GenerationEvent::Done]));
    }

    #[test]
    fn history_entries_map_to_chat_messages() {
        let entry = HistoryEntry {
            role: Role::Assistant,
            text: "Hi there.".to_string(),
            truncated: false,
        };
        let message = ChatMessage::from(&entry);
        assert_eq!(message.role, "assistant");
        assert_eq!(message.content, "Hi there.");
    }
}
