//! Streaming chat proxy.
//!
//! Forwards a conversation to the generation service and re-emits the reply
//! as server-sent events: `data: {"text": ...}` per delta, a final
//! `data: [DONE]`, and `data: {"error": ...}` for mid-stream failures. Lets
//! a browser client drive generation without holding the API key.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    Json,
    extract::State,
    response::sse::{Event, Sse},
};
use futures::Stream;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;

use crate::core::generation::{ChatMessage, GenerationError, GenerationEvent, GenerationStream};
use crate::errors::{AppError, AppResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
}

pub async fn chat_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatRequest>,
) -> AppResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    if request.messages.is_empty() {
        return Err(AppError::BadRequest("messages array is required".to_string()));
    }

    let rx = state
        .generation
        .stream_reply(request.messages)
        .await
        .map_err(|e| match e {
            GenerationError::Upstream { status, message } => {
                AppError::UpstreamError { status, message }
            }
            other => AppError::InternalServerError(other.to_string()),
        })?;

    Ok(Sse::new(sse_events(rx)))
}

/// Map the generation event channel onto the SSE wire format. Both `Done`
/// and a mid-stream failure terminate the stream after one final event.
fn sse_events(
    rx: mpsc::Receiver<GenerationEvent>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    futures::stream::unfold(Some(rx), |rx| async move {
        let mut rx = rx?;
        let (payload, terminal) = event_payload(rx.recv().await);
        let rx = if terminal { None } else { Some(rx) };
        Some((Ok(Event::default().data(payload)), rx))
    })
}

/// The `data:` payload for one received event, and whether it ends the
/// stream. A closed channel without an explicit stop still yields `[DONE]`.
fn event_payload(event: Option<GenerationEvent>) -> (String, bool) {
    match event {
        Some(GenerationEvent::Delta(text)) => (json!({ "text": text }).to_string(), false),
        Some(GenerationEvent::Failed(e)) => (json!({ "error": e.to_string() }).to_string(), true),
        Some(GenerationEvent::Done) | None => ("[DONE]".to_string(), true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    async fn collect(events: Vec<GenerationEvent>) -> Vec<(String, bool)> {
        let (tx, rx) = mpsc::channel(8);
        for event in events {
            tx.send(event).await.unwrap();
        }
        drop(tx);

        futures::stream::unfold(Some(rx), |rx| async move {
            let mut rx = rx?;
            let (payload, terminal) = event_payload(rx.recv().await);
            let rx = if terminal { None } else { Some(rx) };
            Some(((payload, terminal), rx))
        })
        .collect()
        .await
    }

    #[tokio::test]
    async fn deltas_then_done_marker() {
        let frames = collect(vec![
            GenerationEvent::Delta("Hel".to_string()),
            GenerationEvent::Delta("lo".to_string()),
            GenerationEvent::Done,
        ])
        .await;

        assert_eq!(
            frames,
            vec![
                (r#"{"text":"Hel"}"#.to_string(), false),
                (r#"{"text":"lo"}"#.to_string(), false),
                ("[DONE]".to_string(), true),
            ]
        );
    }

    #[tokio::test]
    async fn inline_error_terminates_the_stream() {
        let frames = collect(vec![
            GenerationEvent::Delta("partial".to_string()),
            GenerationEvent::Failed(GenerationError::Stream("overloaded".to_string())),
            GenerationEvent::Done,
        ])
        .await;

        // The failure frame is the last one; Done after it is never read.
        assert_eq!(frames.len(), 2);
        assert!(frames[1].0.contains("overloaded"));
        assert!(frames[1].1);
    }

    #[tokio::test]
    async fn sender_drop_without_stop_still_closes_with_done() {
        let frames = collect(vec![GenerationEvent::Delta("hi".to_string())]).await;
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1].0, "[DONE]");
    }
}
