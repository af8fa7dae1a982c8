//! Transcription event parsing at the relay boundary.
//!
//! The transcription service sends loosely shaped JSON text frames. They are
//! parsed once, here, into a closed tagged-variant type; anything unknown
//! collapses into [`TranscriptionEvent::Other`] and malformed payloads are
//! dropped silently so they can never crash the turn or the relay.

use serde::Deserialize;

/// One inbound event from the transcription service.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum TranscriptionEvent {
    /// Interim or final transcript segment.
    Results {
        channel: Option<ResultsChannel>,
        is_final: Option<bool>,
        /// Low-latency end-of-utterance signal: the service detected enough
        /// silence after speech (primary turn trigger).
        speech_final: Option<bool>,
    },
    /// Fallback end-of-utterance signal, fired after a longer silence
    /// timeout in case `speech_final` was missed.
    UtteranceEnd {
        last_word_end: Option<f64>,
    },
    /// Anything else (metadata, speech-started markers, …): a no-op.
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
pub struct ResultsChannel {
    pub alternatives: Vec<ResultsAlternative>,
}

#[derive(Debug, Deserialize)]
pub struct ResultsAlternative {
    pub transcript: String,
    pub confidence: Option<f32>,
}

impl TranscriptionEvent {
    /// Parse a text frame; malformed or non-JSON frames yield `None`.
    pub fn parse(text: &str) -> Option<Self> {
        serde_json::from_str(text).ok()
    }

    /// The trimmed transcript of the top alternative, if this is a
    /// `Results` event that carries one.
    pub fn transcript(&self) -> Option<&str> {
        match self {
            TranscriptionEvent::Results {
                channel: Some(channel),
                ..
            } => channel
                .alternatives
                .first()
                .map(|alt| alt.transcript.trim()),
            _ => None,
        }
    }
}
