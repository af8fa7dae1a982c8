//! WebSocket message types and routing
//!
//! Defines the session protocol: incoming control messages from the client,
//! outgoing orchestration messages from the server, and the internal routing
//! enum the single sender task consumes.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::core::conversation::ConversationState;
use crate::core::timing::WordTimings;

/// WebSocket message types for incoming messages
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum IncomingMessage {
    /// Client-side playback report: the renderer in the browser started or
    /// finished playing delivered audio.
    #[serde(rename = "playback")]
    Playback { playing: bool },
    /// Microphone muted; the server starts keepalive signaling upstream.
    #[serde(rename = "mute")]
    Mute,
    #[serde(rename = "unmute")]
    Unmute,
    /// Unknown control messages are ignored, never an error.
    #[serde(other)]
    Other,
}

/// WebSocket message types for outgoing messages
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub enum OutgoingMessage {
    #[serde(rename = "state")]
    State { state: ConversationState },
    /// Live interim transcript for display while the user is speaking.
    #[serde(rename = "interim")]
    Interim { text: String },
    /// The completed utterance that triggered a turn.
    #[serde(rename = "transcript")]
    Transcript { text: String },
    /// The full reply text of a completed turn, with its extracted mood.
    #[serde(rename = "reply")]
    Reply { text: String, mood: String },
    /// One synthesized sentence, in strict sentence order, with word timing
    /// for lip-sync.
    #[serde(rename = "speak_audio")]
    SpeakAudio {
        audio_base64: String,
        words: Vec<String>,
        wtimes: Vec<f64>,
        wdurations: Vec<f64>,
    },
    /// Barge-in: drop any queued audio and stop playback immediately.
    #[serde(rename = "stop_speaking")]
    StopSpeaking,
    #[serde(rename = "error")]
    Error { message: String },
}

impl OutgoingMessage {
    pub fn speak_audio(audio_base64: String, timings: WordTimings) -> Self {
        OutgoingMessage::SpeakAudio {
            audio_base64,
            words: timings.words,
            wtimes: timings.wtimes,
            wdurations: timings.wdurations,
        }
    }
}

/// Message routing for the single sender task.
pub enum MessageRoute {
    Outgoing(OutgoingMessage),
    /// Raw upstream transcription frame, forwarded untouched.
    Passthrough(String),
    Binary(Bytes),
    /// Close the client socket with an explicit code and end the session.
    Close { code: u16, reason: String },
}
