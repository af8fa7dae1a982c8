//! # WebSocket Session Handler Module
//!
//! One WebSocket connection at `/ws/session` carries an entire voice
//! conversation: the client streams microphone audio up, and the server
//! streams transcription state, reply text, and synthesized speech back.
//!
//! ## Connection Flow
//! 1. Client connects to `/ws/session` and starts sending binary audio
//!    immediately; frames that arrive before the upstream transcription
//!    handshake completes are buffered in arrival order.
//! 2. When the upstream is ready the server sends
//!    `{"type":"state","state":"listening"}` and the conversation begins.
//! 3. End-of-utterance triggers a turn: the server sends the final
//!    `transcript`, generates a reply, and delivers synthesized sentences as
//!    `speak_audio` messages in strict sentence order.
//! 4. If the user speaks during a reply, the server cancels the turn, sends
//!    `stop_speaking`, and returns to `listening`.
//!
//! ## Message Types
//!
//! **Incoming (client → server):**
//! - **Binary frames** - raw microphone audio, relayed to transcription
//! - `{"type": "playback", "playing": true}` - client playback report,
//!   drives the server's wait-for-playback before returning to listening
//! - `{"type": "mute"}` / `{"type": "unmute"}` - microphone state; while
//!   muted the server keeps the upstream alive with keepalive signaling
//!
//! **Outgoing (server → client):**
//! - `{"type": "state", "state": "listening|processing|speaking"}`
//! - `{"type": "interim", "text": "..."}` - live partial transcript
//! - `{"type": "transcript", "text": "..."}` - the utterance that started a turn
//! - `{"type": "reply", "text": "...", "mood": "happy"}` - completed reply
//! - `{"type": "speak_audio", "audio_base64": "...", "words": [...],
//!   "wtimes": [...], "wdurations": [...]}` - one sentence of audio with
//!   word timing for lip-sync
//! - `{"type": "stop_speaking"}` - barge-in, drop queued audio now
//! - `{"type": "error", "message": "..."}`
//! - Raw transcription frames are also passed through untouched.
//!
//! A rejected upstream handshake closes the session with close code 4000 so
//! the client can tell a credential problem from a network drop.

pub mod messages;
pub mod renderer;
pub mod session;

// Re-export commonly used items
pub use messages::{IncomingMessage, MessageRoute, OutgoingMessage};
pub use renderer::WsRenderer;
pub use session::ws_session_handler;
