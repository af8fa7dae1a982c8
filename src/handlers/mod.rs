//! HTTP and WebSocket request handlers
//!
//! This module organizes all API handlers into logical groups:
//! - `api` - Health check endpoint
//! - `chat` - Streaming chat proxy (SSE)
//! - `tts` - Speech synthesis proxy
//! - `ws` - WebSocket voice conversation sessions

pub mod api;
pub mod chat;
pub mod tts;
pub mod ws;

// Re-export commonly used handlers for convenient access
pub use ws::ws_session_handler;
