//! Narrow contract to the avatar renderer.
//!
//! The renderer is an external collaborator: it plays decoded audio with
//! word timing, reports whether anything is still playing, and can be told
//! to stop immediately. Everything else about it (camera, lighting,
//! expressions) is out of scope for the orchestration core.

use async_trait::async_trait;
use bytes::Bytes;

use super::timing::WordTimings;

/// Playback surface for synthesized speech.
///
/// Implemented over the session WebSocket in production and by recording
/// stubs in tests.
#[async_trait]
pub trait AvatarRenderer: Send + Sync {
    /// Queue one sentence of audio for playback with word-level lip-sync
    /// timing. Calls arrive strictly in sentence order.
    async fn speak(&self, audio: Bytes, timings: WordTimings);

    /// Whether the renderer is currently playing (or has queued) audio.
    fn is_speaking(&self) -> bool;

    /// Stop playback immediately and drop anything queued.
    async fn stop(&self);
}
