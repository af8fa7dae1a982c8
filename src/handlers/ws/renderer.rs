//! WebSocket-backed avatar renderer.
//!
//! Delivery pushes each ordered sentence to the client as a `speak_audio`
//! message; the client owns actual audio playback and reports it back with
//! `playback` messages, which is what the turn machine's playback-drain wait
//! observes through [`AvatarRenderer::is_speaking`].

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use base64::Engine;
use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::debug;

use crate::core::renderer::AvatarRenderer;
use crate::core::timing::WordTimings;

use super::messages::{MessageRoute, OutgoingMessage};

pub struct WsRenderer {
    tx: mpsc::Sender<MessageRoute>,
    /// Client-reported playback state. Set optimistically on delivery so the
    /// drain wait holds even before the first playback report arrives.
    playing: AtomicBool,
}

impl WsRenderer {
    pub fn new(tx: mpsc::Sender<MessageRoute>) -> Self {
        Self {
            tx,
            playing: AtomicBool::new(false),
        }
    }

    /// Apply a client playback report.
    pub fn set_playing(&self, playing: bool) {
        debug!(playing, "Client playback report");
        self.playing.store(playing, Ordering::Release);
    }
}

#[async_trait]
impl AvatarRenderer for WsRenderer {
    async fn speak(&self, audio: Bytes, timings: WordTimings) {
        self.playing.store(true, Ordering::Release);
        let audio_base64 = base64::engine::general_purpose::STANDARD.encode(&audio);
        let _ = self
            .tx
            .send(MessageRoute::Outgoing(OutgoingMessage::speak_audio(
                audio_base64,
                timings,
            )))
            .await;
    }

    fn is_speaking(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }

    async fn stop(&self) {
        self.playing.store(false, Ordering::Release);
        let _ = self
            .tx
            .send(MessageRoute::Outgoing(OutgoingMessage::StopSpeaking))
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn speak_marks_playing_and_sends_encoded_audio() {
        let (tx, mut rx) = mpsc::channel(8);
        let renderer = WsRenderer::new(tx);

        renderer
            .speak(Bytes::from_static(b"ABC"), WordTimings::default())
            .await;
        assert!(renderer.is_speaking());

        match rx.recv().await {
            Some(MessageRoute::Outgoing(OutgoingMessage::SpeakAudio {
                audio_base64, ..
            })) => assert_eq!(audio_base64, "QUJD"),
            _ => panic!("expected a speak_audio message"),
        }
    }

    #[tokio::test]
    async fn stop_clears_playing_and_sends_stop_speaking() {
        let (tx, mut rx) = mpsc::channel(8);
        let renderer = WsRenderer::new(tx);
        renderer.set_playing(true);

        renderer.stop().await;
        assert!(!renderer.is_speaking());
        assert!(matches!(
            rx.recv().await,
            Some(MessageRoute::Outgoing(OutgoingMessage::StopSpeaking))
        ));
    }

    #[tokio::test]
    async fn playback_report_drives_is_speaking() {
        let (tx, _rx) = mpsc::channel(8);
        let renderer = WsRenderer::new(tx);

        renderer.set_playing(true);
        assert!(renderer.is_speaking());
        renderer.set_playing(false);
        assert!(!renderer.is_speaking());
    }
}
