//! The turn state machine.
//!
//! One [`ConversationManager`] lives per session and owns the whole
//! conversation lifecycle: it turns transcription events into turn triggers,
//! drives the segmenter and the synthesis dispatcher for each turn, appends
//! to the bounded history, waits for playback to drain, and implements
//! barge-in cancellation through the session's generation token.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::core::dispatcher::SynthesisDispatcher;
use crate::core::generation::{ChatMessage, GenerationEvent, GenerationStream};
use crate::core::history::ConversationHistory;
use crate::core::renderer::AvatarRenderer;
use crate::core::segmenter::SentenceSegmenter;
use crate::core::synthesis::SpeechSynthesizer;
use crate::core::transcription::TranscriptionEvent;

use super::state::{ConversationState, SessionState, TranscriptBuffer};

/// Timing knobs for the playback-drain wait.
#[derive(Debug, Clone)]
pub struct TurnSettings {
    /// Delay after the last delivery before polling, so playback can start.
    pub settle_delay: Duration,
    /// Poll interval for the renderer's "is playing" signal.
    pub poll_interval: Duration,
    /// Upper bound on poll iterations, in case the renderer never reports
    /// idle.
    pub poll_max_iterations: u32,
}

impl Default for TurnSettings {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(400),
            poll_interval: Duration::from_millis(250),
            poll_max_iterations: 240,
        }
    }
}

/// The finished reply of a naturally completed turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnReply {
    pub text: String,
    pub mood: String,
}

/// What the session loop should do after feeding one transcription event
/// through the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventAction {
    None,
    /// Show a live interim transcript to the user.
    Interim { text: String },
    /// An utterance completed; run a turn for it.
    StartTurn { user_text: String },
    /// The user spoke over the reply; the turn was already cancelled.
    BargeIn,
}

/// Reply text accumulated by the turn currently in flight.
///
/// Claimed (taken) exactly once, either by natural completion or by
/// barge-in, whichever gets there first. That single `Option::take` under
/// one lock is what keeps the partial reply from being appended to history
/// twice when the two race.
struct LiveReply {
    token: u64,
    text: String,
}

pub struct ConversationManager {
    session: Arc<SessionState>,
    history: Mutex<ConversationHistory>,
    transcript: TranscriptBuffer,
    live_reply: Mutex<Option<LiveReply>>,
    generation: Arc<dyn GenerationStream>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    renderer: Arc<dyn AvatarRenderer>,
    settings: TurnSettings,
}

impl ConversationManager {
    pub fn new(
        generation: Arc<dyn GenerationStream>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        renderer: Arc<dyn AvatarRenderer>,
        settings: TurnSettings,
    ) -> Self {
        Self {
            session: Arc::new(SessionState::new()),
            history: Mutex::new(ConversationHistory::new()),
            transcript: TranscriptBuffer::new(),
            live_reply: Mutex::new(None),
            generation,
            synthesizer,
            renderer,
            settings,
        }
    }

    /// Leave the bootstrap state once the session is wired up.
    pub fn mark_ready(&self) {
        if self.session.state() == ConversationState::Loading {
            self.session.set_state(ConversationState::Listening);
        }
    }

    pub fn state(&self) -> ConversationState {
        self.session.state()
    }

    /// Number of retained history entries; exposed for diagnostics.
    pub fn history_len(&self) -> usize {
        self.history.lock().len()
    }

    /// Feed one transcription event through the state machine.
    ///
    /// Appends final segments to the utterance buffer, fires barge-in when
    /// speech is detected while not listening, and reports when an
    /// end-of-utterance signal completed an utterance. Both end-of-utterance
    /// signals funnel through [`TranscriptBuffer::take`], so whichever fires
    /// second observes an empty buffer and is a no-op.
    pub async fn handle_event(&self, event: &TranscriptionEvent) -> EventAction {
        match event {
            TranscriptionEvent::Results {
                is_final,
                speech_final,
                ..
            } => {
                let text = event.transcript().unwrap_or("").to_string();
                let state = self.session.state();

                if !text.is_empty()
                    && matches!(
                        state,
                        ConversationState::Processing | ConversationState::Speaking
                    )
                {
                    self.barge_in().await;
                    return EventAction::BargeIn;
                }

                if state != ConversationState::Listening {
                    return EventAction::None;
                }

                if !is_final.unwrap_or(false) {
                    if text.is_empty() {
                        return EventAction::None;
                    }
                    return EventAction::Interim {
                        text: self.transcript.preview(&text),
                    };
                }

                self.transcript.append(&text);

                if speech_final.unwrap_or(false) {
                    let user_text = self.transcript.take();
                    if !user_text.is_empty() {
                        debug!("Turn triggered by speech_final");
                        return EventAction::StartTurn { user_text };
                    }
                }
                EventAction::None
            }
            TranscriptionEvent::UtteranceEnd { .. } => {
                if self.session.state() == ConversationState::Listening {
                    let user_text = self.transcript.take();
                    if !user_text.is_empty() {
                        debug!("Turn triggered by utterance-end fallback");
                        return EventAction::StartTurn { user_text };
                    }
                }
                EventAction::None
            }
            TranscriptionEvent::Other => EventAction::None,
        }
    }

    /// Interrupt the turn in flight and return to listening.
    ///
    /// Not an error path: the user simply spoke over the reply. The partial
    /// reply accumulated so far is preserved in history, tagged as
    /// truncated, so later turns keep the context.
    pub async fn barge_in(&self) {
        let state = self.session.state();
        if !matches!(
            state,
            ConversationState::Processing | ConversationState::Speaking
        ) {
            return;
        }

        self.session.invalidate();

        if let Some(live) = self.live_reply.lock().take() {
            let partial = live.text.trim();
            if !partial.is_empty() {
                self.history.lock().push_assistant_truncated(partial.to_string());
            }
        }

        self.renderer.stop().await;
        self.transcript.clear();
        self.session.set_state(ConversationState::Listening);
        info!("Barge-in: turn interrupted, listening again");
    }

    /// Run one full turn for a completed utterance.
    ///
    /// Streams the generated reply, segments it into sentences, synthesizes
    /// them concurrently with strictly ordered delivery, then waits for the
    /// renderer to drain before returning to listening. Returns `None` when
    /// the turn was cancelled by barge-in or aborted by a generation
    /// failure.
    pub async fn run_turn(&self, user_text: String) -> Option<TurnReply> {
        // A fresh token cancels any prior live turn and is what every
        // continuation of this turn validates against.
        let token = self.session.invalidate();
        self.session.set_state(ConversationState::Processing);
        info!("Turn started: {user_text:?}");

        let messages: Vec<ChatMessage> = {
            let mut history = self.history.lock();
            history.push_user(user_text);
            history.entries().map(ChatMessage::from).collect()
        };
        *self.live_reply.lock() = Some(LiveReply {
            token,
            text: String::new(),
        });

        let mut rx = match self.generation.stream_reply(messages).await {
            Ok(rx) => rx,
            Err(e) => {
                warn!("Generation request failed: {e}");
                return self.abort_turn(token);
            }
        };

        let mut segmenter = SentenceSegmenter::new();
        let mut dispatcher = SynthesisDispatcher::new(
            self.synthesizer.clone(),
            self.renderer.clone(),
            self.session.clone(),
            token,
        );

        loop {
            match rx.recv().await {
                Some(GenerationEvent::Delta(delta)) => {
                    if !self.session.is_current(token) {
                        // Barged in while the stream was still producing;
                        // history was already handled by barge_in.
                        return None;
                    }
                    for unit in segmenter.push(&delta) {
                        dispatcher.dispatch(unit);
                    }
                    if let Some(live) = self.live_reply.lock().as_mut() {
                        if live.token == token {
                            live.text = segmenter.full_text().to_string();
                        }
                    }
                }
                Some(GenerationEvent::Done) | None => break,
                Some(GenerationEvent::Failed(e)) => {
                    warn!("Generation stream failed mid-turn: {e}");
                    return self.abort_turn(token);
                }
            }
        }

        if let Some(unit) = segmenter.finish() {
            dispatcher.dispatch(unit);
        }
        let mood = segmenter.mood().to_string();
        if let Some(live) = self.live_reply.lock().as_mut() {
            if live.token == token {
                live.text = segmenter.full_text().trim().to_string();
            }
        }

        // All launched synthesis tasks settled; playback draining is a
        // separate wait below.
        let delivered_any = dispatcher.wait_settled().await;

        if !self.session.is_current(token) {
            return None;
        }

        // Natural completion claims the live reply; if barge-in won the
        // race there is nothing left to claim and nothing to append.
        let reply_text = {
            let mut live = self.live_reply.lock();
            if matches!(live.as_ref(), Some(entry) if entry.token == token) {
                live.take().map(|entry| entry.text)
            } else {
                None
            }
        }?;

        if !reply_text.trim().is_empty() {
            self.history.lock().push_assistant(reply_text.clone());
        }

        if delivered_any {
            self.wait_for_playback_drain(token).await;
            if !self.session.is_current(token) {
                return None;
            }
        }

        self.session.set_state(ConversationState::Listening);
        info!("Turn complete, listening again");
        Some(TurnReply {
            text: reply_text,
            mood,
        })
    }

    /// Abort the turn on a generation failure: discard the unflushed reply,
    /// invalidate in-flight synthesis, return to listening. The user sees
    /// no hard error, just no reply.
    fn abort_turn(&self, token: u64) -> Option<TurnReply> {
        {
            let mut live = self.live_reply.lock();
            if matches!(live.as_ref(), Some(entry) if entry.token == token) {
                live.take();
            }
        }
        if self.session.is_current(token) {
            self.session.invalidate();
            self.session.set_state(ConversationState::Listening);
        }
        None
    }

    /// Bounded poll of the renderer's playback signal.
    async fn wait_for_playback_drain(&self, token: u64) {
        tokio::time::sleep(self.settings.settle_delay).await;
        for _ in 0..self.settings.poll_max_iterations {
            if !self.session.is_current(token) {
                return;
            }
            if !self.renderer.is_speaking() {
                return;
            }
            tokio::time::sleep(self.settings.poll_interval).await;
        }
        warn!("Renderer never reported idle; giving up on playback wait");
    }
}
