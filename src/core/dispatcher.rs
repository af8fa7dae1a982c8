//! Ordered concurrent synthesis dispatch.
//!
//! Sentences stream out of the segmenter faster than the synthesis service
//! answers, and responses come back in whatever order the network decides.
//! The dispatcher launches one synthesis task per sentence immediately, then
//! reassembles completions through a sequence-keyed buffer so the renderer
//! only ever sees audio in ascending sentence order. A failed sentence is
//! skipped silently rather than retried; one bad sentence must not stall the
//! rest of the reply.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::conversation::SessionState;
use super::renderer::AvatarRenderer;
use super::segmenter::SentenceUnit;
use super::synthesis::{SpeechSynthesizer, SynthesizedSpeech};

/// Settled result for one sentence, keyed by its sequence number.
enum SynthesisOutcome {
    Ready(SynthesizedSpeech),
    Failed,
}

/// Sequence-ordered reassembly state.
///
/// Guarded by an async mutex that is held across renderer delivery, which
/// serializes flush passes: completions are handled one at a time, so a
/// later-sequence task can never overtake an in-progress delivery.
struct ReassemblyBuffer {
    next_deliver_seq: u32,
    completed: HashMap<u32, SynthesisOutcome>,
    delivered_any: bool,
}

/// Per-turn synthesis dispatcher. Fresh state every turn; never shared
/// across turns.
pub struct SynthesisDispatcher {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    renderer: Arc<dyn AvatarRenderer>,
    session: Arc<SessionState>,
    token: u64,
    buffer: Arc<Mutex<ReassemblyBuffer>>,
    tasks: Vec<JoinHandle<()>>,
}

impl SynthesisDispatcher {
    pub fn new(
        synthesizer: Arc<dyn SpeechSynthesizer>,
        renderer: Arc<dyn AvatarRenderer>,
        session: Arc<SessionState>,
        token: u64,
    ) -> Self {
        Self {
            synthesizer,
            renderer,
            session,
            token,
            buffer: Arc::new(Mutex::new(ReassemblyBuffer {
                next_deliver_seq: 0,
                completed: HashMap::new(),
                delivered_any: false,
            })),
            tasks: Vec::new(),
        }
    }

    /// Launch synthesis for one sentence. Returns immediately; emission of
    /// later sentences is never blocked on an earlier request.
    pub fn dispatch(&mut self, unit: SentenceUnit) {
        let synthesizer = self.synthesizer.clone();
        let renderer = self.renderer.clone();
        let session = self.session.clone();
        let buffer = self.buffer.clone();
        let token = self.token;

        let handle = tokio::spawn(async move {
            let outcome = if !session.is_current(token) {
                // Turn already cancelled; settle the slot without a request.
                SynthesisOutcome::Failed
            } else {
                match synthesizer.synthesize(&unit.text).await {
                    Ok(speech) => SynthesisOutcome::Ready(speech),
                    Err(e) => {
                        warn!(seq = unit.seq, "Sentence synthesis failed, skipping: {e}");
                        SynthesisOutcome::Failed
                    }
                }
            };

            flush_ready(buffer, renderer, session, token, unit.seq, outcome).await;
        });
        self.tasks.push(handle);
    }

    /// Wait for every launched synthesis task to settle.
    ///
    /// This is the "all dispatched" wait: it resolves once the last request
    /// has completed and flushed, independent of how long playback runs.
    /// Returns whether any sentence was actually delivered to the renderer.
    pub async fn wait_settled(self) -> bool {
        join_all(self.tasks).await;
        self.buffer.lock().await.delivered_any
    }
}

/// Store one settled outcome and drain everything now deliverable in order.
async fn flush_ready(
    buffer: Arc<Mutex<ReassemblyBuffer>>,
    renderer: Arc<dyn AvatarRenderer>,
    session: Arc<SessionState>,
    token: u64,
    seq: u32,
    outcome: SynthesisOutcome,
) {
    let mut buffer = buffer.lock().await;
    buffer.completed.insert(seq, outcome);

    loop {
        let seq = buffer.next_deliver_seq;
        let Some(entry) = buffer.completed.remove(&seq) else {
            break;
        };
        buffer.next_deliver_seq += 1;

        match entry {
            SynthesisOutcome::Ready(speech) => {
                // Stale turns advance the cursor but never reach the renderer.
                if !session.is_current(token) {
                    debug!(seq, "Discarding synthesized sentence for cancelled turn");
                    continue;
                }
                if !buffer.delivered_any {
                    buffer.delivered_any = true;
                    session.begin_speaking();
                }
                renderer.speak(speech.audio, speech.timings).await;
            }
            SynthesisOutcome::Failed => {
                debug!(seq, "Skipping failed sentence");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::conversation::ConversationState;
    use crate::core::synthesis::SynthesisError;
    use crate::core::timing::WordTimings;

    use async_trait::async_trait;
    use bytes::Bytes;
    use std::collections::HashSet;
    use std::time::Duration;

    /// Synthesizer stub with a per-sentence artificial delay, so tests can
    /// force completions to arrive in any permutation.
    struct ScriptedSynthesizer {
        delays_ms: Vec<u64>,
        failures: HashSet<u32>,
    }

    impl ScriptedSynthesizer {
        fn new(delays_ms: Vec<u64>) -> Self {
            Self {
                delays_ms,
                failures: HashSet::new(),
            }
        }

        fn failing(mut self, seq: u32) -> Self {
            self.failures.insert(seq);
            self
        }
    }

    #[async_trait]
    impl SpeechSynthesizer for ScriptedSynthesizer {
        async fn synthesize(&self, text: &str) -> Result<SynthesizedSpeech, SynthesisError> {
            // Sentence text is "s<seq>" in these tests.
            let seq: u32 = text.trim_start_matches('s').parse().unwrap();
            let delay = self.delays_ms.get(seq as usize).copied().unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            if self.failures.contains(&seq) {
                return Err(SynthesisError::Upstream {
                    status: 500,
                    message: "scripted failure".to_string(),
                });
            }
            Ok(SynthesizedSpeech {
                audio: Bytes::from(text.as_bytes().to_vec()),
                timings: WordTimings::default(),
            })
        }
    }

    /// Renderer stub recording delivery order.
    #[derive(Default)]
    struct RecordingRenderer {
        spoken: parking_lot::Mutex<Vec<String>>,
    }

    #[async_trait]
    impl AvatarRenderer for RecordingRenderer {
        async fn speak(&self, audio: Bytes, _timings: WordTimings) {
            self.spoken
                .lock()
                .push(String::from_utf8(audio.to_vec()).unwrap());
        }

        fn is_speaking(&self) -> bool {
            false
        }

        async fn stop(&self) {}
    }

    fn unit(seq: u32) -> SentenceUnit {
        SentenceUnit {
            seq,
            text: format!("s{seq}"),
        }
    }

    fn session_in_processing() -> Arc<SessionState> {
        let session = Arc::new(SessionState::new());
        session.set_state(ConversationState::Processing);
        session
    }

    #[tokio::test]
    async fn delivers_in_sequence_order_regardless_of_completion_order() {
        // Completion order: s3, s2, s1, s0.
        let synthesizer = Arc::new(ScriptedSynthesizer::new(vec![80, 60, 40, 20]));
        let renderer = Arc::new(RecordingRenderer::default());
        let session = session_in_processing();
        let token = session.invalidate();

        let mut dispatcher =
            SynthesisDispatcher::new(synthesizer, renderer.clone(), session.clone(), token);
        for seq in 0..4 {
            dispatcher.dispatch(unit(seq));
        }

        assert!(dispatcher.wait_settled().await);
        assert_eq!(*renderer.spoken.lock(), vec!["s0", "s1", "s2", "s3"]);
        assert_eq!(session.state(), ConversationState::Speaking);
    }

    #[tokio::test]
    async fn failed_sentence_is_skipped_without_stalling_the_rest() {
        let synthesizer = Arc::new(ScriptedSynthesizer::new(vec![10, 10, 10]).failing(1));
        let renderer = Arc::new(RecordingRenderer::default());
        let session = session_in_processing();
        let token = session.invalidate();

        let mut dispatcher =
            SynthesisDispatcher::new(synthesizer, renderer.clone(), session.clone(), token);
        for seq in 0..3 {
            dispatcher.dispatch(unit(seq));
        }

        assert!(dispatcher.wait_settled().await);
        assert_eq!(*renderer.spoken.lock(), vec!["s0", "s2"]);
    }

    #[tokio::test]
    async fn all_failures_deliver_nothing_and_never_enter_speaking() {
        let synthesizer = Arc::new(ScriptedSynthesizer::new(vec![5, 5]).failing(0).failing(1));
        let renderer = Arc::new(RecordingRenderer::default());
        let session = session_in_processing();
        let token = session.invalidate();

        let mut dispatcher =
            SynthesisDispatcher::new(synthesizer, renderer.clone(), session.clone(), token);
        dispatcher.dispatch(unit(0));
        dispatcher.dispatch(unit(1));

        assert!(!dispatcher.wait_settled().await);
        assert!(renderer.spoken.lock().is_empty());
        assert_eq!(session.state(), ConversationState::Processing);
    }

    #[tokio::test]
    async fn stale_token_suppresses_all_delivery() {
        let synthesizer = Arc::new(ScriptedSynthesizer::new(vec![30, 30]));
        let renderer = Arc::new(RecordingRenderer::default());
        let session = session_in_processing();
        let token = session.invalidate();

        let mut dispatcher =
            SynthesisDispatcher::new(synthesizer, renderer.clone(), session.clone(), token);
        dispatcher.dispatch(unit(0));
        dispatcher.dispatch(unit(1));

        // Barge-in while requests are in flight.
        session.invalidate();

        assert!(!dispatcher.wait_settled().await);
        assert!(renderer.spoken.lock().is_empty());
    }
}
