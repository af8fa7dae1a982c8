//! Shared session state: conversation lifecycle and turn invalidation.
//!
//! A session has exactly one [`SessionState`], shared between the event loop,
//! the running turn, and the dispatcher's synthesis tasks. The state and the
//! generation counter are atomics for lock-free reads in hot paths; the
//! transcript buffer sits behind a sync lock and is swapped out atomically
//! when a turn triggers, which is what makes the dual end-of-utterance
//! signals race-free.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

use parking_lot::Mutex;
use serde::Serialize;

/// Conversation lifecycle. Exactly one value at a time per session;
/// transitions happen only through the turn flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationState {
    /// Pre-ready bootstrap state, entered once at startup and never
    /// re-entered.
    Loading,
    Listening,
    Processing,
    Speaking,
}

impl ConversationState {
    fn as_u8(self) -> u8 {
        match self {
            ConversationState::Loading => 0,
            ConversationState::Listening => 1,
            ConversationState::Processing => 2,
            ConversationState::Speaking => 3,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => ConversationState::Listening,
            2 => ConversationState::Processing,
            3 => ConversationState::Speaking,
            _ => ConversationState::Loading,
        }
    }
}

/// Lock-free session state shared with in-flight tasks.
#[derive(Debug)]
pub struct SessionState {
    state: AtomicU8,
    /// Monotonically increasing generation token. Every turn runs under the
    /// token it was started with; barge-in bumps the counter, turning every
    /// stale continuation into a no-op.
    generation: AtomicU64,
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(ConversationState::Loading.as_u8()),
            generation: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> ConversationState {
        ConversationState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn set_state(&self, state: ConversationState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    /// Processing → Speaking, only if still Processing. Returns whether the
    /// transition happened (first successful sentence delivery of a turn).
    pub fn begin_speaking(&self) -> bool {
        self.state
            .compare_exchange(
                ConversationState::Processing.as_u8(),
                ConversationState::Speaking.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// The current generation token.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Bump the generation token, invalidating every outstanding
    /// continuation, and return the new token.
    pub fn invalidate(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn is_current(&self, token: u64) -> bool {
        self.generation.load(Ordering::Acquire) == token
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

/// Accumulated final-transcript segments for the utterance in progress.
///
/// `take` swaps the buffer empty under the lock, so when both end-of-utterance
/// signals fire for the same utterance only the first observes text; the
/// second sees an empty buffer and is a no-op.
#[derive(Debug, Default)]
pub struct TranscriptBuffer {
    text: Mutex<String>,
}

impl TranscriptBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one final segment, space-separated.
    pub fn append(&self, segment: &str) {
        let segment = segment.trim();
        if segment.is_empty() {
            return;
        }
        let mut text = self.text.lock();
        if !text.is_empty() {
            text.push(' ');
        }
        text.push_str(segment);
    }

    /// Accumulated text plus a live interim tail, for display.
    pub fn preview(&self, interim: &str) -> String {
        let text = self.text.lock();
        if text.is_empty() {
            interim.trim().to_string()
        } else {
            format!("{} {}", *text, interim.trim()).trim().to_string()
        }
    }

    /// Atomically take the accumulated utterance, leaving the buffer empty.
    pub fn take(&self) -> String {
        std::mem::take(&mut *self.text.lock())
    }

    pub fn clear(&self) {
        self.text.lock().clear();
    }

    pub fn is_empty(&self) -> bool {
        self.text.lock().is_empty()
    }
}
