pub mod conversation;
pub mod dispatcher;
pub mod generation;
pub mod history;
pub mod renderer;
pub mod segmenter;
pub mod synthesis;
pub mod timing;
pub mod transcription;

// Re-export commonly used types for convenience
pub use conversation::{
    ConversationManager, ConversationState, EventAction, SessionState, TranscriptBuffer, TurnReply,
    TurnSettings,
};
pub use dispatcher::SynthesisDispatcher;
pub use generation::{
    AnthropicGeneration, ChatMessage, GenerationError, GenerationEvent, GenerationStream,
};
pub use history::{ConversationHistory, HistoryEntry, Role, MAX_HISTORY_ENTRIES};
pub use renderer::AvatarRenderer;
pub use segmenter::{SentenceSegmenter, SentenceUnit};
pub use synthesis::{
    ElevenLabsSynthesizer, SpeechSynthesizer, SynthesisError, SynthesizedSpeech, VoiceSettings,
};
pub use timing::WordTimings;
pub use transcription::TranscriptionEvent;
