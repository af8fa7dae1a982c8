pub mod manager;
pub mod state;

pub use manager::{ConversationManager, EventAction, TurnReply, TurnSettings};
pub use state::{ConversationState, SessionState, TranscriptBuffer};
