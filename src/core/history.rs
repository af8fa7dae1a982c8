//! Bounded in-memory conversation history.
//!
//! The generation service expects strictly alternating user/assistant
//! messages, so trimming always removes the oldest user+assistant pair
//! together rather than single entries.

use std::collections::VecDeque;

use serde::Serialize;

/// Maximum retained entries (10 user/assistant turns).
pub const MAX_HISTORY_ENTRIES: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub role: Role,
    pub text: String,
    /// Set when a barge-in cut the reply short; the partial text is still
    /// kept so later turns retain context.
    pub truncated: bool,
}

/// Ordered conversation window, bounded to [`MAX_HISTORY_ENTRIES`].
#[derive(Debug, Default)]
pub struct ConversationHistory {
    entries: VecDeque<HistoryEntry>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    pub fn push_user(&mut self, text: impl Into<String>) {
        self.push(Role::User, text.into(), false);
    }

    pub fn push_assistant(&mut self, text: impl Into<String>) {
        self.push(Role::Assistant, text.into(), false);
    }

    /// Record a reply that was interrupted mid-flight.
    pub fn push_assistant_truncated(&mut self, text: impl Into<String>) {
        self.push(Role::Assistant, text.into(), true);
    }

    fn push(&mut self, role: Role, text: String, truncated: bool) {
        self.entries.push_back(HistoryEntry {
            role,
            text,
            truncated,
        });
        while self.entries.len() > MAX_HISTORY_ENTRIES {
            // Drop the oldest user+assistant pair together so role
            // alternation is preserved for the generation request.
            self.entries.pop_front();
            self.entries.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_exceeds_the_entry_bound() {
        let mut history = ConversationHistory::new();
        for i in 0..15 {
            history.push_user(format!("question {i}"));
            history.push_assistant(format!("answer {i}"));
        }
        assert_eq!(history.len(), MAX_HISTORY_ENTRIES);
    }

    #[test]
    fn trims_the_oldest_pair_together() {
        let mut history = ConversationHistory::new();
        for i in 0..11 {
            history.push_user(format!("q{i}"));
            history.push_assistant(format!("a{i}"));
        }

        let first = history.entries().next().unwrap();
        assert_eq!(first.role, Role::User);
        assert_eq!(first.text, "q1");

        // Strict alternation survives the trim.
        for (i, entry) in history.entries().enumerate() {
            let expected = if i % 2 == 0 { Role::User } else { Role::Assistant };
            assert_eq!(entry.role, expected);
        }
    }

    #[test]
    fn truncated_replies_are_flagged_and_retained() {
        let mut history = ConversationHistory::new();
        history.push_user("tell me a story");
        history.push_assistant_truncated("Once upon a");

        let last = history.entries().last().unwrap();
        assert!(last.truncated);
        assert_eq!(last.text, "Once upon a");
    }
}
