//! Incremental sentence segmentation and mood-tag extraction.
//!
//! The generation service streams reply text in small deltas. As soon as a
//! complete sentence is available (terminator followed by whitespace) it is
//! emitted as a [`SentenceUnit`] so synthesis can start without waiting for
//! the rest of the reply. A one-time leading `[MOOD:<word>]` tag selects the
//! avatar's emotional rendering; no sentence is released until that tag is
//! resolved, so it can never leak into synthesized speech.

/// Default mood used when the reply carries no tag.
pub const DEFAULT_MOOD: &str = "neutral";

/// Accumulated characters after which a reply that does not start with the
/// tag prefix is considered tag-free.
const MOOD_SCAN_LIMIT: usize = 20;

const MOOD_PREFIX: &str = "[MOOD:";

/// One complete sentence of reply text with its per-turn sequence number.
///
/// Sequence numbers are dense and start at 0; empty or whitespace-only
/// fragments never consume a slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentenceUnit {
    pub seq: u32,
    pub text: String,
}

/// Streaming sentence segmenter with one-shot mood extraction.
///
/// One instance lives per turn. Feed generation deltas through [`push`] and
/// call [`finish`] when the stream ends to flush any trailing text that never
/// received sentence punctuation.
///
/// [`push`]: SentenceSegmenter::push
/// [`finish`]: SentenceSegmenter::finish
#[derive(Debug)]
pub struct SentenceSegmenter {
    buffer: String,
    full_text: String,
    next_seq: u32,
    mood: String,
    mood_resolved: bool,
}

impl SentenceSegmenter {
    pub fn new() -> Self {
        Self {
            buffer: String::new(),
            full_text: String::new(),
            next_seq: 0,
            mood: DEFAULT_MOOD.to_string(),
            mood_resolved: false,
        }
    }

    /// The resolved mood, or `"neutral"` while unresolved or absent.
    pub fn mood(&self) -> &str {
        &self.mood
    }

    /// The accumulated reply text with the mood tag stripped.
    pub fn full_text(&self) -> &str {
        &self.full_text
    }

    /// Append a generation delta and return any sentences it completed.
    ///
    /// Sentences are withheld while the mood tag is unresolved; the first
    /// delta that resolves it may therefore release several at once.
    pub fn push(&mut self, delta: &str) -> Vec<SentenceUnit> {
        self.buffer.push_str(delta);
        self.full_text.push_str(delta);

        if !self.mood_resolved {
            self.try_resolve_mood(false);
            if !self.mood_resolved {
                return Vec::new();
            }
        }

        self.drain_sentences()
    }

    /// Flush the remaining buffer at stream end.
    ///
    /// Forces mood resolution first so a reply consisting of nothing but a
    /// tag still resolves, then emits any trailing text as a final
    /// (possibly punctuation-less) unit.
    pub fn finish(&mut self) -> Option<SentenceUnit> {
        if !self.mood_resolved {
            self.try_resolve_mood(true);
        }
        let trailing = self.buffer.trim();
        if trailing.is_empty() {
            self.buffer.clear();
            return None;
        }
        let unit = SentenceUnit {
            seq: self.next_seq,
            text: trailing.to_string(),
        };
        self.next_seq += 1;
        self.buffer.clear();
        Some(unit)
    }

    fn drain_sentences(&mut self) -> Vec<SentenceUnit> {
        let mut units = Vec::new();
        while let Some((end, rest)) = find_sentence_break(&self.buffer) {
            let sentence = self.buffer[..end].trim().to_string();
            self.buffer = self.buffer[rest..].to_string();
            if !sentence.is_empty() {
                units.push(SentenceUnit {
                    seq: self.next_seq,
                    text: sentence,
                });
                self.next_seq += 1;
            }
        }
        units
    }

    /// Resolve the mood tag once per turn.
    ///
    /// Resolution happens when a closing bracket appears, when more than
    /// `MOOD_SCAN_LIMIT` characters accumulate without the text starting
    /// with the tag prefix, or unconditionally at stream end (`force`).
    /// On a successful parse the tag and its trailing whitespace are
    /// stripped from both the segmentation buffer and the full reply text.
    fn try_resolve_mood(&mut self, force: bool) {
        // Before any sentence is emitted the buffer equals the accumulated
        // reply text, so scanning the buffer scans the very start of the turn.
        debug_assert_eq!(self.buffer, self.full_text);

        let has_close = self.buffer.contains(']');
        let could_be_tag = starts_with_tag_prefix(&self.buffer);

        if !has_close {
            if !force && (could_be_tag || self.buffer.chars().count() <= MOOD_SCAN_LIMIT) {
                return;
            }
            // Confirmed absent (or stream ended mid-tag): keep the default.
            self.mood_resolved = true;
            return;
        }

        if self.buffer.starts_with(MOOD_PREFIX) {
            if let Some(close) = self.buffer.find(']') {
                let word = self.buffer[MOOD_PREFIX.len()..close].trim();
                if !word.is_empty() {
                    self.mood = word.to_string();
                }
                let stripped = self.buffer[close + 1..].trim_start().to_string();
                self.buffer = stripped.clone();
                self.full_text = stripped;
                self.mood_resolved = true;
                return;
            }
        }

        // A bracket appeared but the text is not a leading mood tag.
        self.mood_resolved = true;
    }
}

impl Default for SentenceSegmenter {
    fn default() -> Self {
        Self::new()
    }
}

/// True while the text could still grow into a `[MOOD:` prefix.
fn starts_with_tag_prefix(text: &str) -> bool {
    if text.len() >= MOOD_PREFIX.len() {
        text.starts_with(MOOD_PREFIX)
    } else {
        MOOD_PREFIX.starts_with(text)
    }
}

/// Find the first sentence terminator followed by whitespace.
///
/// Returns the byte offset one past the terminator (sentence end, inclusive
/// of the terminator) and the offset past the whitespace where the remaining
/// buffer starts.
fn find_sentence_break(text: &str) -> Option<(usize, usize)> {
    let mut chars = text.char_indices().peekable();
    while let Some((i, ch)) = chars.next() {
        if matches!(ch, '.' | '!' | '?') {
            if let Some(&(_, next)) = chars.peek() {
                if next.is_whitespace() {
                    let end = i + ch.len_utf8();
                    return Some((end, end + next.len_utf8()));
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(units: &[SentenceUnit]) -> Vec<&str> {
        units.iter().map(|u| u.text.as_str()).collect()
    }

    #[test]
    fn emits_sentence_on_terminator_followed_by_whitespace() {
        let mut seg = SentenceSegmenter::new();
        assert!(seg.push("Hello there").is_empty());
        let units = seg.push(". How are you?");
        assert_eq!(texts(&units), vec!["Hello there."]);
        assert_eq!(units[0].seq, 0);
    }

    #[test]
    fn terminator_at_buffer_end_waits_for_whitespace() {
        let mut seg = SentenceSegmenter::new();
        assert!(seg.push("Wait for it.").is_empty());
        let units = seg.push(" Done. ");
        assert_eq!(texts(&units), vec!["Wait for it.", "Done."]);
        assert_eq!(units[1].seq, 1);
    }

    #[test]
    fn multiple_sentences_in_one_delta() {
        let mut seg = SentenceSegmenter::new();
        let units = seg.push("One. Two! Three? Four");
        assert_eq!(texts(&units), vec!["One.", "Two!", "Three?"]);
        assert_eq!(seg.finish().unwrap().text, "Four");
    }

    #[test]
    fn trailing_text_without_punctuation_is_flushed_at_finish() {
        let mut seg = SentenceSegmenter::new();
        assert!(seg.push("no punctuation here at all").is_empty());
        let unit = seg.finish().unwrap();
        assert_eq!(unit.text, "no punctuation here at all");
        assert_eq!(unit.seq, 0);
    }

    #[test]
    fn whitespace_only_trailing_buffer_is_dropped() {
        let mut seg = SentenceSegmenter::new();
        seg.push("Done.   ");
        assert!(seg.finish().is_none());
    }

    #[test]
    fn sequence_numbers_are_dense_across_push_and_finish() {
        let mut seg = SentenceSegmenter::new();
        let first = seg.push("A. B. ");
        let last = seg.finish().unwrap();
        assert_eq!(first[0].seq, 0);
        assert_eq!(first[1].seq, 1);
        assert_eq!(last.seq, 2);
    }

    #[test]
    fn mood_tag_is_extracted_and_stripped() {
        let mut seg = SentenceSegmenter::new();
        let units = seg.push("[MOOD:happy] Great news! It worked. ");
        assert_eq!(seg.mood(), "happy");
        assert_eq!(texts(&units), vec!["Great news!", "It worked."]);
        assert_eq!(seg.full_text(), "Great news! It worked. ");
    }

    #[test]
    fn mood_tag_split_across_deltas() {
        let mut seg = SentenceSegmenter::new();
        assert!(seg.push("[MOO").is_empty());
        assert!(seg.push("D:love").is_empty());
        let units = seg.push("] Missing you. ");
        assert_eq!(seg.mood(), "love");
        assert_eq!(texts(&units), vec!["Missing you."]);
    }

    #[test]
    fn untagged_reply_defaults_to_neutral_and_is_unchanged() {
        let mut seg = SentenceSegmenter::new();
        let units = seg.push("That sounds like a lovely plan for today. ");
        assert_eq!(seg.mood(), DEFAULT_MOOD);
        assert_eq!(texts(&units), vec!["That sounds like a lovely plan for today."]);
        assert_eq!(seg.full_text(), "That sounds like a lovely plan for today. ");
    }

    #[test]
    fn sentences_are_held_back_until_mood_resolution() {
        let mut seg = SentenceSegmenter::new();
        // A complete sentence arrives while the text could still be a tag
        // prefix; nothing may be emitted yet.
        assert!(seg.push("[MOOD:sad").is_empty());
        let units = seg.push("] Oh no. That hurts. ");
        assert_eq!(seg.mood(), "sad");
        assert_eq!(texts(&units), vec!["Oh no.", "That hurts."]);
    }

    #[test]
    fn resolution_after_twenty_chars_without_tag_prefix() {
        let mut seg = SentenceSegmenter::new();
        // 21+ chars, no terminator, no bracket: resolves to neutral and the
        // buffer keeps accumulating as ordinary text.
        assert!(seg.push("well now this is long").is_empty());
        assert_eq!(seg.mood(), DEFAULT_MOOD);
        let units = seg.push(" indeed. ");
        assert_eq!(texts(&units), vec!["well now this is long indeed."]);
    }

    #[test]
    fn stray_bracket_resolves_to_neutral_without_stripping() {
        let mut seg = SentenceSegmenter::new();
        let units = seg.push("lists] are fun. ");
        assert_eq!(seg.mood(), DEFAULT_MOOD);
        assert_eq!(texts(&units), vec!["lists] are fun."]);
    }

    #[test]
    fn tag_only_reply_finishes_empty() {
        let mut seg = SentenceSegmenter::new();
        assert!(seg.push("[MOOD:happy]").is_empty());
        assert!(seg.finish().is_none());
        assert_eq!(seg.mood(), "happy");
        assert_eq!(seg.full_text(), "");
    }

    #[test]
    fn empty_candidate_does_not_consume_a_sequence_number() {
        let mut seg = SentenceSegmenter::new();
        // Leading ". " produces an empty candidate which must not take seq 0.
        let units = seg.push(". Hello there my dear friend. ");
        assert_eq!(texts(&units), vec!["Hello there my dear friend."]);
        assert_eq!(units[0].seq, 0);
    }
}
