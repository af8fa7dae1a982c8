//! Character-alignment decoding for lip-sync playback.
//!
//! The synthesis service returns character-level timing in one of two wire
//! shapes: a normalized form with millisecond arrays, or a raw form with
//! second arrays that needs a ×1000 conversion. Playback wants word-level
//! timing, so both shapes are collapsed into [`WordTimings`].

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Word-level timing handed to the avatar renderer alongside audio.
///
/// `wtimes` holds each word's start offset in milliseconds from the beginning
/// of the audio; `wdurations` the word's length in milliseconds. All three
/// vectors are the same length.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WordTimings {
    pub words: Vec<String>,
    pub wtimes: Vec<f64>,
    pub wdurations: Vec<f64>,
}

impl WordTimings {
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

/// Character alignment as returned by the synthesis service.
///
/// The two variants are equivalent in content; `Normalized` is already in
/// milliseconds while `Raw` carries start/end times in seconds.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Alignment {
    Normalized {
        chars: Vec<String>,
        #[serde(rename = "charStartTimesMs")]
        char_start_times_ms: Vec<f64>,
        #[serde(rename = "charDurationsMs")]
        char_durations_ms: Vec<f64>,
    },
    Raw {
        characters: Vec<String>,
        character_start_times_seconds: Vec<f64>,
        character_end_times_seconds: Vec<f64>,
    },
}

/// Decode an optional pair of alignments, preferring the normalized shape.
///
/// Returns empty timings when neither shape is present; the caller treats
/// that as a payload to play without lip-sync rather than an error.
pub fn decode_alignment(
    normalized: Option<&Alignment>,
    raw: Option<&Alignment>,
) -> WordTimings {
    match normalized.or(raw) {
        Some(alignment) => words_from_alignment(alignment),
        None => {
            warn!("Synthesis response carried no alignment; returning empty timings");
            WordTimings::default()
        }
    }
}

/// Collapse character-level timing into word-level timing.
///
/// Words are split on whitespace characters; each word's start is the start
/// of its first character and its duration runs to the end of its last.
pub fn words_from_alignment(alignment: &Alignment) -> WordTimings {
    let (chars, starts_ms, durations_ms): (&[String], Vec<f64>, Vec<f64>) = match alignment {
        Alignment::Normalized {
            chars,
            char_start_times_ms,
            char_durations_ms,
        } => (chars, char_start_times_ms.clone(), char_durations_ms.clone()),
        Alignment::Raw {
            characters,
            character_start_times_seconds,
            character_end_times_seconds,
        } => {
            let starts: Vec<f64> = character_start_times_seconds
                .iter()
                .map(|t| t * 1000.0)
                .collect();
            let durations: Vec<f64> = character_start_times_seconds
                .iter()
                .zip(character_end_times_seconds.iter())
                .map(|(start, end)| (end - start) * 1000.0)
                .collect();
            (characters, starts, durations)
        }
    };

    if chars.len() != starts_ms.len() || chars.len() != durations_ms.len() {
        warn!(
            chars = chars.len(),
            starts = starts_ms.len(),
            durations = durations_ms.len(),
            "Alignment arrays have mismatched lengths; returning empty timings"
        );
        return WordTimings::default();
    }

    let mut timings = WordTimings::default();
    let mut word = String::new();
    let mut word_start: Option<f64> = None;
    let mut word_end = 0.0_f64;

    let mut push_word = |word: &mut String, start: &mut Option<f64>, end: f64| {
        if !word.is_empty() {
            if let Some(s) = start.take() {
                timings.words.push(std::mem::take(word));
                timings.wtimes.push(s);
                timings.wdurations.push(end - s);
            }
        }
    };

    for (i, ch) in chars.iter().enumerate() {
        if ch.is_empty() || ch.chars().all(char::is_whitespace) {
            push_word(&mut word, &mut word_start, word_end);
        } else {
            if word_start.is_none() {
                word_start = Some(starts_ms[i]);
            }
            word_end = starts_ms[i] + durations_ms[i];
            word.push_str(ch);
        }
    }
    push_word(&mut word, &mut word_start, word_end);

    timings
}
