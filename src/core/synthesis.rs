//! Speech-synthesis client.
//!
//! One sentence in, one atomic response out: the full audio payload plus
//! character-level timing, decoded into word timing for lip-sync. The
//! concrete provider is the ElevenLabs with-timestamps endpoint; the
//! [`SpeechSynthesizer`] trait is the seam the dispatcher and tests use.

use async_trait::async_trait;
use base64::Engine;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::timing::{decode_alignment, Alignment, WordTimings};

pub const ELEVENLABS_TTS_URL: &str = "https://api.elevenlabs.io/v1/text-to-speech";
const DEFAULT_MODEL_ID: &str = "eleven_turbo_v2_5";

/// Per-sentence synthesis errors. Recovered locally: the failed sentence is
/// skipped and dispatch continues.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SynthesisError {
    #[error("synthesis request failed: {0}")]
    Request(String),

    #[error("synthesis service returned {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("synthesis payload decode failed: {0}")]
    Decode(String),
}

/// Decoded synthesis output for one sentence.
#[derive(Debug, Clone)]
pub struct SynthesizedSpeech {
    pub audio: Bytes,
    pub timings: WordTimings,
}

/// One-sentence synthesis seam.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<SynthesizedSpeech, SynthesisError>;
}

/// Voice rendering parameters sent with every request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceSettings {
    pub stability: f32,
    pub similarity_boost: f32,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            stability: 0.5,
            similarity_boost: 0.75,
        }
    }
}

/// Wire shape of the with-timestamps response.
#[derive(Debug, Deserialize)]
pub struct WithTimestampsResponse {
    pub audio_base64: String,
    pub alignment: Option<Alignment>,
    pub normalized_alignment: Option<Alignment>,
}

/// ElevenLabs with-timestamps client.
pub struct ElevenLabsSynthesizer {
    client: reqwest::Client,
    api_key: String,
    voice_id: String,
    model_id: String,
    voice_settings: VoiceSettings,
}

impl ElevenLabsSynthesizer {
    pub fn new(client: reqwest::Client, api_key: String, voice_id: String) -> Self {
        Self {
            client,
            api_key,
            voice_id,
            model_id: DEFAULT_MODEL_ID.to_string(),
            voice_settings: VoiceSettings::default(),
        }
    }

    /// Fetch the raw with-timestamps JSON without decoding.
    ///
    /// Used by the HTTP proxy endpoint, which hands the payload to the
    /// browser untouched; a missing voice id falls back to the configured
    /// one.
    pub async fn synthesize_raw(
        &self,
        text: &str,
        voice_id: Option<&str>,
        voice_settings: Option<&VoiceSettings>,
    ) -> Result<serde_json::Value, SynthesisError> {
        let voice_id = voice_id.unwrap_or(&self.voice_id);
        let url = format!("{ELEVENLABS_TTS_URL}/{voice_id}/with-timestamps");

        let body = json!({
            "text": text.trim(),
            "model_id": self.model_id,
            "voice_settings": voice_settings.unwrap_or(&self.voice_settings),
        });

        let response = self
            .client
            .post(&url)
            .header("xi-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| SynthesisError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(SynthesisError::Upstream {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| SynthesisError::Decode(e.to_string()))
    }
}

#[async_trait]
impl SpeechSynthesizer for ElevenLabsSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<SynthesizedSpeech, SynthesisError> {
        let raw = self.synthesize_raw(text, None, None).await?;
        let response: WithTimestampsResponse = serde_json::from_value(raw)
            .map_err(|e| SynthesisError::Decode(e.to_string()))?;
        decode_response(response)
    }
}

/// Decode the base64 audio and collapse the alignment into word timings.
fn decode_response(response: WithTimestampsResponse) -> Result<SynthesizedSpeech, SynthesisError> {
    let audio = base64::engine::general_purpose::STANDARD
        .decode(&response.audio_base64)
        .map_err(|e| SynthesisError::Decode(e.to_string()))?;

    let timings = decode_alignment(
        response.normalized_alignment.as_ref(),
        response.alignment.as_ref(),
    );

    Ok(SynthesizedSpeech {
        audio: Bytes::from(audio),
        timings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_audio_and_normalized_alignment() {
        let response: WithTimestampsResponse = serde_json::from_str(
            r#"{
                "audio_base64": "AAEC",
                "alignment": null,
                "normalized_alignment": {
                    "chars": ["h", "i"],
                    "charStartTimesMs": [0, 80],
                    "charDurationsMs": [80, 70]
                }
            }"#,
        )
        .unwrap();

        let speech = decode_response(response).unwrap();
        assert_eq!(speech.audio.as_ref(), &[0u8, 1, 2]);
        assert_eq!(speech.timings.words, vec!["hi"]);
    }

    #[test]
    fn falls_back_to_raw_alignment() {
        let response: WithTimestampsResponse = serde_json::from_str(
            r#"{
                "audio_base64": "AA==",
                "alignment": {
                    "characters": ["y", "o"],
                    "character_start_times_seconds": [0.0, 0.1],
                    "character_end_times_seconds": [0.1, 0.2]
                }
            }"#,
        )
        .unwrap();

        let speech = decode_response(response).unwrap();
        assert_eq!(speech.timings.words, vec!["yo"]);
        assert_eq!(speech.timings.wtimes, vec![0.0]);
    }

    #[test]
    fn invalid_base64_is_a_decode_error() {
        let response = WithTimestampsResponse {
            audio_base64: "!!!not base64!!!".to_string(),
            alignment: None,
            normalized_alignment: None,
        };
        assert!(matches!(
            decode_response(response),
            Err(SynthesisError::Decode(_))
        ));
    }

    #[test]
    fn missing_alignment_yields_empty_timings_not_an_error() {
        let response = WithTimestampsResponse {
            audio_base64: "AA==".to_string(),
            alignment: None,
            normalized_alignment: None,
        };
        let speech = decode_response(response).unwrap();
        assert!(speech.timings.is_empty());
        assert_eq!(speech.audio.len(), 1);
    }
}
