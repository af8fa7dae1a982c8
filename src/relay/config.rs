//! Upstream transcription connection parameters.

use url::Url;

use super::upstream::RelayError;

pub const DEEPGRAM_LISTEN_URL: &str = "wss://api.deepgram.com/v1/listen";

/// Transcription session parameters, applied as query parameters on the
/// upstream URL.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub model: String,
    pub language: String,
    pub smart_format: bool,
    pub interim_results: bool,
    /// Silence (ms) after speech before the service emits `speech_final`.
    pub endpointing_ms: u32,
    /// Longer silence (ms) before the fallback `UtteranceEnd` event.
    pub utterance_end_ms: u32,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            model: "nova-2".to_string(),
            language: "en".to_string(),
            smart_format: true,
            interim_results: true,
            endpointing_ms: 500,
            utterance_end_ms: 1500,
        }
    }
}

impl RelayConfig {
    pub fn build_listen_url(&self) -> Result<String, RelayError> {
        let mut url = Url::parse(DEEPGRAM_LISTEN_URL)
            .map_err(|e| RelayError::Connect(format!("invalid upstream URL: {e}")))?;

        {
            let mut query_pairs = url.query_pairs_mut();
            query_pairs.append_pair("model", &self.model);
            query_pairs.append_pair("language", &self.language);
            query_pairs.append_pair("smart_format", &self.smart_format.to_string());
            query_pairs.append_pair("interim_results", &self.interim_results.to_string());
            query_pairs.append_pair("endpointing", &self.endpointing_ms.to_string());
            query_pairs.append_pair("utterance_end_ms", &self.utterance_end_ms.to_string());
        }

        Ok(url.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_listen_url_carries_all_session_parameters() {
        let url = RelayConfig::default().build_listen_url().unwrap();

        assert!(url.starts_with("wss://api.deepgram.com/v1/listen?"));
        assert!(url.contains("model=nova-2"));
        assert!(url.contains("language=en"));
        assert!(url.contains("smart_format=true"));
        assert!(url.contains("interim_results=true"));
        assert!(url.contains("endpointing=500"));
        assert!(url.contains("utterance_end_ms=1500"));
    }

    #[test]
    fn custom_parameters_override_the_defaults() {
        let config = RelayConfig {
            model: "nova-3".to_string(),
            endpointing_ms: 300,
            ..RelayConfig::default()
        };
        let url = config.build_listen_url().unwrap();
        assert!(url.contains("model=nova-3"));
        assert!(url.contains("endpointing=300"));
    }
}
