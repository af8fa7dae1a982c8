use std::sync::Arc;

use crate::config::ServerConfig;
use crate::core::generation::AnthropicGeneration;
use crate::core::synthesis::ElevenLabsSynthesizer;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: ServerConfig,
    /// Shared HTTP client; connection pooling across all upstream calls.
    pub http: reqwest::Client,
    pub generation: Arc<AnthropicGeneration>,
    pub synthesizer: Arc<ElevenLabsSynthesizer>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Arc<Self> {
        let http = reqwest::Client::new();

        let generation = Arc::new(AnthropicGeneration::new(
            http.clone(),
            config.anthropic_api_key.clone(),
            config.generation_model.clone(),
            config.generation_max_tokens,
        ));
        let synthesizer = Arc::new(ElevenLabsSynthesizer::new(
            http.clone(),
            config.elevenlabs_api_key.clone(),
            config.elevenlabs_voice_id.clone(),
        ));

        Arc::new(Self {
            config,
            http,
            generation,
            synthesizer,
        })
    }
}
