//! Server configuration.
//!
//! Loaded from environment variables (with `.env` support via dotenvy). All
//! upstream credentials are required at startup so a misconfigured server
//! fails immediately instead of on the first session.

mod env;

use crate::relay::RelayConfig;

/// Default generation model and reply budget; short replies keep the spoken
/// conversation snappy.
pub const DEFAULT_GENERATION_MODEL: &str = "claude-sonnet-4-6";
pub const DEFAULT_GENERATION_MAX_TOKENS: u32 = 300;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    // Server settings
    pub host: String,
    pub port: u16,

    // Upstream credentials, all required
    pub anthropic_api_key: String,
    pub deepgram_api_key: String,
    pub elevenlabs_api_key: String,
    pub elevenlabs_voice_id: String,

    // Generation settings
    pub generation_model: String,
    pub generation_max_tokens: u32,

    // Transcription session parameters
    pub relay: RelayConfig,
}

impl ServerConfig {
    /// The socket address string to bind to.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
