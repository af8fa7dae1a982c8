use std::env;

use super::{ServerConfig, DEFAULT_GENERATION_MAX_TOKENS, DEFAULT_GENERATION_MODEL};
use crate::relay::RelayConfig;

const REQUIRED_VARS: [&str; 4] = [
    "ANTHROPIC_API_KEY",
    "DEEPGRAM_API_KEY",
    "ELEVENLABS_API_KEY",
    "ELEVENLABS_VOICE_ID",
];

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Also loads from a `.env` file if present using dotenvy. Fails when
    /// any upstream credential is missing or a numeric variable is
    /// malformed.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();

        let missing: Vec<&str> = REQUIRED_VARS
            .iter()
            .filter(|name| env::var(name).map(|v| v.trim().is_empty()).unwrap_or(true))
            .copied()
            .collect();
        if !missing.is_empty() {
            return Err(format!(
                "Missing required environment variables: {}",
                missing.join(", ")
            )
            .into());
        }

        // Server configuration
        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|e| format!("Invalid port number: {e}"))?;

        // Generation settings
        let generation_model = env::var("GENERATION_MODEL")
            .unwrap_or_else(|_| DEFAULT_GENERATION_MODEL.to_string());
        let generation_max_tokens = match env::var("GENERATION_MAX_TOKENS") {
            Ok(value) => value
                .parse::<u32>()
                .map_err(|e| format!("Invalid GENERATION_MAX_TOKENS: {e}"))?,
            Err(_) => DEFAULT_GENERATION_MAX_TOKENS,
        };

        Ok(ServerConfig {
            host,
            port,
            anthropic_api_key: env::var("ANTHROPIC_API_KEY")?,
            deepgram_api_key: env::var("DEEPGRAM_API_KEY")?,
            elevenlabs_api_key: env::var("ELEVENLABS_API_KEY")?,
            elevenlabs_voice_id: env::var("ELEVENLABS_VOICE_ID")?,
            generation_model,
            generation_max_tokens,
            relay: RelayConfig::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn set_required_vars() {
        unsafe {
            env::set_var("ANTHROPIC_API_KEY", "test-anthropic");
            env::set_var("DEEPGRAM_API_KEY", "test-deepgram");
            env::set_var("ELEVENLABS_API_KEY", "test-elevenlabs");
            env::set_var("ELEVENLABS_VOICE_ID", "test-voice");
        }
    }

    fn cleanup_env_vars() {
        unsafe {
            for name in REQUIRED_VARS {
                env::remove_var(name);
            }
            env::remove_var("HOST");
            env::remove_var("PORT");
            env::remove_var("GENERATION_MODEL");
            env::remove_var("GENERATION_MAX_TOKENS");
        }
    }

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        cleanup_env_vars();
        set_required_vars();

        let config = ServerConfig::from_env().expect("Should load config");
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.generation_model, DEFAULT_GENERATION_MODEL);
        assert_eq!(config.generation_max_tokens, DEFAULT_GENERATION_MAX_TOKENS);
        assert_eq!(config.relay.model, "nova-2");
        assert_eq!(config.address(), "0.0.0.0:3000");

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_env_missing_required_vars() {
        cleanup_env_vars();
        set_required_vars();
        unsafe {
            env::remove_var("ELEVENLABS_VOICE_ID");
        }

        let result = ServerConfig::from_env();
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("ELEVENLABS_VOICE_ID")
        );

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_env_blank_key_counts_as_missing() {
        cleanup_env_vars();
        set_required_vars();
        unsafe {
            env::set_var("ANTHROPIC_API_KEY", "   ");
        }

        let result = ServerConfig::from_env();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("ANTHROPIC_API_KEY"));

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_env_host_port_and_generation_overrides() {
        cleanup_env_vars();
        set_required_vars();
        unsafe {
            env::set_var("HOST", "127.0.0.1");
            env::set_var("PORT", "8080");
            env::set_var("GENERATION_MODEL", "custom-model");
            env::set_var("GENERATION_MAX_TOKENS", "512");
        }

        let config = ServerConfig::from_env().expect("Should load config");
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 8080);
        assert_eq!(config.generation_model, "custom-model");
        assert_eq!(config.generation_max_tokens, 512);

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_env_invalid_port() {
        cleanup_env_vars();
        set_required_vars();
        unsafe {
            env::set_var("PORT", "not-a-port");
        }

        let result = ServerConfig::from_env();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Invalid port"));

        cleanup_env_vars();
    }
}
