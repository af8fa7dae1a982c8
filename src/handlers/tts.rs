//! Synthesis proxy.
//!
//! Forwards one sentence to the synthesis service and returns its
//! with-timestamps JSON payload untouched, so a browser client can drive
//! synthesis directly without holding the API key.

use std::sync::Arc;

use axum::{Json, extract::State};
use serde::Deserialize;
use serde_json::Value;

use crate::core::synthesis::VoiceSettings;
use crate::errors::{AppError, AppResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct TtsRequest {
    pub text: String,
    /// Overrides the configured voice when present.
    pub voice_id: Option<String>,
    pub voice_settings: Option<VoiceSettings>,
}

pub async fn tts_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TtsRequest>,
) -> AppResult<Json<Value>> {
    if request.text.trim().is_empty() {
        return Err(AppError::BadRequest("text is required".to_string()));
    }

    let payload = state
        .synthesizer
        .synthesize_raw(
            &request.text,
            request.voice_id.as_deref(),
            request.voice_settings.as_ref(),
        )
        .await?;

    Ok(Json(payload))
}
