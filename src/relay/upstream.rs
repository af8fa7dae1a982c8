//! Upstream transcription socket: connect, key verification, keepalive.

use std::time::Duration;

use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{info, warn};

use super::config::RelayConfig;

/// Sent on the client socket when the upstream handshake is rejected, so the
/// browser can distinguish an auth problem from a network drop.
pub const HANDSHAKE_REJECTED_CLOSE_CODE: u16 = 4000;

/// The upstream drops idle connections; a keepalive message on this cadence
/// holds the session open while the microphone is muted or silent.
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(5);
pub const KEEPALIVE_MESSAGE: &str = r#"{"type":"KeepAlive"}"#;

const DEEPGRAM_PROJECTS_URL: &str = "https://api.deepgram.com/v1/projects";

pub type UpstreamSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("upstream connection failed: {0}")]
    Connect(String),

    /// The upstream refused the WebSocket handshake outright, usually a bad
    /// or missing API key.
    #[error("upstream rejected handshake with HTTP {status}")]
    HandshakeRejected { status: u16 },

    #[error("upstream send failed: {0}")]
    Send(String),
}

/// Open the upstream transcription socket for one session.
pub async fn connect_upstream(
    config: &RelayConfig,
    api_key: &str,
) -> Result<UpstreamSocket, RelayError> {
    let url = config.build_listen_url()?;

    let request = tokio_tungstenite::tungstenite::http::Request::builder()
        .uri(&url)
        .header("Authorization", format!("Token {api_key}"))
        .body(())
        .map_err(|e| RelayError::Connect(format!("invalid handshake request: {e}")))?;

    match connect_async(request).await {
        Ok((socket, _)) => {
            info!("Connected to transcription upstream");
            Ok(socket)
        }
        Err(tokio_tungstenite::tungstenite::Error::Http(response)) => {
            Err(RelayError::HandshakeRejected {
                status: response.status().as_u16(),
            })
        }
        Err(e) => Err(RelayError::Connect(e.to_string())),
    }
}

/// Probe the transcription API key at startup.
///
/// Log-only: a failed probe is reported loudly but never prevents the server
/// from starting, since the key may become valid or the check may be a
/// transient network failure.
pub async fn verify_key(client: &reqwest::Client, api_key: &str) {
    let result = client
        .get(DEEPGRAM_PROJECTS_URL)
        .header("Authorization", format!("Token {api_key}"))
        .send()
        .await;

    match result {
        Ok(response) if response.status().is_success() => {
            info!("Transcription API key verified");
        }
        Ok(response) => {
            warn!(
                status = response.status().as_u16(),
                "Transcription API key check failed; sessions will likely be rejected"
            );
        }
        Err(e) => {
            warn!("Transcription API key check unreachable: {e}");
        }
    }
}
