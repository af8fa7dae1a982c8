use axum::Router;
use tokio::net::TcpListener;

use anyhow::anyhow;

use mayamind::{ServerConfig, relay, routes, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    // Initialize crypto provider for TLS connections
    // This must be done before any TLS connections are attempted
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install default crypto provider"))?;

    // Load configuration
    let config = ServerConfig::from_env().map_err(|e| anyhow!(e.to_string()))?;
    let address = config.address();

    // Probe the transcription key up front; a bad key surfaces here instead
    // of on the first session.
    let app_state = AppState::new(config);
    relay::verify_key(&app_state.http, &app_state.config.deepgram_api_key).await;

    // Combine all routes: public health check + API + websocket sessions
    let public_routes =
        Router::new().route("/", axum::routing::get(mayamind::handlers::api::health_check));

    let app = public_routes
        .merge(routes::api::create_api_router())
        .merge(routes::ws::create_ws_router())
        .with_state(app_state);

    // Create listener
    let listener = TcpListener::bind(&address).await?;

    println!("Server listening on {address}");

    // Start server
    axum::serve(listener, app).await?;

    Ok(())
}
