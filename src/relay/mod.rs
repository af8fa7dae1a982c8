//! Transcription relay: bridges a client session to the live transcription
//! service over WebSocket, buffering audio until the upstream handshake
//! completes and keeping the upstream alive across quiet periods.

pub mod config;
pub mod gate;
pub mod upstream;

pub use config::RelayConfig;
pub use gate::{FrameGate, RelayFrame};
pub use upstream::{
    connect_upstream, verify_key, RelayError, UpstreamSocket, HANDSHAKE_REJECTED_CLOSE_CODE,
    KEEPALIVE_INTERVAL, KEEPALIVE_MESSAGE,
};
