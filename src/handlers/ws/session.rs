//! Axum WebSocket session handler
//!
//! One task per connected client. The session owns the upstream
//! transcription relay, the conversation manager, and a single sender task
//! that serializes everything going back to the client.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        State,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::select;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, error, info, warn};

use crate::core::conversation::{ConversationManager, EventAction, TurnSettings};
use crate::core::generation::GenerationStream;
use crate::core::synthesis::SpeechSynthesizer;
use crate::core::transcription::TranscriptionEvent;
use crate::relay::{
    FrameGate, RelayConfig, RelayError, RelayFrame, connect_upstream,
    HANDSHAKE_REJECTED_CLOSE_CODE, KEEPALIVE_INTERVAL, KEEPALIVE_MESSAGE,
};
use crate::state::AppState;

use super::messages::{IncomingMessage, MessageRoute, OutgoingMessage};
use super::renderer::WsRenderer;

/// Generous buffer: audio frames arrive every ~250ms but synthesized
/// sentences are large and bursty.
const CHANNEL_BUFFER_SIZE: usize = 1024;

/// What the upstream relay task reports back to the session loop.
enum UpstreamEvent {
    /// Handshake complete; buffered frames may flow.
    Ready,
    /// One transcription text frame.
    Event(String),
    /// Upstream went away; the session closes with the same code.
    Closed { code: u16, reason: String },
    /// The handshake itself failed.
    Failed(RelayError),
}

/// WebSocket session handler
/// Upgrades the HTTP connection to a full voice conversation session
pub async fn ws_session_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    info!("WebSocket session upgrade requested");
    ws.on_upgrade(move |socket| handle_session(socket, state))
}

async fn handle_session(socket: WebSocket, app_state: Arc<AppState>) {
    info!("WebSocket session established");

    let (mut sender, mut receiver) = socket.split();
    let (message_tx, mut message_rx) = mpsc::channel::<MessageRoute>(CHANNEL_BUFFER_SIZE);

    // Single sender task; everything bound for the client funnels through
    // one channel so frames never interleave mid-message.
    let mut sender_task = tokio::spawn(async move {
        while let Some(route) = message_rx.recv().await {
            let result = match route {
                MessageRoute::Outgoing(message) => match serde_json::to_string(&message) {
                    Ok(json) => sender.send(Message::Text(json.into())).await,
                    Err(e) => {
                        error!("Failed to serialize outgoing message: {}", e);
                        continue;
                    }
                },
                MessageRoute::Passthrough(text) => sender.send(Message::Text(text.into())).await,
                MessageRoute::Binary(data) => sender.send(Message::Binary(data)).await,
                MessageRoute::Close { code, reason } => {
                    let _ = sender
                        .send(Message::Close(Some(CloseFrame {
                            code,
                            reason: reason.into(),
                        })))
                        .await;
                    break;
                }
            };

            if let Err(e) = result {
                error!("Failed to send WebSocket message: {}", e);
                break;
            }
        }
    });

    // Upstream transcription relay.
    let (frame_tx, frame_rx) = mpsc::channel::<RelayFrame>(CHANNEL_BUFFER_SIZE);
    let (event_tx, mut event_rx) = mpsc::channel::<UpstreamEvent>(CHANNEL_BUFFER_SIZE);
    let mut upstream_task = tokio::spawn(run_upstream(
        app_state.config.relay.clone(),
        app_state.config.deepgram_api_key.clone(),
        frame_rx,
        event_tx,
    ));

    // Conversation orchestration for this session.
    let renderer = Arc::new(WsRenderer::new(message_tx.clone()));
    let generation: Arc<dyn GenerationStream> = app_state.generation.clone();
    let synthesizer: Arc<dyn SpeechSynthesizer> = app_state.synthesizer.clone();
    let manager = Arc::new(ConversationManager::new(
        generation,
        synthesizer,
        renderer.clone(),
        TurnSettings::default(),
    ));

    let mut gate = FrameGate::new();
    let mut muted = false;
    let mut last_audio = Instant::now();
    let mut keepalive = tokio::time::interval(KEEPALIVE_INTERVAL);

    loop {
        select! {
            msg_result = receiver.next() => {
                match msg_result {
                    Some(Ok(Message::Binary(data))) => {
                        last_audio = Instant::now();
                        if let Some(frame) = gate.accept(RelayFrame::Binary(data)) {
                            if frame_tx.send(frame).await.is_err() {
                                warn!("Upstream relay gone, dropping audio");
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Text(text))) => {
                        handle_client_message(&text, &renderer, &mut muted, &mut last_audio);
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!("WebSocket session closed by client");
                        break;
                    }
                    Some(Ok(_)) => {
                        // Ping/Pong handled by axum
                    }
                    Some(Err(e)) => {
                        warn!("WebSocket error: {}", e);
                        break;
                    }
                    None => {
                        info!("WebSocket session ended by client");
                        break;
                    }
                }
            }

            upstream = event_rx.recv() => {
                let Some(event) = upstream else {
                    warn!("Upstream relay task ended unexpectedly");
                    break;
                };
                match event {
                    UpstreamEvent::Ready => {
                        for frame in gate.upstream_ready() {
                            if frame_tx.send(frame).await.is_err() {
                                break;
                            }
                        }
                        manager.mark_ready();
                        send_state(&message_tx, &manager).await;
                    }
                    UpstreamEvent::Event(text) => {
                        handle_upstream_event(text, &manager, &message_tx).await;
                    }
                    UpstreamEvent::Closed { code, reason } => {
                        info!(code, reason, "Upstream closed, ending session");
                        let _ = message_tx
                            .send(MessageRoute::Close { code, reason })
                            .await;
                        break;
                    }
                    UpstreamEvent::Failed(RelayError::HandshakeRejected { status }) => {
                        error!(status, "Upstream rejected the transcription handshake");
                        let _ = message_tx
                            .send(MessageRoute::Close {
                                code: HANDSHAKE_REJECTED_CLOSE_CODE,
                                reason: format!("Deepgram HTTP {status}"),
                            })
                            .await;
                        break;
                    }
                    UpstreamEvent::Failed(e) => {
                        error!("Upstream connection failed: {}", e);
                        let _ = message_tx
                            .send(MessageRoute::Close {
                                code: 1011,
                                reason: e.to_string(),
                            })
                            .await;
                        break;
                    }
                }
            }

            _ = keepalive.tick() => {
                // Idle keepalive: the upstream times out quiet connections,
                // so hold it open while the microphone is muted or silent.
                if keepalive_due(&gate, muted, last_audio) {
                    debug!("Sending upstream keepalive");
                    if frame_tx
                        .send(RelayFrame::Text(KEEPALIVE_MESSAGE.to_string()))
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
            }
        }
    }

    // Cancel any turn still in flight before tearing the session down.
    manager.barge_in().await;

    // Closing the frame channel lets the upstream task send a proper close
    // frame instead of seeing a raw connection drop; abort is the fallback.
    drop(frame_tx);
    let _ = tokio::time::timeout(Duration::from_millis(200), &mut sender_task).await;
    let _ = tokio::time::timeout(Duration::from_millis(200), &mut upstream_task).await;
    sender_task.abort();
    upstream_task.abort();

    info!("WebSocket session terminated");
}

/// Whether a keepalive is owed this tick: the upstream must be live, and no
/// audio may be flowing (microphone muted, or nothing heard for a full
/// interval).
fn keepalive_due(gate: &FrameGate, muted: bool, last_audio: Instant) -> bool {
    gate.is_open() && (muted || last_audio.elapsed() >= KEEPALIVE_INTERVAL)
}

/// Apply one client control message.
fn handle_client_message(
    text: &str,
    renderer: &Arc<WsRenderer>,
    muted: &mut bool,
    last_audio: &mut Instant,
) {
    let incoming: IncomingMessage = match serde_json::from_str(text) {
        Ok(msg) => msg,
        Err(e) => {
            debug!("Ignoring malformed client message: {}", e);
            return;
        }
    };

    match incoming {
        IncomingMessage::Playback { playing } => renderer.set_playing(playing),
        IncomingMessage::Mute => *muted = true,
        IncomingMessage::Unmute => {
            *muted = false;
            *last_audio = Instant::now();
        }
        IncomingMessage::Other => {
            debug!("Ignoring unknown client message type");
        }
    }
}

/// Feed one upstream transcription frame through the turn state machine and
/// act on the result. The raw frame is also forwarded to the client so it
/// can render live transcription state itself.
async fn handle_upstream_event(
    text: String,
    manager: &Arc<ConversationManager>,
    message_tx: &mpsc::Sender<MessageRoute>,
) {
    let _ = message_tx
        .send(MessageRoute::Passthrough(text.clone()))
        .await;

    let Some(event) = TranscriptionEvent::parse(&text) else {
        debug!("Dropping malformed upstream frame");
        return;
    };

    match manager.handle_event(&event).await {
        EventAction::None => {}
        EventAction::Interim { text } => {
            let _ = message_tx
                .send(MessageRoute::Outgoing(OutgoingMessage::Interim { text }))
                .await;
        }
        EventAction::BargeIn => {
            send_state(message_tx, manager).await;
        }
        EventAction::StartTurn { user_text } => {
            let _ = message_tx
                .send(MessageRoute::Outgoing(OutgoingMessage::Transcript {
                    text: user_text.clone(),
                }))
                .await;

            let task_manager = manager.clone();
            let tx = message_tx.clone();
            tokio::spawn(async move {
                let reply = task_manager.run_turn(user_text).await;
                send_state(&tx, &task_manager).await;
                if let Some(reply) = reply {
                    let _ = tx
                        .send(MessageRoute::Outgoing(OutgoingMessage::Reply {
                            text: reply.text,
                            mood: reply.mood,
                        }))
                        .await;
                }
            });
            send_state(message_tx, manager).await;
        }
    }
}

async fn send_state(message_tx: &mpsc::Sender<MessageRoute>, manager: &Arc<ConversationManager>) {
    let _ = message_tx
        .send(MessageRoute::Outgoing(OutgoingMessage::State {
            state: manager.state(),
        }))
        .await;
}

/// Upstream relay task: connect, then pump frames both directions until
/// either side goes away.
async fn run_upstream(
    config: RelayConfig,
    api_key: String,
    frame_rx: mpsc::Receiver<RelayFrame>,
    event_tx: mpsc::Sender<UpstreamEvent>,
) {
    let socket = match connect_upstream(&config, &api_key).await {
        Ok(socket) => socket,
        Err(e) => {
            let _ = event_tx.send(UpstreamEvent::Failed(e)).await;
            return;
        }
    };
    if event_tx.send(UpstreamEvent::Ready).await.is_err() {
        return;
    }

    let (sink, stream) = socket.split();
    relay_frames(sink, stream, frame_rx, event_tx).await;
}

/// Pump frames both directions between the session and the upstream socket.
///
/// Ends when the frame channel closes (the socket is then closed cleanly
/// with a close frame), when the upstream closes or errors, or when the
/// session stops listening for events.
async fn relay_frames<Si, St>(
    mut sink: Si,
    mut stream: St,
    mut frame_rx: mpsc::Receiver<RelayFrame>,
    event_tx: mpsc::Sender<UpstreamEvent>,
) where
    Si: Sink<WsMessage> + Unpin,
    Si::Error: std::fmt::Display,
    St: Stream<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        select! {
            frame = frame_rx.recv() => {
                let Some(frame) = frame else {
                    // Session ended; close upstream cleanly.
                    let _ = sink.close().await;
                    return;
                };
                // Frame type is preserved: audio stays binary, keepalive
                // stays text.
                let message = match frame {
                    RelayFrame::Text(text) => WsMessage::Text(text.into()),
                    RelayFrame::Binary(data) => WsMessage::Binary(data),
                };
                if let Err(e) = sink.send(message).await {
                    warn!("Upstream send failed: {}", e);
                    let _ = event_tx
                        .send(UpstreamEvent::Closed {
                            code: 1011,
                            reason: format!("upstream send failed: {e}"),
                        })
                        .await;
                    return;
                }
            }

            message = stream.next() => {
                match message {
                    Some(Ok(WsMessage::Text(text))) => {
                        if event_tx
                            .send(UpstreamEvent::Event(text.to_string()))
                            .await
                            .is_err()
                        {
                            return;
                        }
                    }
                    Some(Ok(WsMessage::Close(frame))) => {
                        let (code, reason) = match frame {
                            Some(frame) => (u16::from(frame.code), frame.reason.to_string()),
                            None => (1000, String::new()),
                        };
                        let _ = event_tx.send(UpstreamEvent::Closed { code, reason }).await;
                        return;
                    }
                    Some(Ok(_)) => {
                        // Ping/Pong handled by the library; upstream never
                        // sends binary.
                    }
                    Some(Err(e)) => {
                        warn!("Upstream WebSocket error: {}", e);
                        let _ = event_tx
                            .send(UpstreamEvent::Closed {
                                code: 1011,
                                reason: e.to_string(),
                            })
                            .await;
                        return;
                    }
                    None => {
                        let _ = event_tx
                            .send(UpstreamEvent::Closed {
                                code: 1000,
                                reason: "upstream stream ended".to_string(),
                            })
                            .await;
                        return;
                    }
                }
            }
        }
    }
}
