//! Pre-handshake frame buffering.
//!
//! The client starts streaming audio the moment its socket opens, while the
//! upstream handshake is still in flight. The gate holds those early frames
//! in arrival order and releases them, still in order, once the upstream is
//! ready; after that it passes frames straight through. Nothing is ever
//! reordered or dropped while buffering.

use std::collections::VecDeque;

use bytes::Bytes;
use tracing::debug;

/// One client frame bound for the upstream: audio chunks arrive as binary,
/// control frames as text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayFrame {
    Text(String),
    Binary(Bytes),
}

#[derive(Debug, PartialEq, Eq)]
enum GateState {
    Connecting,
    Open,
}

/// FIFO gate between the client socket and the upstream sink.
#[derive(Debug)]
pub struct FrameGate {
    state: GateState,
    pending: VecDeque<RelayFrame>,
}

impl FrameGate {
    pub fn new() -> Self {
        Self {
            state: GateState::Connecting,
            pending: VecDeque::new(),
        }
    }

    /// Accept one client frame. Returns the frame when the gate is open and
    /// it should be forwarded immediately; buffers it otherwise.
    pub fn accept(&mut self, frame: RelayFrame) -> Option<RelayFrame> {
        match self.state {
            GateState::Connecting => {
                self.pending.push_back(frame);
                None
            }
            GateState::Open => Some(frame),
        }
    }

    /// Open the gate and drain everything buffered, in arrival order.
    pub fn upstream_ready(&mut self) -> Vec<RelayFrame> {
        self.state = GateState::Open;
        if !self.pending.is_empty() {
            debug!(
                buffered = self.pending.len(),
                "Upstream ready, flushing buffered frames"
            );
        }
        self.pending.drain(..).collect()
    }

    pub fn is_open(&self) -> bool {
        self.state == GateState::Open
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

impl Default for FrameGate {
    fn default() -> Self {
        Self::new()
    }
}
