//! Per-connection state machine, transport-agnostic.
//!
//! Transport callbacks become [`ConnEvent`]s fed to [`Connection::handle`],
//! which returns the [`ConnAction`]s the driver must perform. The
//! machine never touches a socket, so every transition is testable with
//! plain byte slices and a synthetic clock.
//!
//! Receive side: bytes append to a bounded buffer; while handshaking
//! the buffer is scanned for the HTTP header block, afterwards it is
//! drained frame by frame. Transmit side: at most one chunk of bytes
//! (the upgrade response, then one encoded frame at a time) is
//! outstanding, with an offset tracking how much of it the transport
//! has accepted; the remainder is retried on the poll cadence and
//! never duplicated.

use std::time::{Duration, Instant};

use retrocon_ws_protocol::{
    decode_frame, encode_text_frame, extract_websocket_key, find_header_end, handshake, Opcode,
};

/// Receive buffer capacity; exceeding it is a protocol violation.
pub const RX_BUFFER: usize = 1024;

/// Connections that received nothing for this long are force-closed,
/// regardless of transmit activity.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Idle,
    Handshaking,
    Connected,
    Closed,
}

/// Transport-level events, one per callback the transport layer has.
#[derive(Debug)]
pub enum ConnEvent<'a> {
    BytesReceived { data: &'a [u8], now: Instant },
    PollTick { now: Instant },
    PeerClosed,
    TransportError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    HandshakeFailed,
    BufferOverflow,
    ProtocolViolation,
    PeerClose,
    IdleTimeout,
    TransportError,
    InputRejected,
}

impl core::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let text = match self {
            CloseReason::HandshakeFailed => "handshake failed",
            CloseReason::BufferOverflow => "receive buffer overflow",
            CloseReason::ProtocolViolation => "protocol violation",
            CloseReason::PeerClose => "peer close",
            CloseReason::IdleTimeout => "idle timeout",
            CloseReason::TransportError => "transport error",
            CloseReason::InputRejected => "input rejected by console",
        };
        f.write_str(text)
    }
}

/// What the transport driver must do after an event.
#[derive(Debug, PartialEq, Eq)]
pub enum ConnAction {
    /// Hand a text-frame payload to the application.
    DeliverInput(Vec<u8>),
    /// Tear the connection down; the slot becomes free.
    Close(CloseReason),
}

pub struct Connection {
    state: ConnState,
    rx: Vec<u8>,
    pending: Vec<u8>,
    pending_offset: usize,
    last_activity: Instant,
    idle_timeout: Duration,
}

impl Connection {
    pub fn new(now: Instant) -> Self {
        Self::with_idle_timeout(now, IDLE_TIMEOUT)
    }

    pub fn with_idle_timeout(now: Instant, idle_timeout: Duration) -> Self {
        Self {
            state: ConnState::Handshaking,
            rx: Vec::with_capacity(RX_BUFFER),
            pending: Vec::new(),
            pending_offset: 0,
            last_activity: now,
            idle_timeout,
        }
    }

    pub fn state(&self) -> ConnState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnState::Connected
    }

    pub fn handle(&mut self, event: ConnEvent<'_>) -> Vec<ConnAction> {
        if self.state == ConnState::Closed {
            return Vec::new();
        }

        match event {
            ConnEvent::BytesReceived { data, now } => self.on_bytes(data, now),
            ConnEvent::PollTick { now } => self.on_poll(now),
            ConnEvent::PeerClosed => self.close(CloseReason::PeerClose),
            ConnEvent::TransportError => self.close(CloseReason::TransportError),
        }
    }

    /// Force-close from the driver side (e.g. the application refused
    /// delivered input).
    pub fn force_close(&mut self, reason: CloseReason) -> Vec<ConnAction> {
        if self.state == ConnState::Closed {
            return Vec::new();
        }
        self.close(reason)
    }

    // Transmit path: one frame outstanding at a time.

    pub fn has_pending(&self) -> bool {
        self.pending_offset < self.pending.len()
    }

    /// Encode `payload` as the next outgoing text frame. Only legal
    /// while connected with an empty pending slot; returns whether the
    /// frame was staged.
    pub fn stage_frame(&mut self, payload: &[u8]) -> bool {
        if self.state != ConnState::Connected || self.has_pending() || payload.is_empty() {
            return false;
        }
        match encode_text_frame(payload) {
            Ok(frame) => {
                self.pending = frame;
                self.pending_offset = 0;
                true
            }
            Err(_) => false,
        }
    }

    /// Unsent remainder of the pending frame.
    pub fn pending_bytes(&self) -> Option<&[u8]> {
        self.has_pending().then(|| &self.pending[self.pending_offset..])
    }

    /// Record that the transport accepted `n` more bytes of the
    /// pending frame. Partial writes leave the rest in place.
    pub fn advance_pending(&mut self, n: usize) {
        self.pending_offset = (self.pending_offset + n).min(self.pending.len());
        if !self.has_pending() {
            self.pending.clear();
            self.pending_offset = 0;
        }
    }

    fn on_bytes(&mut self, data: &[u8], now: Instant) -> Vec<ConnAction> {
        if self.rx.len() + data.len() > RX_BUFFER {
            return self.close(CloseReason::BufferOverflow);
        }
        self.rx.extend_from_slice(data);
        self.last_activity = now;

        match self.state {
            ConnState::Handshaking => self.process_handshake(),
            ConnState::Connected => self.process_frames(Vec::new()),
            _ => Vec::new(),
        }
    }

    fn on_poll(&mut self, now: Instant) -> Vec<ConnAction> {
        if now.duration_since(self.last_activity) > self.idle_timeout {
            return self.close(CloseReason::IdleTimeout);
        }
        Vec::new()
    }

    fn process_handshake(&mut self) -> Vec<ConnAction> {
        let Some(header_len) = find_header_end(&self.rx) else {
            // Still waiting for the blank line.
            return Vec::new();
        };

        let key = match extract_websocket_key(&self.rx[..header_len]) {
            Ok(key) => key,
            Err(err) => {
                tracing::debug!("websocket handshake rejected: {err}");
                return self.close(CloseReason::HandshakeFailed);
            }
        };

        let token = handshake::accept_token(&key);
        let response = handshake::upgrade_response(&token);

        // The handshake consumes exactly the header block; any frame
        // bytes that followed it stay buffered.
        self.rx.drain(..header_len);
        self.state = ConnState::Connected;
        tracing::debug!("websocket handshake completed");

        // The response goes out through the pending-bytes path like
        // any frame, so a slow reader never blocks the driver.
        self.pending = response.into_bytes();
        self.pending_offset = 0;

        self.process_frames(Vec::new())
    }

    fn process_frames(&mut self, mut actions: Vec<ConnAction>) -> Vec<ConnAction> {
        let mut offset = 0;

        loop {
            match decode_frame(&self.rx[offset..]) {
                Ok(Some(frame)) => {
                    let consumed = frame.consumed;
                    match frame.opcode {
                        Opcode::Text => actions.push(ConnAction::DeliverInput(frame.payload)),
                        Opcode::Close => {
                            actions.extend(self.close(CloseReason::PeerClose));
                            return actions;
                        }
                        // Binary accepted but ignored; ping gets no
                        // pong; everything else is tolerated.
                        _ => {}
                    }
                    offset += consumed;
                }
                Ok(None) => break,
                Err(err) => {
                    tracing::debug!("websocket protocol violation: {err}");
                    actions.extend(self.close(CloseReason::ProtocolViolation));
                    return actions;
                }
            }
        }

        if offset > 0 {
            self.rx.drain(..offset);
        }
        actions
    }

    fn close(&mut self, reason: CloseReason) -> Vec<ConnAction> {
        self.state = ConnState::Closed;
        self.rx.clear();
        self.pending.clear();
        self.pending_offset = 0;
        vec![ConnAction::Close(reason)]
    }
}
