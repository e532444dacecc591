//! Per-connection protocol state
//!
//! A [`Connection`] holds everything that must survive between reads of one
//! byte stream: the lifecycle state, bytes that do not yet form a complete
//! frame, the partially reassembled message, and frames the core itself
//! produced (close echoes, error closes) that the transport still has to
//! write.
//!
//! A connection is mutated by exactly one owner at a time. The tokio adapter
//! keeps each connection inside its own task.

use std::fmt;
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use tracing::debug;

use crate::error::{Error, Result};
use crate::frame::{FrameEncoder, Message, OpCode};

/// Opaque identity of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl ConnectionId {
    /// Get the raw ID value
    #[inline]
    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// Create a ConnectionId from a raw u64 value
    #[inline]
    pub fn from_u64(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Waiting for a valid upgrade request
    Handshaking,
    /// Normal operation
    Open,
    /// We sent a close frame and wait for the peer's
    ClosingLocal,
    /// Peer sent a close frame, our reply is pending
    ClosingRemote,
    /// Closing handshake finished or the stream failed
    Closed,
}

impl ConnectionState {
    /// Whether incoming frames are still processed in this state
    #[inline]
    pub fn accepts_frames(&self) -> bool {
        matches!(self, ConnectionState::Open | ConnectionState::ClosingLocal)
    }
}

/// Protocol state of one WebSocket connection
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    pub(crate) state: ConnectionState,
    /// Bytes received but not yet forming a complete frame
    pub(crate) recv_buf: BytesMut,
    /// Payload of the message being reassembled
    pub(crate) fragment_buf: BytesMut,
    /// Opcode of the message being reassembled
    pub(crate) fragment_opcode: Option<OpCode>,
    /// Code of the first close frame sent or received
    pub(crate) close_code: Option<u16>,
    /// Frames waiting to be written to the stream
    pub(crate) outbound: BytesMut,
    close_sent_at: Option<Instant>,
    encoder: FrameEncoder,
}

impl Connection {
    /// Create a connection for a freshly accepted stream
    pub fn new(id: ConnectionId) -> Self {
        Self {
            id,
            state: ConnectionState::Handshaking,
            recv_buf: BytesMut::new(),
            fragment_buf: BytesMut::new(),
            fragment_opcode: None,
            close_code: None,
            outbound: BytesMut::new(),
            close_sent_at: None,
            encoder: FrameEncoder::new(),
        }
    }

    /// Create a connection with a preallocated receive buffer
    pub fn with_capacity(id: ConnectionId, capacity: usize) -> Self {
        let mut conn = Self::new(id);
        conn.recv_buf.reserve(capacity);
        conn
    }

    /// Connection identity
    #[inline]
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Current lifecycle state
    #[inline]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Check if the connection is open for application traffic
    #[inline]
    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Open
    }

    /// Check if the connection is closed
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.state == ConnectionState::Closed
    }

    /// Code of the first close frame sent or received
    #[inline]
    pub fn close_code(&self) -> Option<u16> {
        self.close_code
    }

    /// Number of buffered bytes not yet forming a complete frame
    #[inline]
    pub fn recv_buffer_len(&self) -> usize {
        self.recv_buf.len()
    }

    /// Whether a fragmented message is being reassembled
    #[inline]
    pub fn has_pending_fragment(&self) -> bool {
        self.fragment_opcode.is_some()
    }

    /// Record a successful upgrade: Handshaking → Open
    pub fn complete_handshake(&mut self) -> Result<()> {
        if self.state != ConnectionState::Handshaking {
            return Err(Error::InvalidState("handshake already completed"));
        }
        self.state = ConnectionState::Open;
        debug!(conn = %self.id, "connection open");
        Ok(())
    }

    /// Queue a data message for the peer
    pub fn send(&mut self, msg: &Message) -> Result<()> {
        if !self.is_open() {
            return Err(Error::InvalidState("connection is not open"));
        }
        self.encoder
            .encode_into(&mut self.outbound, msg.opcode(), msg.as_bytes())
    }

    /// Queue a ping carrying `payload`
    pub fn ping(&mut self, payload: &[u8]) -> Result<()> {
        if !self.is_open() {
            return Err(Error::InvalidState("connection is not open"));
        }
        self.encoder.encode_into(&mut self.outbound, OpCode::Ping, payload)
    }

    /// Queue a pong echoing `payload`
    ///
    /// Pongs are allowed while our own close is pending.
    pub fn pong(&mut self, payload: &[u8]) -> Result<()> {
        if !self.state.accepts_frames() {
            return Err(Error::InvalidState("connection is not open"));
        }
        self.encoder.encode_into(&mut self.outbound, OpCode::Pong, payload)
    }

    /// Start a locally initiated close: send a close frame, Open → ClosingLocal
    pub fn close(&mut self, code: u16, reason: &str) -> Result<()> {
        if !self.is_open() {
            return Err(Error::InvalidState("connection is not open"));
        }
        self.encoder.encode_close(&mut self.outbound, code, reason)?;
        self.close_code = Some(code);
        self.close_sent_at = Some(Instant::now());
        self.state = ConnectionState::ClosingLocal;
        debug!(conn = %self.id, code, "close sent");
        Ok(())
    }

    /// Whether our close has waited longer than `timeout` for the peer's reply
    pub fn close_deadline_elapsed(&self, now: Instant, timeout: Duration) -> bool {
        match (self.state, self.close_sent_at) {
            (ConnectionState::ClosingLocal, Some(sent)) => {
                now.saturating_duration_since(sent) >= timeout
            }
            _ => false,
        }
    }

    /// Instant after which an unanswered close is given up on
    pub fn close_deadline(&self, timeout: Duration) -> Option<Instant> {
        match (self.state, self.close_sent_at) {
            (ConnectionState::ClosingLocal, Some(sent)) => Some(sent + timeout),
            _ => None,
        }
    }

    /// Check if frames are waiting to be written
    #[inline]
    pub fn has_outbound(&self) -> bool {
        !self.outbound.is_empty()
    }

    /// Take all frames waiting to be written
    pub fn take_outbound(&mut self) -> Bytes {
        self.outbound.split().freeze()
    }

    /// Terminate the connection after `err`
    ///
    /// Queues a best-effort close frame when the error maps to a close code
    /// and the stream is still writable, then drops all partial input.
    pub(crate) fn fail(&mut self, err: &Error) {
        let writable = matches!(
            self.state,
            ConnectionState::Open | ConnectionState::ClosingRemote
        );
        if let (true, Some(code)) = (writable, err.close_code()) {
            // Reason text is informational; keep it within the control limit.
            if self.encoder.encode_close(&mut self.outbound, code, "").is_ok() {
                self.close_code.get_or_insert(code);
            }
        }
        self.discard_input();
        self.state = ConnectionState::Closed;
        debug!(conn = %self.id, error = %err, "connection failed");
    }

    /// Mark the underlying stream as released
    pub fn release(&mut self) {
        if self.state != ConnectionState::Closed {
            debug!(conn = %self.id, state = ?self.state, "connection released");
        }
        self.discard_input();
        self.state = ConnectionState::Closed;
    }

    pub(crate) fn encoder(&self) -> FrameEncoder {
        self.encoder
    }

    pub(crate) fn discard_input(&mut self) {
        self.recv_buf.clear();
        self.fragment_buf.clear();
        self.fragment_opcode = None;
    }
}
