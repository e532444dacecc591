//! Error types for the WebSocket endpoint

use std::fmt;
use std::io;

use crate::connection::ConnectionId;

/// Result type alias for WebSocket operations
pub type Result<T> = std::result::Result<T, Error>;

/// WebSocket error types
#[derive(Debug)]
pub enum Error {
    /// I/O error from the underlying stream
    Io(io::Error),
    /// Upgrade request was well-formed HTTP but not a valid WebSocket upgrade
    Handshake(&'static str),
    /// Upgrade request could not be parsed as HTTP
    InvalidHttp(&'static str),
    /// Frame-level protocol violation
    Protocol(&'static str),
    /// Invalid UTF-8 in a text message or close reason
    InvalidUtf8,
    /// Close frame carried a code that may not appear on the wire
    InvalidCloseCode(u16),
    /// Reassembled message exceeds the configured maximum
    MessageTooLarge,
    /// Single frame exceeds the configured maximum
    FrameTooLarge,
    /// Connection closed
    ConnectionClosed,
    /// Connection reset by peer
    ConnectionReset,
    /// Operation not allowed in the connection's current state
    InvalidState(&'static str),
    /// No live connection with this id
    UnknownConnection(ConnectionId),
    /// The connection's outbound queue is full; the peer is not keeping up
    QueueFull(ConnectionId),
}

/// Close frame reason
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReason {
    /// Close status code
    pub code: u16,
    /// Optional reason string
    pub reason: String,
}

impl CloseReason {
    /// Normal closure
    pub const NORMAL: u16 = 1000;
    /// Going away (e.g., server shutdown)
    pub const GOING_AWAY: u16 = 1001;
    /// Protocol error
    pub const PROTOCOL_ERROR: u16 = 1002;
    /// Unsupported data
    pub const UNSUPPORTED: u16 = 1003;
    /// No status received
    pub const NO_STATUS: u16 = 1005;
    /// Abnormal closure
    pub const ABNORMAL: u16 = 1006;
    /// Invalid frame payload
    pub const INVALID_PAYLOAD: u16 = 1007;
    /// Policy violation
    pub const POLICY: u16 = 1008;
    /// Message too big
    pub const TOO_BIG: u16 = 1009;
    /// Mandatory extension
    pub const EXTENSION: u16 = 1010;
    /// Internal server error
    pub const INTERNAL: u16 = 1011;

    /// Create a new close reason
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// Check if the close code may be sent in a close frame per RFC 6455
    pub fn is_valid_code(code: u16) -> bool {
        matches!(code, 1000..=1003 | 1007..=1011 | 3000..=4999)
    }
}

impl Error {
    /// Close code to send when this error terminates an open connection
    ///
    /// Returns `None` for errors that are not frame-level (I/O, handshake,
    /// registry lookups), where no close frame is owed to the peer.
    pub fn close_code(&self) -> Option<u16> {
        match self {
            Error::Protocol(_) | Error::InvalidCloseCode(_) => Some(CloseReason::PROTOCOL_ERROR),
            Error::InvalidUtf8 => Some(CloseReason::INVALID_PAYLOAD),
            Error::MessageTooLarge | Error::FrameTooLarge => Some(CloseReason::TOO_BIG),
            _ => None,
        }
    }

    /// Whether the error belongs to the upgrade request (answered with 400)
    pub fn is_handshake(&self) -> bool {
        matches!(self, Error::Handshake(_) | Error::InvalidHttp(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Handshake(msg) => write!(f, "Bad upgrade request: {}", msg),
            Error::InvalidHttp(msg) => write!(f, "Invalid HTTP: {}", msg),
            Error::Protocol(msg) => write!(f, "Protocol error: {}", msg),
            Error::InvalidUtf8 => write!(f, "Invalid UTF-8 in text payload"),
            Error::InvalidCloseCode(code) => write!(f, "Invalid close code: {}", code),
            Error::MessageTooLarge => write!(f, "Message too large"),
            Error::FrameTooLarge => write!(f, "Frame too large"),
            Error::ConnectionClosed => write!(f, "Connection closed"),
            Error::ConnectionReset => write!(f, "Connection reset by peer"),
            Error::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
            Error::UnknownConnection(id) => write!(f, "Unknown connection: {}", id),
            Error::QueueFull(id) => write!(f, "Outbound queue full for connection {}", id),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::ConnectionReset => Error::ConnectionReset,
            io::ErrorKind::BrokenPipe | io::ErrorKind::UnexpectedEof => Error::ConnectionClosed,
            _ => Error::Io(e),
        }
    }
}
