//! # wsgate: server-side WebSocket over raw byte streams
//!
//! An RFC 6455 endpoint that needs nothing but a byte stream: it negotiates
//! the HTTP/1.1 upgrade itself and speaks the frame protocol directly.
//!
//! The core is I/O free:
//!
//! - [`handshake`]: validate the upgrade request, compute the accept key,
//!   build the `101` (or `400`) response
//! - [`decoder`]: turn arbitrarily chunked bytes into messages and control
//!   events, reassembling fragments
//! - [`frame`]: the frame model and the server-side encoder
//! - [`connection`]: per-connection lifecycle state
//! - [`registry`]: the set of live connections, `send` and `broadcast`
//! - [`events`]: connect / message / disconnect dispatch to application
//!   handlers
//!
//! With the `tokio-runtime` feature (on by default), [`server`] drives all of
//! the above over any tokio `AsyncRead + AsyncWrite` stream.
//!
//! ## Example
//!
//! ```ignore
//! use wsgate::prelude::*;
//! use tokio::net::TcpListener;
//!
//! let server = WebSocketServer::new(Config::default());
//! let registry = server.registry();
//!
//! server.on(EventKind::Message, move |event: &Event<'_>| {
//!     if let Event::Message(from, msg) = event {
//!         registry.broadcast(|peer| peer.id() != *from, msg);
//!     }
//!     Ok(())
//! });
//!
//! let listener = TcpListener::bind("127.0.0.1:8080").await?;
//! server.serve(listener).await?;
//! ```

use std::time::Duration;

pub mod connection;
pub mod decoder;
pub mod error;
pub mod events;
pub mod frame;
pub mod handshake;
pub mod mask;
pub mod registry;

#[cfg(feature = "tokio-runtime")]
pub mod server;

pub use connection::{Connection, ConnectionId, ConnectionState};
pub use decoder::{FrameDecoder, FrameEvent};
pub use error::{CloseReason, Error, Result};
pub use events::{DispatchReport, Event, EventDispatcher, EventHandler, EventKind, HandlerError};
pub use frame::{FrameEncoder, FrameHeader, Message, OpCode};
pub use registry::{ConnectionRegistry, Peer};

#[cfg(feature = "tokio-runtime")]
pub use server::WebSocketServer;

/// Default receive buffer size (64KB)
pub const RECV_BUFFER_SIZE: usize = 64 * 1024;

/// Maximum WebSocket frame header size (2 + 8 + 4 = 14 bytes)
pub const MAX_FRAME_HEADER_SIZE: usize = 14;

/// Largest payload encoded with the 7-bit length field
pub const SMALL_MESSAGE_THRESHOLD: usize = 125;

/// Largest payload encoded with the 16-bit extended length
pub const MEDIUM_MESSAGE_THRESHOLD: usize = 65535;

/// Maximum payload of a control frame
pub const MAX_CONTROL_PAYLOAD: usize = 125;

/// WebSocket GUID for handshake
pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Configuration for WebSocket connections
///
/// # Example
///
/// ```
/// use wsgate::Config;
/// use std::time::Duration;
///
/// let config = Config::builder()
///     .max_payload_length(16 * 1024)
///     .close_timeout(Duration::from_secs(2))
///     .build();
/// assert_eq!(config.max_message_size, 16 * 1024);
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum reassembled message size (default: 64MB)
    pub max_message_size: usize,
    /// Maximum single frame payload size (default: 16MB)
    pub max_frame_size: usize,
    /// Maximum size of the HTTP upgrade request head (default: 8KB)
    pub max_handshake_size: usize,
    /// Initial receive buffer capacity (default: 64KB)
    pub read_buffer_size: usize,
    /// How long to wait for the peer's close frame after sending ours
    /// (default: 5s)
    pub close_timeout: Duration,
    /// Answer pings with pongs automatically (default: true)
    pub auto_pong: bool,
    /// Frames a connection may have queued by other tasks (default: 1024)
    ///
    /// A full queue marks the peer as too slow; it is closed with 1008.
    pub outbound_queue_capacity: usize,
    /// Bytes of unwritten frames held per connection before the peer is
    /// closed with 1008 (default: 16MB)
    pub max_outbound_buffer: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_message_size: 64 * 1024 * 1024,
            max_frame_size: 16 * 1024 * 1024,
            max_handshake_size: handshake::MAX_HEADER_SIZE,
            read_buffer_size: RECV_BUFFER_SIZE,
            close_timeout: Duration::from_secs(5),
            auto_pong: true,
            outbound_queue_capacity: registry::DEFAULT_QUEUE_CAPACITY,
            max_outbound_buffer: 16 * 1024 * 1024,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }
}

/// Builder for WebSocket configuration
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder with default values
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    /// Set both the maximum message and frame size
    pub fn max_payload_length(mut self, size: usize) -> Self {
        self.config.max_message_size = size;
        self.config.max_frame_size = size;
        self
    }

    /// Set maximum message size
    pub fn max_message_size(mut self, size: usize) -> Self {
        self.config.max_message_size = size;
        self
    }

    /// Set maximum frame size
    pub fn max_frame_size(mut self, size: usize) -> Self {
        self.config.max_frame_size = size;
        self
    }

    /// Set maximum upgrade request size
    pub fn max_handshake_size(mut self, size: usize) -> Self {
        self.config.max_handshake_size = size;
        self
    }

    /// Set initial receive buffer capacity
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.config.read_buffer_size = size;
        self
    }

    /// Set the close handshake timeout
    pub fn close_timeout(mut self, timeout: Duration) -> Self {
        self.config.close_timeout = timeout;
        self
    }

    /// Enable or disable automatic pong replies
    pub fn auto_pong(mut self, enabled: bool) -> Self {
        self.config.auto_pong = enabled;
        self
    }

    /// Set the per-connection outbound queue capacity (at least 1)
    pub fn outbound_queue_capacity(mut self, frames: usize) -> Self {
        self.config.outbound_queue_capacity = frames.max(1);
        self
    }

    /// Set the per-connection limit on unwritten bytes
    pub fn max_outbound_buffer(mut self, size: usize) -> Self {
        self.config.max_outbound_buffer = size;
        self
    }

    /// Build the configuration
    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::Config;
    pub use crate::connection::{Connection, ConnectionId, ConnectionState};
    pub use crate::decoder::{FrameDecoder, FrameEvent};
    pub use crate::error::{CloseReason, Error, Result};
    pub use crate::events::{Event, EventDispatcher, EventKind, HandlerError};
    pub use crate::frame::{FrameEncoder, Message, OpCode};
    pub use crate::registry::{ConnectionRegistry, Peer};

    #[cfg(feature = "tokio-runtime")]
    pub use crate::server::WebSocketServer;
}
