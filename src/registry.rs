//! Registry of live connections
//!
//! The registry is the single process-wide owner of the set of open
//! connections. Entries are added and removed only through
//! [`ConnectionRegistry::register`] and [`ConnectionRegistry::unregister`].
//!
//! Each entry is a [`Peer`]: a handle holding the sending half of the
//! connection's bounded outbound channel. The task that owns the connection's
//! byte stream drains the receiving half, so `send` and `broadcast` never
//! touch connection state directly and never block. A peer whose queue is
//! full is flagged as overflowed and stops accepting frames; its task then
//! closes it.
//!
//! Broadcast encodes the frame once and shares the resulting `Bytes` with
//! every recipient.
//!
//! # Example
//!
//! ```
//! use wsgate::registry::{ConnectionRegistry, Outbound};
//! use wsgate::Message;
//!
//! let registry = ConnectionRegistry::new();
//! let (a, _rx_a) = registry.register_new();
//! let (_b, mut rx_b) = registry.register_new();
//!
//! // Send to everyone except `a`
//! let sent = registry
//!     .broadcast(|peer| peer.id() != a.id(), &Message::text("hi"))
//!     .unwrap();
//! assert_eq!(sent, 1);
//! assert!(matches!(rx_b.try_recv(), Ok(Outbound::Frame(_))));
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use bytes::Bytes;
use parking_lot::RwLock;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::{Receiver, Sender, channel};
use tracing::{debug, trace};

use crate::connection::ConnectionId;
use crate::error::{Error, Result};
use crate::frame::{FrameEncoder, Message, OpCode};

/// Default number of frames queued per connection
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Instruction for the task that owns a connection's stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// An encoded frame to write as-is
    Frame(Bytes),
    /// Start the closing handshake
    Close {
        /// Close status code
        code: u16,
        /// Reason text
        reason: String,
    },
}

/// Registry entry for one connection
#[derive(Debug)]
pub struct Peer {
    id: ConnectionId,
    sender: Sender<Outbound>,
    open: AtomicBool,
    overflowed: AtomicBool,
}

impl Peer {
    /// Create a peer handle around an outbound channel
    pub fn new(id: ConnectionId, sender: Sender<Outbound>) -> Self {
        Self {
            id,
            sender,
            open: AtomicBool::new(true),
            overflowed: AtomicBool::new(false),
        }
    }

    /// Connection identity
    #[inline]
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Whether the connection still accepts application messages
    #[inline]
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire) && !self.sender.is_closed()
    }

    /// Mark the connection as no longer accepting application messages
    pub fn mark_closing(&self) {
        self.open.store(false, Ordering::Release);
    }

    /// Whether a send ever found the outbound queue full
    #[inline]
    pub fn is_overflowed(&self) -> bool {
        self.overflowed.load(Ordering::Acquire)
    }

    /// Hand an instruction to the connection's task without waiting
    fn deliver(&self, outbound: Outbound) -> Result<()> {
        if !self.is_open() {
            return Err(Error::ConnectionClosed);
        }
        match self.sender.try_send(outbound) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.overflowed.store(true, Ordering::Release);
                self.mark_closing();
                debug!(conn = %self.id, "outbound queue full");
                Err(Error::QueueFull(self.id))
            }
            Err(TrySendError::Closed(_)) => {
                self.mark_closing();
                Err(Error::ConnectionClosed)
            }
        }
    }
}

/// Process-wide set of live connections
pub struct ConnectionRegistry {
    /// All peers indexed by connection id
    peers: RwLock<HashMap<ConnectionId, Arc<Peer>>>,
    /// Next connection id (atomic counter)
    next_id: AtomicU64,
    /// Total frames handed to peers (for stats)
    frames_sent: AtomicU64,
    /// Capacity of channels created by `register_new`
    queue_capacity: usize,
    encoder: FrameEncoder,
}

impl ConnectionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::with_queue_capacity(DEFAULT_QUEUE_CAPACITY)
    }

    /// Create an empty registry whose peers queue at most `capacity` frames
    pub fn with_queue_capacity(capacity: usize) -> Self {
        Self {
            peers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            frames_sent: AtomicU64::new(0),
            queue_capacity: capacity.max(1),
            encoder: FrameEncoder::new(),
        }
    }

    /// Per-peer outbound queue capacity
    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    /// Allocate a fresh connection id
    pub fn next_id(&self) -> ConnectionId {
        ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Add a peer
    ///
    /// Fails with [`Error::InvalidState`] if the id is already registered.
    pub fn register(&self, peer: Peer) -> Result<Arc<Peer>> {
        let id = peer.id();
        let peer = Arc::new(peer);
        {
            let mut peers = self.peers.write();
            if peers.contains_key(&id) {
                return Err(Error::InvalidState("connection id already registered"));
            }
            peers.insert(id, Arc::clone(&peer));
        }
        debug!(conn = %id, "registered");
        Ok(peer)
    }

    /// Allocate an id, create its outbound channel and register it
    pub fn register_new(&self) -> (Arc<Peer>, Receiver<Outbound>) {
        let (tx, rx) = channel(self.queue_capacity);
        let peer = Arc::new(Peer::new(self.next_id(), tx));
        self.peers.write().insert(peer.id(), Arc::clone(&peer));
        debug!(conn = %peer.id(), "registered");
        (peer, rx)
    }

    /// Remove a peer, returning it if it was registered
    pub fn unregister(&self, id: ConnectionId) -> Option<Arc<Peer>> {
        let peer = self.peers.write().remove(&id);
        if let Some(ref peer) = peer {
            peer.mark_closing();
            debug!(conn = %id, "unregistered");
        }
        peer
    }

    /// Look up a peer
    pub fn get(&self, id: ConnectionId) -> Option<Arc<Peer>> {
        self.peers.read().get(&id).cloned()
    }

    /// Check if a connection is registered
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.peers.read().contains_key(&id)
    }

    /// Number of registered connections
    pub fn len(&self) -> usize {
        self.peers.read().len()
    }

    /// Check if no connection is registered
    pub fn is_empty(&self) -> bool {
        self.peers.read().is_empty()
    }

    /// Ids of all registered connections
    pub fn ids(&self) -> Vec<ConnectionId> {
        self.peers.read().keys().copied().collect()
    }

    /// Total frames handed to peers since creation
    pub fn frames_sent(&self) -> u64 {
        self.frames_sent.load(Ordering::Relaxed)
    }

    /// Send a message to one connection
    pub fn send(&self, id: ConnectionId, msg: &Message) -> Result<()> {
        let frame = self.encoder.encode_message(msg)?;
        self.send_frame(id, frame)
    }

    /// Send a text message to one connection
    pub fn send_text(&self, id: ConnectionId, text: &str) -> Result<()> {
        self.send(id, &Message::text(text))
    }

    /// Send an already encoded frame to one connection
    pub fn send_frame(&self, id: ConnectionId, frame: Bytes) -> Result<()> {
        let peer = self.get(id).ok_or(Error::UnknownConnection(id))?;
        peer.deliver(Outbound::Frame(frame))?;
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Send a ping carrying `payload` (at most 125 bytes) to one connection
    pub fn ping(&self, id: ConnectionId, payload: &[u8]) -> Result<()> {
        let frame = self.encoder.encode(OpCode::Ping, payload)?;
        self.send_frame(id, frame)
    }

    /// Ask a connection to start the closing handshake
    pub fn close(&self, id: ConnectionId, code: u16, reason: &str) -> Result<()> {
        let peer = self.get(id).ok_or(Error::UnknownConnection(id))?;
        peer.deliver(Outbound::Close {
            code,
            reason: reason.to_string(),
        })
    }

    /// Send a message to every open connection for which `predicate` holds
    ///
    /// Returns the number of connections the frame was handed to.
    pub fn broadcast<F>(&self, predicate: F, msg: &Message) -> Result<usize>
    where
        F: Fn(&Peer) -> bool,
    {
        let frame = self.encoder.encode_message(msg)?;
        let peers = self.peers.read();

        let mut delivered = 0;
        for peer in peers.values() {
            if !peer.is_open() || !predicate(peer) {
                continue;
            }
            match peer.deliver(Outbound::Frame(frame.clone())) {
                Ok(()) => delivered += 1,
                Err(_) => trace!(conn = %peer.id(), "broadcast skipped closed peer"),
            }
        }

        self.frames_sent.fetch_add(delivered as u64, Ordering::Relaxed);
        Ok(delivered)
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("connections", &self.len())
            .field("frames_sent", &self.frames_sent())
            .field("queue_capacity", &self.queue_capacity)
            .finish()
    }
}
