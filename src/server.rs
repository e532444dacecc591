//! Tokio adapter driving connections over async byte streams
//!
//! [`WebSocketServer::accept`] owns one stream for its whole life: it
//! answers the upgrade request, registers the connection, feeds every read
//! into the decoder, writes whatever the core queued, and unregisters the
//! connection when the stream ends. Other tasks reach the connection only
//! through the registry's outbound channel.
//!
//! # Example
//!
//! ```ignore
//! use wsgate::prelude::*;
//! use tokio::net::TcpListener;
//!
//! let server = WebSocketServer::new(Config::default());
//! let echo = server.clone();
//! server.on(EventKind::Message, move |event: &Event<'_>| {
//!     if let Event::Message(id, msg) = event {
//!         echo.send(*id, msg)?;
//!     }
//!     Ok(())
//! });
//!
//! let listener = TcpListener::bind("0.0.0.0:8080").await?;
//! server.serve(listener).await?;
//! ```

use std::io;
use std::sync::Arc;
use std::time::Duration;

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc::{Receiver, channel};
use tokio::time::{self, Instant};
use tracing::{debug, info, trace, warn};

use crate::Config;
use crate::connection::{Connection, ConnectionId};
use crate::decoder::{FrameDecoder, FrameEvent};
use crate::error::{CloseReason, Error, Result};
use crate::events::{Event, EventDispatcher, EventKind, HandlerError};
use crate::frame::{Message, OpCode};
use crate::handshake;
use crate::registry::{ConnectionRegistry, Outbound, Peer};

struct ServerInner {
    config: Config,
    decoder: FrameDecoder,
    registry: Arc<ConnectionRegistry>,
    events: Arc<EventDispatcher>,
}

/// WebSocket endpoint shared by all connection tasks
///
/// Cloning is cheap; clones share the registry and the event handlers.
#[derive(Clone)]
pub struct WebSocketServer {
    inner: Arc<ServerInner>,
}

impl WebSocketServer {
    /// Create a server with its own registry and dispatcher
    pub fn new(config: Config) -> Self {
        let queue_capacity = config.outbound_queue_capacity;
        Self::with_parts(
            config,
            Arc::new(ConnectionRegistry::with_queue_capacity(queue_capacity)),
            Arc::new(EventDispatcher::new()),
        )
    }

    /// Create a server around an existing registry and dispatcher
    pub fn with_parts(
        config: Config,
        registry: Arc<ConnectionRegistry>,
        events: Arc<EventDispatcher>,
    ) -> Self {
        Self {
            inner: Arc::new(ServerInner {
                decoder: FrameDecoder::new(&config),
                config,
                registry,
                events,
            }),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Registry of live connections
    pub fn registry(&self) -> Arc<ConnectionRegistry> {
        Arc::clone(&self.inner.registry)
    }

    /// Event dispatcher
    pub fn events(&self) -> Arc<EventDispatcher> {
        Arc::clone(&self.inner.events)
    }

    /// Register an event handler
    pub fn on<F>(&self, kind: EventKind, handler: F)
    where
        F: Fn(&Event<'_>) -> std::result::Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.inner.events.on(kind, handler);
    }

    /// Number of live connections
    pub fn connection_count(&self) -> usize {
        self.inner.registry.len()
    }

    /// Send a message to one connection
    pub fn send(&self, id: ConnectionId, msg: &Message) -> Result<()> {
        self.inner.registry.send(id, msg)
    }

    /// Send a text message to one connection
    pub fn send_text(&self, id: ConnectionId, text: &str) -> Result<()> {
        self.inner.registry.send_text(id, text)
    }

    /// Send a ping to one connection
    pub fn ping(&self, id: ConnectionId, payload: &[u8]) -> Result<()> {
        self.inner.registry.ping(id, payload)
    }

    /// Send a message to every open connection for which `predicate` holds
    pub fn broadcast<F>(&self, predicate: F, msg: &Message) -> Result<usize>
    where
        F: Fn(&Peer) -> bool,
    {
        self.inner.registry.broadcast(predicate, msg)
    }

    /// Start the closing handshake on one connection
    pub fn close(&self, id: ConnectionId, code: u16, reason: &str) -> Result<()> {
        self.inner.registry.close(id, code, reason)
    }

    /// Serve one stream until it closes
    ///
    /// Answers the upgrade request (`400` and shutdown on a bad one), then
    /// emits `Connect`, one `Message` per complete message and exactly one
    /// `Disconnect`. Returns the first protocol error the peer committed, or
    /// the I/O error that ended the stream.
    pub async fn accept<S>(&self, mut stream: S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let config = &self.inner.config;
        let mut buf = BytesMut::with_capacity(config.read_buffer_size);

        let (response, consumed) = loop {
            if stream.read_buf(&mut buf).await? == 0 {
                return Err(Error::ConnectionClosed);
            }
            match handshake::parse_request_with_limit(&buf, config.max_handshake_size) {
                Ok(Some((req, len))) => match handshake::negotiate(&req) {
                    Ok(resp) => {
                        debug!(path = req.path, "upgrade accepted");
                        break (resp.response, len);
                    }
                    Err(err) => return reject(&mut stream, err, config.close_timeout).await,
                },
                Ok(None) => continue,
                Err(err) => return reject(&mut stream, err, config.close_timeout).await,
            }
        };
        write_within(&mut stream, &response, config.close_timeout).await?;
        buf.advance(consumed);

        let registry = &self.inner.registry;
        let id = registry.next_id();
        let mut conn = Connection::with_capacity(id, config.read_buffer_size);
        conn.complete_handshake()?;

        let (tx, mut rx) = channel(registry.queue_capacity());
        let peer = registry.register(Peer::new(id, tx))?;
        self.inner.events.emit(&Event::Connect(id));

        let result = self.run(&mut stream, &mut conn, &peer, &mut rx, buf).await;

        registry.unregister(id);
        conn.release();
        self.inner.events.emit(&Event::Disconnect(id));

        match time::timeout(config.close_timeout, stream.shutdown()).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => trace!(conn = %id, error = %err, "shutdown failed"),
            Err(_) => trace!(conn = %id, "shutdown timed out"),
        }
        match &result {
            Ok(()) => debug!(conn = %id, code = ?conn.close_code(), "connection finished"),
            Err(err) => debug!(conn = %id, error = %err, "connection ended with error"),
        }
        result
    }

    /// Accept TCP connections forever, one task per connection
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        if let Ok(addr) = listener.local_addr() {
            info!(%addr, "listening");
        }
        loop {
            let (stream, addr) = listener.accept().await?;
            if let Err(err) = stream.set_nodelay(true) {
                trace!(%addr, error = %err, "set_nodelay failed");
            }

            let server = self.clone();
            tokio::spawn(async move {
                match server.accept(stream).await {
                    Ok(()) => {}
                    Err(err) if err.is_handshake() => {
                        debug!(%addr, error = %err, "upgrade rejected")
                    }
                    Err(err) => warn!(%addr, error = %err, "connection error"),
                }
            });
        }
    }

    async fn run<S>(
        &self,
        stream: &mut S,
        conn: &mut Connection,
        peer: &Peer,
        rx: &mut Receiver<Outbound>,
        mut buf: BytesMut,
    ) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let config = &self.inner.config;
        let close_timeout = config.close_timeout;
        let mut first_error = None;
        let mut pending = BytesMut::new();
        let mut drain_deadline = None;

        // Frames pipelined behind the upgrade request
        if !buf.is_empty() {
            self.process(conn, &buf, &mut first_error);
            buf.clear();
        }

        let (mut reader, mut writer) = tokio::io::split(stream);

        loop {
            if peer.is_overflowed() && conn.is_open() {
                debug!(conn = %conn.id(), "closing connection with a full outbound queue");
                // Frames accepted before the overflow still go out ahead of the close
                pending.extend_from_slice(&conn.take_outbound());
                while let Ok(Outbound::Frame(frame)) = rx.try_recv() {
                    pending.extend_from_slice(&frame);
                }
                conn.close(CloseReason::POLICY, "outbound queue full")?;
            }
            if !conn.is_open() {
                peer.mark_closing();
            }
            if conn.has_outbound() {
                pending.extend_from_slice(&conn.take_outbound());
            }
            if conn.is_closed() {
                if pending.is_empty() {
                    break;
                }
                drain_deadline.get_or_insert_with(|| Instant::now() + close_timeout);
            }

            // Writes race the deadline so a peer that stops reading cannot pin the task
            let deadline = conn
                .close_deadline(close_timeout)
                .map(Instant::from_std)
                .or(drain_deadline);

            tokio::select! {
                read = reader.read_buf(&mut buf), if !conn.is_closed() => {
                    if read? == 0 {
                        debug!(conn = %conn.id(), "peer closed the stream");
                        break;
                    }
                    self.process(conn, &buf, &mut first_error);
                    buf.clear();
                }
                written = writer.write(&pending), if !pending.is_empty() => {
                    let n = written?;
                    if n == 0 {
                        return Err(Error::ConnectionReset);
                    }
                    pending.advance(n);
                }
                Some(outbound) = rx.recv(), if !conn.is_closed() => match outbound {
                    Outbound::Frame(frame) if conn.is_open() => {
                        if pending.len() >= config.max_outbound_buffer {
                            debug!(conn = %conn.id(), buffered = pending.len(), "peer is not reading");
                            conn.close(CloseReason::POLICY, "slow consumer")?;
                        } else {
                            pending.extend_from_slice(&frame);
                        }
                    }
                    Outbound::Frame(_) => trace!(conn = %conn.id(), "dropping frame after close"),
                    Outbound::Close { code, reason } => {
                        if let Err(err) = conn.close(code, &reason) {
                            debug!(conn = %conn.id(), error = %err, "close request ignored");
                        }
                    }
                },
                _ = time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    debug!(conn = %conn.id(), unsent = pending.len(), "close handshake timed out");
                    conn.release();
                    break;
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn process(&self, conn: &mut Connection, data: &[u8], first_error: &mut Option<Error>) {
        for event in self.inner.decoder.feed(conn, data) {
            match event {
                FrameEvent::Message(msg) => {
                    self.inner.events.emit(&Event::Message(conn.id(), &msg));
                }
                FrameEvent::ControlReceived(OpCode::Ping, payload) => {
                    if self.inner.config.auto_pong {
                        if let Err(err) = conn.pong(&payload) {
                            trace!(conn = %conn.id(), error = %err, "pong skipped");
                        }
                    }
                }
                FrameEvent::ControlReceived(opcode, _) => {
                    trace!(conn = %conn.id(), ?opcode, "control frame");
                }
                FrameEvent::ProtocolError(err) => {
                    first_error.get_or_insert(err);
                }
            }
        }
    }
}

impl Default for WebSocketServer {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl std::fmt::Debug for WebSocketServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketServer")
            .field("config", &self.inner.config)
            .field("registry", &self.inner.registry)
            .field("events", &self.inner.events)
            .finish()
    }
}

/// Answer a bad upgrade request with `400` and hang up
async fn reject<S>(stream: &mut S, err: Error, timeout: Duration) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    debug!(error = %err, "rejecting upgrade");
    write_within(stream, &handshake::build_rejection(), timeout).await?;
    if let Ok(Err(shutdown)) = time::timeout(timeout, stream.shutdown()).await {
        trace!(error = %shutdown, "shutdown failed");
    }
    Err(err)
}

/// Write all of `data`, giving up once `timeout` passes
async fn write_within<S>(stream: &mut S, data: &[u8], timeout: Duration) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    match time::timeout(timeout, stream.write_all(data)).await {
        Ok(written) => Ok(written?),
        Err(_) => Err(io::Error::from(io::ErrorKind::TimedOut).into()),
    }
}
