//! Connection lifecycle events for application code
//!
//! Handlers are registered per [`EventKind`] and run synchronously, in
//! registration order, every time an event of that kind is emitted. A
//! handler returning an error is logged and counted; the remaining handlers
//! still run and the connection stays up.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::warn;

use crate::connection::ConnectionId;
use crate::frame::Message;

/// Kind of lifecycle event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Upgrade completed
    Connect,
    /// Data message received
    Message,
    /// Connection released
    Disconnect,
}

impl EventKind {
    const COUNT: usize = 3;

    #[inline]
    fn index(self) -> usize {
        match self {
            EventKind::Connect => 0,
            EventKind::Message => 1,
            EventKind::Disconnect => 2,
        }
    }
}

/// A lifecycle event
#[derive(Debug, Clone, Copy)]
pub enum Event<'a> {
    /// Connection finished the upgrade and is open
    Connect(ConnectionId),
    /// Connection delivered a complete message
    Message(ConnectionId, &'a Message),
    /// Connection was released
    Disconnect(ConnectionId),
}

impl Event<'_> {
    /// Kind of this event
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Connect(_) => EventKind::Connect,
            Event::Message(..) => EventKind::Message,
            Event::Disconnect(_) => EventKind::Disconnect,
        }
    }

    /// Connection the event concerns
    pub fn connection(&self) -> ConnectionId {
        match self {
            Event::Connect(id) | Event::Message(id, _) | Event::Disconnect(id) => *id,
        }
    }
}

/// Error returned by an event handler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerError {
    message: String,
}

impl HandlerError {
    /// Create a handler error
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Error description
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handler failed: {}", self.message)
    }
}

impl std::error::Error for HandlerError {}

impl From<crate::error::Error> for HandlerError {
    fn from(e: crate::error::Error) -> Self {
        HandlerError::new(e.to_string())
    }
}

/// Application callback for lifecycle events
pub trait EventHandler: Send + Sync {
    /// Handle one event
    fn handle(&self, event: &Event<'_>) -> Result<(), HandlerError>;
}

impl<F> EventHandler for F
where
    F: Fn(&Event<'_>) -> Result<(), HandlerError> + Send + Sync,
{
    fn handle(&self, event: &Event<'_>) -> Result<(), HandlerError> {
        self(event)
    }
}

/// Outcome of one [`EventDispatcher::emit`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Handlers invoked
    pub invoked: usize,
    /// Handlers that returned an error
    pub failed: usize,
}

type HandlerList = Vec<Arc<dyn EventHandler>>;

/// Ordered handler lists, one per event kind
pub struct EventDispatcher {
    handlers: RwLock<[HandlerList; EventKind::COUNT]>,
}

impl EventDispatcher {
    /// Create a dispatcher with no handlers
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new([Vec::new(), Vec::new(), Vec::new()]),
        }
    }

    /// Append a closure handler for `kind`
    pub fn on<F>(&self, kind: EventKind, handler: F)
    where
        F: Fn(&Event<'_>) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.on_handler(kind, Arc::new(handler));
    }

    /// Append a handler object for `kind`
    pub fn on_handler(&self, kind: EventKind, handler: Arc<dyn EventHandler>) {
        self.handlers.write()[kind.index()].push(handler);
    }

    /// Number of handlers registered for `kind`
    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.handlers.read()[kind.index()].len()
    }

    /// Invoke every handler registered for the event's kind, in order
    ///
    /// The handler list is snapshotted first, so handlers may register more
    /// handlers or emit events themselves.
    pub fn emit(&self, event: &Event<'_>) -> DispatchReport {
        let handlers: HandlerList = self.handlers.read()[event.kind().index()].clone();

        let mut report = DispatchReport::default();
        for handler in &handlers {
            report.invoked += 1;
            if let Err(err) = handler.handle(event) {
                report.failed += 1;
                warn!(
                    conn = %event.connection(),
                    kind = ?event.kind(),
                    error = %err,
                    "event handler failed"
                );
            }
        }
        report
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let handlers = self.handlers.read();
        f.debug_struct("EventDispatcher")
            .field("connect", &handlers[0].len())
            .field("message", &handlers[1].len())
            .field("disconnect", &handlers[2].len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use super::*;

    #[test]
    fn test_emit_in_registration_order() {
        let dispatcher = EventDispatcher::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let log = Arc::clone(&log);
            dispatcher.on(EventKind::Connect, move |event| {
                log.lock().push((tag, event.connection()));
                Ok(())
            });
        }

        let report = dispatcher.emit(&Event::Connect(ConnectionId(4)));
        assert_eq!(report, DispatchReport { invoked: 3, failed: 0 });
        assert_eq!(
            *log.lock(),
            vec![
                ("first", ConnectionId(4)),
                ("second", ConnectionId(4)),
                ("third", ConnectionId(4)),
            ]
        );
    }

    #[test]
    fn test_kinds_are_separate() {
        let dispatcher = EventDispatcher::new();
        let hits = Arc::new(Mutex::new(Vec::new()));

        let h = Arc::clone(&hits);
        dispatcher.on(EventKind::Message, move |event| {
            if let Event::Message(_, msg) = event {
                h.lock().push(msg.as_text().unwrap_or_default().to_string());
            }
            Ok(())
        });

        assert_eq!(dispatcher.emit(&Event::Disconnect(ConnectionId(1))).invoked, 0);
        let msg = Message::text("ping");
        assert_eq!(dispatcher.emit(&Event::Message(ConnectionId(1), &msg)).invoked, 1);
        assert_eq!(*hits.lock(), vec!["ping".to_string()]);
        assert_eq!(dispatcher.handler_count(EventKind::Message), 1);
        assert_eq!(dispatcher.handler_count(EventKind::Connect), 0);
    }

    #[test]
    fn test_failing_handler_does_not_stop_dispatch() {
        let dispatcher = EventDispatcher::new();
        let reached = Arc::new(Mutex::new(false));

        dispatcher.on(EventKind::Disconnect, |_| Err(HandlerError::new("boom")));
        let r = Arc::clone(&reached);
        dispatcher.on(EventKind::Disconnect, move |_| {
            *r.lock() = true;
            Ok(())
        });

        let report = dispatcher.emit(&Event::Disconnect(ConnectionId(9)));
        assert_eq!(report, DispatchReport { invoked: 2, failed: 1 });
        assert!(*reached.lock());
    }

    #[test]
    fn test_handler_may_register_handlers() {
        let dispatcher = Arc::new(EventDispatcher::new());
        let d = Arc::clone(&dispatcher);
        dispatcher.on(EventKind::Connect, move |_| {
            d.on(EventKind::Disconnect, |_| Ok(()));
            Ok(())
        });

        dispatcher.emit(&Event::Connect(ConnectionId(1)));
        assert_eq!(dispatcher.handler_count(EventKind::Disconnect), 1);
    }

    struct Counter(Mutex<usize>);

    impl EventHandler for Counter {
        fn handle(&self, _event: &Event<'_>) -> Result<(), HandlerError> {
            *self.0.lock() += 1;
            Ok(())
        }
    }

    #[test]
    fn test_handler_object() {
        let dispatcher = EventDispatcher::new();
        let counter = Arc::new(Counter(Mutex::new(0)));
        dispatcher.on_handler(EventKind::Connect, counter.clone());
        dispatcher.emit(&Event::Connect(ConnectionId(1)));
        dispatcher.emit(&Event::Connect(ConnectionId(2)));
        assert_eq!(*counter.0.lock(), 2);
    }
}
