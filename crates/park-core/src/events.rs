//! Park event bus
//!
//! Lots publish [`ParkEvent`]s here. Delivery is synchronous to named handlers
//! (inside the operation that raised the event) and then fanned out on a
//! `tokio::sync::broadcast` channel for async consumers.
//!
//! The bus also carries the inbound direction: a [`ParkRequest`] pushed with
//! [`ParkEventBus::request_park`] is handed to the attached request sink,
//! normally a [`crate::ParkRegistry`].

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use tokio::sync::broadcast;

use crate::session::ParkableSession;
use crate::types::{ParkedCall, ReleaseReason};

/// Notifications raised by parking lots
#[derive(Debug, Clone)]
pub enum ParkEvent {
    /// A call took a slot
    Parked { call: ParkedCall },
    /// A call left its slot
    Unparked {
        call: ParkedCall,
        reason: ReleaseReason,
    },
}

/// Discriminant of [`ParkEvent`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParkEventKind {
    Parked,
    Unparked,
}

impl ParkEvent {
    pub fn kind(&self) -> ParkEventKind {
        match self {
            ParkEvent::Parked { .. } => ParkEventKind::Parked,
            ParkEvent::Unparked { .. } => ParkEventKind::Unparked,
        }
    }

    /// The call the event is about
    pub fn call(&self) -> &ParkedCall {
        match self {
            ParkEvent::Parked { call } | ParkEvent::Unparked { call, .. } => call,
        }
    }
}

/// Receives park events synchronously
pub trait ParkEventHandler: Send + Sync {
    fn handle_event(&self, event: &ParkEvent);
}

impl<F> ParkEventHandler for F
where
    F: Fn(&ParkEvent) + Send + Sync,
{
    fn handle_event(&self, event: &ParkEvent) {
        self(event)
    }
}

/// "Park this session into this lot", as delivered over the bus
#[derive(Clone)]
pub struct ParkRequest {
    pub lot: String,
    pub session: Arc<dyn ParkableSession>,
}

impl ParkRequest {
    pub fn new(lot: impl Into<String>, session: Arc<dyn ParkableSession>) -> Self {
        Self {
            lot: lot.into(),
            session,
        }
    }
}

impl fmt::Debug for ParkRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParkRequest")
            .field("lot", &self.lot)
            .field("session", &self.session.id())
            .finish()
    }
}

/// Consumer of inbound park requests
pub trait ParkRequestSink: Send + Sync {
    fn handle_park_request(&self, request: ParkRequest) -> Option<ParkedCall>;
}

struct BusInner {
    handlers: RwLock<Vec<(String, Arc<dyn ParkEventHandler>)>>,
    sender: broadcast::Sender<ParkEvent>,
    request_sink: RwLock<Option<Weak<dyn ParkRequestSink>>>,
}

/// Shared notification bus for parking. Cloning shares the same bus.
#[derive(Clone)]
pub struct ParkEventBus {
    inner: Arc<BusInner>,
}

impl ParkEventBus {
    /// Create a bus whose broadcast channel buffers `capacity` events
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            inner: Arc::new(BusInner {
                handlers: RwLock::new(Vec::new()),
                sender,
                request_sink: RwLock::new(None),
            }),
        }
    }

    /// Add an event handler with a unique name
    pub fn add_event_handler(&self, name: &str, handler: Arc<dyn ParkEventHandler>) {
        let mut handlers = self.inner.handlers.write();
        handlers.retain(|(n, _)| n != name);
        handlers.push((name.to_string(), handler));
    }

    /// Remove an event handler by name
    pub fn remove_event_handler(&self, name: &str) -> bool {
        let mut handlers = self.inner.handlers.write();
        if let Some(pos) = handlers.iter().position(|(n, _)| n == name) {
            handlers.remove(pos);
            true
        } else {
            false
        }
    }

    pub fn event_handler_count(&self) -> usize {
        self.inner.handlers.read().len()
    }

    /// Subscribe to events on the broadcast channel
    pub fn subscribe(&self) -> broadcast::Receiver<ParkEvent> {
        self.inner.sender.subscribe()
    }

    /// Publish an event to all handlers, then to broadcast subscribers
    pub fn publish(&self, event: ParkEvent) {
        // Handlers may call back into the bus, so don't hold the lock
        let handlers: Vec<Arc<dyn ParkEventHandler>> = self
            .inner
            .handlers
            .read()
            .iter()
            .map(|(_, h)| h.clone())
            .collect();

        for handler in handlers {
            handler.handle_event(&event);
        }

        // No receivers is not an error
        let _ = self.inner.sender.send(event);
    }

    /// Attach the consumer of inbound park requests, replacing any previous one
    pub fn set_request_sink(&self, sink: Weak<dyn ParkRequestSink>) {
        let mut slot = self.inner.request_sink.write();
        if slot.as_ref().is_some_and(|old| old.strong_count() > 0) {
            tracing::warn!("Replacing existing park request sink on shared bus");
        }
        *slot = Some(sink);
    }

    /// Deliver an inbound park request
    pub fn request_park(&self, request: ParkRequest) -> Option<ParkedCall> {
        let sink = self.inner.request_sink.read().as_ref().and_then(Weak::upgrade);
        match sink {
            Some(sink) => sink.handle_park_request(request),
            None => {
                tracing::warn!(
                    "Dropping park request for lot '{}': no registry attached",
                    request.lot
                );
                None
            }
        }
    }
}

impl Default for ParkEventBus {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_EVENT_CHANNEL_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::LocalSession;
    use crate::types::{CallerIdentity, ParkRecord, ParkedBy, Slot};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn sample_event() -> ParkEvent {
        let session = LocalSession::new("1000");
        let record = ParkRecord {
            lot: "test".to_string(),
            slot: Slot::new(1).unwrap(),
            count: 1,
            parked_by: ParkedBy {
                id: session.id(),
                identity: CallerIdentity::new("1000", ""),
            },
            parked: true,
            parked_at: chrono::Utc::now(),
        };
        ParkEvent::Parked {
            call: ParkedCall { session, record },
        }
    }

    #[test]
    fn test_event_handler_management() {
        let bus = ParkEventBus::default();
        let count = Arc::new(AtomicUsize::new(0));

        let c = count.clone();
        bus.add_event_handler(
            "counter",
            Arc::new(move |_: &ParkEvent| {
                c.fetch_add(1, Ordering::SeqCst);
            }),
        );
        assert_eq!(bus.event_handler_count(), 1);

        bus.publish(sample_event());
        assert_eq!(count.load(Ordering::SeqCst), 1);

        assert!(bus.remove_event_handler("counter"));
        assert!(!bus.remove_event_handler("counter"));
        bus.publish(sample_event());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_same_name_replaces_handler() {
        let bus = ParkEventBus::default();
        bus.add_event_handler("h", Arc::new(|_: &ParkEvent| {}));
        bus.add_event_handler("h", Arc::new(|_: &ParkEvent| {}));
        assert_eq!(bus.event_handler_count(), 1);
    }

    #[test]
    fn test_broadcast_delivery() {
        let bus = ParkEventBus::new(8);
        let mut rx = bus.subscribe();
        bus.publish(sample_event());
        let event = rx.try_recv().unwrap();
        assert_eq!(event.kind(), ParkEventKind::Parked);
        assert_eq!(event.call().slot().to_string(), "01");
    }

    #[test]
    fn test_request_without_sink() {
        let bus = ParkEventBus::default();
        let session = LocalSession::new("1000");
        assert!(bus.request_park(ParkRequest::new("lot", session)).is_none());
    }
}
