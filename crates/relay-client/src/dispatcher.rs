//! Client-side handler registry and envelope dispatch.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use relay_core::{Envelope, EventType};
use serde_json::Value;
use tracing::{debug, warn};

/// A registered callback. Receives `data` for typed handlers and the whole
/// envelope (as JSON) for wildcard handlers.
pub type Handler = Arc<dyn Fn(&Value) + Send + Sync>;

struct Registration {
    id: u64,
    handler: Handler,
}

/// Maps event types (and the `"*"` wildcard) to ordered handler lists.
#[derive(Default)]
pub struct Dispatcher {
    handlers: Mutex<HashMap<EventType, Vec<Registration>>>,
    next_id: AtomicU64,
}

impl Dispatcher {
    /// Create an empty dispatcher.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register `handler` for `event_type`, or for every envelope when
    /// `event_type` is `"*"`.
    ///
    /// Handlers for the same type run in registration order.
    pub fn register_handler<F>(self: &Arc<Self>, event_type: impl Into<EventType>, handler: F) -> HandlerGuard
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let event_type = event_type.into();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.handlers
            .lock()
            .entry(event_type.clone())
            .or_default()
            .push(Registration {
                id,
                handler: Arc::new(handler),
            });
        debug!(event_type = %event_type, id, "handler registered");
        HandlerGuard {
            dispatcher: Arc::downgrade(self),
            event_type,
            id,
        }
    }

    fn unregister(&self, event_type: &EventType, id: u64) -> bool {
        let mut handlers = self.handlers.lock();
        let Some(list) = handlers.get_mut(event_type) else {
            return false;
        };
        let before = list.len();
        list.retain(|r| r.id != id);
        let removed = list.len() != before;
        if list.is_empty() {
            let _ = handlers.remove(event_type);
        }
        removed
    }

    /// Number of handlers registered for `event_type`.
    pub fn handler_count(&self, event_type: &EventType) -> usize {
        self.handlers.lock().get(event_type).map_or(0, Vec::len)
    }

    /// Parse a raw frame and dispatch it. Returns how many handlers ran.
    pub fn dispatch(&self, raw: &str) -> usize {
        match Envelope::from_json(raw) {
            Ok(envelope) => self.dispatch_envelope(&envelope),
            Err(e) => {
                warn!(error = %e, "dropping unparseable frame");
                0
            }
        }
    }

    /// Dispatch an already parsed envelope. Returns how many handlers ran.
    ///
    /// `data` is handed over as-is: a known type whose body does not match
    /// its registered shape is logged and still delivered. Handlers run
    /// outside the registry lock, so they may register or unregister
    /// handlers themselves.
    pub fn dispatch_envelope(&self, envelope: &Envelope) -> usize {
        if let Err(e) = envelope.payload() {
            debug!(event_type = %envelope.event_type, error = %e, "payload does not match its type");
        }

        let (typed, wildcard) = {
            let handlers = self.handlers.lock();
            let collect = |key: &EventType| -> Vec<Handler> {
                handlers
                    .get(key)
                    .map(|list| list.iter().map(|r| r.handler.clone()).collect())
                    .unwrap_or_default()
            };
            let typed = if envelope.event_type.is_wildcard() {
                Vec::new()
            } else {
                collect(&envelope.event_type)
            };
            (typed, collect(&EventType::wildcard()))
        };

        for handler in &typed {
            handler(&envelope.data);
        }
        if !wildcard.is_empty() {
            match serde_json::to_value(envelope) {
                Ok(whole) => {
                    for handler in &wildcard {
                        handler(&whole);
                    }
                }
                Err(e) => warn!(error = %e, "failed to encode envelope for wildcard handlers"),
            }
        }

        let invoked = typed.len() + wildcard.len();
        if invoked == 0 {
            debug!(event_type = %envelope.event_type, "no handlers");
        }
        invoked
    }
}

/// Disposer returned by [`Dispatcher::register_handler`].
///
/// Dropping the guard leaves the handler registered; call
/// [`unregister`](Self::unregister) to remove it.
#[derive(Debug, Clone)]
pub struct HandlerGuard {
    dispatcher: Weak<Dispatcher>,
    event_type: EventType,
    id: u64,
}

impl HandlerGuard {
    /// Remove exactly this registration. Safe to call more than once.
    ///
    /// Returns `true` only on the call that actually removed it.
    pub fn unregister(&self) -> bool {
        self.dispatcher
            .upgrade()
            .is_some_and(|d| d.unregister(&self.event_type, self.id))
    }

    /// The type this handler listens for.
    pub fn event_type(&self) -> &EventType {
        &self.event_type
    }
}
