//! Routing of decoded messages to registered handlers.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::info;

use crate::events::InboundMessage;

/// Literal accepted by [`HandlerKey::parse`] for the catch-all handler.
pub const WILDCARD: &str = "*";

/// Side-effecting callback invoked with each routed message.
pub type Handler = Arc<dyn Fn(&InboundMessage) + Send + Sync>;

/// Registry key. The catch-all is its own variant so it can never collide
/// with a real event name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HandlerKey {
    Specific(String),
    Wildcard,
}

impl HandlerKey {
    /// `"*"` maps to [`HandlerKey::Wildcard`], anything else is specific.
    pub fn parse(event_type: &str) -> Self {
        if event_type == WILDCARD {
            HandlerKey::Wildcard
        } else {
            HandlerKey::Specific(event_type.to_string())
        }
    }
}

/// Which handler, if any, a message was routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Specific,
    Wildcard,
    Unhandled,
}

/// A handler panicked while processing a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerPanic {
    pub event: String,
    pub detail: String,
}

/// Event-type to handler map shared between `on()` callers and the dispatcher.
///
/// Handlers are cloned out of the map before being invoked, so a handler may
/// register further handlers without deadlocking.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<HandlerKey, Handler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the handler for `key`. Last registration wins.
    pub fn register(&self, key: HandlerKey, handler: Handler) {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, handler);
    }

    pub fn remove(&self, key: &HandlerKey) -> bool {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.handlers.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Specific handler for `event`, else the wildcard.
    fn resolve(&self, event: &str) -> Option<(DispatchOutcome, Handler)> {
        let map = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(h) = map.get(&HandlerKey::Specific(event.to_string())) {
            return Some((DispatchOutcome::Specific, Arc::clone(h)));
        }
        map.get(&HandlerKey::Wildcard)
            .map(|h| (DispatchOutcome::Wildcard, Arc::clone(h)))
    }

    /// Route `message` to at most one handler.
    ///
    /// Unrouted messages are logged. A panicking handler is contained and
    /// reported through the `Err` side; it never unwinds into the caller.
    pub fn dispatch(&self, message: &InboundMessage) -> Result<DispatchOutcome, HandlerPanic> {
        let Some((outcome, handler)) = self.resolve(&message.event) else {
            info!(
                event = %message.event,
                timestamp = message.timestamp.as_deref().unwrap_or("-"),
                payload = %message.payload,
                "Unhandled event"
            );
            return Ok(DispatchOutcome::Unhandled);
        };

        catch_unwind(AssertUnwindSafe(|| handler(message)))
            .map(|()| outcome)
            .map_err(|panic| HandlerPanic {
                event: message.event.clone(),
                detail: panic_detail(panic.as_ref()),
            })
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let map = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("HandlerRegistry")
            .field("keys", &map.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn panic_detail(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
