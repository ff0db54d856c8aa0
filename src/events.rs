//! Observability events emitted once per validation step.
//!
//! Sinks receive the precise failure reason; the TLS layer never does.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PinEvent {
    CacheHit { domain: String },
    CacheMiss { domain: String },
    Success { domain: String },
    Failure { domain: String, reason: Error },
}

impl PinEvent {
    pub fn domain(&self) -> &str {
        match self {
            PinEvent::CacheHit { domain }
            | PinEvent::CacheMiss { domain }
            | PinEvent::Success { domain }
            | PinEvent::Failure { domain, .. } => domain,
        }
    }
}

/// Receives pin events. Implementations must not block for long; a panic is
/// caught and ignored.
pub trait EventSink: Send + Sync {
    fn on_event(&self, event: &PinEvent);
}

impl<F> EventSink for F
where
    F: Fn(&PinEvent) + Send + Sync,
{
    fn on_event(&self, event: &PinEvent) {
        self(event)
    }
}

/// Fans events out to every registered sink and to `tracing`.
#[derive(Clone, Default)]
pub struct EventDispatcher {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, sink: Arc<dyn EventSink>) {
        self.sinks.push(sink);
    }

    pub fn emit(&self, event: PinEvent) {
        match &event {
            PinEvent::CacheHit { domain } => debug!(domain = %domain, "Pin cache hit"),
            PinEvent::CacheMiss { domain } => debug!(domain = %domain, "Pin cache miss"),
            PinEvent::Success { domain } => info!(domain = %domain, "Pin validation succeeded"),
            PinEvent::Failure { domain, reason } => warn!(
                domain = %domain,
                code = %reason.code(),
                reason = %reason,
                "Pin validation failed"
            ),
        }

        for sink in &self.sinks {
            if catch_unwind(AssertUnwindSafe(|| sink.on_event(&event))).is_err() {
                warn!(domain = %event.domain(), "Pin event sink panicked, ignoring");
            }
        }
    }
}

/// Keeps every event it receives, in order.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<PinEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<PinEvent> {
        self.events.lock().clone()
    }

    pub fn take(&self) -> Vec<PinEvent> {
        std::mem::take(&mut *self.events.lock())
    }
}

impl EventSink for RecordingSink {
    fn on_event(&self, event: &PinEvent) {
        self.events.lock().push(event.clone());
    }
}
