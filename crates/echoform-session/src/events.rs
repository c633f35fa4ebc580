//! Typed session events.
//!
//! Handlers subscribe per [`EventKind`] (or to everything). Emission is
//! synchronous on the emitting thread and reaches handlers in subscription
//! order. Handlers may subscribe or unsubscribe from inside a callback; the
//! change applies from the next emission.

use crate::spatial::SpatialMode;
use echoform_spec::{ContentHash, ParamValue};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Event categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A node parameter changed.
    ParamChange,
    /// A commit started rendering.
    RenderStart,
    /// A commit finished.
    RenderDone,
    /// A failure observers should hear about.
    Error,
    /// The spec changed.
    GraphDirty,
    /// A spatial binding switched between live and committed.
    SpatialModeChanged,
    /// The previewed node changed.
    PreviewChanged,
}

/// Which subsystem reported an [`SessionEvent::Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSource {
    /// Asset load or decode.
    Asset,
    /// Commit pipeline.
    Render,
    /// Spatial binding.
    Spatial,
}

/// A session event.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A node parameter changed.
    ParamChange {
        /// Node id.
        node: String,
        /// Parameter name.
        param: String,
        /// Value applied, after clamping.
        value: ParamValue,
        /// Whether the requested value was clamped.
        clamped: bool,
        /// Scheduled time, or `None` for immediate.
        at_time: Option<f64>,
    },
    /// A commit started rendering.
    RenderStart {
        /// Hash of the spec being rendered.
        spec_hash: ContentHash,
        /// Node the render was restricted to.
        node: Option<String>,
    },
    /// A commit finished.
    RenderDone {
        /// Hash of the rendered spec.
        spec_hash: ContentHash,
        /// Hash of the encoded audio.
        audio_hash: ContentHash,
        /// Whether the result came from the render cache.
        cached: bool,
    },
    /// A failure.
    Error {
        /// Reporting subsystem.
        source: ErrorSource,
        /// Subject of the failure (asset url, node id).
        subject: Option<String>,
        /// Human-readable message.
        message: String,
    },
    /// The spec changed and cached hashes are stale.
    GraphDirty,
    /// A spatial binding switched mode.
    SpatialModeChanged {
        /// Node id.
        node: String,
        /// New mode.
        mode: SpatialMode,
    },
    /// The previewed node changed.
    PreviewChanged {
        /// Soloed node, or `None` for the full mix.
        node: Option<String>,
    },
}

impl SessionEvent {
    /// Category of this event.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::ParamChange { .. } => EventKind::ParamChange,
            Self::RenderStart { .. } => EventKind::RenderStart,
            Self::RenderDone { .. } => EventKind::RenderDone,
            Self::Error { .. } => EventKind::Error,
            Self::GraphDirty => EventKind::GraphDirty,
            Self::SpatialModeChanged { .. } => EventKind::SpatialModeChanged,
            Self::PreviewChanged { .. } => EventKind::PreviewChanged,
        }
    }
}

/// Handle returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler = Arc<dyn Fn(&SessionEvent) + Send + Sync>;

struct Subscriber {
    id: SubscriptionId,
    kind: Option<EventKind>,
    handler: Handler,
}

/// Subscriber lists per event category.
#[derive(Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<Subscriber>>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscribers.lock().len())
            .finish()
    }
}

impl EventBus {
    /// Creates an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Calls `handler` for every event of `kind`.
    pub fn subscribe(
        &self,
        kind: EventKind,
        handler: impl Fn(&SessionEvent) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.add(Some(kind), Arc::new(handler))
    }

    /// Calls `handler` for every event.
    pub fn subscribe_all(
        &self,
        handler: impl Fn(&SessionEvent) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.add(None, Arc::new(handler))
    }

    /// Removes a subscription. Returns whether it existed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subs = self.subscribers.lock();
        let before = subs.len();
        subs.retain(|s| s.id != id);
        subs.len() != before
    }

    /// Delivers `event` to matching handlers in subscription order.
    pub fn emit(&self, event: &SessionEvent) {
        let kind = event.kind();
        let handlers: Vec<Handler> = self
            .subscribers
            .lock()
            .iter()
            .filter(|s| s.kind.is_none_or(|k| k == kind))
            .map(|s| Arc::clone(&s.handler))
            .collect();
        for handler in handlers {
            handler(event);
        }
    }

    fn add(&self, kind: Option<EventKind>, handler: Handler) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers.lock().push(Subscriber { id, kind, handler });
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivers_in_subscription_order_by_kind() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        for tag in ["first", "second"] {
            let log = Arc::clone(&log);
            bus.subscribe(EventKind::GraphDirty, move |_| log.lock().push(tag));
        }
        let other = Arc::clone(&log);
        bus.subscribe(EventKind::PreviewChanged, move |_| other.lock().push("preview"));
        let all = Arc::clone(&log);
        bus.subscribe_all(move |_| all.lock().push("all"));

        bus.emit(&SessionEvent::GraphDirty);
        assert_eq!(*log.lock(), vec!["first", "second", "all"]);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicU64::new(0));
        let c = Arc::clone(&count);
        let id = bus.subscribe(EventKind::GraphDirty, move |_| {
            c.fetch_add(1, Ordering::Relaxed);
        });
        bus.emit(&SessionEvent::GraphDirty);
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.emit(&SessionEvent::GraphDirty);
        assert_eq!(count.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn handlers_may_subscribe_reentrantly() {
        let bus = Arc::new(EventBus::new());
        let inner = Arc::clone(&bus);
        bus.subscribe(EventKind::GraphDirty, move |_| {
            inner.subscribe(EventKind::GraphDirty, |_| {});
        });
        bus.emit(&SessionEvent::GraphDirty);
        assert_eq!(bus.subscribers.lock().len(), 2);
    }
}
