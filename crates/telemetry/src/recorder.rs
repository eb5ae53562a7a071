//! Thread-safe trace recorder: a capped ring buffer of lifecycle events
//! with push-style subscriptions.

use crate::TelemetryError;
use crate::model::{TraceEvent, TraceEventType};
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};

/// Events kept in the ring buffer.
pub const TRACE_CAPACITY: usize = 150;

type Listener = Arc<dyn Fn(&TraceEvent) + Send + Sync>;
type ListenerMap = RwLock<BTreeMap<u64, Listener>>;

/// Passive observer of invocation lifecycle events.
///
/// Thread-safe via `RwLock`. The newest event is at the front.
pub struct TraceRecorder {
    events: RwLock<VecDeque<TraceEvent>>,
    capacity: usize,
    listeners: Arc<ListenerMap>,
    next_listener_id: AtomicU64,
}

/// Handle returned by [`TraceRecorder::subscribe`].
pub struct Subscription {
    id: u64,
    listeners: Weak<ListenerMap>,
}

impl Subscription {
    /// Stop receiving events.
    pub fn unsubscribe(self) {
        if let Some(listeners) = self.listeners.upgrade() {
            listeners
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&self.id);
        }
    }
}

impl std::fmt::Debug for TraceRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraceRecorder")
            .field("event_count", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl Default for TraceRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl TraceRecorder {
    pub fn new() -> Self {
        Self::with_capacity(TRACE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: RwLock::new(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(1),
            listeners: Arc::new(RwLock::new(BTreeMap::new())),
            next_listener_id: AtomicU64::new(1),
        }
    }

    /// Prepend an event, dropping the oldest past capacity, then notify
    /// every listener.
    pub fn record(&self, event: TraceEvent) {
        tracing::debug!(
            trace_id = %event.trace_id,
            event_type = %event.event_type,
            latency_ms = event.latency_ms,
            "trace event"
        );

        {
            let mut events = self.events.write().unwrap_or_else(PoisonError::into_inner);
            events.push_front(event.clone());
            events.truncate(self.capacity);
        }

        // Snapshot so a listener may unsubscribe from inside its callback.
        let listeners: Vec<Listener> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        for listener in listeners {
            listener(&event);
        }
    }

    /// Register a callback invoked after every `record`.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&TraceEvent) + Send + Sync + 'static,
    {
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, Arc::new(listener));
        Subscription {
            id,
            listeners: Arc::downgrade(&self.listeners),
        }
    }

    /// All buffered events, newest first.
    pub fn events(&self) -> Vec<TraceEvent> {
        self.events
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Events for one invocation, newest first.
    pub fn by_trace(&self, trace_id: &str) -> Vec<TraceEvent> {
        self.events
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| e.trace_id == trace_id)
            .cloned()
            .collect()
    }

    /// Events of one type, newest first.
    pub fn by_type(&self, event_type: TraceEventType) -> Vec<TraceEvent> {
        self.events
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| e.event_type == event_type)
            .cloned()
            .collect()
    }

    /// The buffer as a JSON array, newest first.
    pub fn to_json(&self) -> Result<String, TelemetryError> {
        let events = self.events();
        Ok(serde_json::to_string_pretty(&events)?)
    }

    pub fn len(&self) -> usize {
        self.events.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn clear(&self) {
        self.events.write().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn event(trace_id: &str, event_type: TraceEventType) -> TraceEvent {
        TraceEvent::new(trace_id, event_type, "local", "local")
    }

    #[test]
    fn newest_first() {
        let recorder = TraceRecorder::new();
        recorder.record(event("t1", TraceEventType::InvocationReceived));
        recorder.record(event("t1", TraceEventType::ModelRequestStart));

        let events = recorder.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, TraceEventType::ModelRequestStart);
        assert_eq!(events[1].event_type, TraceEventType::InvocationReceived);
    }

    #[test]
    fn ring_buffer_drops_oldest() {
        let recorder = TraceRecorder::new();
        for i in 0..(TRACE_CAPACITY + 10) {
            recorder.record(event(&format!("t{i}"), TraceEventType::InvocationReceived));
        }
        assert_eq!(recorder.len(), TRACE_CAPACITY);
        let events = recorder.events();
        assert_eq!(events[0].trace_id, format!("t{}", TRACE_CAPACITY + 9));
        assert_eq!(events[TRACE_CAPACITY - 1].trace_id, "t10");
    }

    #[test]
    fn listeners_see_every_event_until_unsubscribed() {
        let recorder = TraceRecorder::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let sub = recorder.subscribe(move |e| sink.lock().unwrap().push(e.event_type));

        recorder.record(event("t1", TraceEventType::InvocationReceived));
        recorder.record(event("t1", TraceEventType::Error));
        assert_eq!(recorder.listener_count(), 1);

        sub.unsubscribe();
        recorder.record(event("t2", TraceEventType::InvocationReceived));

        assert_eq!(recorder.listener_count(), 0);
        assert_eq!(
            seen.lock().unwrap().as_slice(),
            [TraceEventType::InvocationReceived, TraceEventType::Error]
        );
    }

    #[test]
    fn filter_by_trace_and_type() {
        let recorder = TraceRecorder::new();
        recorder.record(event("a", TraceEventType::InvocationReceived));
        recorder.record(event("b", TraceEventType::InvocationReceived));
        recorder.record(event("a", TraceEventType::ToolCallStart));

        assert_eq!(recorder.by_trace("a").len(), 2);
        assert_eq!(recorder.by_type(TraceEventType::InvocationReceived).len(), 2);
    }

    #[test]
    fn to_json_is_an_array_newest_first() {
        let recorder = TraceRecorder::new();
        recorder.record(event("t1", TraceEventType::InvocationReceived));
        recorder.record(event("t1", TraceEventType::ModelRequestEnd).with_tokens(10, 5));

        let json: serde_json::Value = serde_json::from_str(&recorder.to_json().unwrap()).unwrap();
        let arr = json.as_array().unwrap();
        assert_eq!(arr.len(), 2);
        assert_eq!(arr[0]["event_type"], "model_request_end");
        assert_eq!(arr[0]["token_estimate_total"], 15);
    }

    #[test]
    fn unsubscribe_after_recorder_dropped_is_harmless() {
        let recorder = TraceRecorder::new();
        let sub = recorder.subscribe(|_| {});
        drop(recorder);
        sub.unsubscribe();
    }

    #[test]
    fn clear_and_debug() {
        let recorder = TraceRecorder::new();
        recorder.record(event("t", TraceEventType::Error));
        assert!(format!("{recorder:?}").contains("event_count"));
        recorder.clear();
        assert!(recorder.is_empty());
    }
}
