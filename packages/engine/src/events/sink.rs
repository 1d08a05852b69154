// packages/engine/src/events/sink.rs
//! Event delivery targets

use crate::events::event::{EngineEvent, EventType};
use crate::events::queue::EventQueue;
use crossbeam_channel::Sender;
use std::sync::Arc;
use tracing::{info, trace, warn};

/// Receives reportable events. Implementations must not panic.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: EngineEvent);
}

/// Logs every event; failures at `warn`, the rest at `info`/`trace`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: EngineEvent) {
        if event.event_type.is_failure() {
            warn!(
                event_id = %event.id,
                session = %event.session_id,
                data = %event.data,
                "{}",
                event.summary()
            );
        } else if matches!(
            event.event_type,
            EventType::ActionCompleted | EventType::TickCompleted
        ) {
            trace!(event_id = %event.id, "{}", event.summary());
        } else {
            info!(event_id = %event.id, session = %event.session_id, "{}", event.summary());
        }
    }
}

/// Buffers events in a bounded lock-free queue
pub struct QueueSink {
    queue: Arc<EventQueue>,
}

impl QueueSink {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: Arc::new(EventQueue::new(capacity)),
        }
    }

    /// Shared handle for the consumer side
    pub fn queue(&self) -> Arc<EventQueue> {
        Arc::clone(&self.queue)
    }
}

impl EventSink for QueueSink {
    fn emit(&self, event: EngineEvent) {
        if let Err(event) = self.queue.push(event) {
            warn!("Event queue full, dropping {:?} event {}", event.event_type, event.id);
        }
    }
}

/// Forwards events over a crossbeam channel
pub struct ChannelSink {
    tx: Sender<EngineEvent>,
}

impl ChannelSink {
    pub fn new(tx: Sender<EngineEvent>) -> Self {
        Self { tx }
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: EngineEvent) {
        // receiver gone means nobody is listening any more
        let _ = self.tx.send(event);
    }
}

/// Forwards only the events whose type passes a predicate
pub struct FilterSink {
    inner: Arc<dyn EventSink>,
    accept: fn(&EventType) -> bool,
}

impl FilterSink {
    pub fn new(inner: Arc<dyn EventSink>, accept: fn(&EventType) -> bool) -> Self {
        Self { inner, accept }
    }

    /// Keeps per-tick chatter out of bounded consumers
    pub fn failures(inner: Arc<dyn EventSink>) -> Self {
        Self::new(inner, EventType::is_failure)
    }
}

impl EventSink for FilterSink {
    fn emit(&self, event: EngineEvent) {
        if (self.accept)(&event.event_type) {
            self.inner.emit(event);
        }
    }
}

/// Delivers each event to several sinks
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl EventSink for FanoutSink {
    fn emit(&self, event: EngineEvent) {
        if let Some((last, rest)) = self.sinks.split_last() {
            for sink in rest {
                sink.emit(event.clone());
            }
            last.emit(event);
        }
    }
}

/// Stamps events with the session id and forwards them to a sink
#[derive(Clone)]
pub struct Reporter {
    session_id: Arc<str>,
    sink: Arc<dyn EventSink>,
}

impl Reporter {
    pub fn new(session_id: impl Into<String>, sink: Arc<dyn EventSink>) -> Self {
        let session_id: String = session_id.into();
        Self {
            session_id: Arc::from(session_id),
            sink,
        }
    }

    /// Reporter that only logs
    pub fn tracing(session_id: impl Into<String>) -> Self {
        Self::new(session_id, Arc::new(TracingSink))
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn emit(&self, event_type: EventType, data: serde_json::Value) {
        self.sink
            .emit(EngineEvent::new(self.session_id.as_ref(), event_type, data));
    }
}

impl std::fmt::Debug for Reporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reporter")
            .field("session_id", &self.session_id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_sink_buffers() {
        let sink = QueueSink::new(2);
        let queue = sink.queue();
        sink.emit(EngineEvent::new("s", EventType::ActionFailed, serde_json::json!({})));
        sink.emit(EngineEvent::new("s", EventType::ActionFailed, serde_json::json!({})));
        sink.emit(EngineEvent::new("s", EventType::ActionFailed, serde_json::json!({})));

        assert_eq!(queue.stats().current_size, 2);
        assert_eq!(queue.stats().drop_count, 1);
    }

    #[test]
    fn test_channel_sink_survives_closed_receiver() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let sink = ChannelSink::new(tx);
        drop(rx);
        sink.emit(EngineEvent::new("s", EventType::TickCompleted, serde_json::json!({})));
    }

    #[test]
    fn test_fanout_delivers_to_all() {
        let a = Arc::new(QueueSink::new(4));
        let b = Arc::new(QueueSink::new(4));
        let fanout = FanoutSink::new()
            .with(a.clone() as Arc<dyn EventSink>)
            .with(b.clone() as Arc<dyn EventSink>);

        fanout.emit(EngineEvent::new("s", EventType::OperatorStopped, serde_json::json!({})));

        assert_eq!(a.queue().stats().current_size, 1);
        assert_eq!(b.queue().stats().current_size, 1);
    }

    #[test]
    fn test_failure_filter_outlasts_queue_capacity() {
        let queue_sink = Arc::new(QueueSink::new(4));
        let reporter = Reporter::new("s", Arc::new(FilterSink::failures(queue_sink.clone())));

        for tick in 0..50 {
            reporter.emit(EventType::TickCompleted, serde_json::json!({ "tick": tick }));
            reporter.emit(EventType::ActionCompleted, serde_json::json!({}));
        }
        reporter.emit(EventType::ActionFailed, serde_json::json!({ "rule": "heal" }));
        reporter.emit(EventType::LaneTaskFailed, serde_json::json!({}));

        let queue = queue_sink.queue();
        let kept: Vec<_> = queue.drain().into_iter().map(|e| e.event_type).collect();
        assert_eq!(kept, vec![EventType::ActionFailed, EventType::LaneTaskFailed]);
        assert_eq!(queue.stats().drop_count, 0);
    }

    #[test]
    fn test_reporter_stamps_session() {
        let sink = Arc::new(QueueSink::new(4));
        let reporter = Reporter::new("session-1", sink.clone());
        reporter.emit(EventType::TemplateLoaded, serde_json::json!({"template": "boss"}));

        let event = sink.queue().try_pop().unwrap();
        assert_eq!(event.session_id, "session-1");
        assert_eq!(event.event_type, EventType::TemplateLoaded);
    }
}
