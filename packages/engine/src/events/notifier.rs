// packages/engine/src/events/notifier.rs
//! Background consumer for an `EventQueue`
//!
//! Drains the queue on a fixed period while a session runs so bounded
//! buffers never fill up, then performs one last drain on `finish()`.

use crate::events::event::EngineEvent;
use crate::events::queue::EventQueue;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

/// Handle to a running drain task
pub struct QueueDrain {
    stop: Arc<Notify>,
    task: JoinHandle<u64>,
}

impl QueueDrain {
    /// Spawn a task handing every queued event to `deliver` each `period`
    pub fn spawn<F>(queue: Arc<EventQueue>, period: Duration, mut deliver: F) -> Self
    where
        F: FnMut(EngineEvent) + Send + 'static,
    {
        let stop = Arc::new(Notify::new());
        let stopped = Arc::clone(&stop);

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut delivered = 0u64;

            loop {
                let last = tokio::select! {
                    _ = stopped.notified() => true,
                    _ = interval.tick() => false,
                };

                for event in queue.drain() {
                    deliver(event);
                    delivered += 1;
                }

                if last {
                    debug!("Event drain finished after {} events", delivered);
                    return delivered;
                }
            }
        });

        Self { stop, task }
    }

    /// Stop the task after a final drain; returns the number of delivered events
    pub async fn finish(self) -> u64 {
        self.stop.notify_one();
        match self.task.await {
            Ok(delivered) => delivered,
            Err(e) => {
                warn!("Event drain task failed: {}", e);
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::event::EventType;
    use crate::events::sink::{EventSink, QueueSink};
    use parking_lot::Mutex;

    #[tokio::test]
    async fn test_drain_keeps_small_queue_from_overflowing() {
        let sink = QueueSink::new(4);
        let queue = sink.queue();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let collected = Arc::clone(&seen);

        let drain = QueueDrain::spawn(Arc::clone(&queue), Duration::from_millis(5), move |event| {
            collected.lock().push(event.event_type)
        });

        for _ in 0..4 {
            for _ in 0..3 {
                sink.emit(EngineEvent::new("s", EventType::ActionFailed, serde_json::json!({})));
            }
            tokio::time::sleep(Duration::from_millis(30)).await;
        }

        assert_eq!(drain.finish().await, 12);
        assert_eq!(seen.lock().len(), 12);
        assert_eq!(queue.stats().drop_count, 0);
    }

    #[tokio::test]
    async fn test_finish_delivers_what_is_left() {
        let sink = QueueSink::new(8);
        let queue = sink.queue();
        let drain = QueueDrain::spawn(Arc::clone(&queue), Duration::from_secs(3600), |_| {});

        sink.emit(EngineEvent::new("s", EventType::CriticalFailure, serde_json::json!({})));
        sink.emit(EngineEvent::new("s", EventType::LaneTaskFailed, serde_json::json!({})));

        assert_eq!(drain.finish().await, 2);
        assert!(queue.is_empty());
    }
}
