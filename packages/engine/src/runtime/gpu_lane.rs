// packages/engine/src/runtime/gpu_lane.rs
//! GPU exclusive lane
//!
//! A single-worker FIFO lane. The recognition backend breaks under
//! concurrent access, so every GPU-touching task goes through here and at
//! most one of them runs at any time, however many threads submit.
//!
//! ```text
//! tick thread ─┐
//! async op A ──┼─► [job][job][job] ─► gpu-lane worker ─► CompletionHook
//! async op B ──┘        FIFO             (one at a time)
//! ```
//!
//! A task that fails or panics never takes the worker down: the outcome is
//! handed to the completion hook and to the task's `LaneHandle`.

use crate::events::{EventType, Reporter};
use crate::utils::errors::{EngineError, Result};
use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

/// Outcome of one lane task, as seen by the completion hook
#[derive(Debug, Clone)]
pub struct LaneTaskReport {
    pub id: u64,
    pub label: String,

    /// Time spent waiting in the queue
    pub queued_for: Duration,

    /// Time spent running
    pub ran_for: Duration,

    /// `None` on success
    pub error: Option<String>,
}

/// Observes every lane task outcome. Panics raised here are contained.
pub trait CompletionHook: Send + Sync {
    fn on_complete(&self, report: &LaneTaskReport);
}

/// Logs outcomes and reports failures as `LaneTaskFailed` events
pub struct ReportingHook {
    reporter: Reporter,
}

impl ReportingHook {
    pub fn new(reporter: Reporter) -> Self {
        Self { reporter }
    }
}

impl CompletionHook for ReportingHook {
    fn on_complete(&self, report: &LaneTaskReport) {
        match &report.error {
            None => trace!(
                "Lane task #{} '{}' finished in {:?}",
                report.id,
                report.label,
                report.ran_for
            ),
            Some(err) => {
                warn!("Lane task #{} '{}' failed: {}", report.id, report.label, err);
                self.reporter.emit(
                    EventType::LaneTaskFailed,
                    serde_json::json!({
                        "task_id": report.id,
                        "operation": report.label,
                        "error": err,
                        "ran_for_ms": report.ran_for.as_millis() as u64,
                    }),
                );
            }
        }
    }
}

type Job = Box<dyn FnOnce() -> std::result::Result<(), String> + Send + 'static>;

struct LaneJob {
    id: u64,
    label: String,
    submitted_at: Instant,
    run: Job,
}

#[derive(Default)]
struct LaneCounters {
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
}

/// Lane statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaneStats {
    pub submitted: u64,

    /// Finished tasks, failures included
    pub completed: u64,
    pub failed: u64,

    /// Submitted but not finished
    pub queued: u64,
}

/// Handle to the result of a submitted task
pub struct LaneHandle<T> {
    id: u64,
    rx: Receiver<std::result::Result<T, String>>,
}

impl<T> LaneHandle<T> {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Block until the task has run
    pub fn wait(self) -> Result<T> {
        match self.rx.recv() {
            Ok(outcome) => outcome.map_err(EngineError::ResourceContention),
            Err(_) => Err(EngineError::ResourceContention(format!(
                "lane task #{} was dropped before completing",
                self.id
            ))),
        }
    }

    /// Block for at most `timeout`; `None` when the task is still pending
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<T>> {
        match self.rx.recv_timeout(timeout) {
            Ok(outcome) => Some(outcome.map_err(EngineError::ResourceContention)),
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => None,
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => Some(Err(
                EngineError::ResourceContention(format!("lane task #{} was dropped", self.id)),
            )),
        }
    }

    /// Non-blocking poll
    pub fn try_wait(&self) -> Option<Result<T>> {
        self.wait_timeout(Duration::ZERO)
    }
}

/// Single-admission execution lane for GPU-bound work
pub struct GpuLane {
    name: String,
    tx: Mutex<Option<Sender<LaneJob>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    counters: Arc<LaneCounters>,
    next_id: AtomicU64,
}

impl GpuLane {
    /// Spawn the lane worker
    pub fn start(name: impl Into<String>, hook: Arc<dyn CompletionHook>) -> Result<Self> {
        let name = name.into();
        let (tx, rx) = crossbeam_channel::unbounded::<LaneJob>();
        let counters = Arc::new(LaneCounters::default());

        let worker = std::thread::Builder::new()
            .name(name.clone())
            .spawn({
                let counters = Arc::clone(&counters);
                move || run_worker(rx, hook, counters)
            })
            .map_err(|e| EngineError::io(format!("<thread {}>", name), e))?;

        info!("GPU lane '{}' started", name);

        Ok(Self {
            name,
            tx: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
            counters,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Enqueue `task`; it runs after every task submitted before it
    pub fn submit<T, F>(&self, label: impl Into<String>, task: F) -> Result<LaneHandle<T>>
    where
        T: Send + 'static,
        F: FnOnce() -> std::result::Result<T, String> + Send + 'static,
    {
        let label = label.into();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (result_tx, result_rx) = crossbeam_channel::bounded(1);

        let run: Job = Box::new(move || {
            let outcome = match catch_unwind(AssertUnwindSafe(task)) {
                Ok(outcome) => outcome,
                Err(panic) => Err(format!("task panicked: {}", panic_message(&*panic))),
            };
            let error = outcome.as_ref().err().cloned();
            // the submitter may have dropped its handle
            let _ = result_tx.send(outcome);
            match error {
                Some(err) => Err(err),
                None => Ok(()),
            }
        });

        let guard = self.tx.lock();
        let Some(tx) = guard.as_ref() else {
            return Err(EngineError::LaneClosed);
        };
        tx.send(LaneJob {
            id,
            label: label.clone(),
            submitted_at: Instant::now(),
            run,
        })
        .map_err(|_| EngineError::LaneClosed)?;
        drop(guard);

        self.counters.submitted.fetch_add(1, Ordering::Relaxed);
        debug!("Submitted lane task #{} '{}' to '{}'", id, label, self.name);

        Ok(LaneHandle { id, rx: result_rx })
    }

    /// Stop accepting work. With `wait`, block until queued work has drained.
    ///
    /// Without `wait`, queued and running tasks still complete in the
    /// background. Calling it again is a no-op.
    pub fn shutdown(&self, wait: bool) {
        let was_open = self.tx.lock().take().is_some();
        if was_open {
            info!("GPU lane '{}' no longer accepts work", self.name);
        }

        if !wait {
            return;
        }

        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            if worker.thread().id() == std::thread::current().id() {
                // shutdown from a lane task: the worker exits once the queue drains
                warn!("GPU lane '{}' shutdown(wait) called from its own worker", self.name);
                return;
            }
            if worker.join().is_err() {
                error!("GPU lane '{}' worker terminated abnormally", self.name);
            }
            info!("GPU lane '{}' drained and stopped", self.name);
        }
    }

    pub fn is_accepting(&self) -> bool {
        self.tx.lock().is_some()
    }

    pub fn stats(&self) -> LaneStats {
        let submitted = self.counters.submitted.load(Ordering::Relaxed);
        let completed = self.counters.completed.load(Ordering::Relaxed);
        LaneStats {
            submitted,
            completed,
            failed: self.counters.failed.load(Ordering::Relaxed),
            queued: submitted.saturating_sub(completed),
        }
    }
}

impl Drop for GpuLane {
    fn drop(&mut self) {
        self.shutdown(false);
    }
}

fn run_worker(rx: Receiver<LaneJob>, hook: Arc<dyn CompletionHook>, counters: Arc<LaneCounters>) {
    // ends once every sender is gone and the queue is empty
    for job in rx.iter() {
        let queued_for = job.submitted_at.elapsed();
        let started = Instant::now();
        let result = (job.run)();
        let ran_for = started.elapsed();

        counters.completed.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("autopilot_lane_tasks_total").increment(1);
        metrics::histogram!("autopilot_lane_task_seconds").record(ran_for.as_secs_f64());
        if result.is_err() {
            counters.failed.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("autopilot_lane_task_failures_total").increment(1);
        }

        let report = LaneTaskReport {
            id: job.id,
            label: job.label,
            queued_for,
            ran_for,
            error: result.err(),
        };

        if let Err(panic) = catch_unwind(AssertUnwindSafe(|| hook.on_complete(&report))) {
            error!(
                "Completion hook panicked for lane task #{}: {}",
                report.id,
                panic_message(&*panic)
            );
        }
    }
    debug!("GPU lane worker exiting");
}

pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
