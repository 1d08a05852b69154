// packages/engine/src/operations/atomic.rs
//! The atomic operation capability set

use crate::runtime::context::RuntimeContext;
use crate::utils::errors::ActionFailure;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Smallest executable unit, bound to a runtime context.
///
/// `execute` performs exactly one side effect and never retries. `stop` may
/// be called at any time from any thread, any number of times.
pub trait AtomicOperation: Send + Sync {
    fn name(&self) -> &str;

    /// Dispatched without blocking the tick
    fn is_async(&self) -> bool;

    fn execute(&self) -> Result<(), ActionFailure>;

    fn stop(&self);
}

/// One-shot stop flag that sleeping operations can wait on
#[derive(Debug, Default)]
pub struct StopSignal {
    stopped: Mutex<bool>,
    cvar: Condvar,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` the first time only
    pub fn trigger(&self) -> bool {
        let mut stopped = self.stopped.lock();
        if *stopped {
            return false;
        }
        *stopped = true;
        self.cvar.notify_all();
        true
    }

    pub fn is_triggered(&self) -> bool {
        *self.stopped.lock()
    }

    /// Block for up to `timeout`; returns whether the signal fired
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut stopped = self.stopped.lock();
        while !*stopped {
            if self.cvar.wait_until(&mut stopped, deadline).timed_out() {
                break;
            }
        }
        *stopped
    }
}

/// State shared by the built-in operations: name, dispatch mode, bound
/// context and stop signal
pub struct OperationBase {
    name: String,
    async_op: bool,
    context: Arc<RuntimeContext>,
    stop: StopSignal,
}

impl OperationBase {
    pub fn new(name: impl Into<String>, async_op: bool, context: Arc<RuntimeContext>) -> Self {
        Self {
            name: name.into(),
            async_op,
            context,
            stop: StopSignal::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_async(&self) -> bool {
        self.async_op
    }

    pub fn context(&self) -> &RuntimeContext {
        &self.context
    }

    pub fn stop(&self) {
        if self.stop.trigger() {
            tracing::debug!("Stop requested for operation '{}'", self.name);
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.is_triggered()
    }

    /// `Err(Stopped)` once stop was requested
    pub fn ensure_running(&self) -> Result<(), ActionFailure> {
        if self.is_stopped() {
            Err(ActionFailure::Stopped(self.name.clone()))
        } else {
            Ok(())
        }
    }

    /// Sleep that ends early with `Err(Stopped)` when stop is requested
    pub fn sleep(&self, duration: Duration) -> Result<(), ActionFailure> {
        if self.stop.wait_timeout(duration) {
            Err(ActionFailure::Stopped(self.name.clone()))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_signal_triggers_once() {
        let signal = StopSignal::new();
        assert!(!signal.is_triggered());
        assert!(signal.trigger());
        assert!(!signal.trigger());
        assert!(signal.is_triggered());
    }

    #[test]
    fn test_wait_timeout_elapses() {
        let signal = StopSignal::new();
        let started = Instant::now();
        assert!(!signal.wait_timeout(Duration::from_millis(20)));
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_wait_timeout_wakes_on_trigger() {
        let signal = Arc::new(StopSignal::new());
        let waiter = {
            let signal = Arc::clone(&signal);
            std::thread::spawn(move || {
                let started = Instant::now();
                let stopped = signal.wait_timeout(Duration::from_secs(10));
                (stopped, started.elapsed())
            })
        };

        std::thread::sleep(Duration::from_millis(20));
        signal.trigger();

        let (stopped, waited) = waiter.join().unwrap();
        assert!(stopped);
        assert!(waited < Duration::from_secs(5));
    }
}
