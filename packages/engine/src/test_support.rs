// packages/engine/src/test_support.rs
//! Test doubles shared by unit tests

use crate::runtime::context::RuntimeContext;
use crate::runtime::controller::{Controller, ControllerError, Recognizer};
use crate::runtime::gpu_lane::{CompletionHook, GpuLane, LaneTaskReport};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Turn(f64),
    Press(String, Duration),
}

/// Controller that records commands; can be told to fail
#[derive(Default)]
pub struct RecordingController {
    commands: Mutex<Vec<Command>>,
    fail_with: Mutex<Option<String>>,
}

impl RecordingController {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn commands(&self) -> Vec<Command> {
        self.commands.lock().clone()
    }

    pub fn fail_with(&self, message: &str) {
        *self.fail_with.lock() = Some(message.to_string());
    }

    fn record(&self, command: Command) -> Result<(), ControllerError> {
        if let Some(message) = self.fail_with.lock().clone() {
            return Err(ControllerError(message));
        }
        self.commands.lock().push(command);
        Ok(())
    }
}

impl Controller for RecordingController {
    fn turn_by_distance(&self, distance: f64) -> Result<(), ControllerError> {
        self.record(Command::Turn(distance))
    }

    fn press_key(&self, key: &str, hold: Duration) -> Result<(), ControllerError> {
        self.record(Command::Press(key.to_string(), hold))
    }
}

/// Recognizer returning a fixed answer after a delay
pub struct StaticRecognizer {
    pub answer: Result<Option<serde_json::Value>, String>,
    pub delay: Duration,
}

impl Recognizer for StaticRecognizer {
    fn recognize(&self, _target: &str) -> Result<Option<serde_json::Value>, String> {
        std::thread::sleep(self.delay);
        self.answer.clone()
    }
}

pub struct NoopHook;

impl CompletionHook for NoopHook {
    fn on_complete(&self, _report: &LaneTaskReport) {}
}

pub fn lane() -> Arc<GpuLane> {
    Arc::new(GpuLane::start("test-lane", Arc::new(NoopHook)).unwrap())
}

pub fn context(controller: Arc<RecordingController>) -> RuntimeContext {
    RuntimeContext::new("test-session", controller, lane())
}
