// packages/engine/src/runtime/controller.rs
//! Capabilities consumed by atomic operations
//!
//! The engine never talks to a device directly. Input simulation is reached
//! through `Controller`, screen recognition through `Recognizer`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

/// Error reported by a controller implementation
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{0}")]
pub struct ControllerError(pub String);

/// Input primitives of the game controller
pub trait Controller: Send + Sync {
    /// Turn the view by `distance` (positive is clockwise)
    fn turn_by_distance(&self, distance: f64) -> Result<(), ControllerError>;

    /// Press and release `key`, holding it for `hold`
    fn press_key(&self, key: &str, hold: Duration) -> Result<(), ControllerError>;
}

/// Screen recognition; runs on the GPU lane
pub trait Recognizer: Send + Sync {
    /// Look for `target` on screen. `Ok(None)` means not found.
    fn recognize(&self, target: &str) -> Result<Option<serde_json::Value>, String>;
}

/// Controller that logs commands instead of sending them
#[derive(Debug, Default)]
pub struct DryRunController {
    commands: AtomicU64,
}

impl DryRunController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn command_count(&self) -> u64 {
        self.commands.load(Ordering::Relaxed)
    }
}

impl Controller for DryRunController {
    fn turn_by_distance(&self, distance: f64) -> Result<(), ControllerError> {
        self.commands.fetch_add(1, Ordering::Relaxed);
        info!("[dry-run] turn_by_distance({})", distance);
        Ok(())
    }

    fn press_key(&self, key: &str, hold: Duration) -> Result<(), ControllerError> {
        self.commands.fetch_add(1, Ordering::Relaxed);
        info!("[dry-run] press_key({}, {:?})", key, hold);
        Ok(())
    }
}

/// Recognizer that never finds anything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullRecognizer;

impl Recognizer for NullRecognizer {
    fn recognize(&self, _target: &str) -> Result<Option<serde_json::Value>, String> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dry_run_counts_commands() {
        let controller = DryRunController::new();
        controller.turn_by_distance(90.0).unwrap();
        controller.press_key("space", Duration::from_millis(10)).unwrap();
        assert_eq!(controller.command_count(), 2);
    }

    #[test]
    fn test_null_recognizer() {
        assert_eq!(NullRecognizer.recognize("boss").unwrap(), None);
    }
}
