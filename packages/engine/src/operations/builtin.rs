// packages/engine/src/operations/builtin.rs
//! Built-in operation variants
//!
//! | name        | params                         | effect                              |
//! |-------------|--------------------------------|-------------------------------------|
//! | `turn`      | `distance`                     | `controller.turn_by_distance`       |
//! | `press`     | `key`, `hold_ms` (50)          | `controller.press_key`              |
//! | `wait`      | `ms`                           | interruptible sleep                 |
//! | `set_fact`  | `key`, `value`                 | writes a context fact (sync only)   |
//! | `recognize` | `target`, `result_key`         | recognizer on the GPU lane          |

use crate::operations::atomic::{AtomicOperation, OperationBase};
use crate::operations::registry::{Binder, OperationRegistry};
use crate::operations::schema::{FieldSchema, FieldType};
use crate::rules::model::OperationDescriptor;
use crate::runtime::context::RuntimeContext;
use crate::runtime::controller::ControllerError;
use crate::utils::errors::{ActionFailure, EngineError, Result};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub const TURN: &str = "turn";
pub const PRESS: &str = "press";
pub const WAIT: &str = "wait";
pub const SET_FACT: &str = "set_fact";
pub const RECOGNIZE: &str = "recognize";

const DEFAULT_HOLD_MS: f64 = 50.0;

/// How often a pending recognition re-checks its stop signal
const RECOGNIZE_POLL: Duration = Duration::from_millis(20);

macro_rules! delegate_to_base {
    () => {
        fn name(&self) -> &str {
            self.base.name()
        }

        fn is_async(&self) -> bool {
            self.base.is_async()
        }

        fn stop(&self) {
            self.base.stop()
        }
    };
}

/// Turn the view by a signed distance
pub struct Turn {
    base: OperationBase,
    distance: f64,
}

impl AtomicOperation for Turn {
    delegate_to_base!();

    fn execute(&self) -> std::result::Result<(), ActionFailure> {
        self.base.ensure_running()?;
        debug!("turn_by_distance({})", self.distance);
        self.base
            .context()
            .controller()
            .turn_by_distance(self.distance)
            .map_err(|e| controller_failure(&self.base, e))
    }
}

/// Press and release a key
pub struct Press {
    base: OperationBase,
    key: String,
    hold: Duration,
}

impl AtomicOperation for Press {
    delegate_to_base!();

    fn execute(&self) -> std::result::Result<(), ActionFailure> {
        self.base.ensure_running()?;
        debug!("press_key({}, {:?})", self.key, self.hold);
        self.base
            .context()
            .controller()
            .press_key(&self.key, self.hold)
            .map_err(|e| controller_failure(&self.base, e))
    }
}

/// Sleep; `stop` cuts it short
pub struct Wait {
    base: OperationBase,
    duration: Duration,
}

impl AtomicOperation for Wait {
    delegate_to_base!();

    fn execute(&self) -> std::result::Result<(), ActionFailure> {
        self.base.sleep(self.duration)
    }
}

/// Write one fact into the context
pub struct SetFact {
    base: OperationBase,
    key: String,
    value: Value,
}

impl AtomicOperation for SetFact {
    delegate_to_base!();

    fn execute(&self) -> std::result::Result<(), ActionFailure> {
        self.base.ensure_running()?;
        self.base.context().set_fact(self.key.clone(), self.value.clone());
        Ok(())
    }
}

/// Run the recognizer on the GPU lane and store what it found.
///
/// `Some(value)` is stored under `result_key`; `None` removes the fact.
pub struct Recognize {
    base: OperationBase,
    target: String,
    result_key: String,
}

impl Recognize {
    fn failure(&self, message: impl ToString) -> ActionFailure {
        ActionFailure::Recognition {
            operation: self.base.name().to_string(),
            message: message.to_string(),
        }
    }
}

impl AtomicOperation for Recognize {
    delegate_to_base!();

    fn execute(&self) -> std::result::Result<(), ActionFailure> {
        self.base.ensure_running()?;
        let context = self.base.context();

        let recognizer = Arc::clone(context.recognizer());
        let target = self.target.clone();
        let handle = context
            .lane()
            .submit(format!("{}:{}", RECOGNIZE, self.target), move || {
                recognizer.recognize(&target)
            })
            .map_err(|e| self.failure(e))?;

        let outcome = loop {
            if let Some(outcome) = handle.wait_timeout(RECOGNIZE_POLL) {
                break outcome;
            }
            // the lane task still runs to completion; its result is dropped
            self.base.ensure_running()?;
        };

        // a result arriving after stop is discarded
        self.base.ensure_running()?;

        match outcome.map_err(|e| self.failure(e))? {
            Some(value) => {
                debug!("Recognized '{}' -> {}", self.target, value);
                context.set_fact(self.result_key.clone(), value);
            }
            None => {
                debug!("'{}' not recognized", self.target);
                context.remove_fact(&self.result_key);
            }
        }
        Ok(())
    }
}

pub(crate) fn register_builtins(registry: &mut OperationRegistry) {
    registry.register(
        TURN,
        vec![FieldSchema::new("distance", "Distance", FieldType::Text)
            .required()
            .icon("rotate")
            .placeholder("-90")],
        |desc| {
            let distance = require_number(desc, "distance")?;
            let async_op = desc.async_op;
            Ok(binder(move |ctx| {
                Box::new(Turn {
                    base: OperationBase::new(TURN, async_op, ctx),
                    distance,
                }) as Box<dyn AtomicOperation>
            }))
        },
    );

    registry.register(
        PRESS,
        vec![
            FieldSchema::new("key", "Key", FieldType::Text)
                .required()
                .icon("keyboard")
                .placeholder("space"),
            FieldSchema::new("hold_ms", "Hold (ms)", FieldType::Text)
                .default_value(serde_json::json!(DEFAULT_HOLD_MS as u64)),
        ],
        |desc| {
            let key = require_text(desc, "key")?;
            let hold = millis_param(desc, "hold_ms")?
                .unwrap_or_else(|| Duration::from_millis(DEFAULT_HOLD_MS as u64));
            let async_op = desc.async_op;
            Ok(binder(move |ctx| {
                Box::new(Press {
                    base: OperationBase::new(PRESS, async_op, ctx),
                    key: key.clone(),
                    hold,
                }) as Box<dyn AtomicOperation>
            }))
        },
    );

    registry.register(
        WAIT,
        vec![FieldSchema::new("ms", "Duration (ms)", FieldType::Text)
            .required()
            .icon("clock")],
        |desc| {
            let duration = millis_param(desc, "ms")?.ok_or_else(|| invalid(desc, "ms", "is required"))?;
            let async_op = desc.async_op;
            Ok(binder(move |ctx| {
                Box::new(Wait {
                    base: OperationBase::new(WAIT, async_op, ctx),
                    duration,
                }) as Box<dyn AtomicOperation>
            }))
        },
    );

    registry.register(
        SET_FACT,
        vec![
            FieldSchema::new("key", "Fact", FieldType::Text).required(),
            FieldSchema::new("value", "Value", FieldType::CodeEditor)
                .required()
                .language("yaml"),
        ],
        |desc| {
            if desc.async_op {
                // facts are written by the tick thread only
                return Err(EngineError::ConfigError(format!(
                    "operation '{}' cannot run asynchronously",
                    SET_FACT
                )));
            }
            let key = require_text(desc, "key")?;
            let value = desc
                .params
                .get("value")
                .cloned()
                .ok_or_else(|| invalid(desc, "value", "is required"))?;
            Ok(binder(move |ctx| {
                Box::new(SetFact {
                    base: OperationBase::new(SET_FACT, false, ctx),
                    key: key.clone(),
                    value: value.clone(),
                }) as Box<dyn AtomicOperation>
            }))
        },
    );

    registry.register(
        RECOGNIZE,
        vec![
            FieldSchema::new("target", "Target", FieldType::Text)
                .required()
                .icon("eye"),
            FieldSchema::new("result_key", "Store result as", FieldType::Text).required(),
        ],
        |desc| {
            let target = require_text(desc, "target")?;
            let result_key = require_text(desc, "result_key")?;
            let async_op = desc.async_op;
            Ok(binder(move |ctx| {
                Box::new(Recognize {
                    base: OperationBase::new(RECOGNIZE, async_op, ctx),
                    target: target.clone(),
                    result_key: result_key.clone(),
                }) as Box<dyn AtomicOperation>
            }))
        },
    );
}

fn binder<F>(bind: F) -> Binder
where
    F: Fn(Arc<RuntimeContext>) -> Box<dyn AtomicOperation> + Send + Sync + 'static,
{
    Box::new(bind)
}

fn controller_failure(base: &OperationBase, err: ControllerError) -> ActionFailure {
    ActionFailure::Controller {
        operation: base.name().to_string(),
        message: err.0,
    }
}

fn invalid(desc: &OperationDescriptor, param: &str, reason: impl Into<String>) -> EngineError {
    EngineError::ConfigError(
        ActionFailure::InvalidParameter {
            operation: desc.name.clone(),
            param: param.to_string(),
            reason: reason.into(),
        }
        .to_string(),
    )
}

fn param<'d>(desc: &'d OperationDescriptor, key: &str) -> Option<&'d Value> {
    desc.params.get(key).filter(|v| !v.is_null())
}

/// Numbers may also be written as numeric strings
fn number_param(desc: &OperationDescriptor, key: &str) -> Result<Option<f64>> {
    let number = match param(desc, key) {
        None => return Ok(None),
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(_) => None,
    };
    match number {
        Some(n) if n.is_finite() => Ok(Some(n)),
        _ => Err(invalid(desc, key, "expected a number")),
    }
}

fn require_number(desc: &OperationDescriptor, key: &str) -> Result<f64> {
    number_param(desc, key)?.ok_or_else(|| invalid(desc, key, "is required"))
}

fn millis_param(desc: &OperationDescriptor, key: &str) -> Result<Option<Duration>> {
    match number_param(desc, key)? {
        Some(ms) if ms < 0.0 => Err(invalid(desc, key, "must not be negative")),
        Some(ms) => Duration::try_from_secs_f64(ms / 1000.0)
            .map(Some)
            .map_err(|_| invalid(desc, key, "is out of range")),
        None => Ok(None),
    }
}

fn require_text(desc: &OperationDescriptor, key: &str) -> Result<String> {
    let text = match param(desc, key) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(_) => return Err(invalid(desc, key, "expected text")),
        None => String::new(),
    };
    if text.is_empty() {
        return Err(invalid(desc, key, "is required"));
    }
    Ok(text)
}
