// packages/engine/src/runtime/operator.rs
//! Operator: the template runtime
//!
//! ```text
//!  Unloaded ──load()──► Loaded ──run_tick()──► Running ──stop()──► Stopped
//!                          └─────────────────stop()──────────────────┘
//! ```
//!
//! A tick snapshots the context, evaluates the rules and dispatches the
//! operations of every matched rule in order. Sync operations run on the
//! tick thread; async ones get a worker thread and report their outcome as
//! events. Every running operation sits in the in-flight table so `stop()`
//! can reach it from any thread.

use crate::events::{EventType, Reporter};
use crate::operations::{AtomicOperation, CompiledOperation, OperationRegistry};
use crate::rules::evaluator::evaluate;
use crate::rules::model::OperationTemplate;
use crate::runtime::context::RuntimeContext;
use crate::runtime::gpu_lane::panic_message;
use crate::template::{merge, MergedArtifact, TemplateStore};
use crate::utils::config::TemplatesConfig;
use crate::utils::errors::{ActionFailure, EngineError, Result};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde_json::json;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, error, info, warn};

/// Lifecycle state of an operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorState {
    Unloaded,
    Loaded,
    Running,
    Stopped,
}

impl std::fmt::Display for OperatorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OperatorState::Unloaded => "unloaded",
            OperatorState::Loaded => "loaded",
            OperatorState::Running => "running",
            OperatorState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// A sync operation failure inside a tick
#[derive(Debug, Clone, PartialEq)]
pub struct RuleFailure {
    pub rule_id: String,
    pub failure: ActionFailure,
}

/// What one tick did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    pub tick: u64,

    /// Matched rules, in dispatch order
    pub fired: Vec<String>,

    /// Completed sync operations
    pub actions: usize,

    pub async_dispatched: usize,

    pub failures: Vec<RuleFailure>,
}

/// Loaded template with every descriptor compiled
struct Plan {
    template: Arc<OperationTemplate>,
    operations: HashMap<String, Vec<CompiledOperation>>,
}

struct InFlight {
    rule_id: String,
    operation: Arc<dyn AtomicOperation>,
}

/// Loads one template and executes it tick by tick
pub struct Operator {
    store: TemplateStore,
    registry: Arc<OperationRegistry>,
    sub_dir: String,
    name: String,
    read_from_merged: bool,
    reporter: Reporter,

    state: Mutex<OperatorState>,
    plan: RwLock<Option<Arc<Plan>>>,

    /// Operations currently executing, sync and async
    in_flight: Arc<DashMap<u64, InFlight>>,
    next_dispatch: AtomicU64,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Operator {
    pub fn new(
        store: TemplateStore,
        registry: Arc<OperationRegistry>,
        sub_dir: impl Into<String>,
        name: impl Into<String>,
        reporter: Reporter,
    ) -> Self {
        Self {
            store,
            registry,
            sub_dir: sub_dir.into(),
            name: name.into(),
            read_from_merged: false,
            reporter,
            state: Mutex::new(OperatorState::Unloaded),
            plan: RwLock::new(None),
            in_flight: Arc::new(DashMap::new()),
            next_dispatch: AtomicU64::new(1),
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Operator for the template named in `config`
    pub fn from_config(config: &TemplatesConfig, registry: Arc<OperationRegistry>, reporter: Reporter) -> Self {
        Self::new(
            TemplateStore::new(&config.root),
            registry,
            &config.sub_dir,
            &config.template,
            reporter,
        )
        .read_from_merged(config.read_from_merged)
    }

    /// Load the merged artifact instead of the raw fragments
    pub fn read_from_merged(mut self, merged: bool) -> Self {
        self.read_from_merged = merged;
        self
    }

    pub fn state(&self) -> OperatorState {
        *self.state.lock()
    }

    pub fn sub_dir(&self) -> &str {
        &self.sub_dir
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The loaded template; `None` before load and after stop
    pub fn template(&self) -> Option<Arc<OperationTemplate>> {
        self.plan.read().as_ref().map(|plan| Arc::clone(&plan.template))
    }

    /// Number of operations currently executing
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Unloaded → Loaded
    pub fn load(&self) -> Result<()> {
        let mut state = self.state.lock();
        if *state != OperatorState::Unloaded {
            return Err(EngineError::InvalidState {
                action: "load",
                state: state.to_string(),
            });
        }

        let template = self
            .store
            .load(&self.sub_dir, &self.name, self.read_from_merged)
            .map_err(|e| match e {
                EngineError::NotFound(what) => {
                    EngineError::ConfigError(format!("template does not exist: {}", what))
                }
                other => other,
            })?;
        let operations = self.compile(&template)?;

        self.reporter.emit(
            EventType::TemplateLoaded,
            json!({
                "sub_dir": self.sub_dir,
                "template": self.name,
                "rules": template.rules.len(),
                "operations": template.operation_count(),
                "merged": self.read_from_merged,
            }),
        );

        *self.plan.write() = Some(Arc::new(Plan {
            template: Arc::new(template),
            operations,
        }));
        *state = OperatorState::Loaded;
        Ok(())
    }

    /// Run one evaluation pass. Loaded/Running → Running.
    pub fn run_tick(&self, context: &Arc<RuntimeContext>) -> Result<TickReport> {
        {
            let mut state = self.state.lock();
            match *state {
                OperatorState::Loaded | OperatorState::Running => *state = OperatorState::Running,
                other => {
                    return Err(EngineError::InvalidState {
                        action: "run a tick",
                        state: other.to_string(),
                    })
                }
            }
        }

        let plan = self.plan.read().clone().ok_or_else(|| EngineError::InvalidState {
            action: "run a tick",
            state: "without a template".to_string(),
        })?;

        let tick = context.begin_tick();
        let snapshot = context.snapshot();
        let matched = evaluate(&snapshot, &plan.template.rules);
        debug!("Tick {}: {} rules matched", tick, matched.len());

        let mut report = TickReport {
            tick,
            ..Default::default()
        };

        'rules: for rule in matched {
            if self.is_stopped() {
                debug!("Operator stopped during tick {}", tick);
                break;
            }
            report.fired.push(rule.id.clone());

            let operations = plan.operations.get(&rule.id).map(Vec::as_slice).unwrap_or_default();
            for compiled in operations {
                let operation: Arc<dyn AtomicOperation> = Arc::from(compiled.bind(Arc::clone(context)));

                if operation.is_async() {
                    self.dispatch_async(&rule.id, operation);
                    report.async_dispatched += 1;
                    continue;
                }

                match self.execute_tracked(&rule.id, &operation) {
                    Ok(()) => {
                        context.record_action(&rule.id);
                        report.actions += 1;
                        metrics::counter!("autopilot_actions_total").increment(1);
                    }
                    Err(ActionFailure::Stopped(_)) if self.is_stopped() => break 'rules,
                    Err(failure) => {
                        metrics::counter!("autopilot_action_failures_total").increment(1);
                        self.reporter.emit(
                            EventType::ActionFailed,
                            json!({
                                "tick": tick,
                                "rule": rule.id,
                                "operation": operation.name(),
                                "error": failure.to_string(),
                                "critical": rule.critical,
                            }),
                        );

                        if rule.critical {
                            error!("Critical rule '{}' failed: {}", rule.id, failure);
                            self.reporter.emit(
                                EventType::CriticalFailure,
                                json!({ "tick": tick, "rule": rule.id, "error": failure.to_string() }),
                            );
                            return Err(EngineError::CriticalActionFailed {
                                rule_id: rule.id.clone(),
                                source: failure,
                            });
                        }

                        warn!("Rule '{}' aborted: {}", rule.id, failure);
                        report.failures.push(RuleFailure {
                            rule_id: rule.id.clone(),
                            failure,
                        });
                        continue 'rules;
                    }
                }
            }
        }

        metrics::counter!("autopilot_ticks_total").increment(1);
        self.reporter.emit(
            EventType::TickCompleted,
            json!({
                "tick": tick,
                "fired": report.fired,
                "actions": report.actions,
                "async_dispatched": report.async_dispatched,
                "failures": report.failures.len(),
            }),
        );
        Ok(report)
    }

    /// Stop every in-flight operation and release the template.
    /// Safe from any thread; repeated calls are no-ops.
    pub fn stop(&self) {
        let previous = {
            let mut state = self.state.lock();
            if *state == OperatorState::Stopped {
                return;
            }
            std::mem::replace(&mut *state, OperatorState::Stopped)
        };

        let mut stopped = 0usize;
        for entry in self.in_flight.iter() {
            debug!(
                "Stopping in-flight '{}' of rule '{}'",
                entry.operation.name(),
                entry.rule_id
            );
            entry.operation.stop();
            stopped += 1;
        }
        self.in_flight.clear();
        self.plan.write().take();

        info!(
            "Operator '{}/{}' stopped (was {}, {} in-flight operations stopped)",
            self.sub_dir, self.name, previous, stopped
        );
        self.reporter.emit(
            EventType::OperatorStopped,
            json!({
                "sub_dir": self.sub_dir,
                "template": self.name,
                "previous_state": previous.to_string(),
                "stopped_operations": stopped,
            }),
        );
    }

    /// Block until every async worker has finished
    pub fn join_async(&self) {
        let workers = std::mem::take(&mut *self.workers.lock());
        for worker in workers {
            if worker.join().is_err() {
                error!("Async operation worker terminated abnormally");
            }
        }
    }

    /// Merge all raw fragments of the template and persist the artifact.
    ///
    /// Nothing is written when the merge or validation fails.
    pub fn save_as_one_file(&self) -> Result<PathBuf> {
        let state = self.state();
        if state == OperatorState::Unloaded {
            return Err(EngineError::InvalidState {
                action: "save the merged template",
                state: state.to_string(),
            });
        }

        let fragments = self.store.load_fragments(&self.sub_dir, &self.name)?;
        let template = merge(&self.sub_dir, &self.name, fragments)?;
        self.compile(&template)?;

        let artifact = MergedArtifact::encode(&template)?;
        let path = self.store.write_merged(&self.sub_dir, &self.name, &artifact)?;

        self.reporter.emit(
            EventType::TemplateMerged,
            json!({
                "sub_dir": self.sub_dir,
                "template": self.name,
                "fragments": template.fragments,
                "rules": template.rules.len(),
                "path": path.display().to_string(),
                "bytes": artifact.len(),
            }),
        );
        Ok(path)
    }

    fn is_stopped(&self) -> bool {
        *self.state.lock() == OperatorState::Stopped
    }

    fn compile(&self, template: &OperationTemplate) -> Result<HashMap<String, Vec<CompiledOperation>>> {
        let mut operations = HashMap::with_capacity(template.rules.len());
        for rule in &template.rules {
            if rule.id.trim().is_empty() {
                return Err(EngineError::ConfigError(format!(
                    "template '{}/{}' has a rule without an id",
                    template.sub_dir, template.name
                )));
            }

            let compiled = rule
                .operations
                .iter()
                .map(|descriptor| {
                    self.registry.compile(descriptor).map_err(|e| match e {
                        EngineError::ConfigError(msg) => {
                            EngineError::ConfigError(format!("rule '{}': {}", rule.id, msg))
                        }
                        other => other,
                    })
                })
                .collect::<Result<Vec<_>>>()?;

            if operations.insert(rule.id.clone(), compiled).is_some() {
                return Err(EngineError::ConfigError(format!(
                    "duplicate rule id '{}' in template '{}/{}'",
                    rule.id, template.sub_dir, template.name
                )));
            }
        }
        Ok(operations)
    }

    /// Register in the in-flight table; a late registration after stop is
    /// stopped right away
    fn track(&self, rule_id: &str, operation: &Arc<dyn AtomicOperation>) -> u64 {
        let id = self.next_dispatch.fetch_add(1, Ordering::Relaxed);
        self.in_flight.insert(
            id,
            InFlight {
                rule_id: rule_id.to_string(),
                operation: Arc::clone(operation),
            },
        );
        if self.is_stopped() {
            operation.stop();
            self.in_flight.remove(&id);
        }
        id
    }

    fn execute_tracked(&self, rule_id: &str, operation: &Arc<dyn AtomicOperation>) -> std::result::Result<(), ActionFailure> {
        let id = self.track(rule_id, operation);
        debug!("Executing '{}' of rule '{}'", operation.name(), rule_id);
        let result = run_guarded(operation.as_ref());
        self.in_flight.remove(&id);
        result
    }

    fn dispatch_async(&self, rule_id: &str, operation: Arc<dyn AtomicOperation>) {
        let id = self.track(rule_id, &operation);
        let in_flight = Arc::clone(&self.in_flight);
        let reporter = self.reporter.clone();
        let rule = rule_id.to_string();
        let name = operation.name().to_string();

        let spawned = std::thread::Builder::new()
            .name(format!("async-op-{}", id))
            .spawn(move || {
                let result = run_guarded(operation.as_ref());
                in_flight.remove(&id);
                report_async(&reporter, &rule, operation.name(), result);
            });

        let mut workers = self.workers.lock();
        workers.retain(|worker| !worker.is_finished());
        match spawned {
            Ok(worker) => {
                debug!("Dispatched async '{}' of rule '{}' as #{}", name, rule_id, id);
                workers.push(worker);
            }
            Err(e) => {
                self.in_flight.remove(&id);
                error!("Could not spawn worker for async '{}': {}", name, e);
                metrics::counter!("autopilot_action_failures_total").increment(1);
                self.reporter.emit(
                    EventType::ActionFailed,
                    json!({ "rule": rule_id, "operation": name, "async": true, "error": e.to_string() }),
                );
            }
        }
    }
}

impl Drop for Operator {
    fn drop(&mut self) {
        let state = *self.state.get_mut();
        if state == OperatorState::Running {
            self.stop();
        }
    }
}

impl std::fmt::Debug for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Operator")
            .field("sub_dir", &self.sub_dir)
            .field("name", &self.name)
            .field("read_from_merged", &self.read_from_merged)
            .field("state", &self.state())
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

/// Execute with panics turned into `ActionFailure::Panicked`
fn run_guarded(operation: &dyn AtomicOperation) -> std::result::Result<(), ActionFailure> {
    match catch_unwind(AssertUnwindSafe(|| operation.execute())) {
        Ok(result) => result,
        Err(panic) => {
            error!("Operation '{}' panicked: {}", operation.name(), panic_message(&*panic));
            Err(ActionFailure::Panicked(operation.name().to_string()))
        }
    }
}

fn report_async(reporter: &Reporter, rule: &str, operation: &str, result: std::result::Result<(), ActionFailure>) {
    match result {
        Ok(()) => {
            metrics::counter!("autopilot_actions_total").increment(1);
            reporter.emit(
                EventType::ActionCompleted,
                json!({ "rule": rule, "operation": operation, "async": true }),
            );
        }
        Err(ActionFailure::Stopped(_)) => {
            debug!("Async '{}' of rule '{}' was stopped", operation, rule);
        }
        Err(failure) => {
            metrics::counter!("autopilot_action_failures_total").increment(1);
            warn!("Async '{}' of rule '{}' failed: {}", operation, rule, failure);
            reporter.emit(
                EventType::ActionFailed,
                json!({ "rule": rule, "operation": operation, "async": true, "error": failure.to_string() }),
            );
        }
    }
}
