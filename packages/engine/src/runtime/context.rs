// packages/engine/src/runtime/context.rs
//! Runtime context shared by one session
//!
//! Holds the capabilities operations act through (controller, recognizer,
//! GPU lane) and the mutable game state the rules are evaluated against.
//! Readers never see the live state: they take a `ContextSnapshot`.

use crate::rules::condition::FactSource;
use crate::runtime::controller::{Controller, NullRecognizer, Recognizer};
use crate::runtime::gpu_lane::GpuLane;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Mutable state of a session
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextState {
    /// Facts observed about the game, keyed by name
    pub facts: BTreeMap<String, serde_json::Value>,

    /// When the last synchronous operation completed
    pub last_action_at: Option<DateTime<Utc>>,

    /// Rule that produced the last completed action
    pub last_rule: Option<String>,

    /// Number of ticks started so far
    pub tick: u64,
}

/// Immutable copy of the context state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextSnapshot {
    state: ContextState,
}

impl ContextSnapshot {
    pub fn facts(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.state.facts
    }

    pub fn tick(&self) -> u64 {
        self.state.tick
    }

    pub fn last_action_at(&self) -> Option<DateTime<Utc>> {
        self.state.last_action_at
    }

    pub fn last_rule(&self) -> Option<&str> {
        self.state.last_rule.as_deref()
    }
}

impl FactSource for ContextSnapshot {
    fn fact(&self, key: &str) -> Option<&serde_json::Value> {
        self.state.facts.get(key)
    }
}

/// Per-session context handed to every bound operation
pub struct RuntimeContext {
    session_id: String,
    controller: Arc<dyn Controller>,
    recognizer: Arc<dyn Recognizer>,
    lane: Arc<GpuLane>,
    state: RwLock<ContextState>,
}

impl RuntimeContext {
    pub fn new(session_id: impl Into<String>, controller: Arc<dyn Controller>, lane: Arc<GpuLane>) -> Self {
        Self {
            session_id: session_id.into(),
            controller,
            recognizer: Arc::new(NullRecognizer),
            lane,
            state: RwLock::new(ContextState::default()),
        }
    }

    pub fn with_recognizer(mut self, recognizer: Arc<dyn Recognizer>) -> Self {
        self.recognizer = recognizer;
        self
    }

    /// Seed a fact before the session starts
    pub fn with_fact(self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.state.write().facts.insert(key.into(), value);
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn controller(&self) -> &Arc<dyn Controller> {
        &self.controller
    }

    pub fn recognizer(&self) -> &Arc<dyn Recognizer> {
        &self.recognizer
    }

    pub fn lane(&self) -> &Arc<GpuLane> {
        &self.lane
    }

    pub fn snapshot(&self) -> ContextSnapshot {
        ContextSnapshot {
            state: self.state.read().clone(),
        }
    }

    pub fn fact(&self, key: &str) -> Option<serde_json::Value> {
        self.state.read().facts.get(key).cloned()
    }

    /// Returns the previous value
    pub fn set_fact(&self, key: impl Into<String>, value: serde_json::Value) -> Option<serde_json::Value> {
        self.state.write().facts.insert(key.into(), value)
    }

    pub fn remove_fact(&self, key: &str) -> Option<serde_json::Value> {
        self.state.write().facts.remove(key)
    }

    /// Record that `rule_id` just completed an action
    pub fn record_action(&self, rule_id: &str) {
        let mut state = self.state.write();
        state.last_action_at = Some(Utc::now());
        state.last_rule = Some(rule_id.to_string());
    }

    /// Advance the tick counter, returning the new tick number
    pub(crate) fn begin_tick(&self) -> u64 {
        let mut state = self.state.write();
        state.tick += 1;
        state.tick
    }
}

impl std::fmt::Debug for RuntimeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeContext")
            .field("session_id", &self.session_id)
            .field("lane", &self.lane.name())
            .field("state", &*self.state.read())
            .finish_non_exhaustive()
    }
}
