// packages/engine/src/events/event.rs
//! Event record emitted by the operator, the GPU lane and the session

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// A reportable engine event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineEvent {
    /// Unique event ID
    pub id: String,

    /// Session the event belongs to
    pub session_id: String,

    pub event_type: EventType,

    pub timestamp: DateTime<Utc>,

    /// Event payload (JSON)
    pub data: serde_json::Value,
}

/// Event types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    TemplateLoaded,
    TemplateMerged,
    TickCompleted,
    ActionCompleted,
    ActionFailed,
    CriticalFailure,
    LaneTaskFailed,
    OperatorStopped,
}

impl EventType {
    /// Failure events are the ones forwarded to push notifications
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            EventType::ActionFailed | EventType::CriticalFailure | EventType::LaneTaskFailed
        )
    }
}

impl EngineEvent {
    pub fn new(session_id: impl Into<String>, event_type: EventType, data: serde_json::Value) -> Self {
        Self {
            id: Ulid::new().to_string(),
            session_id: session_id.into(),
            event_type,
            timestamp: Utc::now(),
            data,
        }
    }

    /// Short human-readable summary for notification bodies
    pub fn summary(&self) -> String {
        let detail = self
            .data
            .get("error")
            .or_else(|| self.data.get("operation"))
            .or_else(|| self.data.get("template"))
            .and_then(|v| v.as_str())
            .unwrap_or("");

        if detail.is_empty() {
            format!("{:?}", self.event_type)
        } else {
            format!("{:?}: {}", self.event_type, detail)
        }
    }
}
