// packages/engine/tests/engine_scenarios.rs
//! End-to-end scenarios across the template store, operator, operations and
//! GPU lane

use autopilot_engine::events::{ChannelSink, EngineEvent, EventType, Reporter};
use autopilot_engine::operations::OperationRegistry;
use autopilot_engine::runtime::{
    CompletionHook, Controller, ControllerError, GpuLane, LaneTaskReport, Operator, OperatorState,
    RuntimeContext,
};
use autopilot_engine::template::TemplateStore;
use autopilot_engine::EngineError;
use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::{tempdir, TempDir};

#[derive(Default)]
struct TurnRecorder {
    turns: Mutex<Vec<f64>>,
    presses: Mutex<Vec<String>>,
}

impl Controller for TurnRecorder {
    fn turn_by_distance(&self, distance: f64) -> Result<(), ControllerError> {
        self.turns.lock().push(distance);
        Ok(())
    }

    fn press_key(&self, key: &str, _hold: Duration) -> Result<(), ControllerError> {
        self.presses.lock().push(key.to_string());
        Ok(())
    }
}

struct SilentHook;

impl CompletionHook for SilentHook {
    fn on_complete(&self, _report: &LaneTaskReport) {}
}

const FRAGMENT_A: &str = r#"rules:
  - id: turn-left
    when: facing == east
    operations:
      - name: turn
        params: { distance: -90 }
"#;

const FRAGMENT_B: &str = r#"rules:
  - id: turn-right
    when: facing == west
    operations:
      - name: turn
        params: { distance: 90 }
"#;

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

fn operator(dir: &TempDir, merged: bool) -> (Operator, Receiver<EngineEvent>) {
    let (tx, rx) = crossbeam_channel::unbounded();
    let operator = Operator::new(
        TemplateStore::new(dir.path()),
        Arc::new(OperationRegistry::with_builtins()),
        "combat",
        "navigate",
        Reporter::new("scenario", Arc::new(ChannelSink::new(tx))),
    )
    .read_from_merged(merged);
    (operator, rx)
}

fn context(controller: Arc<TurnRecorder>) -> Arc<RuntimeContext> {
    let lane = Arc::new(GpuLane::start("scenario-lane", Arc::new(SilentHook)).unwrap());
    Arc::new(RuntimeContext::new("scenario", controller, lane))
}

#[test]
fn facing_east_dispatches_only_turn_left_once() {
    let dir = tempdir().unwrap();
    write(dir.path(), "combat/navigate/a.yaml", FRAGMENT_A);
    write(dir.path(), "combat/navigate/b.yaml", FRAGMENT_B);

    let (operator, _events) = operator(&dir, false);
    operator.load().unwrap();

    let controller = Arc::new(TurnRecorder::default());
    let context = context(Arc::clone(&controller));
    context.set_fact("facing", json!("east"));

    let report = operator.run_tick(&context).unwrap();

    assert_eq!(report.fired, vec!["turn-left"]);
    assert_eq!(report.actions, 1);
    assert_eq!(*controller.turns.lock(), vec![-90.0]);
    assert_eq!(context.snapshot().last_rule(), Some("turn-left"));
}

#[test]
fn duplicate_rule_id_aborts_merge_without_writing() {
    let dir = tempdir().unwrap();
    let attack = "rules:\n  - id: attack\n    operations:\n      - name: press\n        params: { key: j }\n";
    write(dir.path(), "combat/navigate/a.yaml", attack);
    write(dir.path(), "combat/navigate/b.yaml", FRAGMENT_B);

    let (operator, _events) = operator(&dir, false);
    operator.load().unwrap();

    // a second fragment now declares the same id
    write(dir.path(), "combat/navigate/b.yaml", attack);
    let artifact = dir.path().join("combat/navigate.yaml");

    let err = operator.save_as_one_file().unwrap_err();
    assert!(matches!(err, EngineError::MergeConflict { ref rule_id, .. } if rule_id == "attack"));
    assert!(!artifact.exists());

    // an existing artifact is left untouched
    std::fs::write(&artifact, "previous").unwrap();
    assert!(operator.save_as_one_file().is_err());
    assert_eq!(std::fs::read_to_string(&artifact).unwrap(), "previous");

    let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("combat"))
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with('.'))
        .collect();
    assert!(leftovers.is_empty());
}

#[test]
fn duplicate_rule_id_fails_raw_load() {
    let dir = tempdir().unwrap();
    write(dir.path(), "combat/navigate/a.yaml", FRAGMENT_A);
    write(dir.path(), "combat/navigate/b.yaml", FRAGMENT_A);

    let (operator, _events) = operator(&dir, false);
    assert!(matches!(operator.load(), Err(EngineError::MergeConflict { .. })));
    assert_eq!(operator.state(), OperatorState::Unloaded);
}

#[test]
fn merged_artifact_behaves_like_raw_fragments() {
    let dir = tempdir().unwrap();
    write(dir.path(), "combat/navigate/a.yaml", FRAGMENT_A);
    write(dir.path(), "combat/navigate/b.yaml", FRAGMENT_B);

    let (raw, _events) = operator(&dir, false);
    raw.load().unwrap();
    let path = raw.save_as_one_file().unwrap();
    let first = std::fs::read(&path).unwrap();

    // merging again is byte-identical
    raw.save_as_one_file().unwrap();
    assert_eq!(std::fs::read(&path).unwrap(), first);

    let (merged, _events) = operator(&dir, true);
    merged.load().unwrap();

    for facing in ["east", "west", "north"] {
        let raw_controller = Arc::new(TurnRecorder::default());
        let raw_context = context(Arc::clone(&raw_controller));
        raw_context.set_fact("facing", json!(facing));

        let merged_controller = Arc::new(TurnRecorder::default());
        let merged_context = context(Arc::clone(&merged_controller));
        merged_context.set_fact("facing", json!(facing));

        let raw_report = raw.run_tick(&raw_context).unwrap();
        let merged_report = merged.run_tick(&merged_context).unwrap();

        assert_eq!(raw_report.fired, merged_report.fired, "facing {}", facing);
        assert_eq!(*raw_controller.turns.lock(), *merged_controller.turns.lock());
    }
}

#[test]
fn exclusive_rules_fire_only_the_highest_priority() {
    let dir = tempdir().unwrap();
    write(
        dir.path(),
        "combat/navigate/a.yaml",
        r#"rules:
  - id: heal
    when: hp < 50
    exclusive: true
    priority: 5
    operations:
      - name: press
        params: { key: h }
  - id: flee
    when: hp < 20
    exclusive: true
    priority: 10
    operations:
      - name: press
        params: { key: f }
  - id: look
    operations:
      - name: turn
        params: { distance: 5 }
"#,
    );

    let (operator, _events) = operator(&dir, false);
    operator.load().unwrap();
    let controller = Arc::new(TurnRecorder::default());
    let context = context(Arc::clone(&controller));

    context.set_fact("hp", json!(10));
    assert_eq!(operator.run_tick(&context).unwrap().fired, vec!["flee", "look"]);

    context.set_fact("hp", json!(30));
    assert_eq!(operator.run_tick(&context).unwrap().fired, vec!["heal", "look"]);

    assert_eq!(*controller.presses.lock(), vec!["f", "h"]);
}

#[test]
fn async_operations_report_completion_and_stop_cleanly() {
    let dir = tempdir().unwrap();
    write(
        dir.path(),
        "combat/navigate/a.yaml",
        r#"rules:
  - id: dodge
    operations:
      - name: press
        async_op: true
        params: { key: shift, hold_ms: 1 }
  - id: channel
    operations:
      - name: wait
        async_op: true
        params: { ms: 60000 }
"#,
    );

    let (operator, events) = operator(&dir, false);
    operator.load().unwrap();
    let controller = Arc::new(TurnRecorder::default());
    let context = context(Arc::clone(&controller));

    let report = operator.run_tick(&context).unwrap();
    assert_eq!(report.async_dispatched, 2);

    let deadline = Instant::now() + Duration::from_secs(5);
    let completed = loop {
        let event = events
            .recv_timeout(deadline.saturating_duration_since(Instant::now()))
            .expect("no completion event");
        if event.event_type == EventType::ActionCompleted {
            break event;
        }
    };
    assert_eq!(completed.data["rule"], json!("dodge"));

    let started = Instant::now();
    operator.stop();
    operator.stop();
    operator.join_async();
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(operator.in_flight(), 0);
    assert_eq!(operator.state(), OperatorState::Stopped);
    assert_eq!(*controller.presses.lock(), vec!["shift"]);

    context.lane().shutdown(true);
}
