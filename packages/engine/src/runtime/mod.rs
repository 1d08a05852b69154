// packages/engine/src/runtime/mod.rs
//! Template execution runtime
//!
//! This module provides the live side of the engine:
//!
//! - **Controller**: capability traits the operations act through
//! - **GPU Lane**: single-admission FIFO lane for GPU-bound work
//! - **Context**: per-session state and capabilities, read through snapshots
//! - **Operator**: template state machine and tick dispatch
//! - **Session**: tokio-driven tick loop with graceful shutdown
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────── Session ─────────────────────────────┐
//! │  interval ──► spawn_blocking(run_tick) ──► next interval ...     │
//! │                      │                                           │
//! │                  Operator                                        │
//! │     snapshot ──► evaluate ──► dispatch matched rules in order    │
//! │                                   │                 │            │
//! │                              sync ops          async ops         │
//! │                           (tick thread)     (worker threads)     │
//! │                                   │                 │            │
//! │                                   └──── GpuLane ────┘            │
//! │                                     (one task at a time)         │
//! └──────────────────────────────────────────────────────────────────┘
//! ```

pub mod context;
pub mod controller;
pub mod gpu_lane;
pub mod operator;
pub mod session;

// Re-export commonly used types
pub use context::{ContextSnapshot, ContextState, RuntimeContext};
pub use controller::{Controller, ControllerError, DryRunController, NullRecognizer, Recognizer};
pub use gpu_lane::{CompletionHook, GpuLane, LaneHandle, LaneStats, LaneTaskReport, ReportingHook};
pub use operator::{Operator, OperatorState, RuleFailure, TickReport};
pub use session::{Session, SessionSummary};
