// packages/engine/src/events/mod.rs
//! Reportable engine events
//!
//! Failures during live control never terminate the process. They are
//! turned into `EngineEvent`s and handed to an `EventSink`, from where the
//! notification collaborator picks them up.
//!
//! - **Event**: event record and event types
//! - **Queue**: bounded lock-free queue buffering events for consumers
//! - **Sink**: delivery targets (tracing, queue, channel, filter, fan-out)
//! - **Notifier**: background task draining a queue while a session runs
//!
//! ```text
//! Operator / GPU lane → EventSink::emit() → FilterSink → QueueSink → QueueDrain → notifier
//!                                         → TracingSink → logs
//! ```

pub mod event;
pub mod notifier;
pub mod queue;
pub mod sink;

pub use event::{EngineEvent, EventType};
pub use notifier::QueueDrain;
pub use queue::{EventQueue, QueueStats};
pub use sink::{ChannelSink, EventSink, FanoutSink, FilterSink, QueueSink, Reporter, TracingSink};
