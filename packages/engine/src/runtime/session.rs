// packages/engine/src/runtime/session.rs
//! Tick loop for one automation session
//!
//! The session owns the cadence: a tokio interval fires, the tick runs to
//! completion on a blocking thread, then the loop waits for the next
//! interval. Tick N's sync effects are therefore applied before tick N+1
//! starts. On exit the operator is stopped, async workers are joined and the
//! GPU lane is drained.

use crate::runtime::context::RuntimeContext;
use crate::runtime::operator::{Operator, OperatorState};
use crate::utils::config::SessionConfig;
use crate::utils::errors::{EngineError, Result};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

/// Totals over a finished session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionSummary {
    pub ticks: u64,

    /// Completed sync operations
    pub actions: u64,

    /// Rules aborted by a failing operation
    pub failures: u64,
}

/// Drives an operator against a context at a fixed cadence
pub struct Session {
    config: SessionConfig,
    operator: Arc<Operator>,
    context: Arc<RuntimeContext>,
    shutdown: Arc<Notify>,
}

impl Session {
    pub fn new(config: SessionConfig, operator: Arc<Operator>, context: Arc<RuntimeContext>) -> Self {
        Self {
            config,
            operator,
            context,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// `notify_one()` on the returned handle ends the session
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        Arc::clone(&self.shutdown)
    }

    pub fn operator(&self) -> &Arc<Operator> {
        &self.operator
    }

    pub fn context(&self) -> &Arc<RuntimeContext> {
        &self.context
    }

    /// Run until `max_ticks`, a shutdown request or a critical failure
    pub async fn run(&self) -> Result<SessionSummary> {
        if self.operator.state() == OperatorState::Unloaded {
            let operator = Arc::clone(&self.operator);
            if let Err(e) = join_blocking(move || operator.load()).await.and_then(|loaded| loaded) {
                error!("Session {} could not load its template: {}", self.context.session_id(), e);
                let context = Arc::clone(&self.context);
                join_blocking(move || context.lane().shutdown(true)).await?;
                return Err(e);
            }
        }

        info!(
            "Session {} started: template '{}/{}', tick every {}ms",
            self.context.session_id(),
            self.operator.sub_dir(),
            self.operator.name(),
            self.config.tick_interval_ms
        );

        let started = Instant::now();
        let outcome = self.tick_loop().await;
        self.finish().await?;

        match &outcome {
            Ok(summary) => info!(
                "Session {} finished after {:?}: {} ticks, {} actions, {} failures",
                self.context.session_id(),
                started.elapsed(),
                summary.ticks,
                summary.actions,
                summary.failures
            ),
            Err(e) => error!("Session {} aborted: {}", self.context.session_id(), e),
        }
        outcome
    }

    async fn tick_loop(&self) -> Result<SessionSummary> {
        let mut interval = tokio::time::interval(Duration::from_millis(self.config.tick_interval_ms));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut summary = SessionSummary::default();

        loop {
            if self.config.max_ticks.map_or(false, |max| summary.ticks >= max) {
                return Ok(summary);
            }

            tokio::select! {
                _ = self.shutdown.notified() => {
                    info!("Session {} shutdown requested", self.context.session_id());
                    return Ok(summary);
                }
                _ = interval.tick() => {}
            }

            let operator = Arc::clone(&self.operator);
            let context = Arc::clone(&self.context);
            match join_blocking(move || operator.run_tick(&context)).await? {
                Ok(report) => {
                    summary.ticks += 1;
                    summary.actions += report.actions as u64;
                    summary.failures += report.failures.len() as u64;
                }
                // stopped from outside the session
                Err(EngineError::InvalidState { .. }) if self.operator.state() == OperatorState::Stopped => {
                    return Ok(summary);
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn finish(&self) -> Result<()> {
        let operator = Arc::clone(&self.operator);
        let context = Arc::clone(&self.context);
        join_blocking(move || {
            operator.stop();
            operator.join_async();
            context.lane().shutdown(true);
        })
        .await
    }
}

async fn join_blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| EngineError::TaskFailed(e.to_string()))
}
