// packages/engine/src/utils/config.rs
//! Engine configuration
//!
//! Layering (later wins):
//! 1. Built-in defaults
//! 2. `autopilot.yaml` in the working directory, or the file named by
//!    `AUTOPILOT_CONFIG` / `--config`
//! 3. Environment variables prefixed `AUTOPILOT__`, e.g.
//!    `AUTOPILOT__SESSION__TICK_INTERVAL_MS=100`

use crate::utils::errors::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming an explicit config file
pub const CONFIG_PATH_ENV: &str = "AUTOPILOT_CONFIG";

const DEFAULT_CONFIG_FILE: &str = "autopilot";
const ENV_PREFIX: &str = "AUTOPILOT";

/// Top-level engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub templates: TemplatesConfig,
    pub session: SessionConfig,
    pub lane: LaneConfig,
    pub events: EventsConfig,
    pub observability: ObservabilityConfig,
}

/// Where operation templates live and which one the session runs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplatesConfig {
    /// Root directory holding template sub-directories
    pub root: PathBuf,

    /// Sub-directory namespace of the active template
    pub sub_dir: String,

    /// Active template name
    pub template: String,

    /// Load the merged artifact instead of raw fragments
    pub read_from_merged: bool,
}

impl Default for TemplatesConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("config/templates"),
            sub_dir: "default".to_string(),
            template: "main".to_string(),
            read_from_merged: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Tick cadence in milliseconds
    pub tick_interval_ms: u64,

    /// Stop after this many ticks (unbounded when absent)
    pub max_ticks: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 200,
            max_ticks: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LaneConfig {
    /// Name of the GPU lane worker thread
    pub thread_name: String,
}

impl Default for LaneConfig {
    fn default() -> Self {
        Self {
            thread_name: "gpu-lane".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Capacity of the reportable-event queue
    pub queue_capacity: usize,

    /// How often the running session drains the queue
    pub drain_interval_ms: u64,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 4096,
            drain_interval_ms: 250,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_format: LogFormat,

    /// Prometheus exporter listen address; metrics are disabled when absent
    pub metrics_addr: Option<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Pretty,
            metrics_addr: None,
        }
    }
}

impl EngineConfig {
    /// Load configuration from the default file location and environment
    pub fn load() -> Result<Self> {
        match std::env::var_os(CONFIG_PATH_ENV) {
            Some(path) => Self::load_from(Some(Path::new(&path))),
            None => Self::load_from(None),
        }
    }

    /// Load configuration, reading `path` when given (it must then exist)
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let config: EngineConfig = config::Config::builder()
            .add_source(file)
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.session.tick_interval_ms == 0 {
            return Err(EngineError::ConfigError(
                "session.tick_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.events.queue_capacity == 0 {
            return Err(EngineError::ConfigError(
                "events.queue_capacity must be greater than 0".to_string(),
            ));
        }
        if self.events.drain_interval_ms == 0 {
            return Err(EngineError::ConfigError(
                "events.drain_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.templates.template.trim().is_empty() {
            return Err(EngineError::ConfigError(
                "templates.template must not be empty".to_string(),
            ));
        }
        if self.templates.sub_dir.trim().is_empty() {
            return Err(EngineError::ConfigError(
                "templates.sub_dir must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
