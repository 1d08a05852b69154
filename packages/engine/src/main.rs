// packages/engine/src/main.rs
//! Autopilot Engine
//!
//! Runs operation templates against a dry-run controller and builds merged
//! template artifacts.

use anyhow::{Context, Result};
use autopilot_engine::events::{EventSink, FanoutSink, FilterSink, QueueDrain, QueueSink, Reporter, TracingSink};
use autopilot_engine::observability::{init_metrics, init_tracing};
use autopilot_engine::operations::OperationRegistry;
use autopilot_engine::runtime::{DryRunController, GpuLane, Operator, ReportingHook, RuntimeContext, Session};
use autopilot_engine::settings::{truthy, PropertyAdapter, SettingsStore};
use autopilot_engine::template::TemplateStore;
use autopilot_engine::utils::config::EngineConfig;
use autopilot_engine::BuildInfo;
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "autopilot-engine", version, about = "Conditional-operation execution engine")]
struct Cli {
    /// Configuration file (defaults to ./autopilot.yaml when present)
    #[arg(long, global = true, env = "AUTOPILOT_CONFIG")]
    config: Option<PathBuf>,

    /// Persisted settings file overriding selected config values
    #[arg(long, global = true, env = "AUTOPILOT_SETTINGS")]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the configured template against a dry-run controller (ctrl-c stops)
    Run {
        /// Load the merged artifact instead of raw fragments
        #[arg(long)]
        merged: bool,

        /// Stop after this many ticks
        #[arg(long)]
        max_ticks: Option<u64>,
    },

    /// Merge the configured template's fragments into one artifact
    Merge,

    /// List templates in a sub-directory
    List {
        /// Sub-directory (defaults to the configured one)
        sub_dir: Option<String>,
    },

    /// Print operation field schemas as JSON
    Fields {
        /// Only this operation
        operation: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = EngineConfig::load_from(cli.config.as_deref()).context("loading configuration")?;
    init_tracing(&config.observability)?;
    init_metrics(config.observability.metrics_addr.as_deref())?;

    let build = BuildInfo::current();
    info!("Autopilot Engine v{} ({})", build.version, build.git_hash);

    if let Some(path) = &cli.settings {
        let store = Arc::new(SettingsStore::open(path)?);
        let read_from_merged = PropertyAdapter::new(
            store,
            "read_from_merged",
            serde_json::json!(config.templates.read_from_merged),
        )
        .on_get(truthy);
        config.templates.read_from_merged = read_from_merged.get_as()?;
    }

    match cli.command {
        Commands::Run { merged, max_ticks } => {
            if merged {
                config.templates.read_from_merged = true;
            }
            if max_ticks.is_some() {
                config.session.max_ticks = max_ticks;
            }
            run(config).await
        }
        Commands::Merge => {
            let operator = Operator::from_config(
                &config.templates,
                Arc::new(OperationRegistry::with_builtins()),
                Reporter::tracing("merge"),
            )
            .read_from_merged(false);
            operator.load()?;
            let path = operator.save_as_one_file()?;
            println!("{}", path.display());
            Ok(())
        }
        Commands::List { sub_dir } => {
            let store = TemplateStore::new(&config.templates.root);
            let sub_dir = sub_dir.unwrap_or_else(|| config.templates.sub_dir.clone());
            for name in store.list_templates(&sub_dir)? {
                println!("{}", name);
            }
            Ok(())
        }
        Commands::Fields { operation } => {
            let registry = OperationRegistry::with_builtins();
            let names: Vec<&str> = match &operation {
                Some(name) if registry.contains(name) => vec![name.as_str()],
                Some(name) => anyhow::bail!("unknown operation '{}'", name),
                None => registry.names(),
            };
            let schemas: BTreeMap<&str, _> = names
                .into_iter()
                .filter_map(|name| registry.fields(name).map(|fields| (name, fields)))
                .collect();
            println!("{}", serde_json::to_string_pretty(&schemas)?);
            Ok(())
        }
    }
}

async fn run(config: EngineConfig) -> Result<()> {
    let session_id = ulid::Ulid::new().to_string();

    let events = Arc::new(QueueSink::new(config.events.queue_capacity));
    let queue = events.queue();
    let sink = FanoutSink::new()
        .with(Arc::new(TracingSink))
        .with(Arc::new(FilterSink::failures(events as Arc<dyn EventSink>)));
    let drain = QueueDrain::spawn(
        Arc::clone(&queue),
        Duration::from_millis(config.events.drain_interval_ms),
        |event| info!(event_id = %event.id, "notify: {}", event.summary()),
    );
    let reporter = Reporter::new(&session_id, Arc::new(sink));

    let lane = Arc::new(GpuLane::start(
        &config.lane.thread_name,
        Arc::new(ReportingHook::new(reporter.clone())),
    )?);
    let context = Arc::new(RuntimeContext::new(
        &session_id,
        Arc::new(DryRunController::new()),
        lane,
    ));
    let operator = Arc::new(Operator::from_config(
        &config.templates,
        Arc::new(OperationRegistry::with_builtins()),
        reporter,
    ));

    let session = Session::new(config.session.clone(), operator, context);
    let shutdown = session.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal, cleaning up...");
            shutdown.notify_one();
        }
    });

    let outcome = session.run().await;

    let failures = drain.finish().await;
    if failures > 0 {
        warn!("{} failure events reported during the session", failures);
    }
    let stats = queue.stats();
    if stats.drop_count > 0 {
        warn!(
            "{} events dropped (queue full, {:.1}% of pushes)",
            stats.drop_count,
            stats.drop_rate()
        );
    }

    let summary = outcome?;
    println!(
        "session {}: {} ticks, {} actions, {} failures",
        session_id, summary.ticks, summary.actions, summary.failures
    );
    Ok(())
}
