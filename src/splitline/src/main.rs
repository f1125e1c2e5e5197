//! Splitline — A/B experiment engine for marketing-site templates.
//!
//! Operator CLI over a persistent experiment store: register experiments,
//! evaluate pages for a visitor, record conversions, and export results.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use splitline_analytics::{AnalyticsLogger, TracingSink};
use splitline_core::config::{AppConfig, StorageBackend};
use splitline_core::event_bus::EventSink;
use splitline_core::types::{Experiment, ExperimentConfig};
use splitline_core::SplitlineError;
use splitline_engine::ExperimentEngine;
use splitline_storage::MemoryStore;
use splitline_web::{ExperimentSession, Router};

#[derive(Parser, Debug)]
#[command(name = "splitline")]
#[command(about = "Deterministic A/B experiment assignment for marketing sites")]
#[command(version)]
struct Cli {
    /// Optional TOML config file
    #[arg(long, short, env = "SPLITLINE_CONFIG")]
    config: Option<PathBuf>,

    /// Store file (overrides config)
    #[arg(long, env = "SPLITLINE__STORAGE__PATH")]
    store: Option<PathBuf>,

    /// Key namespace (overrides config)
    #[arg(long, env = "SPLITLINE__ENGINE__NAMESPACE")]
    namespace: Option<String>,

    /// Act as this visitor instead of the one persisted in the store
    #[arg(long, env = "SPLITLINE__ENGINE__VISITOR_ID")]
    visitor: Option<String>,

    /// Register the sample experiments before running the command
    #[arg(long, default_value_t = false)]
    seed: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Register experiments from a JSON file (one object or an array)
    Create { file: PathBuf },
    /// List registered experiments
    List,
    /// Assign the visitor to an experiment
    Assign { experiment: String },
    /// Show the visitor's assignment without creating one
    Variant { experiment: String },
    /// Navigate to a page and evaluate its experiments
    Visit {
        /// Path or full URL; several values navigate in order
        #[arg(required = true)]
        locations: Vec<String>,
    },
    /// Record a goal conversion for the visitor
    Convert {
        experiment: String,
        goal: String,
        #[arg(long)]
        value: Option<f64>,
        /// Metadata as a JSON object
        #[arg(long)]
        metadata: Option<String>,
    },
    /// Print aggregated results for an experiment
    Results { experiment: String },
    /// Export all definitions and results as JSON
    Export {
        #[arg(long, short)]
        out: Option<PathBuf>,
    },
    /// Bucket a synthetic population against an experiment without touching the store
    Simulate {
        experiment: String,
        #[arg(long, default_value_t = 100_000)]
        visitors: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "splitline=info".into()),
        )
        .json()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Load configuration
    let mut config = AppConfig::load(cli.config.as_deref()).context("loading configuration")?;

    // Apply CLI overrides
    if let Some(path) = cli.store {
        config.storage.backend = StorageBackend::File;
        config.storage.path = path;
    }
    if let Some(namespace) = cli.namespace {
        config.engine.namespace = namespace;
    }
    if let Some(visitor) = cli.visitor {
        config.engine.visitor_id = Some(visitor);
    }
    if cli.seed {
        config.engine.seed_sample_data = true;
    }

    info!(
        namespace = %config.engine.namespace,
        backend = ?config.storage.backend,
        store = %config.storage.path.display(),
        analytics = config.analytics.enabled,
        "Configuration loaded"
    );

    let store = splitline_storage::open(&config.storage).context("opening experiment store")?;

    let logger = if config.analytics.enabled {
        match AnalyticsLogger::new(&config.analytics).await {
            Ok(logger) => Some(Arc::new(logger)),
            Err(e) => {
                warn!(error = %e, "Analytics logger unavailable, logging events instead");
                None
            }
        }
    } else {
        None
    };
    let sink: Arc<dyn EventSink> = match &logger {
        Some(logger) => logger.clone() as Arc<dyn EventSink>,
        None => Arc::new(TracingSink),
    };

    let engine =
        Arc::new(ExperimentEngine::from_config(&config.engine, store).with_event_sink(sink));

    let outcome = run(cli.command, engine);

    if let Some(logger) = logger {
        logger.flush().await;
    }
    outcome
}

fn run(command: Command, engine: Arc<ExperimentEngine>) -> anyhow::Result<()> {
    match command {
        Command::Create { file } => {
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            for config in ExperimentConfig::parse_definitions(&raw)? {
                let experiment = engine.create_experiment(config)?;
                println!("created {}", experiment.id);
            }
        }
        Command::List => {
            print_json(&engine.experiments())?;
        }
        Command::Assign { experiment } => {
            require_experiment(&engine, &experiment)?;
            match engine.assign(&experiment) {
                Some(assignment) => print_json(&assignment)?,
                None => println!("visitor {} not participating", engine.visitor_id()),
            }
        }
        Command::Variant { experiment } => {
            require_experiment(&engine, &experiment)?;
            match engine.user_variant(&experiment) {
                Some(assignment) => print_json(&assignment)?,
                None => println!("visitor {} has no variant", engine.visitor_id()),
            }
        }
        Command::Visit { locations } => {
            let session = Arc::new(ExperimentSession::new(Arc::clone(&engine)));
            let router = Router::new();
            router.subscribe(session.clone());

            for (i, location) in locations.iter().enumerate() {
                let event = if i == 0 {
                    router.load(location)
                } else {
                    router.push(location)
                };
                println!("{}", event.path);
                for assignment in session.active_assignments() {
                    println!("  {} -> {}", assignment.experiment_id, assignment.variant_id);
                }
            }
        }
        Command::Convert {
            experiment,
            goal,
            value,
            metadata,
        } => {
            require_experiment(&engine, &experiment)?;
            let metadata = match metadata {
                Some(raw) => serde_json::from_str(&raw).context("metadata must be a JSON object")?,
                None => serde_json::Map::new(),
            };
            match engine.track_conversion(&experiment, &goal, value, metadata) {
                Some(record) => print_json(&record)?,
                None => println!("conversion not recorded"),
            }
        }
        Command::Results { experiment } => {
            require_experiment(&engine, &experiment)?;
            let results = engine
                .results(&experiment)
                .context("results unavailable, see log")?;
            print_json(&results)?;
        }
        Command::Export { out } => {
            let json = engine.export_json()?;
            match out {
                Some(path) => {
                    std::fs::write(&path, json)
                        .with_context(|| format!("writing {}", path.display()))?;
                    info!(path = %path.display(), "Export written");
                }
                None => println!("{json}"),
            }
        }
        Command::Simulate {
            experiment,
            visitors,
        } => {
            let definition = require_experiment(&engine, &experiment)?;
            let scratch =
                ExperimentEngine::with_visitor(Arc::new(MemoryStore::new()), "simulate", "seed");
            scratch.create_experiment(ExperimentConfig {
                id: definition.id,
                name: definition.name,
                description: definition.description,
                variants: definition.variants,
                traffic_allocation: definition.traffic_allocation,
                target_pages: definition.target_pages,
                goals: definition.goals,
            })?;
            for i in 0..visitors {
                scratch
                    .for_visitor(format!("sim-{i:07}"))
                    .assign(&experiment);
            }
            let results = scratch
                .results(&experiment)
                .context("simulation produced no results")?;
            print_json(&results)?;
        }
    }
    Ok(())
}

fn require_experiment(
    engine: &ExperimentEngine,
    experiment_id: &str,
) -> anyhow::Result<Experiment> {
    engine
        .experiment(experiment_id)
        .ok_or_else(|| SplitlineError::NotFound(format!("experiment '{experiment_id}'")).into())
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
