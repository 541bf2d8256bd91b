use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::json;
use uuid::Uuid;

use wayfarer_core::{Catalog, ReviewDecision, TravelRequest};
use wayfarer_runtime::{
    Calculator, CatalogSearch, CatalogSynthesizer, Fault, FaultInjector, FanoutRecorder,
    FileReviewStore, FixedRateCurrency, MemoryRecorder, Orchestrator, OrchestratorBuilder,
    PlanOutcome, RuntimeConfig, TracingRecorder,
};

const DEFAULT_REVIEW_DIR: &str = ".wayfarer/reviews";

#[derive(Parser)]
#[command(name = "wayfarer")]
#[command(author, version, about = "Plan budget itineraries against unreliable dependencies", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Runtime configuration (YAML); defaults apply when absent
    #[arg(long, global = true, env = "WAYFARER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory holding pending and resolved reviews
    #[arg(long, global = true, default_value = DEFAULT_REVIEW_DIR)]
    pub review_dir: PathBuf,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Plan an itinerary
    Plan {
        #[arg(long)]
        destination: String,

        #[arg(long)]
        days: u32,

        #[arg(long)]
        budget: f64,

        #[arg(long, default_value = "AED")]
        currency: String,

        /// Make a dependency fail on every attempt (repeatable)
        #[arg(long, value_enum)]
        fail: Vec<FailArg>,

        /// Additional catalog file (JSON)
        #[arg(long)]
        catalog: Vec<PathBuf>,

        /// Include the run's trace events in the output
        #[arg(long)]
        trace: bool,
    },

    /// Resolve a pending review
    Resolve {
        request_id: Uuid,

        #[arg(long, value_enum)]
        decision: DecisionArg,
    },

    /// List pending reviews
    Pending,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum FailArg {
    Search,
    Synthesis,
    Currency,
    Calculator,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum DecisionArg {
    Approve,
    Reduce,
}

impl From<DecisionArg> for ReviewDecision {
    fn from(arg: DecisionArg) -> Self {
        match arg {
            DecisionArg::Approve => ReviewDecision::Approve,
            DecisionArg::Reduce => ReviewDecision::AutoReduce,
        }
    }
}

pub async fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Commands::Plan {
            destination,
            days,
            budget,
            currency,
            fail,
            catalog,
            trace,
        } => {
            let mut catalogs = vec![Catalog::dubai()];
            for path in &catalog {
                catalogs.push(
                    Catalog::from_json_file(path)
                        .with_context(|| format!("Failed to load catalog {}", path.display()))?,
                );
            }

            let recorder = Arc::new(MemoryRecorder::new());
            let orchestrator = builder(config, &cli.review_dir, catalogs, &fail)
                .recorder(Arc::new(
                    FanoutRecorder::new()
                        .with(Arc::new(TracingRecorder))
                        .with(recorder.clone()),
                ))
                .build()
                .context("Invalid runtime configuration")?;

            let request = TravelRequest::new(destination, days, budget, currency);
            let outcome = orchestrator.plan(request).await?;

            if let PlanOutcome::ReviewRequired(review) = &outcome {
                eprintln!(
                    "Review required ({}). Resolve with: wayfarer resolve {} --decision approve|reduce",
                    review.verdict.describe(),
                    review.request_id
                );
            }

            let mut output = serde_json::to_value(&outcome)?;
            if trace {
                output = json!({
                    "result": output,
                    "trace": serde_json::to_value(recorder.events())?,
                });
            }
            println!("{}", serde_json::to_string_pretty(&output)?);
        }

        Commands::Resolve {
            request_id,
            decision,
        } => {
            let orchestrator = builder(config, &cli.review_dir, vec![Catalog::dubai()], &[])
                .build()
                .context("Invalid runtime configuration")?;
            let outcome = orchestrator
                .resolve_review(request_id, decision.into())
                .await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }

        Commands::Pending => {
            let orchestrator = builder(config, &cli.review_dir, vec![Catalog::dubai()], &[])
                .build()
                .context("Invalid runtime configuration")?;
            for review in orchestrator.pending_reviews().await? {
                println!(
                    "{}  {}  {:.2} {} / budget {:.2}  {}",
                    review.request_id,
                    review.candidate.destination,
                    review.candidate.total_cost,
                    review.candidate.currency,
                    review.budget_amount,
                    review.verdict.describe()
                );
            }
        }
    }

    Ok(())
}

fn load_config(path: Option<&PathBuf>) -> Result<RuntimeConfig> {
    match path {
        Some(path) => {
            tracing::debug!(path = %path.display(), "Loading runtime config");
            RuntimeConfig::from_yaml_file(path)
                .with_context(|| format!("Failed to load config {}", path.display()))
        }
        None => Ok(RuntimeConfig::default()),
    }
}

/// Wire offline dependencies, with `fail` ones wrapped to always fail.
fn builder(
    config: RuntimeConfig,
    review_dir: &Path,
    catalogs: Vec<Catalog>,
    fail: &[FailArg],
) -> OrchestratorBuilder {
    let shared = Arc::new(catalogs.clone());
    let fault = |arg: FailArg| {
        if fail.contains(&arg) {
            Fault::Fail
        } else {
            Fault::Pass
        }
    };

    let mut builder = Orchestrator::builder()
        .config(config)
        .store(Arc::new(FileReviewStore::new(review_dir)))
        .search(Arc::new(FaultInjector::always(
            CatalogSearch::new(shared.clone()),
            fault(FailArg::Search),
        )))
        .synthesis(Arc::new(FaultInjector::always(
            CatalogSynthesizer::new(shared),
            fault(FailArg::Synthesis),
        )))
        .currency(Arc::new(FaultInjector::always(
            FixedRateCurrency::default(),
            fault(FailArg::Currency),
        )))
        .calculator(Arc::new(FaultInjector::always(
            Calculator,
            fault(FailArg::Calculator),
        )));

    // the builder starts with the Dubai catalog
    for catalog in catalogs.into_iter().skip(1) {
        builder = builder.catalog(catalog);
    }
    builder
}
