//! OntoForge CLI - Command-line interface
//!
//! Usage:
//!   ontoforge extract [file] --domain legal
//!   ontoforge evaluate [file] --explain
//!   ontoforge refine [file] --max-rounds 3
//!   ontoforge dedup [file] --threshold 0.8
//!   ontoforge cache-demo
//!
//! Text is read from the file argument, or from stdin when it is absent or `-`.
//! Results are printed as JSON.

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use ontoforge_cache::{ValidationCache, ValidationOutcome};
use ontoforge_core::{EngineConfig, ExtractionStrategy, LoggingConfig, OntologyGenerationContext};
use ontoforge_critic::{evaluate_ontology, explain_score};
use ontoforge_extractor::{suggest_merges, OntologyGenerator};
use ontoforge_mediator::OntologyMediator;
use serde_json::json;
use tracing_subscriber::EnvFilter;

/// Crates whose logs follow `logging.level` when `RUST_LOG` is unset
const CRATES: &[&str] = &[
    "ontoforge_cli",
    "ontoforge_core",
    "ontoforge_extractor",
    "ontoforge_critic",
    "ontoforge_cache",
    "ontoforge_mediator",
];

#[derive(Parser)]
#[command(name = "ontoforge")]
#[command(about = "Rule-based ontology extraction with critic-driven refinement")]
#[command(version)]
struct Cli {
    /// TOML configuration file (environment variables take precedence)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract an ontology from text
    Extract {
        #[command(flatten)]
        input: InputArgs,
        /// Run relationship inference on a worker pool
        #[arg(long)]
        parallel: bool,
        /// Attach offsets, occurrence counts and source to entities
        #[arg(long)]
        include_properties: bool,
    },
    /// Extract and score an ontology
    Evaluate {
        #[command(flatten)]
        input: InputArgs,
        /// Add a human-readable explanation of the score
        #[arg(long)]
        explain: bool,
    },
    /// Run the generate, evaluate, refine cycle
    Refine {
        #[command(flatten)]
        input: InputArgs,
        /// Override the round budget
        #[arg(long)]
        max_rounds: Option<usize>,
        /// Override the convergence threshold
        #[arg(long)]
        threshold: Option<f64>,
    },
    /// Extract and suggest entity merges
    Dedup {
        #[command(flatten)]
        input: InputArgs,
        /// Minimum similarity for a suggestion
        #[arg(long, default_value_t = 0.8)]
        threshold: f64,
        /// Maximum number of suggestions
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Exercise the validation cache and print its statistics
    CacheDemo {
        /// Number of formulas to validate
        #[arg(long, default_value_t = 50)]
        formulas: usize,
    },
}

#[derive(clap::Args)]
struct InputArgs {
    /// Input text file; stdin when absent or `-`
    file: Option<PathBuf>,
    /// Document domain (general, legal, medical, business)
    #[arg(long)]
    domain: Option<String>,
    /// Extraction strategy
    #[arg(long, value_enum, default_value_t = StrategyArg::RuleBased)]
    strategy: StrategyArg,
}

#[derive(Clone, Copy, ValueEnum)]
enum StrategyArg {
    RuleBased,
    LlmBased,
    Hybrid,
}

impl From<StrategyArg> for ExtractionStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::RuleBased => ExtractionStrategy::RuleBased,
            StrategyArg::LlmBased => ExtractionStrategy::LlmBased,
            StrategyArg::Hybrid => ExtractionStrategy::Hybrid,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => EngineConfig::from_file(path)?.with_env_override()?,
        None => EngineConfig::from_env()?,
    };
    if cli.json_logs {
        config.logging.json_format = true;
    }
    init_tracing(&config.logging);
    config.validate()?;

    if config.fallback.enabled {
        tracing::warn!("fallback is enabled but no backend is configured, using rule-based extraction");
    }

    let output = tokio::task::spawn_blocking(move || run(cli.command, &config))
        .await
        .context("pipeline task failed")??;

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let directives: Vec<String> = CRATES
            .iter()
            .map(|krate| format!("{}={}", krate, logging.level))
            .collect();
        EnvFilter::new(directives.join(","))
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_file(logging.include_location)
        .with_line_number(logging.include_location);

    if logging.json_format {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn run(command: Commands, config: &EngineConfig) -> anyhow::Result<serde_json::Value> {
    match command {
        Commands::Extract {
            input,
            parallel,
            include_properties,
        } => {
            let text = read_input(&input)?;
            let mut extraction = config.extraction.clone();
            extraction.enable_parallel_inference |= parallel;
            extraction.include_properties |= include_properties;
            extraction.validate()?;

            let ctx = OntologyGenerationContext::new(source_name(&input), domain(&input, config))
                .with_strategy(input.strategy.into())
                .with_config(extraction);
            let ontology = OntologyGenerator::new().generate_ontology(&text, &ctx);
            Ok(serde_json::to_value(ontology)?)
        }
        Commands::Evaluate { input, explain } => {
            let text = read_input(&input)?;
            let ctx = context(&input, config);
            let ontology = OntologyGenerator::new().generate_ontology(&text, &ctx);
            let score = evaluate_ontology(&ontology, &ctx);

            let mut output = json!({
                "entity_count": ontology.entities.len(),
                "relationship_count": ontology.relationships.len(),
                "score": score,
            });
            if explain {
                output["explanation"] = serde_json::to_value(explain_score(&score))?;
            }
            Ok(output)
        }
        Commands::Refine {
            input,
            max_rounds,
            threshold,
        } => {
            let text = read_input(&input)?;
            let ctx = context(&input, config);

            let mut refinement = config.refinement.clone();
            if let Some(rounds) = max_rounds {
                refinement.max_rounds = rounds;
            }
            if let Some(threshold) = threshold {
                refinement.convergence_threshold = threshold;
            }

            let mediator = OntologyMediator::with_cache_config(
                Arc::new(OntologyGenerator::new()),
                refinement,
                &config.cache,
            )?;
            let outcome = mediator.run_refinement_cycle(&text, &ctx);
            Ok(serde_json::to_value(outcome)?)
        }
        Commands::Dedup {
            input,
            threshold,
            limit,
        } => {
            let text = read_input(&input)?;
            let ctx = context(&input, config);
            let ontology = OntologyGenerator::new().generate_ontology(&text, &ctx);
            let suggestions = suggest_merges(&ontology, threshold, limit, None)?;
            Ok(json!({
                "entity_count": ontology.entities.len(),
                "suggestions": suggestions,
            }))
        }
        Commands::CacheDemo { formulas } => Ok(cache_demo(formulas, config)),
    }
}

fn read_input(input: &InputArgs) -> anyhow::Result<String> {
    match &input.file {
        Some(path) if path.as_os_str() != "-" => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display())),
        _ => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("failed to read stdin")?;
            Ok(text)
        }
    }
}

fn source_name(input: &InputArgs) -> String {
    input
        .file
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "stdin".to_string())
}

fn domain(input: &InputArgs, config: &EngineConfig) -> String {
    input
        .domain
        .clone()
        .unwrap_or_else(|| config.refinement.default_domain.clone())
}

fn context(input: &InputArgs, config: &EngineConfig) -> OntologyGenerationContext {
    OntologyGenerationContext::new(source_name(input), domain(input, config))
        .with_strategy(input.strategy.into())
        .with_config(config.extraction.clone())
}

/// Validate synthetic formulas twice and report the cache statistics
fn cache_demo(formulas: usize, config: &EngineConfig) -> serde_json::Value {
    let mut cache = ValidationCache::with_config(&config.cache);
    let all: Vec<String> = (0..formulas)
        .map(|i| format!("manages(ent_{:04}, ent_{:04})", i, i + 1))
        .collect();

    for _ in 0..2 {
        for formula in &all {
            if cache.get_formula(formula).is_none() {
                cache.set_formula(formula, ValidationOutcome::consistent());
            }
        }
        if cache.get_consistency(&all).is_none() {
            cache.set_consistency(&all, ValidationOutcome::consistent());
        }
    }

    let (base, added) = all.split_at(all.len() / 2);
    if cache.get_incremental(base, added, &[]).is_none() {
        cache.set_incremental(base, added, &[], ValidationOutcome::consistent());
    }

    json!({
        "formulas": formulas,
        "stats": cache.stats(),
    })
}
