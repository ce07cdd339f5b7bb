//! ProcureSense CLI: the main entry point.
//!
//! Commands:
//! - `allocate`  Show the per-tier split of a token budget
//! - `context`   Build a layered context and print its metadata or prompt
//! - `validate`  Validate one candidate output against the ruleset
//! - `batch`     Validate a JSON-lines file of candidates concurrently
//! - `rules`     List or check the active ruleset
//! - `init`      Write default config and rules files

use clap::{Parser, Subcommand};
use procuresense_config::{AppConfig, LoggingConfig};
use procuresense_critic::ComplianceStatus;
use std::path::PathBuf;

mod commands;

/// Exit code for a FLAGGED verdict.
const EXIT_FLAGGED: i32 = 2;

#[derive(Parser)]
#[command(
    name = "procuresense",
    about = "ProcureSense: tiered context budgeting and policy compliance for procurement agents",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to ~/.procuresense/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the total token budget
    #[arg(short, long, global = true, allow_negative_numbers = true)]
    budget: Option<i64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show how a total token budget splits across the four tiers
    Allocate {
        /// Total budget (defaults to the configured one)
        #[arg(allow_negative_numbers = true)]
        total: Option<i64>,
    },

    /// Build a layered context from fragment files
    Context {
        #[command(flatten)]
        inputs: commands::ContextInputs,

        /// Print the rendered prompt instead of metadata
        #[arg(long)]
        render: bool,
    },

    /// Validate a candidate output (exit code 2 when FLAGGED)
    Validate(commands::validate::ValidateArgs),

    /// Validate a JSON-lines file of candidates concurrently
    Batch {
        /// Input file, one JSON object per line
        input: PathBuf,

        /// Maximum validations in flight
        #[arg(long, default_value_t = 8)]
        concurrency: usize,
    },

    /// Inspect the active policy ruleset
    Rules {
        #[command(subcommand)]
        action: RulesAction,
    },

    /// Write default config and rules files
    Init {
        /// Print the defaults instead of writing files
        #[arg(long)]
        print: bool,
    },
}

#[derive(Subcommand)]
enum RulesAction {
    /// List every rule
    List,
    /// Compile a ruleset and check it fits the policy tier
    Check {
        /// Ruleset file (defaults to the configured one)
        file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), commands::BoxError> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => AppConfig::load_with_env(path)?,
        None => AppConfig::load()?,
    };
    if let Some(budget) = cli.budget {
        config.context.total_budget = budget;
    }

    init_tracing(&config.logging, cli.verbose);

    match cli.command {
        Commands::Allocate { total } => {
            commands::allocate::run(total.unwrap_or(config.context.total_budget))?
        }
        Commands::Context { inputs, render } => commands::context::run(&config, &inputs, render)?,
        Commands::Validate(args) => {
            if commands::validate::run(&config, &args)? == ComplianceStatus::Flagged {
                std::process::exit(EXIT_FLAGGED);
            }
        }
        Commands::Batch { input, concurrency } => {
            commands::batch::run(config, &input, concurrency).await?
        }
        Commands::Rules { action } => match action {
            RulesAction::List => commands::rules::list(&config)?,
            RulesAction::Check { file } => commands::rules::check(&config, file.as_deref())?,
        },
        Commands::Init { print } => commands::init::run(print)?,
    }

    Ok(())
}

/// Logs go to stderr so stdout stays machine-readable.
fn init_tracing(logging: &LoggingConfig, verbose: bool) {
    let filter = if verbose { "debug" } else { logging.level.as_str() };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(filter))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    if logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }
}
