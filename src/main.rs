//! # Main — CLI Entry Point
//!
//! Routes subcommands to the sieve and validation drivers in `cli.rs`.
//!
//! ## Subcommands
//!
//! - `sieve`: generate the ground-truth primes for a limit.
//! - `validate`: sequential, optionally checkpointed validation of a classifier.
//! - `distributed`: batch-parallel validation on a worker pool.
//! - `comprehensive`: a fresh validation at each of several limits.
//! - `oeis`: check the sieve and a classifier against the first 100 primes.
//!
//! ## Global Options
//!
//! - `--config` / `PRIMEVAL_CONFIG`: TOML configuration file.
//! - `--output-dir` / `PRIMEVAL_OUTPUT_DIR`: checkpoints and result files
//!   (defaults to `[validation] checkpoint_dir`).
//! - `--threads`: distributed worker count (defaults to `[distributed] workers`).
//! - `--low-memory`: force the memory-constrained sieve path.

mod cli;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use primeval::FailurePolicy;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(
    name = "primeval",
    about = "Validate primality classifiers against exact sieve ground truth"
)]
pub struct Cli {
    /// TOML configuration file
    #[arg(long, env = "PRIMEVAL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory for checkpoints and result files
    #[arg(long, env = "PRIMEVAL_OUTPUT_DIR")]
    pub output_dir: Option<PathBuf>,

    /// Worker threads for distributed runs (defaults to all logical cores)
    #[arg(long)]
    pub threads: Option<usize>,

    /// Treat the run as memory-constrained regardless of available RAM
    #[arg(long)]
    pub low_memory: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Sieve strategy selection; `auto` defers to the configured policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum StrategyArg {
    Auto,
    Standard,
    BitPacked,
    Segmented,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate all primes up to a limit
    Sieve {
        #[arg(long)]
        limit: u64,
        #[arg(long, value_enum, default_value_t = StrategyArg::Auto)]
        strategy: StrategyArg,
        /// Write primes here, one per line (otherwise only the count is printed)
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Validate a classifier over [2, limit], one batch at a time
    Validate {
        #[arg(long)]
        limit: u64,
        /// trial-division, miller-rabin, gmp or odd
        #[arg(long, default_value = "miller-rabin")]
        classifier: String,
        /// Newline-delimited reference primes to use instead of sieving
        #[arg(long)]
        known_primes: Option<PathBuf>,
        /// Save a checkpoint after every batch
        #[arg(long)]
        checkpoint: bool,
        /// Continue from the last checkpoint for this limit
        #[arg(long)]
        resume: bool,
        #[arg(long)]
        batch_size: Option<u64>,
        #[arg(long, value_enum, default_value_t = StrategyArg::Auto)]
        strategy: StrategyArg,
    },
    /// Validate a classifier with batches spread over a worker pool
    Distributed {
        #[arg(long)]
        limit: u64,
        #[arg(long, default_value = "miller-rabin")]
        classifier: String,
        #[arg(long)]
        batch_size: Option<u64>,
        /// fail-fast or partial-success
        #[arg(long)]
        policy: Option<FailurePolicy>,
    },
    /// Validate a classifier at several limits
    Comprehensive {
        /// Comma-separated limits
        #[arg(long, value_delimiter = ',', default_value = "100,1000,10000,100000")]
        limits: Vec<u64>,
        #[arg(long, default_value = "miller-rabin")]
        classifier: String,
    },
    /// Check the sieve and a classifier against the first 100 primes (OEIS A000040)
    Oeis {
        #[arg(long, default_value_t = 541)]
        limit: u64,
        #[arg(long, default_value = "miller-rabin")]
        classifier: String,
    },
}

fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    // LOG_FORMAT=json for log shippers, human-readable otherwise; RUST_LOG filters.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    if log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .init();
    }

    let cli = Cli::parse();
    let config = cli::load_config(&cli)?;

    match &cli.command {
        Commands::Sieve {
            limit,
            strategy,
            out,
        } => cli::run_sieve(&cli, &config, *limit, *strategy, out.as_deref()),
        Commands::Validate {
            limit,
            classifier,
            known_primes,
            checkpoint,
            resume,
            batch_size,
            strategy,
        } => cli::run_validate(
            &cli,
            &config,
            cli::ValidateArgs {
                limit: *limit,
                classifier,
                known_primes: known_primes.as_deref(),
                checkpoint: *checkpoint,
                resume: *resume,
                batch_size: *batch_size,
                strategy: *strategy,
            },
        ),
        Commands::Distributed {
            limit,
            classifier,
            batch_size,
            policy,
        } => cli::run_distributed(&cli, &config, *limit, classifier, *batch_size, *policy),
        Commands::Comprehensive { limits, classifier } => {
            cli::run_comprehensive(&cli, &config, limits, classifier)
        }
        Commands::Oeis { limit, classifier } => cli::run_oeis(&cli, &config, *limit, classifier),
    }
}
