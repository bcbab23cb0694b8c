//! # CLI Execution Functions
//!
//! Execution logic for each subcommand, kept out of `main.rs`. Shared
//! concerns live here too: configuration loading, ground-truth construction,
//! classifier lookup and result sinks.

use anyhow::{Context, Result};
use primeval::checkpoint::CheckpointStore;
use primeval::classifier::{self, Memoized, PrimeClassifier};
use primeval::config::Config;
use primeval::prime_set::OEIS_A000040_PREFIX;
use primeval::progress::Progress;
use primeval::report::{JsonFileSink, ResultSink, TextSummarySink};
use primeval::{
    memory, BatchCoordinator, FailurePolicy, PrimeSet, SieveStrategy, ValidationResult, Validator,
};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::{Cli, StrategyArg};

const REPORT_INTERVAL: Duration = Duration::from_secs(30);

// ── Shared Setup ────────────────────────────────────────────────

pub fn load_config(cli: &Cli) -> Result<Config> {
    let config = Config::load(cli.config.as_deref()).with_context(|| match &cli.config {
        Some(path) => format!("loading config {}", path.display()),
        None => "building default config".to_string(),
    })?;
    Ok(config)
}

fn output_dir(cli: &Cli, config: &Config) -> PathBuf {
    cli.output_dir
        .clone()
        .unwrap_or_else(|| config.validation.checkpoint_dir.clone())
}

fn memory_constrained(cli: &Cli, config: &Config, limit: u64) -> bool {
    cli.low_memory || memory::should_constrain(limit, config.memory_threshold)
}

/// Sieve the ground truth for `limit` with the requested (or policy) strategy.
fn sieve_ground_truth(
    cli: &Cli,
    config: &Config,
    limit: u64,
    strategy: StrategyArg,
) -> primeval::Result<PrimeSet> {
    match strategy {
        StrategyArg::Auto => config
            .sieve
            .generate(limit, memory_constrained(cli, config, limit)),
        StrategyArg::Standard => config.sieve.generate_with(limit, SieveStrategy::Standard),
        StrategyArg::BitPacked => config.sieve.generate_with(limit, SieveStrategy::BitPacked),
        StrategyArg::Segmented => config.sieve.generate_with(limit, SieveStrategy::Segmented),
    }
}

fn resolve_classifier(name: &str, cache_capacity: usize) -> Result<Box<dyn PrimeClassifier>> {
    let inner = classifier::by_name(name).ok_or_else(|| {
        anyhow::anyhow!(
            "unknown classifier '{}' (available: {})",
            name,
            classifier::BUILTIN_NAMES.join(", ")
        )
    })?;
    if cache_capacity == 0 {
        return Ok(inner);
    }
    Ok(Box::new(Memoized::new(inner, cache_capacity)))
}

/// Stop flag raised by SIGINT or SIGTERM. Drivers check it between batches.
fn install_stop_handler() -> Arc<AtomicBool> {
    let stop = Arc::new(AtomicBool::new(false));
    let stop_flag = Arc::clone(&stop);
    std::thread::spawn(move || {
        let sig_rt = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(rt) => rt,
            Err(e) => {
                warn!(error = %e, "signal handler unavailable; Ctrl-C will not checkpoint");
                return;
            }
        };
        sig_rt.block_on(async {
            let ctrl_c = tokio::signal::ctrl_c();
            #[cfg(unix)]
            {
                match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                    Ok(mut sigterm) => {
                        tokio::select! {
                            _ = ctrl_c => {},
                            _ = sigterm.recv() => {},
                        }
                    }
                    Err(_) => {
                        let _ = ctrl_c.await;
                    }
                }
            }
            #[cfg(not(unix))]
            {
                let _ = ctrl_c.await;
            }
            info!("stop requested, finishing current batches");
            stop_flag.store(true, Ordering::Relaxed);
        });
    });
    stop
}

fn publish(cli: &Cli, config: &Config, results: &[ValidationResult]) -> Result<()> {
    let mut json = JsonFileSink::new(output_dir(cli, config));
    let mut text = TextSummarySink::new(std::io::stdout().lock());
    for result in results {
        json.accept(result)?;
        text.accept(result)?;
    }
    Ok(())
}

// ── Subcommands ─────────────────────────────────────────────────

pub fn run_sieve(
    cli: &Cli,
    config: &Config,
    limit: u64,
    strategy: StrategyArg,
    out: Option<&Path>,
) -> Result<()> {
    let primes = sieve_ground_truth(cli, config, limit, strategy)?;
    match out {
        Some(path) => {
            let file = std::fs::File::create(path)
                .with_context(|| format!("creating {}", path.display()))?;
            let mut w = BufWriter::new(file);
            for p in primes.iter() {
                writeln!(w, "{}", p)?;
            }
            w.flush()?;
            info!(path = %path.display(), primes = primes.len(), "primes written");
        }
        None => println!("{} primes <= {}", primes.len(), limit),
    }
    Ok(())
}

pub struct ValidateArgs<'a> {
    pub limit: u64,
    pub classifier: &'a str,
    pub known_primes: Option<&'a Path>,
    pub checkpoint: bool,
    pub resume: bool,
    pub batch_size: Option<u64>,
    pub strategy: StrategyArg,
}

pub fn run_validate(cli: &Cli, config: &Config, args: ValidateArgs<'_>) -> Result<()> {
    let classifier = resolve_classifier(args.classifier, config.validation.cache_capacity)?;
    let ground_truth = match args.known_primes {
        Some(path) => {
            let set = PrimeSet::load(path)?;
            if set.limit() < args.limit {
                warn!(
                    file_limit = set.limit(),
                    limit = args.limit,
                    "known primes stop short of the limit; primes above it count as composite"
                );
            }
            set
        }
        None => sieve_ground_truth(cli, config, args.limit, args.strategy)?,
    };

    let mut validator_config = config.validator_config();
    if let Some(batch_size) = args.batch_size {
        validator_config.batch_size = batch_size;
    }
    let progress = Progress::new();
    let mut validator = Validator::new(validator_config)
        .with_progress(Arc::clone(&progress))
        .with_stop_flag(install_stop_handler());
    let checkpointing = args.checkpoint || args.resume;
    if checkpointing {
        let store = CheckpointStore::new(output_dir(cli, config));
        info!(dir = %store.dir().display(), resume = args.resume, "checkpointing enabled");
        validator = validator.with_checkpoints(store);
    }

    let reporter = progress.start_reporter(REPORT_INTERVAL);
    let outcome = validator.validate(args.limit, &ground_truth, &classifier, args.resume);
    progress.stop();
    let _ = reporter.join();

    let result = match outcome {
        Err(primeval::Error::Interrupted { last_processed }) => {
            warn!(last_processed, "validation interrupted");
            if checkpointing {
                anyhow::bail!(
                    "interrupted after n = {}; rerun with --resume to continue",
                    last_processed
                );
            }
            anyhow::bail!(
                "interrupted after n = {} (no checkpoint; pass --checkpoint to make runs resumable)",
                last_processed
            );
        }
        other => other?,
    };
    publish(cli, config, &[result])
}

pub fn run_distributed(
    cli: &Cli,
    config: &Config,
    limit: u64,
    classifier: &str,
    batch_size: Option<u64>,
    policy: Option<FailurePolicy>,
) -> Result<()> {
    let classifier = resolve_classifier(classifier, config.validation.cache_capacity)?;
    let ground_truth = sieve_ground_truth(cli, config, limit, StrategyArg::Auto)?;
    let workers = cli.threads.unwrap_or_else(|| config.worker_count());
    let policy = policy.unwrap_or(config.distributed.failure_policy);

    let progress = Progress::new();
    let coordinator = BatchCoordinator::new(config.validation.sample_cap)
        .with_progress(Arc::clone(&progress))
        .with_stop_flag(install_stop_handler());
    let reporter = progress.start_reporter(REPORT_INTERVAL);
    let outcome = coordinator.run_distributed(
        limit,
        &ground_truth,
        &classifier,
        batch_size.unwrap_or(config.validation.batch_size),
        workers,
        policy,
    );
    progress.stop();
    let _ = reporter.join();

    publish(cli, config, &[outcome?])
}

pub fn run_comprehensive(
    cli: &Cli,
    config: &Config,
    limits: &[u64],
    classifier: &str,
) -> Result<()> {
    let classifier = resolve_classifier(classifier, config.validation.cache_capacity)?;
    let validator =
        Validator::new(config.validator_config()).with_stop_flag(install_stop_handler());
    let results = validator.validate_many(
        limits,
        |limit| sieve_ground_truth(cli, config, limit, StrategyArg::Auto),
        &classifier,
    )?;

    for r in &results {
        info!(
            limit = r.limit,
            accuracy = format_args!("{:.4}", r.metrics.accuracy),
            f1 = format_args!("{:.4}", r.metrics.f1_score),
            elapsed_secs = format_args!("{:.2}", r.elapsed_secs),
            "scaling point"
        );
    }
    publish(cli, config, &results)
}

pub fn run_oeis(cli: &Cli, config: &Config, limit: u64, classifier: &str) -> Result<()> {
    let reference_max = OEIS_A000040_PREFIX[OEIS_A000040_PREFIX.len() - 1];
    let checked_upto = limit.min(reference_max);
    let reference = PrimeSet::oeis_prefix(checked_upto);

    let sieved = sieve_ground_truth(cli, config, limit, StrategyArg::Auto)?;
    if !sieved.agrees_with(&reference, checked_upto) {
        anyhow::bail!("sieve disagrees with OEIS A000040 below {}", checked_upto);
    }
    info!(checked_upto, primes = reference.len(), "sieve matches OEIS A000040");

    let ground_truth = if limit <= reference_max {
        reference
    } else {
        sieved
    };
    let classifier = resolve_classifier(classifier, config.validation.cache_capacity)?;
    let result = Validator::new(config.validator_config()).validate(
        limit,
        &ground_truth,
        &classifier,
        false,
    )?;
    publish(cli, config, &[result])
}
