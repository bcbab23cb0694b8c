//! # Batch — Distributed Range Validation
//!
//! Partitions `[2, limit]` into contiguous, disjoint [`BatchSpec`]s and
//! validates them on a fixed-size rayon pool. Workers share only the
//! read-only ground truth and classifier. Batches are generated by index,
//! never materialized as a list, and each batch's [`RangeTally`] is folded
//! into its neighbour as soon as both exist. The fold keeps batch order and
//! truncates samples to the cap at every step, so memory stays bounded by
//! the worker count rather than by `limit / batch_size`. Counter totals are
//! independent of batch size and worker count.
//!
//! Distributed runs never touch the checkpoint store.
//!
//! ## Failure Policy
//!
//! The caller chooses how a failing batch (a classifier error) is handled:
//!
//! - [`FailurePolicy::FailFast`]: the run fails with the lowest failing batch
//!   among those that ran. Batches that have not started yet are skipped.
//! - [`FailurePolicy::PartialSuccess`]: the result aggregates every batch that
//!   succeeded and lists the failed ones in `failed_batches`.
//!
//! A raised stop flag skips batches that have not started; they are counted
//! in `cancelled_batches` and contribute nothing to the aggregate.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use crate::classifier::PrimeClassifier;
use crate::error::{Error, Result};
use crate::prime_set::PrimeSet;
use crate::progress::Progress;
use crate::validate::{self, RangeTally, ValidationResult, SAMPLE_CAP};

/// Inclusive range `[start, end]` assigned to one unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BatchSpec {
    pub start: u64,
    pub end: u64,
}

impl BatchSpec {
    pub fn new(start: u64, end: u64) -> Result<Self> {
        if end < start {
            return Err(Error::InvalidRange { start, end });
        }
        Ok(BatchSpec { start, end })
    }

    /// Number of integers in the batch.
    pub fn span(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Batches of `batch_size` integers covering `[2, limit]`.
    pub fn partition(limit: u64, batch_size: u64) -> Vec<BatchSpec> {
        Self::cover(2, limit, batch_size).collect()
    }

    /// Number of batches [`partition`](Self::partition) would produce.
    pub fn count(limit: u64, batch_size: u64) -> u64 {
        if limit < 2 || batch_size == 0 {
            return 0;
        }
        (limit - 2) / batch_size + 1
    }

    /// The `index`-th batch of [`partition`](Self::partition), for
    /// `index < count(limit, batch_size)`.
    pub fn nth(limit: u64, batch_size: u64, index: u64) -> BatchSpec {
        let start = 2 + index * batch_size;
        let end = start.saturating_add(batch_size - 1).min(limit);
        BatchSpec { start, end }
    }

    /// Batches of `batch_size` integers covering `[start, limit]`, the last
    /// one truncated to `limit`. Empty when `start > limit` or the size is 0.
    pub fn cover(start: u64, limit: u64, batch_size: u64) -> impl Iterator<Item = BatchSpec> {
        let mut next = (batch_size > 0 && start <= limit).then_some(start);
        std::iter::from_fn(move || {
            let lo = next?;
            let hi = lo.saturating_add(batch_size - 1).min(limit);
            next = (hi < limit).then(|| hi + 1);
            Some(BatchSpec { start: lo, end: hi })
        })
    }
}

impl fmt::Display for BatchSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    #[default]
    FailFast,
    PartialSuccess,
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "fail-fast" => Ok(FailurePolicy::FailFast),
            "partial-success" => Ok(FailurePolicy::PartialSuccess),
            other => Err(format!(
                "unknown failure policy '{}' (expected fail-fast or partial-success)",
                other
            )),
        }
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FailurePolicy::FailFast => "fail-fast",
            FailurePolicy::PartialSuccess => "partial-success",
        })
    }
}

/// A batch excluded from a partial-success aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedBatch {
    pub start: u64,
    pub end: u64,
    pub error: String,
}

/// Running aggregate of a contiguous run of batches.
struct Aggregate {
    tally: RangeTally,
    failed: Vec<FailedBatch>,
    first_failure: Option<(BatchSpec, Error)>,
    skipped: u64,
}

impl Aggregate {
    fn empty(sample_cap: usize) -> Self {
        Aggregate {
            tally: RangeTally::new(sample_cap),
            failed: Vec::new(),
            first_failure: None,
            skipped: 0,
        }
    }

    fn skipped(sample_cap: usize) -> Self {
        Aggregate {
            skipped: 1,
            ..Aggregate::empty(sample_cap)
        }
    }

    fn failed(sample_cap: usize, spec: BatchSpec, err: Error) -> Self {
        Aggregate {
            failed: vec![FailedBatch {
                start: spec.start,
                end: spec.end,
                error: err.to_string(),
            }],
            first_failure: Some((spec, err)),
            ..Aggregate::empty(sample_cap)
        }
    }

    /// `self` covers batches strictly before `later`.
    fn then(mut self, later: Aggregate) -> Self {
        self.tally.absorb(later.tally);
        self.failed.extend(later.failed);
        if self.first_failure.is_none() {
            self.first_failure = later.first_failure;
        }
        self.skipped += later.skipped;
        self
    }
}

pub struct BatchCoordinator {
    sample_cap: usize,
    progress: Option<Arc<Progress>>,
    stop: Option<Arc<AtomicBool>>,
}

impl Default for BatchCoordinator {
    fn default() -> Self {
        BatchCoordinator::new(SAMPLE_CAP)
    }
}

impl BatchCoordinator {
    pub fn new(sample_cap: usize) -> Self {
        BatchCoordinator {
            sample_cap,
            progress: None,
            stop: None,
        }
    }

    pub fn with_progress(mut self, progress: Arc<Progress>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = Some(stop);
        self
    }

    pub fn run_distributed<C: PrimeClassifier + ?Sized>(
        &self,
        limit: u64,
        ground_truth: &PrimeSet,
        classifier: &C,
        batch_size: u64,
        worker_count: usize,
        policy: FailurePolicy,
    ) -> Result<ValidationResult> {
        if batch_size == 0 {
            return Err(Error::ZeroSized {
                field: "batch size",
            });
        }
        if worker_count == 0 {
            return Err(Error::ZeroSized {
                field: "worker count",
            });
        }
        let started = Instant::now();
        let batches = BatchSpec::count(limit, batch_size);
        info!(
            limit,
            classifier = classifier.name(),
            batches,
            batch_size,
            workers = worker_count,
            policy = %policy,
            "starting distributed validation"
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(worker_count)
            .build()?;
        let abort = AtomicBool::new(false);
        let cap = self.sample_cap;
        let aggregate = pool.install(|| {
            (0..batches)
                .into_par_iter()
                .map(|i| {
                    let spec = BatchSpec::nth(limit, batch_size, i);
                    self.run_batch(spec, ground_truth, classifier, policy, &abort)
                })
                .reduce(|| Aggregate::empty(cap), Aggregate::then)
        });

        if policy == FailurePolicy::FailFast {
            if let Some((spec, err)) = aggregate.first_failure {
                return Err(Error::BatchFailed {
                    start: spec.start,
                    end: spec.end,
                    source: Box::new(err),
                });
            }
        }

        // Fail-fast skips are a consequence of the failure above; only a stop
        // request can leave skipped batches here.
        let skipped = aggregate.skipped;
        let mut result = ValidationResult::from_tally(
            limit,
            classifier.name(),
            ground_truth,
            aggregate.tally,
            started,
        );
        result.cancelled_batches = skipped;
        result.failed_batches = aggregate.failed;
        if skipped > 0 {
            warn!(cancelled = skipped, "distributed run stopped before all batches ran");
        }
        validate::log_summary(&result);
        Ok(result)
    }

    fn run_batch<C: PrimeClassifier + ?Sized>(
        &self,
        spec: BatchSpec,
        ground_truth: &PrimeSet,
        classifier: &C,
        policy: FailurePolicy,
        abort: &AtomicBool,
    ) -> Aggregate {
        let stopped = self
            .stop
            .as_ref()
            .is_some_and(|s| s.load(Ordering::Relaxed));
        if stopped || abort.load(Ordering::Relaxed) {
            return Aggregate::skipped(self.sample_cap);
        }
        if let Some(p) = &self.progress {
            p.set_current(spec.to_string());
        }

        let mut part = Aggregate::empty(self.sample_cap);
        match part
            .tally
            .scan(spec, ground_truth, classifier, self.progress.as_deref())
        {
            Ok(()) => {
                if let Some(p) = &self.progress {
                    p.batches.fetch_add(1, Ordering::Relaxed);
                }
                part
            }
            Err(err) => {
                warn!(batch = %spec, error = %err, "batch failed");
                if policy == FailurePolicy::FailFast {
                    abort.store(true, Ordering::Relaxed);
                }
                Aggregate::failed(self.sample_cap, spec, err)
            }
        }
    }
}

/// Distributed validation with default sample cap and no stop flag.
pub fn run_distributed<C: PrimeClassifier + ?Sized>(
    limit: u64,
    ground_truth: &PrimeSet,
    classifier: &C,
    batch_size: u64,
    worker_count: usize,
    policy: FailurePolicy,
) -> Result<ValidationResult> {
    BatchCoordinator::default().run_distributed(
        limit,
        ground_truth,
        classifier,
        batch_size,
        worker_count,
        policy,
    )
}
