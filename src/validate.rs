//! # Validate — Classifier vs. Ground-Truth Comparison
//!
//! Streams a [`PrimeClassifier`] over `[2, limit]` and compares each answer
//! against a [`PrimeSet`]. Only 2 and the odd integers are examined.
//!
//! | classifier | ground truth | recorded as |
//! |------------|--------------|-------------|
//! | prime | prime | true positive |
//! | prime | composite | false positive (number sampled) |
//! | composite | prime | false negative (number sampled) |
//! | composite | composite | not recorded |
//!
//! True negatives are intentionally not counted: they dominate every range
//! and would cost memory proportional to the scan. Accuracy is therefore
//! measured against the number of known primes, not a full confusion matrix.
//!
//! ## Batches and Checkpoints
//!
//! The scan advances in batches of `batch_size` integers. After each batch
//! the counters and the cursor (`last_processed`, the last integer of the
//! batch) are written to the [`CheckpointStore`] when one is configured. A
//! resumed run pre-seeds its counters from the stored record and restarts at
//! `last_processed + 1`. Mismatch samples are not persisted, so a resumed
//! run only samples numbers from its own part of the scan.
//!
//! ## Cancellation
//!
//! A shared stop flag is checked before every batch. When it is raised the
//! scan returns [`Error::Interrupted`] with the cursor of the last completed
//! batch; that batch is already checkpointed.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::batch::{BatchSpec, FailedBatch};
use crate::checkpoint::CheckpointStore;
use crate::classifier::PrimeClassifier;
use crate::error::{Error, Result};
use crate::prime_set::PrimeSet;
use crate::progress::Progress;

/// Global cap on retained false-positive / false-negative numbers, per list.
pub const SAMPLE_CAP: usize = 1_000;
/// Default number of integers per batch.
pub const BATCH_SIZE: u64 = 1_000_000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationCounters {
    pub true_positives: u64,
    pub false_positives: u64,
    pub false_negatives: u64,
    /// Last integer whose comparison is reflected in the counters.
    pub last_processed: u64,
}

impl ValidationCounters {
    /// First integer a scan seeded with these counters still has to examine.
    pub fn resume_from(&self) -> u64 {
        self.last_processed.saturating_add(1).max(2)
    }

    /// Commutative merge of disjoint partial results.
    pub fn merge(&mut self, other: &ValidationCounters) {
        self.true_positives += other.true_positives;
        self.false_positives += other.false_positives;
        self.false_negatives += other.false_negatives;
        self.last_processed = self.last_processed.max(other.last_processed);
    }

    pub fn mismatches(&self) -> u64 {
        self.false_positives + self.false_negatives
    }
}

/// Cap-then-ignore sample buffer: keeps the first `cap` numbers pushed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MismatchSamples {
    cap: usize,
    numbers: Vec<u64>,
}

impl MismatchSamples {
    pub fn new(cap: usize) -> Self {
        MismatchSamples {
            cap,
            numbers: Vec::new(),
        }
    }

    /// Returns false once the cap is reached and `n` was dropped.
    pub fn push(&mut self, n: u64) -> bool {
        if self.numbers.len() < self.cap {
            self.numbers.push(n);
            true
        } else {
            false
        }
    }

    pub fn absorb(&mut self, other: MismatchSamples) {
        let room = self.cap.saturating_sub(self.numbers.len());
        self.numbers.extend(other.numbers.into_iter().take(room));
    }

    pub fn as_slice(&self) -> &[u64] {
        &self.numbers
    }

    pub fn into_vec(self) -> Vec<u64> {
        self.numbers
    }

    pub fn len(&self) -> usize {
        self.numbers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.numbers.is_empty()
    }
}

/// Counters plus capped samples for one contiguous stretch of the scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeTally {
    pub counters: ValidationCounters,
    pub false_positive_numbers: MismatchSamples,
    pub false_negative_numbers: MismatchSamples,
}

impl RangeTally {
    pub fn new(sample_cap: usize) -> Self {
        Self::seeded(ValidationCounters::default(), sample_cap)
    }

    pub fn seeded(counters: ValidationCounters, sample_cap: usize) -> Self {
        RangeTally {
            counters,
            false_positive_numbers: MismatchSamples::new(sample_cap),
            false_negative_numbers: MismatchSamples::new(sample_cap),
        }
    }

    pub fn absorb(&mut self, other: RangeTally) {
        self.counters.merge(&other.counters);
        self.false_positive_numbers
            .absorb(other.false_positive_numbers);
        self.false_negative_numbers
            .absorb(other.false_negative_numbers);
    }

    /// Compare `classifier` to `ground_truth` for 2 and every odd n in
    /// `[spec.start, spec.end]`, in increasing order.
    pub fn scan<C: PrimeClassifier + ?Sized>(
        &mut self,
        spec: BatchSpec,
        ground_truth: &PrimeSet,
        classifier: &C,
        progress: Option<&Progress>,
    ) -> Result<()> {
        let mut tested = 0u64;
        let before = self.counters.mismatches();
        for n in candidates(spec) {
            let predicted = classifier.is_prime(n).map_err(|e| e.at(n))?;
            let actual = ground_truth.contains(n);
            match (predicted, actual) {
                (true, true) => self.counters.true_positives += 1,
                (true, false) => {
                    self.counters.false_positives += 1;
                    self.false_positive_numbers.push(n);
                }
                (false, true) => {
                    self.counters.false_negatives += 1;
                    self.false_negative_numbers.push(n);
                }
                (false, false) => {}
            }
            tested += 1;
        }
        self.counters.last_processed = self.counters.last_processed.max(spec.end);
        if let Some(p) = progress {
            p.tested.fetch_add(tested, Ordering::Relaxed);
            p.mismatches
                .fetch_add(self.counters.mismatches() - before, Ordering::Relaxed);
        }
        Ok(())
    }
}

/// 2 (when in range) followed by the odd integers of the batch.
fn candidates(spec: BatchSpec) -> impl Iterator<Item = u64> {
    let two = (spec.start <= 2 && 2 <= spec.end).then_some(2);
    let first_odd = spec.start.max(3) | 1;
    let odds = (first_odd <= spec.end)
        .then(|| (first_odd..=spec.end).step_by(2))
        .into_iter()
        .flatten();
    two.into_iter().chain(odds)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub accuracy: f64,
}

impl Metrics {
    pub fn from_counters(counters: &ValidationCounters, total_known_primes: u64) -> Self {
        let ratio = |num: u64, den: u64| {
            if den > 0 {
                num as f64 / den as f64
            } else {
                0.0
            }
        };
        let tp = counters.true_positives;
        let precision = ratio(tp, tp + counters.false_positives);
        let recall = ratio(tp, tp + counters.false_negatives);
        let f1_score = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };
        Metrics {
            precision,
            recall,
            f1_score,
            accuracy: ratio(tp, total_known_primes),
        }
    }
}

/// Final record of one validation run, handed to a result sink.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationResult {
    pub limit: u64,
    pub classifier: String,
    pub total_known_primes: u64,
    pub counters: ValidationCounters,
    pub false_positive_numbers: Vec<u64>,
    pub false_negative_numbers: Vec<u64>,
    pub metrics: Metrics,
    pub elapsed_secs: f64,
    /// Distributed runs only: batches skipped because the run was stopped.
    pub cancelled_batches: u64,
    /// Distributed partial-success runs only.
    pub failed_batches: Vec<FailedBatch>,
}

impl ValidationResult {
    pub fn from_tally(
        limit: u64,
        classifier: &str,
        ground_truth: &PrimeSet,
        tally: RangeTally,
        started: Instant,
    ) -> Self {
        let total_known_primes = ground_truth.count_up_to(limit);
        ValidationResult {
            limit,
            classifier: classifier.to_string(),
            total_known_primes,
            metrics: Metrics::from_counters(&tally.counters, total_known_primes),
            counters: tally.counters,
            false_positive_numbers: tally.false_positive_numbers.into_vec(),
            false_negative_numbers: tally.false_negative_numbers.into_vec(),
            elapsed_secs: started.elapsed().as_secs_f64(),
            cancelled_batches: 0,
            failed_batches: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    pub batch_size: u64,
    pub sample_cap: usize,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        ValidatorConfig {
            batch_size: BATCH_SIZE,
            sample_cap: SAMPLE_CAP,
        }
    }
}

/// Sequential, optionally checkpointed, validation driver.
#[derive(Default)]
pub struct Validator {
    config: ValidatorConfig,
    checkpoints: Option<CheckpointStore>,
    progress: Option<Arc<Progress>>,
    stop: Option<Arc<AtomicBool>>,
}

impl Validator {
    pub fn new(config: ValidatorConfig) -> Self {
        Validator {
            config,
            ..Validator::default()
        }
    }

    pub fn with_checkpoints(mut self, store: CheckpointStore) -> Self {
        self.checkpoints = Some(store);
        self
    }

    pub fn with_progress(mut self, progress: Arc<Progress>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = Some(stop);
        self
    }

    /// Validate `classifier` over `[2, limit]`. With `resume`, continue from
    /// the stored checkpoint for `limit` (if any).
    pub fn validate<C: PrimeClassifier + ?Sized>(
        &self,
        limit: u64,
        ground_truth: &PrimeSet,
        classifier: &C,
        resume: bool,
    ) -> Result<ValidationResult> {
        if self.config.batch_size == 0 {
            return Err(Error::ZeroSized {
                field: "batch size",
            });
        }
        let started = Instant::now();
        let seed = match (&self.checkpoints, resume) {
            (Some(store), true) => store.load(limit).unwrap_or_default(),
            _ => ValidationCounters::default(),
        };
        let start = seed.resume_from();
        info!(
            limit,
            classifier = classifier.name(),
            start,
            batch_size = self.config.batch_size,
            checkpointing = self.checkpoints.is_some(),
            "validating classifier"
        );

        let mut tally = RangeTally::seeded(seed, self.config.sample_cap);
        for spec in BatchSpec::cover(start, limit, self.config.batch_size) {
            if self.stop_requested() {
                info!(last_processed = tally.counters.last_processed, "stop requested");
                return Err(Error::Interrupted {
                    last_processed: tally.counters.last_processed,
                });
            }
            if let Some(p) = &self.progress {
                p.set_current(spec.to_string());
            }

            tally.scan(spec, ground_truth, classifier, self.progress.as_deref())?;

            if let Some(store) = &self.checkpoints {
                store.save(limit, &tally.counters)?;
            }
            if let Some(p) = &self.progress {
                p.batches.fetch_add(1, Ordering::Relaxed);
            }
            debug!(
                start = spec.start,
                end = spec.end,
                tp = tally.counters.true_positives,
                fp = tally.counters.false_positives,
                fn_ = tally.counters.false_negatives,
                "batch complete"
            );
        }

        if let Some(store) = &self.checkpoints {
            if let Err(e) = store.clear(limit) {
                warn!(limit, error = %e, "finished run left its checkpoint behind");
            }
        }
        let result =
            ValidationResult::from_tally(limit, classifier.name(), ground_truth, tally, started);
        log_summary(&result);
        Ok(result)
    }

    /// Fresh validation at each limit (scaling run); `ground_truth_for`
    /// supplies the prime set for a limit.
    pub fn validate_many<C, G>(
        &self,
        limits: &[u64],
        mut ground_truth_for: G,
        classifier: &C,
    ) -> Result<Vec<ValidationResult>>
    where
        C: PrimeClassifier + ?Sized,
        G: FnMut(u64) -> Result<PrimeSet>,
    {
        limits
            .iter()
            .map(|&limit| {
                let truth = ground_truth_for(limit)?;
                self.validate(limit, &truth, classifier, false)
            })
            .collect()
    }

    fn stop_requested(&self) -> bool {
        self.stop
            .as_ref()
            .is_some_and(|s| s.load(Ordering::Relaxed))
    }
}

pub(crate) fn log_summary(result: &ValidationResult) {
    info!(
        limit = result.limit,
        classifier = %result.classifier,
        known_primes = result.total_known_primes,
        tp = result.counters.true_positives,
        fp = result.counters.false_positives,
        fn_ = result.counters.false_negatives,
        precision = format_args!("{:.4}", result.metrics.precision),
        recall = format_args!("{:.4}", result.metrics.recall),
        f1 = format_args!("{:.4}", result.metrics.f1_score),
        accuracy = format_args!("{:.4}", result.metrics.accuracy),
        elapsed_secs = format_args!("{:.2}", result.elapsed_secs),
        "validation complete"
    );
}
