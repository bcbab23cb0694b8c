//! # primeval — Primality Ground Truth and Classifier Validation
//!
//! Builds an exact set of primes up to a limit under bounded memory, then
//! measures a candidate primality classifier against it:
//!
//! - [`sieve`] picks a standard, bit-packed or segmented sieve from the
//!   limit and memory pressure, falling back on allocation failure.
//! - [`validate`] scans `[2, limit]` in batches, checkpointing progress to a
//!   [`checkpoint::CheckpointStore`] so an interrupted run can resume.
//! - [`batch`] splits the range into disjoint batches and runs them on a
//!   worker pool, merging partial results.
//! - [`report`] hands the finished [`validate::ValidationResult`] to a sink.

pub mod batch;
pub mod checkpoint;
pub mod classifier;
pub mod config;
pub mod error;
pub mod memory;
pub mod prime_set;
pub mod progress;
pub mod report;
pub mod sieve;
pub mod validate;

pub use batch::{run_distributed, BatchCoordinator, BatchSpec, FailurePolicy};
pub use classifier::PrimeClassifier;
pub use error::{ClassifierError, Error, Result};
pub use prime_set::PrimeSet;
pub use sieve::{SievePolicy, SieveStrategy};
pub use validate::{ValidationCounters, ValidationResult, Validator, ValidatorConfig};
