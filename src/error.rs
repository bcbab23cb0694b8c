//! # Error — Failure Taxonomy for Sieving and Validation
//!
//! | Variant | Raised by | Handling |
//! |---------|-----------|----------|
//! | `AllocationFailure` | sieve buffers | local fallback to a smaller footprint |
//! | `CorruptCheckpoint` | checkpoint decode | logged, treated as "no checkpoint" |
//! | `Classifier` | candidate classifier | always surfaced to the caller |
//! | `InvalidRange` / `ZeroSized` / `InvalidConfig` | argument checks | rejected before any work starts |
//! | `BatchFailed` | batch coordinator (fail-fast) | first failing batch is reported |
//! | `Interrupted` | stop flag between batches | progress is checkpointed first |

use std::path::PathBuf;

use crate::sieve::SieveStrategy;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("cannot allocate {bytes} bytes for {strategy} sieve")]
    AllocationFailure { strategy: SieveStrategy, bytes: usize },

    #[error("corrupt checkpoint {}: {reason}", path.display())]
    CorruptCheckpoint { path: PathBuf, reason: String },

    #[error("classifier failed at n={n}: {message}")]
    Classifier { n: u64, message: String },

    #[error("invalid range [{start}, {end}]")]
    InvalidRange { start: u64, end: u64 },

    #[error("{field} must be greater than zero")]
    ZeroSized { field: &'static str },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("batch [{start}, {end}] failed: {source}")]
    BatchFailed {
        start: u64,
        end: u64,
        #[source]
        source: Box<Error>,
    },

    #[error("validation interrupted after n={last_processed}")]
    Interrupted { last_processed: u64 },

    #[error("worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Error reported by a candidate classifier for a single input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ClassifierError {
    pub message: String,
}

impl ClassifierError {
    pub fn new(message: impl Into<String>) -> Self {
        ClassifierError {
            message: message.into(),
        }
    }

    /// Attach the offending input, producing the crate-level error.
    pub fn at(self, n: u64) -> Error {
        Error::Classifier {
            n,
            message: self.message,
        }
    }
}
