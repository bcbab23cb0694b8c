//! TOML configuration: sieve thresholds, validation batching, distributed
//! worker settings and the memory-pressure threshold.
//!
//! Every field has a default, so an empty file (or no file) is a valid
//! configuration. CLI flags override whatever is loaded here.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::batch::FailurePolicy;
use crate::error::{Error, Result};
use crate::sieve::SievePolicy;
use crate::validate::{ValidatorConfig, BATCH_SIZE, SAMPLE_CAP};

/// Default fraction of available memory a Standard sieve may claim.
pub const MEMORY_THRESHOLD: f64 = 0.8;
/// Default memoization cache capacity. A single scan asks about each n once,
/// so memoization is off unless a config opts in.
pub const CACHE_CAPACITY: usize = 0;

/// Top-level configuration parsed from TOML.
///
/// Maps to the `[sieve]`, `[validation]` and `[distributed]` sections plus
/// the top-level `memory_threshold` key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_memory_threshold")]
    pub memory_threshold: f64,
    #[serde(default)]
    pub sieve: SievePolicy,
    #[serde(default)]
    pub validation: ValidationSection,
    #[serde(default)]
    pub distributed: DistributedSection,
}

fn default_memory_threshold() -> f64 {
    MEMORY_THRESHOLD
}

impl Default for Config {
    fn default() -> Self {
        Config {
            memory_threshold: MEMORY_THRESHOLD,
            sieve: SievePolicy::default(),
            validation: ValidationSection::default(),
            distributed: DistributedSection::default(),
        }
    }
}

/// The `[validation]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationSection {
    pub batch_size: u64,
    pub sample_cap: usize,
    pub cache_capacity: usize,
    pub checkpoint_dir: PathBuf,
}

impl Default for ValidationSection {
    fn default() -> Self {
        ValidationSection {
            batch_size: BATCH_SIZE,
            sample_cap: SAMPLE_CAP,
            cache_capacity: CACHE_CAPACITY,
            checkpoint_dir: PathBuf::from("output"),
        }
    }
}

/// The `[distributed]` section. `workers = 0` means one per core.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistributedSection {
    pub workers: usize,
    pub failure_policy: FailurePolicy,
}

impl Config {
    /// Parse and validate a configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a configuration file; a missing path yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)?;
                Self::parse(&content)
            }
            None => Ok(Config::default()),
        }
    }

    pub fn validator_config(&self) -> ValidatorConfig {
        ValidatorConfig {
            batch_size: self.validation.batch_size,
            sample_cap: self.validation.sample_cap,
        }
    }

    /// Worker count with `0` resolved to the number of logical cores.
    pub fn worker_count(&self) -> usize {
        match self.distributed.workers {
            0 => std::thread::available_parallelism().map_or(1, |n| n.get()),
            n => n,
        }
    }

    fn validate(&self) -> Result<()> {
        let zero = |field: &'static str| -> Result<()> { Err(Error::ZeroSized { field }) };
        if self.sieve.segment_size == 0 {
            return zero("sieve.segment_size");
        }
        if self.sieve.min_segment_size == 0 {
            return zero("sieve.min_segment_size");
        }
        if self.validation.batch_size == 0 {
            return zero("validation.batch_size");
        }
        if self.sieve.standard_max > self.sieve.bit_packed_max {
            return Err(Error::InvalidConfig(format!(
                "sieve.standard_max ({}) exceeds sieve.bit_packed_max ({})",
                self.sieve.standard_max, self.sieve.bit_packed_max
            )));
        }
        if !(self.memory_threshold > 0.0 && self.memory_threshold <= 1.0) {
            return Err(Error::InvalidConfig(format!(
                "memory_threshold must be in (0, 1], got {}",
                self.memory_threshold
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sieve::{BIT_PACKED_MAX, SEGMENT_SIZE, STANDARD_MAX};

    #[test]
    fn empty_file_is_all_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.sieve.standard_max, STANDARD_MAX);
        assert_eq!(config.sieve.bit_packed_max, BIT_PACKED_MAX);
        assert_eq!(config.sieve.segment_size, SEGMENT_SIZE);
        assert_eq!(config.validation.checkpoint_dir, PathBuf::from("output"));
        assert_eq!(config.validation.cache_capacity, 0);
        assert_eq!(config.distributed.failure_policy, FailurePolicy::FailFast);
        assert_eq!(config.memory_threshold, 0.8);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = Config::parse(
            r#"
memory_threshold = 0.5

[sieve]
segment_size = 65536

[validation]
batch_size = 5000
checkpoint_dir = "/tmp/ckpt"

[distributed]
workers = 3
failure_policy = "partial-success"
"#,
        )
        .unwrap();
        assert_eq!(config.memory_threshold, 0.5);
        assert_eq!(config.sieve.segment_size, 65_536);
        assert_eq!(config.sieve.standard_max, STANDARD_MAX);
        assert_eq!(config.validation.batch_size, 5_000);
        assert_eq!(config.validation.sample_cap, SAMPLE_CAP);
        assert_eq!(config.validation.checkpoint_dir, PathBuf::from("/tmp/ckpt"));
        assert_eq!(config.worker_count(), 3);
        assert_eq!(
            config.distributed.failure_policy,
            FailurePolicy::PartialSuccess
        );
        assert_eq!(config.validator_config().batch_size, 5_000);
    }

    #[test]
    fn zero_batch_size_rejected() {
        let err = Config::parse("[validation]\nbatch_size = 0\n").unwrap_err();
        assert!(matches!(
            err,
            Error::ZeroSized {
                field: "validation.batch_size"
            }
        ));
    }

    #[test]
    fn inverted_thresholds_rejected() {
        let err = Config::parse("[sieve]\nstandard_max = 200\nbit_packed_max = 100\n").unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn memory_threshold_out_of_range_rejected() {
        assert!(Config::parse("memory_threshold = 0.0").is_err());
        assert!(Config::parse("memory_threshold = 1.5").is_err());
        assert!(Config::parse("memory_threshold = 1.0").is_ok());
    }

    #[test]
    fn unknown_policy_is_a_parse_error() {
        let err = Config::parse("[distributed]\nfailure_policy = \"yolo\"\n").unwrap_err();
        assert!(matches!(err, Error::Toml(_)));
    }

    #[test]
    fn load_from_file_and_missing_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("primeval.toml");
        std::fs::write(&path, "[validation]\nsample_cap = 10\n").unwrap();
        assert_eq!(Config::load(Some(&path)).unwrap().validation.sample_cap, 10);
        assert_eq!(Config::load(None).unwrap(), Config::default());
        assert!(matches!(
            Config::load(Some(&dir.path().join("absent.toml"))),
            Err(Error::Io(_))
        ));
    }

    #[test]
    fn zero_workers_resolves_to_cores() {
        assert!(Config::default().worker_count() >= 1);
    }
}
