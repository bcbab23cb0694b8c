//! # Checkpoint — Resumable Validation Progress
//!
//! One durable record per validation limit, stored as
//! `<dir>/checkpoint_<limit>.json`. Each record holds the confusion counters,
//! the resume cursor (`last_processed`) and the time it was written.
//!
//! ## Atomic Writes
//!
//! A record is written to a `.tmp` sibling and renamed over the current file,
//! so a crash mid-write leaves either the old or the new record, never a torn
//! one.
//!
//! ## Integrity
//!
//! The JSON payload is wrapped in an envelope carrying its SHA-256 digest.
//! On load the digest is recomputed; a mismatch, a parse failure, a record for
//! a different limit or a cursor past the limit all count as corruption. The
//! previous record is kept as a single `.1` backup and is tried when the
//! current one is corrupt. If neither is usable, the store reports "no
//! checkpoint" and the scan starts from the beginning.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::validate::ValidationCounters;

/// Durable snapshot of a scan in progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub limit: u64,
    pub last_processed: u64,
    pub true_positives: u64,
    pub false_positives: u64,
    pub false_negatives: u64,
    pub timestamp: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(limit: u64, counters: &ValidationCounters) -> Self {
        Checkpoint {
            limit,
            last_processed: counters.last_processed,
            true_positives: counters.true_positives,
            false_positives: counters.false_positives,
            false_negatives: counters.false_negatives,
            timestamp: Utc::now(),
        }
    }

    pub fn counters(&self) -> ValidationCounters {
        ValidationCounters {
            true_positives: self.true_positives,
            false_positives: self.false_positives,
            false_negatives: self.false_negatives,
            last_processed: self.last_processed,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct CheckpointEnvelope {
    checksum: String,
    data: serde_json::Value,
}

fn sha256_hex(data: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Directory-backed store of per-limit checkpoints.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        CheckpointStore { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, limit: u64) -> PathBuf {
        self.dir.join(format!("checkpoint_{}.json", limit))
    }

    fn backup_path(&self, limit: u64) -> PathBuf {
        let mut p = self.path_for(limit).into_os_string();
        p.push(".1");
        PathBuf::from(p)
    }

    /// Replace the record for `limit` with `counters`.
    pub fn save(&self, limit: u64, counters: &ValidationCounters) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(limit);
        if path.exists() {
            let _ = fs::rename(&path, self.backup_path(limit));
        }

        let data = serde_json::to_value(Checkpoint::new(limit, counters))?;
        let checksum = sha256_hex(&serde_json::to_string(&data)?);
        let json = serde_json::to_string_pretty(&CheckpointEnvelope { checksum, data })?;

        let tmp = path.with_extension("tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &path)?;
        debug!(limit, last_processed = counters.last_processed, path = %path.display(), "checkpoint saved");
        Ok(())
    }

    /// Counters of the newest usable record for `limit`, if any.
    pub fn load(&self, limit: u64) -> Option<ValidationCounters> {
        self.load_record(limit).map(|cp| cp.counters())
    }

    /// Full record (including timestamp) of the newest usable checkpoint.
    pub fn load_record(&self, limit: u64) -> Option<Checkpoint> {
        for (generation, path) in [self.path_for(limit), self.backup_path(limit)]
            .into_iter()
            .enumerate()
        {
            if !path.exists() {
                continue;
            }
            match read_record(&path, limit) {
                Ok(cp) => {
                    if generation > 0 {
                        warn!(path = %path.display(), "recovered checkpoint from backup generation");
                    }
                    info!(
                        limit,
                        last_processed = cp.last_processed,
                        saved_at = %cp.timestamp.to_rfc3339(),
                        "loaded checkpoint"
                    );
                    return Some(cp);
                }
                Err(e) => warn!(error = %e, "ignoring unusable checkpoint"),
            }
        }
        None
    }

    /// Remove every file belonging to the record for `limit`. Missing files
    /// are fine; the first other removal error is returned after all three
    /// removals have been attempted.
    pub fn clear(&self, limit: u64) -> Result<()> {
        let path = self.path_for(limit);
        let mut first_err = None;
        for target in [self.backup_path(limit), path.with_extension("tmp"), path] {
            match fs::remove_file(&target) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(path = %target.display(), error = %e, "could not remove checkpoint file");
                    first_err.get_or_insert(e);
                }
            }
        }
        match first_err {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }
}

fn read_record(path: &Path, limit: u64) -> Result<Checkpoint> {
    let corrupt = |reason: String| Error::CorruptCheckpoint {
        path: path.to_path_buf(),
        reason,
    };

    let raw = fs::read_to_string(path)?;
    let envelope: CheckpointEnvelope =
        serde_json::from_str(&raw).map_err(|e| corrupt(format!("unreadable envelope: {}", e)))?;

    let expected = sha256_hex(&serde_json::to_string(&envelope.data)?);
    if expected != envelope.checksum {
        return Err(corrupt(format!(
            "checksum mismatch (expected {}, found {})",
            &expected[..12],
            &envelope.checksum[..12.min(envelope.checksum.len())]
        )));
    }

    let cp: Checkpoint = serde_json::from_value(envelope.data)
        .map_err(|e| corrupt(format!("malformed record: {}", e)))?;
    if cp.limit != limit {
        return Err(corrupt(format!("record is for limit {}", cp.limit)));
    }
    if cp.last_processed > limit {
        return Err(corrupt(format!(
            "cursor {} is past limit {}",
            cp.last_processed, limit
        )));
    }
    Ok(cp)
}
