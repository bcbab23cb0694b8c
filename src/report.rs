//! # Report — Result Sinks
//!
//! A finished [`ValidationResult`] is handed to a [`ResultSink`]. Two sinks
//! ship with the crate:
//!
//! - [`JsonFileSink`]: `validation_results_<limit>.json` in an output
//!   directory, pretty-printed and written atomically (temp file + rename).
//! - [`TextSummarySink`]: a human-readable summary to any `io::Write`.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::Result;
use crate::validate::ValidationResult;

/// Mismatch numbers printed per line in the text summary.
const NUMBERS_PER_LINE: usize = 10;

pub trait ResultSink {
    fn accept(&mut self, result: &ValidationResult) -> Result<()>;
}

pub struct JsonFileSink {
    dir: PathBuf,
    written: Vec<PathBuf>,
}

impl JsonFileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        JsonFileSink {
            dir: dir.into(),
            written: Vec::new(),
        }
    }

    pub fn path_for(&self, limit: u64) -> PathBuf {
        self.dir.join(format!("validation_results_{}.json", limit))
    }

    /// Files written so far, in acceptance order.
    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }
}

impl ResultSink for JsonFileSink {
    fn accept(&mut self, result: &ValidationResult) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(result.limit);
        write_atomic(&path, serde_json::to_string_pretty(result)?.as_bytes())?;
        info!(path = %path.display(), "results written");
        self.written.push(path);
        Ok(())
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

pub struct TextSummarySink<W> {
    out: W,
}

impl<W: Write> TextSummarySink<W> {
    pub fn new(out: W) -> Self {
        TextSummarySink { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> ResultSink for TextSummarySink<W> {
    fn accept(&mut self, result: &ValidationResult) -> Result<()> {
        write_summary(&mut self.out, result)?;
        self.out.flush()?;
        Ok(())
    }
}

pub fn write_summary<W: Write>(out: &mut W, result: &ValidationResult) -> std::io::Result<()> {
    let c = &result.counters;
    let m = &result.metrics;
    writeln!(out, "Validation results for n <= {}", result.limit)?;
    writeln!(out, "  classifier:          {}", result.classifier)?;
    writeln!(out, "  known primes:        {}", result.total_known_primes)?;
    writeln!(out, "  true positives:      {}", c.true_positives)?;
    writeln!(out, "  false positives:     {}", c.false_positives)?;
    writeln!(out, "  false negatives:     {}", c.false_negatives)?;
    writeln!(out, "  precision:           {:.4}", m.precision)?;
    writeln!(out, "  recall:              {:.4}", m.recall)?;
    writeln!(out, "  f1 score:            {:.4}", m.f1_score)?;
    writeln!(out, "  accuracy:            {:.4}", m.accuracy)?;
    writeln!(out, "  elapsed:             {:.2}s", result.elapsed_secs)?;
    if result.cancelled_batches > 0 {
        writeln!(out, "  cancelled batches:   {}", result.cancelled_batches)?;
    }
    for failed in &result.failed_batches {
        writeln!(
            out,
            "  failed batch [{}, {}]: {}",
            failed.start, failed.end, failed.error
        )?;
    }
    write_numbers(out, "False positives", &result.false_positive_numbers, c.false_positives)?;
    write_numbers(out, "False negatives", &result.false_negative_numbers, c.false_negatives)?;
    Ok(())
}

fn write_numbers<W: Write>(
    out: &mut W,
    title: &str,
    numbers: &[u64],
    total: u64,
) -> std::io::Result<()> {
    if numbers.is_empty() {
        return Ok(());
    }
    if (numbers.len() as u64) < total {
        writeln!(out, "\n{} (first {} of {}):", title, numbers.len(), total)?;
    } else {
        writeln!(out, "\n{}:", title)?;
    }
    for line in numbers.chunks(NUMBERS_PER_LINE) {
        let joined: Vec<String> = line.iter().map(|n| n.to_string()).collect();
        writeln!(out, "  {}", joined.join(", "))?;
    }
    Ok(())
}
