//! # Progress — Shared Validation Progress Counters
//!
//! Lock-free counters updated by the sequential scan and by every batch
//! worker, plus a Mutex-guarded label naming the range currently in flight
//! (written once per batch, so contention is negligible).
//!
//! A background reporter thread logs a status line at a fixed interval until
//! [`Progress::stop`] is called.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tracing::info;

pub struct Progress {
    /// Candidates handed to the classifier.
    pub tested: AtomicU64,
    /// False positives plus false negatives seen so far.
    pub mismatches: AtomicU64,
    /// Batches fully processed.
    pub batches: AtomicU64,
    pub current: Mutex<String>,
    start: Instant,
    shutdown: AtomicBool,
}

impl Progress {
    pub fn new() -> Arc<Self> {
        Arc::new(Progress {
            tested: AtomicU64::new(0),
            mismatches: AtomicU64::new(0),
            batches: AtomicU64::new(0),
            current: Mutex::new(String::new()),
            start: Instant::now(),
            shutdown: AtomicBool::new(false),
        })
    }

    pub fn set_current(&self, label: String) {
        if let Ok(mut current) = self.current.lock() {
            *current = label;
        }
    }

    pub fn start_reporter(self: &Arc<Self>, interval: Duration) -> thread::JoinHandle<()> {
        let progress = Arc::clone(self);
        let tick = Duration::from_millis(200).min(interval);
        thread::spawn(move || {
            let mut last_report = Instant::now();
            while !progress.shutdown.load(Ordering::Relaxed) {
                thread::sleep(tick);
                if last_report.elapsed() >= interval {
                    progress.print_status();
                    last_report = Instant::now();
                }
            }
        })
    }

    pub fn print_status(&self) {
        let elapsed = self.start.elapsed();
        let tested = self.tested.load(Ordering::Relaxed);
        let mismatches = self.mismatches.load(Ordering::Relaxed);
        let batches = self.batches.load(Ordering::Relaxed);
        let current = self
            .current
            .lock()
            .map(|c| c.clone())
            .unwrap_or_default();
        let rate = if elapsed.as_secs() > 0 {
            tested as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };
        let h = elapsed.as_secs() / 3600;
        let m = (elapsed.as_secs() % 3600) / 60;
        let s = elapsed.as_secs() % 60;
        info!(
            current = %current,
            tested,
            mismatches,
            batches,
            rate = format_args!("{:.2}", rate),
            elapsed = format_args!("{:02}:{:02}:{:02}", h, m, s),
            "validation progress"
        );
    }

    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }
}
