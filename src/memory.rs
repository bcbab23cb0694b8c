//! Memory probe deciding whether a run should be treated as
//! memory-constrained.
//!
//! Available memory comes from [`sysinfo`]. A platform where sysinfo reports
//! zero available bytes is treated as unconstrained rather than forcing every
//! run onto the slower bit-packed sieve.

use sysinfo::System;
use tracing::debug;

use crate::sieve;

pub fn available_bytes() -> u64 {
    let mut sys = System::new();
    sys.refresh_memory();
    sys.available_memory()
}

/// Peak bytes of a Standard sieve up to `limit`: the composite flags plus
/// the extracted prime list.
pub fn standard_footprint(limit: u64) -> u64 {
    let flags = limit.saturating_add(1);
    let primes = sieve::estimate_prime_count(limit) as u64;
    flags.saturating_add(primes.saturating_mul(8))
}

/// True when a Standard sieve for `limit` would use more than `threshold`
/// of the memory available right now.
pub fn should_constrain(limit: u64, threshold: f64) -> bool {
    let available = available_bytes();
    let constrained = exceeds_budget(standard_footprint(limit), available, threshold);
    debug!(limit, available, threshold, constrained, "memory probe");
    constrained
}

fn exceeds_budget(footprint: u64, available: u64, threshold: f64) -> bool {
    if available == 0 {
        return false;
    }
    footprint as f64 > available as f64 * threshold
}
