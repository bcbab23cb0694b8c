//! # PrimeSet — Immutable Ground-Truth Prime Collection
//!
//! An ascending, duplicate-free list of primes together with the limit it was
//! built for. Produced by the sieve or imported from a trusted reference file;
//! both sources are handled identically downstream. Membership is a binary
//! search, so a set is safe to share read-only across worker threads.
//!
//! ## Import Format
//!
//! One integer per line. Blank and unparsable lines are skipped (and counted);
//! surrounding whitespace is ignored. Order and duplicates in the file do not
//! matter.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{info, warn};

use crate::error::Result;

/// First 100 primes (OEIS A000040), used as an independent reference list.
pub const OEIS_A000040_PREFIX: [u64; 100] = [
    2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37, 41, 43, 47, 53, 59, 61, 67, 71, 73, 79, 83, 89, 97,
    101, 103, 107, 109, 113, 127, 131, 137, 139, 149, 151, 157, 163, 167, 173, 179, 181, 191, 193,
    197, 199, 211, 223, 227, 229, 233, 239, 241, 251, 257, 263, 269, 271, 277, 281, 283, 293, 307,
    311, 313, 317, 331, 337, 347, 349, 353, 359, 367, 373, 379, 383, 389, 397, 401, 409, 419, 421,
    431, 433, 439, 443, 449, 457, 461, 463, 467, 479, 487, 491, 499, 503, 509, 521, 523, 541,
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimeSet {
    limit: u64,
    primes: Vec<u64>,
}

impl PrimeSet {
    pub fn empty(limit: u64) -> Self {
        PrimeSet {
            limit,
            primes: Vec::new(),
        }
    }

    /// Wrap an already ascending, duplicate-free list.
    pub fn from_sorted(limit: u64, primes: Vec<u64>) -> Self {
        debug_assert!(
            primes.windows(2).all(|w| w[0] < w[1]),
            "PrimeSet::from_sorted requires strictly ascending input"
        );
        PrimeSet { limit, primes }
    }

    /// Build from arbitrary order; the limit becomes the largest element.
    pub fn from_unsorted(mut primes: Vec<u64>) -> Self {
        primes.sort_unstable();
        primes.dedup();
        let limit = primes.last().copied().unwrap_or(0);
        PrimeSet { limit, primes }
    }

    /// The OEIS reference prefix restricted to `limit`.
    pub fn oeis_prefix(limit: u64) -> Self {
        let primes = OEIS_A000040_PREFIX
            .iter()
            .copied()
            .take_while(|&p| p <= limit)
            .collect();
        PrimeSet { limit, primes }
    }

    /// Load a newline-delimited reference file.
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let set = Self::from_reader(BufReader::new(file))?;
        info!(
            path = %path.display(),
            primes = set.len(),
            limit = set.limit,
            "loaded known primes"
        );
        Ok(set)
    }

    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut primes = Vec::new();
        let mut skipped = 0u64;
        for line in reader.lines() {
            let line = line?;
            match line.trim().parse::<u64>() {
                Ok(p) => primes.push(p),
                Err(_) => skipped += 1,
            }
        }
        if skipped > 0 {
            warn!(skipped, "skipped unparsable lines in known-primes input");
        }
        Ok(Self::from_unsorted(primes))
    }

    #[inline]
    pub fn contains(&self, n: u64) -> bool {
        self.primes.binary_search(&n).is_ok()
    }

    pub fn len(&self) -> usize {
        self.primes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.primes.is_empty()
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Number of members `<= limit` (an imported set may extend further).
    pub fn count_up_to(&self, limit: u64) -> u64 {
        self.primes.partition_point(|&p| p <= limit) as u64
    }

    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        self.primes.iter().copied()
    }

    pub fn as_slice(&self) -> &[u64] {
        &self.primes
    }

    /// True when both sets hold exactly the same members in `[0, upto]`.
    pub fn agrees_with(&self, other: &PrimeSet, upto: u64) -> bool {
        let a = &self.primes[..self.count_up_to(upto) as usize];
        let b = &other.primes[..other.count_up_to(upto) as usize];
        a == b
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn from_unsorted_sorts_and_dedups() {
        let set = PrimeSet::from_unsorted(vec![7, 2, 5, 3, 7, 2]);
        assert_eq!(set.as_slice(), &[2, 3, 5, 7]);
        assert_eq!(set.limit(), 7);
    }

    #[test]
    fn contains_uses_exact_membership() {
        let set = PrimeSet::from_sorted(20, vec![2, 3, 5, 7, 11, 13, 17, 19]);
        assert!(set.contains(2));
        assert!(set.contains(19));
        assert!(!set.contains(1));
        assert!(!set.contains(9));
        assert!(!set.contains(23));
    }

    #[test]
    fn count_up_to_ignores_members_past_limit() {
        let set = PrimeSet::from_unsorted(vec![2, 3, 5, 7, 11, 13]);
        assert_eq!(set.count_up_to(1), 0);
        assert_eq!(set.count_up_to(2), 1);
        assert_eq!(set.count_up_to(10), 4);
        assert_eq!(set.count_up_to(1_000), 6);
    }

    #[test]
    fn reader_skips_garbage_lines() {
        let input = "2\n3\n\nfive\n  7  \n5\n-1\n11\n";
        let set = PrimeSet::from_reader(Cursor::new(input)).unwrap();
        assert_eq!(set.as_slice(), &[2, 3, 5, 7, 11]);
    }

    #[test]
    fn load_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(PrimeSet::load(&dir.path().join("nope.txt")).is_err());
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("primes.txt");
        std::fs::write(&path, "2\n3\n5\n7\n").unwrap();
        let set = PrimeSet::load(&path).unwrap();
        assert_eq!(set.len(), 4);
        assert!(set.contains(5));
    }

    #[test]
    fn oeis_prefix_respects_limit() {
        assert_eq!(PrimeSet::oeis_prefix(1).len(), 0);
        assert_eq!(PrimeSet::oeis_prefix(30).len(), 10);
        assert_eq!(PrimeSet::oeis_prefix(541).len(), 100);
        assert_eq!(PrimeSet::oeis_prefix(10_000).len(), 100);
    }

    #[test]
    fn agrees_with_compares_prefix_only() {
        let a = PrimeSet::from_unsorted(vec![2, 3, 5, 7, 11]);
        let b = PrimeSet::from_unsorted(vec![2, 3, 5, 7, 13]);
        assert!(a.agrees_with(&b, 10));
        assert!(!a.agrees_with(&b, 11));
    }
}
