//! # Sieve — Ground-Truth Prime Generation
//!
//! Produces the exact set of primes `<= limit` with one of three sieve of
//! Eratosthenes variants, chosen by a data-driven [`SievePolicy`]:
//!
//! | Strategy | Storage | Selected when |
//! |----------|---------|---------------|
//! | `Standard` | one byte per integer in `[0, limit]` | `limit <= standard_max`, memory ample |
//! | `BitPacked` | one bit per odd integer | `limit <= bit_packed_max`, or memory constrained |
//! | `Segmented` | base primes to √limit + one window at a time | `limit > bit_packed_max` |
//!
//! All three agree member-for-member on every limit; the property tests in
//! `tests/property_tests.rs` hold them to that.
//!
//! ## Bit-Packed Layout
//!
//! Only odd candidates are tracked. The bit at index `k` stands for `2k + 1`,
//! so composites of an odd prime `p` start at index `(p² − 1) / 2` and recur
//! every `p` indices (consecutive odd multiples of `p` are `2p` apart).
//!
//! ## Segmented Windows
//!
//! Base primes up to `⌊√limit⌋` come from the standard sieve. The remainder
//! `[⌊√limit⌋ + 1, limit]` is swept in fixed-size windows; each window buffer
//! is allocated, sieved, drained into the output and dropped before the next
//! one, so the working set is one window plus the base primes.
//!
//! ## Allocation
//!
//! Every buffer is reserved with `try_reserve_exact`. A refused reservation
//! becomes [`Error::AllocationFailure`]; [`SievePolicy::generate`] then falls
//! back to the segmented sieve and keeps halving its window down to
//! `min_segment_size` before giving up.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::prime_set::PrimeSet;

/// Default limit up to which the byte-per-integer sieve is used.
pub const STANDARD_MAX: u64 = 10_000_000;
/// Default limit up to which the odd-only bit sieve is used.
pub const BIT_PACKED_MAX: u64 = 100_000_000;
/// Default segmented-sieve window, in integers.
pub const SEGMENT_SIZE: u64 = 10_000_000;
/// Smallest window tried when retrying after an allocation failure.
pub const MIN_SEGMENT_SIZE: u64 = 4_096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SieveStrategy {
    Standard,
    BitPacked,
    Segmented,
}

impl fmt::Display for SieveStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SieveStrategy::Standard => write!(f, "standard"),
            SieveStrategy::BitPacked => write!(f, "bit-packed"),
            SieveStrategy::Segmented => write!(f, "segmented"),
        }
    }
}

/// Thresholds that map (limit, memory pressure) onto a strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SievePolicy {
    pub standard_max: u64,
    pub bit_packed_max: u64,
    pub segment_size: u64,
    pub min_segment_size: u64,
}

impl Default for SievePolicy {
    fn default() -> Self {
        SievePolicy {
            standard_max: STANDARD_MAX,
            bit_packed_max: BIT_PACKED_MAX,
            segment_size: SEGMENT_SIZE,
            min_segment_size: MIN_SEGMENT_SIZE,
        }
    }
}

impl SievePolicy {
    pub fn select(&self, limit: u64, memory_constrained: bool) -> SieveStrategy {
        if limit > self.bit_packed_max {
            SieveStrategy::Segmented
        } else if memory_constrained || limit > self.standard_max {
            SieveStrategy::BitPacked
        } else {
            SieveStrategy::Standard
        }
    }

    /// Generate primes `<= limit` with the policy-selected strategy, falling
    /// back to ever smaller segmented windows if buffers cannot be allocated.
    pub fn generate(&self, limit: u64, memory_constrained: bool) -> Result<PrimeSet> {
        let strategy = self.select(limit, memory_constrained);
        info!(limit, %strategy, memory_constrained, "generating ground-truth primes");
        self.generate_with(limit, strategy)
    }

    /// Generate with a forced strategy (same allocation fallback as `generate`).
    pub fn generate_with(&self, limit: u64, strategy: SieveStrategy) -> Result<PrimeSet> {
        let first = match strategy {
            SieveStrategy::Standard => standard(limit),
            SieveStrategy::BitPacked => bit_packed(limit),
            SieveStrategy::Segmented => segmented(limit, self.segment_size),
        };
        let set = match first {
            Err(Error::AllocationFailure { strategy, bytes }) => {
                warn!(%strategy, bytes, "sieve allocation failed, falling back to segmented sieve");
                let window = match strategy {
                    SieveStrategy::Segmented => self.segment_size / 2,
                    _ => self.segment_size,
                };
                self.segmented_with_retry(limit, window)?
            }
            other => other?,
        };
        info!(limit, primes = set.len(), "ground truth ready");
        Ok(set)
    }

    fn segmented_with_retry(&self, limit: u64, mut window: u64) -> Result<PrimeSet> {
        let floor = self.min_segment_size.max(1);
        loop {
            if window < floor {
                return Err(Error::AllocationFailure {
                    strategy: SieveStrategy::Segmented,
                    bytes: floor.div_ceil(8) as usize,
                });
            }
            match segmented(limit, window) {
                Err(Error::AllocationFailure { bytes, .. }) => {
                    warn!(window, bytes, "segmented window allocation failed, halving window");
                    window /= 2;
                }
                other => return other,
            }
        }
    }
}

/// Generate primes `<= limit` with the default policy.
pub fn generate(limit: u64, memory_constrained: bool) -> Result<PrimeSet> {
    SievePolicy::default().generate(limit, memory_constrained)
}

/// Byte-per-integer sieve over `[0, limit]`.
pub fn standard(limit: u64) -> Result<PrimeSet> {
    if limit < 2 {
        return Ok(PrimeSet::empty(limit));
    }
    let strategy = SieveStrategy::Standard;
    let len = buffer_len(limit, 1, strategy)?;
    let mut composite = try_filled(len, false, strategy)?;
    composite[0] = true;
    composite[1] = true;

    let root = limit.isqrt() as usize;
    for i in 2..=root {
        if !composite[i] {
            for m in (i * i..len).step_by(i) {
                composite[m] = true;
            }
        }
    }

    let mut primes = try_with_capacity(estimate_prime_count(limit), strategy)?;
    primes.extend(
        composite
            .iter()
            .enumerate()
            .filter(|&(_, &c)| !c)
            .map(|(n, _)| n as u64),
    );
    Ok(PrimeSet::from_sorted(limit, primes))
}

/// Odd-only sieve, one bit per odd integer in `[1, limit]`.
pub fn bit_packed(limit: u64) -> Result<PrimeSet> {
    if limit < 2 {
        return Ok(PrimeSet::empty(limit));
    }
    let strategy = SieveStrategy::BitPacked;
    // index k <-> 2k + 1, for k in 0..=(limit - 1) / 2
    let len = buffer_len((limit - 1) / 2, 1, strategy)?;
    let mut odd = BitSieve::try_new_all_set(len, strategy)?;
    odd.clear(0); // 1 is not prime

    let mut k = 1usize;
    loop {
        let p = 2 * k + 1;
        let square = p * p;
        if square as u64 > limit {
            break;
        }
        if odd.get(k) {
            for idx in ((square - 1) / 2..len).step_by(p) {
                odd.clear(idx);
            }
        }
        k += 1;
    }

    let mut primes = try_with_capacity(estimate_prime_count(limit), strategy)?;
    primes.push(2);
    primes.extend(odd.iter_set_bits().map(|k| 2 * k as u64 + 1));
    Ok(PrimeSet::from_sorted(limit, primes))
}

/// Segmented sieve sweeping `[⌊√limit⌋ + 1, limit]` in windows of `window` integers.
pub fn segmented(limit: u64, window: u64) -> Result<PrimeSet> {
    if window == 0 {
        return Err(Error::ZeroSized { field: "segment window" });
    }
    if limit < 2 {
        return Ok(PrimeSet::empty(limit));
    }
    let strategy = SieveStrategy::Segmented;
    let root = limit.isqrt();
    let base = standard(root).map_err(|e| relabel(e, strategy))?;

    let mut primes = try_with_capacity(estimate_prime_count(limit), strategy)?;
    primes.extend(base.iter());

    let mut lo = root + 1;
    let mut windows = 0u64;
    while lo <= limit {
        let hi = lo.saturating_add(window - 1).min(limit);
        let len = buffer_len(hi - lo, 1, strategy)?;
        let mut survivors = BitSieve::try_new_all_set(len, strategy)?;

        for p in base.iter() {
            let square = p * p;
            if square > hi {
                break;
            }
            let first = square.max(lo.div_ceil(p).saturating_mul(p));
            for m in (first..=hi).step_by(p as usize) {
                survivors.clear((m - lo) as usize);
            }
        }

        primes.extend(survivors.iter_set_bits().map(|i| lo + i as u64));
        windows += 1;
        if hi == limit {
            break;
        }
        lo = hi + 1;
    }

    debug!(limit, window, windows, base_primes = base.len(), "segmented sieve complete");
    Ok(PrimeSet::from_sorted(limit, primes))
}

/// Upper bound on π(n) used to presize the output (π(n) < 1.26·n/ln n).
pub(crate) fn estimate_prime_count(n: u64) -> usize {
    if n < 10 {
        return 4;
    }
    let nf = n as f64;
    (1.3 * nf / nf.ln()) as usize
}

/// `last_index + extra` as a `usize`, or an allocation failure if it cannot be addressed.
fn buffer_len(last_index: u64, extra: u64, strategy: SieveStrategy) -> Result<usize> {
    last_index
        .checked_add(extra)
        .and_then(|len| usize::try_from(len).ok())
        .ok_or(Error::AllocationFailure {
            strategy,
            bytes: usize::MAX,
        })
}

fn try_filled<T: Clone>(len: usize, value: T, strategy: SieveStrategy) -> Result<Vec<T>> {
    let mut buf = try_with_capacity(len, strategy)?;
    buf.resize(len, value);
    Ok(buf)
}

fn try_with_capacity<T>(len: usize, strategy: SieveStrategy) -> Result<Vec<T>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| Error::AllocationFailure {
            strategy,
            bytes: len.saturating_mul(std::mem::size_of::<T>()),
        })?;
    Ok(buf)
}

fn relabel(err: Error, strategy: SieveStrategy) -> Error {
    match err {
        Error::AllocationFailure { bytes, .. } => Error::AllocationFailure { strategy, bytes },
        other => other,
    }
}

/// Packed bit array used by the bit-packed and segmented sieves.
///
/// Bit `i` lives in word `i / 64` at position `i % 64`. A set bit means the
/// candidate is still considered prime; sieving clears bits.
pub struct BitSieve {
    words: Vec<u64>,
    len: usize,
}

impl BitSieve {
    /// All `len` bits set, with the padding bits of the last word kept clear.
    pub fn try_new_all_set(len: usize, strategy: SieveStrategy) -> Result<Self> {
        let num_words = len.div_ceil(64);
        let mut words = try_filled(num_words, u64::MAX, strategy)?;
        let extra = num_words * 64 - len;
        if extra > 0 {
            if let Some(last) = words.last_mut() {
                *last >>= extra;
            }
        }
        Ok(BitSieve { words, len })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn get(&self, index: usize) -> bool {
        debug_assert!(index < self.len, "BitSieve index {} >= {}", index, self.len);
        self.words[index / 64] & (1u64 << (index % 64)) != 0
    }

    #[inline]
    pub fn clear(&mut self, index: usize) {
        debug_assert!(index < self.len, "BitSieve index {} >= {}", index, self.len);
        self.words[index / 64] &= !(1u64 << (index % 64));
    }

    pub fn count_ones(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Indices of set bits, ascending.
    pub fn iter_set_bits(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(wi, &word)| SetBits {
            word,
            base: wi * 64,
        })
    }
}

struct SetBits {
    word: u64,
    base: usize,
}

impl Iterator for SetBits {
    type Item = usize;

    #[inline]
    fn next(&mut self) -> Option<usize> {
        if self.word == 0 {
            return None;
        }
        let tz = self.word.trailing_zeros() as usize;
        self.word &= self.word - 1;
        Some(self.base + tz)
    }
}

#[cfg(test)]
mod tests {
    //! Strategy agreement, known prime counts (OEIS A000720: π(100)=25,
    //! π(1000)=168, π(10⁴)=1229, π(10⁵)=9592), window-boundary cases for the
    //! segmented sieve, policy selection and BitSieve word-boundary handling.

    use super::*;

    fn trial_division(n: u64) -> bool {
        if n < 2 {
            return false;
        }
        let mut d = 2;
        while d * d <= n {
            if n % d == 0 {
                return false;
            }
            d += 1;
        }
        true
    }

    // ── Correctness ─────────────────────────────────────────────────

    #[test]
    fn standard_small_limits() {
        assert!(standard(0).unwrap().is_empty());
        assert!(standard(1).unwrap().is_empty());
        assert_eq!(standard(2).unwrap().as_slice(), &[2]);
        assert_eq!(standard(3).unwrap().as_slice(), &[2, 3]);
        assert_eq!(standard(10).unwrap().as_slice(), &[2, 3, 5, 7]);
    }

    #[test]
    fn bit_packed_small_limits() {
        assert!(bit_packed(1).unwrap().is_empty());
        assert_eq!(bit_packed(2).unwrap().as_slice(), &[2]);
        assert_eq!(bit_packed(3).unwrap().as_slice(), &[2, 3]);
        assert_eq!(bit_packed(9).unwrap().as_slice(), &[2, 3, 5, 7]);
        assert_eq!(bit_packed(25).unwrap().len(), 9);
    }

    #[test]
    fn segmented_window_seven_up_to_thirty() {
        let set = segmented(30, 7).unwrap();
        assert_eq!(set.as_slice(), &[2, 3, 5, 7, 11, 13, 17, 19, 23, 29]);
    }

    #[test]
    fn segmented_tiny_windows_and_limits() {
        for limit in 0..200u64 {
            let expected = standard(limit).unwrap();
            for window in [1u64, 2, 3, 5, 64, 1000] {
                assert_eq!(
                    segmented(limit, window).unwrap(),
                    expected,
                    "limit={} window={}",
                    limit,
                    window
                );
            }
        }
    }

    #[test]
    fn segmented_rejects_zero_window() {
        assert!(matches!(
            segmented(100, 0),
            Err(Error::ZeroSized { .. })
        ));
    }

    #[test]
    fn matches_trial_division_to_ten_thousand() {
        let set = standard(10_000).unwrap();
        for n in 0..=10_000u64 {
            assert_eq!(set.contains(n), trial_division(n), "n={}", n);
        }
    }

    #[test]
    fn known_prime_counts() {
        for &(limit, count) in &[(100u64, 25usize), (1_000, 168), (10_000, 1229), (100_000, 9592)] {
            assert_eq!(standard(limit).unwrap().len(), count, "standard π({})", limit);
            assert_eq!(bit_packed(limit).unwrap().len(), count, "bit-packed π({})", limit);
            assert_eq!(segmented(limit, 1_000).unwrap().len(), count, "segmented π({})", limit);
        }
    }

    #[test]
    fn strategies_agree_around_squares() {
        // Limits at and around p² are where the marking start is most fragile.
        for p in [2u64, 3, 5, 7, 11, 13, 31, 97] {
            for limit in [p * p - 1, p * p, p * p + 1] {
                let a = standard(limit).unwrap();
                assert_eq!(a, bit_packed(limit).unwrap(), "bit-packed limit={}", limit);
                assert_eq!(a, segmented(limit, 10).unwrap(), "segmented limit={}", limit);
            }
        }
    }

    // ── Policy ──────────────────────────────────────────────────────

    #[test]
    fn policy_selects_by_scale_and_memory() {
        let policy = SievePolicy {
            standard_max: 1_000,
            bit_packed_max: 10_000,
            ..SievePolicy::default()
        };
        assert_eq!(policy.select(1_000, false), SieveStrategy::Standard);
        assert_eq!(policy.select(1_000, true), SieveStrategy::BitPacked);
        assert_eq!(policy.select(1_001, false), SieveStrategy::BitPacked);
        assert_eq!(policy.select(10_000, true), SieveStrategy::BitPacked);
        assert_eq!(policy.select(10_001, false), SieveStrategy::Segmented);
        assert_eq!(policy.select(10_001, true), SieveStrategy::Segmented);
    }

    #[test]
    fn generate_uses_small_segments_past_bit_packed_max() {
        let policy = SievePolicy {
            standard_max: 100,
            bit_packed_max: 1_000,
            segment_size: 97,
            min_segment_size: 8,
        };
        assert_eq!(policy.select(5_000, false), SieveStrategy::Segmented);
        assert_eq!(policy.generate(5_000, false).unwrap().len(), 669);
    }

    #[test]
    fn generate_with_forced_strategies_agree() {
        let policy = SievePolicy::default();
        let a = policy.generate_with(50_000, SieveStrategy::Standard).unwrap();
        let b = policy.generate_with(50_000, SieveStrategy::BitPacked).unwrap();
        let c = policy.generate_with(50_000, SieveStrategy::Segmented).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, c);
    }

    #[test]
    fn generate_limit_one_is_empty() {
        assert!(generate(1, false).unwrap().is_empty());
        assert!(generate(1, true).unwrap().is_empty());
    }

    #[test]
    fn strategy_display_is_kebab_case() {
        assert_eq!(SieveStrategy::Standard.to_string(), "standard");
        assert_eq!(SieveStrategy::BitPacked.to_string(), "bit-packed");
        assert_eq!(SieveStrategy::Segmented.to_string(), "segmented");
    }

    // ── BitSieve ────────────────────────────────────────────────────

    #[test]
    fn bitsieve_padding_bits_stay_clear() {
        let bs = BitSieve::try_new_all_set(65, SieveStrategy::BitPacked).unwrap();
        assert_eq!(bs.words.len(), 2);
        assert_eq!(bs.words[1].count_ones(), 1);
        assert_eq!(bs.count_ones(), 65);
    }

    #[test]
    fn bitsieve_clear_across_word_boundaries() {
        let mut bs = BitSieve::try_new_all_set(200, SieveStrategy::BitPacked).unwrap();
        for &i in &[0usize, 63, 64, 127, 128, 199] {
            bs.clear(i);
        }
        assert_eq!(bs.count_ones(), 194);
        assert!(!bs.get(63));
        assert!(!bs.get(64));
        assert!(bs.get(65));
        let survivors: Vec<usize> = bs.iter_set_bits().take(3).collect();
        assert_eq!(survivors, vec![1, 2, 3]);
    }

    #[test]
    fn bitsieve_empty() {
        let bs = BitSieve::try_new_all_set(0, SieveStrategy::Segmented).unwrap();
        assert!(bs.is_empty());
        assert_eq!(bs.len(), 0);
        assert_eq!(bs.iter_set_bits().count(), 0);
    }

    #[test]
    fn unaddressable_buffer_is_allocation_failure() {
        let err = buffer_len(u64::MAX, 1, SieveStrategy::Standard).unwrap_err();
        assert!(matches!(
            err,
            Error::AllocationFailure {
                strategy: SieveStrategy::Standard,
                ..
            }
        ));
    }
}
