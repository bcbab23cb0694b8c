//! # Classifier — Candidate Primality Classifiers Under Test
//!
//! The validator only ever sees a [`PrimeClassifier`]: a named, thread-safe
//! `is_prime(n)` capability that may fail for a given input. The reference
//! implementations here serve as cross-checks and as fixtures:
//!
//! | Classifier | Method | Exact? |
//! |------------|--------|--------|
//! | `TrialDivision` | divide by 2, then odd d ≤ √n | yes |
//! | `MillerRabin` | strong-probable-prime test, first 12 prime bases | yes for all u64 |
//! | `Gmp` | GMP `mpz_probab_prime_p` via `rug` | probabilistic |
//! | `OddHeuristic` | "odd and > 1" | no (rejects 2, accepts odd composites) |
//!
//! [`Memoized`] wraps any classifier with a [`BoundedCache`] owned by the
//! run that created it. Eviction is first-in first-out, so cache contents
//! depend only on the sequence of lookups.

use rug::integer::IsPrime;
use rug::Integer;
use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::sync::Mutex;

use crate::error::ClassifierError;

pub type ClassifierResult = std::result::Result<bool, ClassifierError>;

/// A primality classifier under validation.
///
/// Implementations must be deterministic per input. Internal caching is
/// allowed as long as it is safe for concurrent callers.
pub trait PrimeClassifier: Send + Sync {
    fn name(&self) -> &str;
    fn is_prime(&self, n: u64) -> ClassifierResult;
}

impl<C: PrimeClassifier + ?Sized> PrimeClassifier for &C {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn is_prime(&self, n: u64) -> ClassifierResult {
        (**self).is_prime(n)
    }
}

impl<C: PrimeClassifier + ?Sized> PrimeClassifier for Box<C> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn is_prime(&self, n: u64) -> ClassifierResult {
        (**self).is_prime(n)
    }
}

// ── Reference Classifiers ───────────────────────────────────────

#[derive(Debug, Clone, Copy, Default)]
pub struct TrialDivision;

impl PrimeClassifier for TrialDivision {
    fn name(&self) -> &str {
        "trial-division"
    }

    fn is_prime(&self, n: u64) -> ClassifierResult {
        Ok(trial_division(n))
    }
}

pub fn trial_division(n: u64) -> bool {
    if n < 2 {
        return false;
    }
    if n % 2 == 0 {
        return n == 2;
    }
    let mut d = 3u64;
    while d <= n / d {
        if n % d == 0 {
            return false;
        }
        d += 2;
    }
    true
}

/// Deterministic Miller–Rabin for the full u64 range.
#[derive(Debug, Clone, Copy, Default)]
pub struct MillerRabin;

/// Testing against these 12 bases is exact for every n < 3.3·10²⁴.
const MR_BASES: [u64; 12] = [2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37];

impl PrimeClassifier for MillerRabin {
    fn name(&self) -> &str {
        "miller-rabin"
    }

    fn is_prime(&self, n: u64) -> ClassifierResult {
        Ok(miller_rabin(n))
    }
}

pub fn miller_rabin(n: u64) -> bool {
    if n < 2 {
        return false;
    }
    for &p in &MR_BASES {
        if n % p == 0 {
            return n == p;
        }
    }
    let d = (n - 1) >> (n - 1).trailing_zeros();
    let s = (n - 1).trailing_zeros();
    'bases: for &a in &MR_BASES {
        let mut x = pow_mod(a, d, n);
        if x == 1 || x == n - 1 {
            continue;
        }
        for _ in 1..s {
            x = mul_mod(x, x, n);
            if x == n - 1 {
                continue 'bases;
            }
        }
        return false;
    }
    true
}

#[inline]
fn mul_mod(a: u64, b: u64, m: u64) -> u64 {
    (a as u128 * b as u128 % m as u128) as u64
}

/// base^exp mod modulus with u128 intermediates.
pub fn pow_mod(mut base: u64, mut exp: u64, modulus: u64) -> u64 {
    if modulus == 1 {
        return 0;
    }
    let mut result = 1u64;
    base %= modulus;
    while exp > 0 {
        if exp & 1 == 1 {
            result = mul_mod(result, base, modulus);
        }
        exp >>= 1;
        base = mul_mod(base, base, modulus);
    }
    result
}

/// GMP probable-prime test (`rounds` Miller–Rabin rounds after trial division).
#[derive(Debug, Clone, Copy)]
pub struct Gmp {
    pub rounds: u32,
}

impl Default for Gmp {
    fn default() -> Self {
        Gmp { rounds: 25 }
    }
}

impl PrimeClassifier for Gmp {
    fn name(&self) -> &str {
        "gmp"
    }

    fn is_prime(&self, n: u64) -> ClassifierResult {
        Ok(Integer::from(n).is_probably_prime(self.rounds) != IsPrime::No)
    }
}

/// Accepts every odd n > 1. Deliberately wrong: a fixture with known mismatches.
#[derive(Debug, Clone, Copy, Default)]
pub struct OddHeuristic;

impl PrimeClassifier for OddHeuristic {
    fn name(&self) -> &str {
        "odd"
    }

    fn is_prime(&self, n: u64) -> ClassifierResult {
        Ok(n > 1 && n % 2 == 1)
    }
}

/// Adapts a closure into a classifier.
pub struct FnClassifier<F> {
    name: String,
    f: F,
}

impl<F> FnClassifier<F>
where
    F: Fn(u64) -> ClassifierResult + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        FnClassifier {
            name: name.into(),
            f,
        }
    }
}

impl<F> PrimeClassifier for FnClassifier<F>
where
    F: Fn(u64) -> ClassifierResult + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn is_prime(&self, n: u64) -> ClassifierResult {
        (self.f)(n)
    }
}

/// Look up a built-in classifier by its CLI name.
pub fn by_name(name: &str) -> Option<Box<dyn PrimeClassifier>> {
    match name {
        "trial-division" => Some(Box::new(TrialDivision)),
        "miller-rabin" => Some(Box::new(MillerRabin)),
        "gmp" => Some(Box::new(Gmp::default())),
        "odd" => Some(Box::new(OddHeuristic)),
        _ => None,
    }
}

pub const BUILTIN_NAMES: [&str; 4] = ["trial-division", "miller-rabin", "gmp", "odd"];

// ── Bounded Memoization ─────────────────────────────────────────

/// Fixed-capacity map with first-in first-out eviction.
pub struct BoundedCache<K, V> {
    capacity: usize,
    map: HashMap<K, V>,
    order: VecDeque<K>,
}

impl<K: Eq + Hash + Clone, V: Clone> BoundedCache<K, V> {
    pub fn new(capacity: usize) -> Self {
        BoundedCache {
            capacity,
            map: HashMap::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.map.get(key).cloned()
    }

    pub fn insert(&mut self, key: K, value: V) {
        if self.capacity == 0 {
            return;
        }
        if let Some(slot) = self.map.get_mut(&key) {
            *slot = value;
            return;
        }
        if self.map.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.map.remove(&oldest);
            }
        }
        self.order.push_back(key.clone());
        self.map.insert(key, value);
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Classifier wrapper that memoizes answers in a per-run bounded cache.
///
/// Errors are never cached.
pub struct Memoized<C> {
    inner: C,
    cache: Mutex<BoundedCache<u64, bool>>,
}

impl<C: PrimeClassifier> Memoized<C> {
    pub fn new(inner: C, capacity: usize) -> Self {
        Memoized {
            inner,
            cache: Mutex::new(BoundedCache::new(capacity)),
        }
    }

    pub fn cached_entries(&self) -> usize {
        self.cache.lock().map(|c| c.len()).unwrap_or(0)
    }
}

impl<C: PrimeClassifier> PrimeClassifier for Memoized<C> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn is_prime(&self, n: u64) -> ClassifierResult {
        let poisoned = || ClassifierError::new("memo cache lock poisoned");
        if let Some(hit) = self.cache.lock().map_err(|_| poisoned())?.get(&n) {
            return Ok(hit);
        }
        let answer = self.inner.is_prime(n)?;
        self.cache.lock().map_err(|_| poisoned())?.insert(n, answer);
        Ok(answer)
    }
}
