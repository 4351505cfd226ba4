//! Uniform random draws for the lifecycle simulator.
//!
//! All randomness used by a simulation flows through a [`RandomSource`] so that
//! tests can replace it with a seeded or fully scripted source.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

pub trait RandomSource: Send + Sync {
    /// Roll a float in [0.0, 1.0).
    fn next_f64(&self) -> f64;

    /// Bernoulli trial: returns true with probability p.
    fn chance(&self, p: f64) -> bool {
        self.next_f64() < p
    }

    /// Roll an index in [0, n). `n` must be > 0.
    fn below(&self, n: usize) -> usize {
        let idx = (self.next_f64() * n as f64) as usize;
        idx.min(n.saturating_sub(1))
    }

    /// Roll an integer in [lo, hi].
    fn between(&self, lo: u64, hi: u64) -> u64 {
        let span = hi.saturating_sub(lo).saturating_add(1);
        let offset = (self.next_f64() * span as f64) as u64;
        lo + offset.min(span - 1)
    }

    /// Jittered delay uniform in [lo_ms, hi_ms).
    fn uniform_ms(&self, lo_ms: u64, hi_ms: u64) -> Duration {
        let span = hi_ms.saturating_sub(lo_ms) as f64;
        Duration::from_millis(lo_ms + (self.next_f64() * span) as u64)
    }
}

/// Uniformly picks one item, or `None` for an empty slice.
pub fn pick<'a, T>(rng: &dyn RandomSource, items: &'a [T]) -> Option<&'a T> {
    if items.is_empty() {
        None
    } else {
        items.get(rng.below(items.len()))
    }
}

/// `StdRng`-backed source, shared between concurrent lifecycle runs.
pub struct SeededRandom {
    inner: Mutex<StdRng>,
}

impl SeededRandom {
    pub fn from_seed(seed: u64) -> Self {
        Self {
            inner: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            inner: Mutex::new(StdRng::from_entropy()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StdRng> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RandomSource for SeededRandom {
    fn next_f64(&self) -> f64 {
        self.lock().gen_range(0.0..1.0)
    }
}

/// Replays a fixed list of draws, then returns 0.0 forever.
///
/// Lets tests force a specific branch of the lifecycle.
pub struct ScriptedRandom {
    draws: Mutex<VecDeque<f64>>,
}

impl ScriptedRandom {
    pub fn new(draws: impl IntoIterator<Item = f64>) -> Self {
        Self {
            draws: Mutex::new(draws.into_iter().collect()),
        }
    }
}

impl RandomSource for ScriptedRandom {
    fn next_f64(&self) -> f64 {
        self.draws
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or(0.0)
    }
}
