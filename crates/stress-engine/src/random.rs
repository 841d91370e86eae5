//! Seedable per-worker randomness.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;
use stress_core::ThinkTime;

/// Spreads worker seeds so neighbouring workers do not share prefixes.
const WORKER_SEED_STRIDE: u64 = 0x9E37_79B9_7F4A_7C15;

/// Every random choice an iteration makes goes through this type: the
/// search letter, the pool index, think-time and throwaway entry names.
#[derive(Debug, Clone)]
pub struct RandomSource {
    rng: StdRng,
}

impl RandomSource {
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }

    /// Source for worker `index`: derived from the run seed when there is one.
    pub fn for_worker(run_seed: Option<u64>, index: u64) -> Self {
        match run_seed {
            Some(seed) => Self::seeded(seed ^ index.wrapping_add(1).wrapping_mul(WORKER_SEED_STRIDE)),
            None => Self::from_entropy(),
        }
    }

    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    /// A letter in `a..=z`.
    pub fn lowercase_letter(&mut self) -> char {
        char::from(b'a' + self.rng.random_range(0..26u8))
    }

    /// Uniform pause within `range`, inclusive.
    pub fn think_time(&mut self, range: &ThinkTime) -> Duration {
        let min = range.min.as_micros() as u64;
        let max = range.max.as_micros() as u64;
        if max <= min {
            return range.min;
        }
        Duration::from_micros(self.rng.random_range(min..=max))
    }

    /// Hex token for throwaway entry names.
    pub fn token(&mut self) -> String {
        format!("{:016x}", self.rng.random::<u64>())
    }
}
