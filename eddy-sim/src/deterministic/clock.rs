//! Virtual time and random number generation for deterministic runs.

use std::fmt;
use std::time::Duration;

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;

use crate::SimulationError;

/// Maximum time that can be advanced in a single operation (24 hours).
const MAX_TIME_ADVANCE: Duration = Duration::from_secs(86400);

/// Point on the logical timeline, measured from logical zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
pub struct VirtualInstant(Duration);

impl VirtualInstant {
    /// Logical zero, where every run starts.
    pub const ZERO: VirtualInstant = VirtualInstant(Duration::ZERO);

    /// Creates instant at `millis` after logical zero.
    pub fn from_millis(millis: u64) -> Self {
        Self(Duration::from_millis(millis))
    }

    /// Returns offset from logical zero.
    pub fn as_duration(self) -> Duration {
        self.0
    }

    /// Returns instant `delay` later, saturating at the end of representable time.
    pub fn saturating_add(self, delay: Duration) -> Self {
        Self(self.0.saturating_add(delay))
    }
}

impl fmt::Display for VirtualInstant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t+{}ms", self.0.as_millis())
    }
}

/// Deterministic clock for virtual time control.
///
/// Time only moves forward and only when told to; it is independent of
/// wall-clock time.
#[derive(Debug, Clone, Default)]
pub struct VirtualClock {
    current: VirtualInstant,
}

impl VirtualClock {
    /// Creates clock at logical zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns current virtual time.
    pub fn now(&self) -> VirtualInstant {
        self.current
    }

    /// Returns elapsed virtual time since logical zero.
    pub fn elapsed(&self) -> Duration {
        self.current.as_duration()
    }

    /// Advances virtual time by `duration`.
    ///
    /// # Errors
    ///
    /// - `SimulationError::TimeAdvanceTooLarge` - Duration exceeds 24 hours
    pub fn advance(&mut self, duration: Duration) -> Result<VirtualInstant, SimulationError> {
        if duration > MAX_TIME_ADVANCE {
            return Err(SimulationError::TimeAdvanceTooLarge {
                requested: duration,
            });
        }
        self.current = self.current.saturating_add(duration);
        Ok(self.current)
    }

    /// Advances virtual time to `target`.
    ///
    /// # Errors
    ///
    /// - `SimulationError::ClockWentBackwards` - Target is in the past
    pub fn advance_to(&mut self, target: VirtualInstant) -> Result<(), SimulationError> {
        if target < self.current {
            return Err(SimulationError::ClockWentBackwards {
                current: self.current,
                target,
            });
        }
        self.current = target;
        Ok(())
    }

    /// Resets clock to logical zero.
    pub fn reset(&mut self) {
        self.current = VirtualInstant::ZERO;
    }
}

/// Deterministic random number generator for reproducible scenario generation.
///
/// Uses ChaCha8 for fast, seed-stable pseudorandom numbers.
#[derive(Debug)]
pub struct DeterministicRng {
    rng: ChaCha8Rng,
    seed: u64,
}

impl DeterministicRng {
    /// Creates deterministic RNG from seed value.
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            seed,
        }
    }

    /// Returns the seed used for this RNG.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Generates random number in range [min, max).
    pub fn random_range(&mut self, min: u64, max: u64) -> u64 {
        if min >= max {
            return min;
        }
        min + (self.rng.next_u64() % (max - min))
    }

    /// Generates random boolean with given probability.
    pub fn random_bool(&mut self, probability: f64) -> bool {
        (self.rng.next_u64() as f64 / u64::MAX as f64) < probability
    }

    /// Selects random element from slice.
    pub fn choose<'a, T>(&mut self, slice: &'a [T]) -> Option<&'a T> {
        if slice.is_empty() {
            None
        } else {
            let index = self.random_range(0, slice.len() as u64) as usize;
            slice.get(index)
        }
    }
}
