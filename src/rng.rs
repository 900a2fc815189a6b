//! Seeded roll source for Event trigger chances.
//!
//! Each `BuffCollection` owns one generator, seeded from the host. An Event
//! trigger draws only after its event kind, cooldown and value bounds have all
//! matched, and only when its chance lies strictly between 0 and 1. Certain and
//! impossible triggers never advance the sequence, so adding or tuning them
//! leaves every other trigger's outcomes unchanged for a given seed.

const SPLITMIX64_GOLDEN: u64 = 0x9e3779b97f4a7c15;
const SPLITMIX64_M1: u64 = 0xbf58476d1ce4e5b9;
const SPLITMIX64_M2: u64 = 0x94d049bb133111eb;

#[derive(Debug, Clone, Copy)]
pub struct Rng {
    state: u64,
}

impl Rng {
    pub fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    #[inline]
    pub fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_add(SPLITMIX64_GOLDEN);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(SPLITMIX64_M1);
        z = (z ^ (z >> 27)).wrapping_mul(SPLITMIX64_M2);
        z ^ (z >> 31)
    }

    /// Uniform value in `[0, 1)` built from the top 53 bits.
    #[inline]
    pub fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }

    /// Roll against `chance` in `[0, 1]`. Chances at or above 1 never consume a value.
    pub fn roll(&mut self, chance: f64) -> bool {
        if chance >= 1.0 {
            return true;
        }
        if chance <= 0.0 || chance.is_nan() {
            return false;
        }
        self.next_f64() < chance
    }
}

impl Default for Rng {
    fn default() -> Self {
        Self::new(7)
    }
}
