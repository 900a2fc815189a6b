//! Fixed-timestep accumulator: variable wall-clock deltas in, whole frames out.

/// Tolerance for float timer comparisons so `0.1 * 10` counts as a full second.
pub const TIME_EPSILON: f64 = 1e-9;

/// True once `timer` has reached `interval`, within [TIME_EPSILON].
pub fn interval_reached(timer: f64, interval: f64) -> bool {
    timer + TIME_EPSILON >= interval
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameClock {
    frame_rate: f64,
    frame_interval: f64,
    remainder: f64,
}

impl FrameClock {
    /// `frame_rate` must be positive; skill loading rejects anything else.
    pub fn new(frame_rate: f64) -> Self {
        let frame_rate = if frame_rate > 0.0 { frame_rate } else { 1.0 };
        Self {
            frame_rate,
            frame_interval: 1.0 / frame_rate,
            remainder: 0.0,
        }
    }

    pub fn frame_rate(&self) -> f64 {
        self.frame_rate
    }

    pub fn frame_interval(&self) -> f64 {
        self.frame_interval
    }

    /// Fraction of a frame accumulated but not yet emitted.
    pub fn remainder(&self) -> f64 {
        self.remainder
    }

    pub fn reset(&mut self) {
        self.remainder = 0.0;
    }

    /// Accumulates `delta` seconds and returns how many whole frames elapsed.
    /// Negative and non-finite deltas are ignored.
    pub fn advance(&mut self, delta: f64) -> u32 {
        if !delta.is_finite() || delta <= 0.0 {
            return 0;
        }
        self.remainder += delta;
        let mut frames = 0u32;
        while interval_reached(self.remainder, self.frame_interval) {
            self.remainder -= self.frame_interval;
            frames += 1;
        }
        if self.remainder < 0.0 {
            self.remainder = 0.0;
        }
        frames
    }
}
