//! Seeded random number generation for parameter initialisation.
//!
//! A lightweight xorshift PRNG: the same seed always yields the same
//! parameters, so two networks built from one seed are bit-identical.

/// Xorshift generator used only at construction time, never during inference.
#[derive(Debug, Clone)]
pub struct SimpleRng {
    state: u64,
}

impl SimpleRng {
    /// Create a new RNG with explicit seed (if zero, use a fixed value).
    pub fn new(seed: u64) -> Self {
        let state = if seed == 0 { 0x9e3779b97f4a7c15 } else { seed };
        Self { state }
    }

    /// Basic xorshift to generate u32.
    pub fn next_u32(&mut self) -> u32 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        (x >> 32) as u32
    }

    /// Convert to [0, 1).
    ///
    /// Only the top 24 bits are used so the quotient is exact in f32 and can
    /// never round up to 1.0.
    pub fn next_f32(&mut self) -> f32 {
        (self.next_u32() >> 8) as f32 / (1u32 << 24) as f32
    }

    /// Uniform sample in [low, high).
    pub fn gen_range_f32(&mut self, low: f32, high: f32) -> f32 {
        low + (high - low) * self.next_f32()
    }

    /// Fill a buffer with uniform samples in [low, high).
    pub fn fill_uniform(&mut self, data: &mut [f32], low: f32, high: f32) {
        for value in data.iter_mut() {
            *value = self.gen_range_f32(low, high);
        }
    }
}
