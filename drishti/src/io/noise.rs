//! Seeded noise for synthetic capture.

use rand::prelude::*;
use rand::rngs::SmallRng;
use rand_distr::{Distribution, StandardNormal, Uniform};

/// Noise source with a reproducible seed.
#[derive(Clone)]
pub struct SensorNoise {
    rng: SmallRng,
}

impl SensorNoise {
    /// Seed 0 draws from entropy; anything else is reproducible.
    pub fn new(seed: u64) -> Self {
        let rng = if seed == 0 {
            SmallRng::from_entropy()
        } else {
            SmallRng::seed_from_u64(seed)
        };
        Self { rng }
    }

    #[inline]
    pub fn gaussian(&mut self, stddev: f32) -> f32 {
        if stddev == 0.0 {
            return 0.0;
        }
        let n: f32 = self.rng.sample(StandardNormal);
        n * stddev
    }

    /// Uniform in [0, 1).
    #[inline]
    pub fn uniform(&mut self) -> f32 {
        Uniform::new(0.0f32, 1.0).sample(&mut self.rng)
    }

    #[inline]
    pub fn chance(&mut self, probability: f32) -> bool {
        self.uniform() < probability
    }

    /// 8-bit channel value with sensor grain applied.
    #[inline]
    pub fn pixel(&mut self, value: f32, grain: f32) -> u8 {
        (value + self.gaussian(grain)).round().clamp(0.0, 255.0) as u8
    }

    /// Per-axis jitter for a pose component.
    pub fn jitter3(&mut self, stddev: f32) -> [f32; 3] {
        [
            self.gaussian(stddev),
            self.gaussian(stddev),
            self.gaussian(stddev),
        ]
    }
}
