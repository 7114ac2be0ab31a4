//! Brickwall peak limiter with instant attack and smoothed release.

use super::param::db_to_gain;

#[derive(Debug, Clone)]
pub struct Limiter {
    sample_rate: f64,
    ceiling: f32,
    release_coef: f32,
    gain: f32,
}

impl Limiter {
    pub fn new(sample_rate: f64) -> Self {
        let mut l = Limiter {
            sample_rate,
            ceiling: 1.0,
            release_coef: 0.0,
            gain: 1.0,
        };
        l.configure(-1.0, 0.05);
        l
    }

    /// Ceiling in dBFS, release in seconds.
    pub fn configure(&mut self, ceiling_db: f64, release: f64) {
        self.ceiling = db_to_gain(ceiling_db.clamp(-60.0, 0.0)) as f32;
        self.release_coef = (-1.0 / (release.max(0.001) * self.sample_rate)).exp() as f32;
    }

    pub fn ceiling(&self) -> f32 {
        self.ceiling
    }

    #[inline]
    pub fn process(&mut self, left: f32, right: f32) -> (f32, f32) {
        let peak = left.abs().max(right.abs());
        let wanted = if peak > self.ceiling {
            self.ceiling / peak
        } else {
            1.0
        };
        self.gain = if wanted < self.gain {
            wanted
        } else {
            self.release_coef * self.gain + (1.0 - self.release_coef) * wanted
        };
        (left * self.gain, right * self.gain)
    }

    pub fn process_block(&mut self, left: &mut [f32], right: &mut [f32]) {
        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            (*l, *r) = self.process(*l, *r);
        }
    }
}
