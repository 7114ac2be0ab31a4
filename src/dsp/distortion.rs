//! Waveshaping distortion.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ShapeCurve {
    /// x / (1 + |x|), warm saturation.
    #[default]
    Soft,
    /// Clamp at the threshold.
    Hard,
    /// Fold back into range past the threshold.
    Foldback,
}

#[inline]
pub fn soft_clip(sample: f32, drive: f32) -> f32 {
    let x = sample * drive;
    x / (1.0 + x.abs())
}

#[inline]
pub fn hard_clip(sample: f32, drive: f32, threshold: f32) -> f32 {
    (sample * drive).clamp(-threshold, threshold)
}

#[inline]
pub fn foldback(sample: f32, drive: f32, threshold: f32) -> f32 {
    let threshold = threshold.max(1e-3);
    let mut x = sample * drive;
    // Extreme drive can need many folds; the clamp below bounds what is left.
    for _ in 0..64 {
        if x > threshold {
            x = 2.0 * threshold - x;
        } else if x < -threshold {
            x = -2.0 * threshold - x;
        } else {
            break;
        }
    }
    x.clamp(-threshold, threshold)
}

#[derive(Debug, Clone)]
pub struct Distortion {
    pub curve: ShapeCurve,
    /// Input gain, 1 is clean.
    pub drive: f32,
    pub threshold: f32,
    pub mix: f32,
    /// Output trim applied to the wet signal.
    pub output: f32,
}

impl Default for Distortion {
    fn default() -> Self {
        Distortion {
            curve: ShapeCurve::Soft,
            drive: 4.0,
            threshold: 0.6,
            mix: 1.0,
            output: 0.8,
        }
    }
}

impl Distortion {
    /// `amount` in [0, 1] maps onto drive 1..=50.
    pub fn set_amount(&mut self, amount: f64) {
        self.drive = 1.0 + amount.clamp(0.0, 1.0) as f32 * 49.0;
    }

    #[inline]
    pub fn shape(&self, x: f32) -> f32 {
        match self.curve {
            ShapeCurve::Soft => soft_clip(x, self.drive),
            ShapeCurve::Hard => hard_clip(x, self.drive, self.threshold),
            ShapeCurve::Foldback => foldback(x, self.drive, self.threshold),
        }
    }

    #[inline]
    pub fn process(&mut self, left: f32, right: f32) -> (f32, f32) {
        let dry = 1.0 - self.mix;
        let wet = self.mix * self.output;
        (
            left * dry + self.shape(left) * wet,
            right * dry + self.shape(right) * wet,
        )
    }

    pub fn process_block(&mut self, left: &mut [f32], right: &mut [f32]) {
        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            (*l, *r) = self.process(*l, *r);
        }
    }
}
