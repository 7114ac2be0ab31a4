//! Feed-forward compressor with a soft knee, shaped after WebAudio's
//! `DynamicsCompressorNode`.

use super::param::{db_to_gain, gain_to_db};

#[derive(Debug, Clone)]
pub struct Compressor {
    sample_rate: f64,
    /// dB.
    pub threshold: f64,
    pub ratio: f64,
    /// Knee width in dB; 0 is a hard knee.
    pub knee: f64,
    /// Seconds.
    pub attack: f64,
    /// Seconds.
    pub release: f64,
    /// dB.
    pub makeup: f64,
    attack_coef: f64,
    release_coef: f64,
    envelope: f64,
}

impl Compressor {
    pub fn new(sample_rate: f64) -> Self {
        let mut c = Compressor {
            sample_rate,
            threshold: -24.0,
            ratio: 4.0,
            knee: 6.0,
            attack: 0.003,
            release: 0.25,
            makeup: 0.0,
            attack_coef: 0.0,
            release_coef: 0.0,
            envelope: 0.0,
        };
        c.update_timing();
        c
    }

    pub fn configure(&mut self, threshold: f64, ratio: f64, knee: f64, attack: f64, release: f64) {
        self.threshold = threshold.clamp(-100.0, 0.0);
        self.ratio = ratio.clamp(1.0, 20.0);
        self.knee = knee.clamp(0.0, 40.0);
        self.attack = attack.clamp(0.0001, 1.0);
        self.release = release.clamp(0.001, 5.0);
        self.update_timing();
    }

    fn update_timing(&mut self) {
        self.attack_coef = (-1.0 / (self.attack * self.sample_rate)).exp();
        self.release_coef = (-1.0 / (self.release * self.sample_rate)).exp();
    }

    /// Gain change in dB (<= 0) for a detector level in dB.
    #[inline]
    pub(crate) fn gain_reduction(&self, level_db: f64) -> f64 {
        let slope = 1.0 - 1.0 / self.ratio;
        let half = self.knee / 2.0;
        if self.knee <= 0.0 || level_db >= self.threshold + half {
            (self.threshold - level_db).min(0.0) * slope
        } else if level_db <= self.threshold - half {
            0.0
        } else {
            let x = level_db - (self.threshold - half);
            -(x * x) / (2.0 * self.knee) * slope
        }
    }

    #[inline]
    pub fn process(&mut self, left: f32, right: f32) -> (f32, f32) {
        let level = left.abs().max(right.abs()) as f64;
        let coef = if level > self.envelope {
            self.attack_coef
        } else {
            self.release_coef
        };
        self.envelope = coef * self.envelope + (1.0 - coef) * level;

        let reduction = self.gain_reduction(gain_to_db(self.envelope));
        let gain = db_to_gain(reduction + self.makeup) as f32;
        (left * gain, right * gain)
    }

    pub fn process_block(&mut self, left: &mut [f32], right: &mut [f32]) {
        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            (*l, *r) = self.process(*l, *r);
        }
    }

    /// Current reduction in dB, for metering.
    pub fn reduction_db(&self) -> f64 {
        -self.gain_reduction(gain_to_db(self.envelope))
    }

    pub fn reset(&mut self) {
        self.envelope = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compressor(threshold: f64, ratio: f64, attack: f64, release: f64) -> Compressor {
        let mut c = Compressor::new(44100.0);
        c.configure(threshold, ratio, 0.0, attack, release);
        c
    }

    #[test]
    fn quiet_signal_is_untouched() {
        let mut c = compressor(-20.0, 4.0, 0.001, 0.1);
        for _ in 0..1000 {
            c.process(0.05, 0.05);
        }
        let (l, _) = c.process(0.05, 0.05);
        assert!((l - 0.05).abs() < 1e-3);
    }

    #[test]
    fn loud_signal_is_reduced_by_ratio() {
        let mut c = compressor(-12.0, 4.0, 0.001, 0.1);
        for _ in 0..5000 {
            c.process(1.0, 1.0);
        }
        // 12 dB over at 4:1 leaves 3 dB over: -9 dB
        assert!((c.reduction_db() - 9.0).abs() < 0.2, "{}", c.reduction_db());
        let (l, _) = c.process(1.0, 1.0);
        assert!(l > 0.3 && l < 0.4, "{l}");
    }

    #[test]
    fn gain_recovers_after_release() {
        let mut c = compressor(-20.0, 10.0, 0.001, 0.05);
        for _ in 0..1000 {
            c.process(1.0, 1.0);
        }
        let (squashed, _) = c.process(0.1, 0.1);
        for _ in 0..5000 {
            c.process(0.1, 0.1);
        }
        let (recovered, _) = c.process(0.1, 0.1);
        assert!(recovered > squashed);
    }

    #[test]
    fn soft_knee_is_continuous() {
        let mut c = Compressor::new(44100.0);
        c.configure(-24.0, 4.0, 6.0, 0.003, 0.25);
        let below = c.gain_reduction(-27.0);
        let above = c.gain_reduction(-21.0);
        assert_eq!(below, 0.0);
        assert!((above - (-3.0 * 0.75)).abs() < 1e-9);
        assert!((c.gain_reduction(-27.0 + 1e-6)).abs() < 1e-6);
    }
}
