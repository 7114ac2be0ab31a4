//! Noise sources for impacts, explosions and percussion.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoiseColor {
    White,
    /// -3 dB/octave (Paul Kellet's economy filter).
    Pink,
    /// -6 dB/octave, leaky integrated white noise.
    Brown,
}

#[derive(Debug, Clone)]
pub struct Noise {
    pub color: NoiseColor,
    rng: fastrand::Rng,
    b0: f64,
    b1: f64,
    b2: f64,
    brown: f64,
}

impl Noise {
    pub fn new(color: NoiseColor, seed: u64) -> Self {
        Noise {
            color,
            rng: fastrand::Rng::with_seed(seed),
            b0: 0.0,
            b1: 0.0,
            b2: 0.0,
            brown: 0.0,
        }
    }

    pub fn next_sample(&mut self) -> f64 {
        let white = self.rng.f64() * 2.0 - 1.0;
        match self.color {
            NoiseColor::White => white,
            NoiseColor::Pink => {
                self.b0 = 0.99765 * self.b0 + white * 0.0990460;
                self.b1 = 0.96300 * self.b1 + white * 0.2965164;
                self.b2 = 0.57000 * self.b2 + white * 1.0526913;
                (self.b0 + self.b1 + self.b2 + white * 0.1848) * 0.2
            }
            NoiseColor::Brown => {
                self.brown = (self.brown + white * 0.02) / 1.02;
                self.brown * 3.5
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(color: NoiseColor) -> (f64, f64) {
        let mut n = Noise::new(color, 42);
        let samples: Vec<f64> = (0..20000).map(|_| n.next_sample()).collect();
        let mean = samples.iter().sum::<f64>() / samples.len() as f64;
        let peak = samples.iter().fold(0.0_f64, |m, s| m.max(s.abs()));
        (mean, peak)
    }

    #[test]
    fn white_noise_is_centered_and_bounded() {
        let (mean, peak) = stats(NoiseColor::White);
        assert!(mean.abs() < 0.05, "mean {mean}");
        assert!(peak <= 1.0);
    }

    #[test]
    fn colored_noise_stays_in_range() {
        for color in [NoiseColor::Pink, NoiseColor::Brown] {
            let (_, peak) = stats(color);
            assert!(peak > 0.01 && peak < 2.0, "{color:?} peak {peak}");
        }
    }

    #[test]
    fn same_seed_same_sequence() {
        let mut a = Noise::new(NoiseColor::White, 7);
        let mut b = Noise::new(NoiseColor::White, 7);
        for _ in 0..64 {
            assert_eq!(a.next_sample(), b.next_sample());
        }
    }
}
