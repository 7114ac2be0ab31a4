//! Anti-aliased oscillators using PolyBLEP.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Waveform {
    Sine,
    Square,
    Sawtooth,
    Triangle,
}

/// A band-limited oscillator. Frequency may be changed every sample
/// (sweeps, vibrato) without phase discontinuities.
#[derive(Debug, Clone)]
pub struct Oscillator {
    pub waveform: Waveform,
    pub frequency: f64,
    /// Detune in cents.
    pub detune: f64,
    phase: f64,
    sample_rate: f64,
}

impl Oscillator {
    pub fn new(waveform: Waveform, sample_rate: f64) -> Self {
        Oscillator {
            waveform,
            frequency: 440.0,
            detune: 0.0,
            phase: 0.0,
            sample_rate,
        }
    }

    pub fn with_frequency(mut self, frequency: f64) -> Self {
        self.frequency = frequency;
        self
    }

    fn phase_inc(&self) -> f64 {
        let freq = self.frequency * (2.0_f64).powf(self.detune / 1200.0);
        (freq / self.sample_rate).clamp(0.0, 0.5)
    }

    pub fn next_sample(&mut self) -> f64 {
        let inc = self.phase_inc();
        let sample = match self.waveform {
            Waveform::Sine => (2.0 * PI * self.phase).sin(),
            Waveform::Sawtooth => 2.0 * self.phase - 1.0 - poly_blep(self.phase, inc),
            Waveform::Square => self.square(inc),
            Waveform::Triangle => {
                if self.phase < 0.5 {
                    4.0 * self.phase - 1.0
                } else {
                    3.0 - 4.0 * self.phase
                }
            }
        };

        self.phase += inc;
        if self.phase >= 1.0 {
            self.phase -= 1.0;
        }
        sample
    }

    fn square(&self, inc: f64) -> f64 {
        let mut value = if self.phase < 0.5 { 1.0 } else { -1.0 };
        value += poly_blep(self.phase, inc);
        value -= poly_blep((self.phase + 0.5) % 1.0, inc);
        value
    }

    pub fn reset(&mut self) {
        self.phase = 0.0;
    }
}

/// PolyBLEP correction around a waveform discontinuity.
///
/// `t` is the phase in [0, 1), `dt` the phase increment per sample.
fn poly_blep(t: f64, dt: f64) -> f64 {
    if dt <= 0.0 {
        return 0.0;
    }
    if t < dt {
        let t = t / dt;
        2.0 * t - t * t - 1.0
    } else if t > 1.0 - dt {
        let t = (t - 1.0) / dt;
        t * t + 2.0 * t + 1.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peak(waveform: Waveform) -> f64 {
        let mut osc = Oscillator::new(waveform, 44100.0).with_frequency(440.0);
        (0..44100).map(|_| osc.next_sample().abs()).fold(0.0, f64::max)
    }

    #[test]
    fn sine_starts_at_zero() {
        let mut osc = Oscillator::new(Waveform::Sine, 44100.0);
        assert!(osc.next_sample().abs() < 1e-10);
    }

    #[test]
    fn waveforms_stay_bounded() {
        assert!(peak(Waveform::Sine) <= 1.0);
        assert!(peak(Waveform::Triangle) <= 1.0);
        assert!(peak(Waveform::Sawtooth) <= 1.5);
        assert!(peak(Waveform::Square) <= 1.5);
    }

    #[test]
    fn octave_detune_doubles_increment() {
        let a = Oscillator::new(Waveform::Sine, 44100.0).with_frequency(220.0);
        let mut b = a.clone();
        b.detune = 1200.0;
        assert!((b.phase_inc() - 2.0 * a.phase_inc()).abs() < 1e-12);
    }

    #[test]
    fn per_sample_sweep_stays_finite() {
        let mut osc = Oscillator::new(Waveform::Sawtooth, 44100.0);
        for i in 0..4410 {
            osc.frequency = 2000.0 - i as f64 * 0.4;
            assert!(osc.next_sample().is_finite());
        }
    }

    #[test]
    fn waveform_names_round_trip() {
        let w: Waveform = serde_json::from_str("\"sawtooth\"").unwrap();
        assert_eq!(w, Waveform::Sawtooth);
    }
}
