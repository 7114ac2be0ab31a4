//! Biquad filter, matching WebAudio `BiquadFilterNode` coefficients.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterType {
    Lowpass,
    Highpass,
    Bandpass,
    Notch,
    Peaking,
    Lowshelf,
    Highshelf,
}

/// A second-order IIR filter in Direct Form II Transposed.
/// Coefficients from the Audio EQ Cookbook (Robert Bristow-Johnson).
#[derive(Debug, Clone)]
pub struct BiquadFilter {
    filter_type: FilterType,
    frequency: f64,
    q: f64,
    /// Used by the peaking and shelf types.
    gain_db: f64,

    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,

    z1: f64,
    z2: f64,

    sample_rate: f64,
    dirty: bool,
}

impl BiquadFilter {
    pub fn new(filter_type: FilterType, sample_rate: f64) -> Self {
        let mut f = BiquadFilter {
            filter_type,
            frequency: 1000.0,
            q: 0.707,
            gain_db: 0.0,
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
            z1: 0.0,
            z2: 0.0,
            sample_rate,
            dirty: true,
        };
        f.update_coefficients();
        f
    }

    pub fn with(filter_type: FilterType, frequency: f64, q: f64, sample_rate: f64) -> Self {
        let mut f = Self::new(filter_type, sample_rate);
        f.frequency = frequency;
        f.q = q;
        f.update_coefficients();
        f
    }

    pub fn filter_type(&self) -> FilterType {
        self.filter_type
    }

    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    pub fn update_coefficients(&mut self) {
        let nyquist = self.sample_rate * 0.5;
        let freq = self.frequency.clamp(10.0, nyquist * 0.99);
        let q = self.q.max(1e-4);
        let w0 = 2.0 * PI * freq / self.sample_rate;
        let cos_w0 = w0.cos();
        let sin_w0 = w0.sin();
        let alpha = sin_w0 / (2.0 * q);
        let a_lin = 10.0_f64.powf(self.gain_db / 40.0);

        let (b0, b1, b2, a0, a1, a2) = match self.filter_type {
            FilterType::Lowpass => {
                let b1 = 1.0 - cos_w0;
                (b1 / 2.0, b1, b1 / 2.0, 1.0 + alpha, -2.0 * cos_w0, 1.0 - alpha)
            }
            FilterType::Highpass => {
                let b0 = (1.0 + cos_w0) / 2.0;
                (b0, -(1.0 + cos_w0), b0, 1.0 + alpha, -2.0 * cos_w0, 1.0 - alpha)
            }
            FilterType::Bandpass => (alpha, 0.0, -alpha, 1.0 + alpha, -2.0 * cos_w0, 1.0 - alpha),
            FilterType::Notch => (1.0, -2.0 * cos_w0, 1.0, 1.0 + alpha, -2.0 * cos_w0, 1.0 - alpha),
            FilterType::Peaking => (
                1.0 + alpha * a_lin,
                -2.0 * cos_w0,
                1.0 - alpha * a_lin,
                1.0 + alpha / a_lin,
                -2.0 * cos_w0,
                1.0 - alpha / a_lin,
            ),
            FilterType::Lowshelf => {
                let k = 2.0 * a_lin.sqrt() * alpha;
                (
                    a_lin * ((a_lin + 1.0) - (a_lin - 1.0) * cos_w0 + k),
                    2.0 * a_lin * ((a_lin - 1.0) - (a_lin + 1.0) * cos_w0),
                    a_lin * ((a_lin + 1.0) - (a_lin - 1.0) * cos_w0 - k),
                    (a_lin + 1.0) + (a_lin - 1.0) * cos_w0 + k,
                    -2.0 * ((a_lin - 1.0) + (a_lin + 1.0) * cos_w0),
                    (a_lin + 1.0) + (a_lin - 1.0) * cos_w0 - k,
                )
            }
            FilterType::Highshelf => {
                let k = 2.0 * a_lin.sqrt() * alpha;
                (
                    a_lin * ((a_lin + 1.0) + (a_lin - 1.0) * cos_w0 + k),
                    -2.0 * a_lin * ((a_lin - 1.0) + (a_lin + 1.0) * cos_w0),
                    a_lin * ((a_lin + 1.0) + (a_lin - 1.0) * cos_w0 - k),
                    (a_lin + 1.0) - (a_lin - 1.0) * cos_w0 + k,
                    2.0 * ((a_lin - 1.0) - (a_lin + 1.0) * cos_w0),
                    (a_lin + 1.0) - (a_lin - 1.0) * cos_w0 - k,
                )
            }
        };

        self.b0 = b0 / a0;
        self.b1 = b1 / a0;
        self.b2 = b2 / a0;
        self.a1 = a1 / a0;
        self.a2 = a2 / a0;
        self.dirty = false;
    }

    #[inline]
    pub fn process(&mut self, input: f64) -> f64 {
        if self.dirty {
            self.update_coefficients();
        }
        let output = self.b0 * input + self.z1;
        self.z1 = self.b1 * input - self.a1 * output + self.z2;
        self.z2 = self.b2 * input - self.a2 * output;
        output
    }

    pub fn reset(&mut self) {
        self.z1 = 0.0;
        self.z2 = 0.0;
    }

    pub fn set_type(&mut self, filter_type: FilterType) {
        if self.filter_type != filter_type {
            self.filter_type = filter_type;
            self.dirty = true;
        }
    }

    pub fn set_frequency(&mut self, freq: f64) {
        if self.frequency != freq {
            self.frequency = freq;
            self.dirty = true;
        }
    }

    pub fn set_q(&mut self, q: f64) {
        if self.q != q {
            self.q = q;
            self.dirty = true;
        }
    }

    pub fn set_gain_db(&mut self, gain_db: f64) {
        if self.gain_db != gain_db {
            self.gain_db = gain_db;
            self.dirty = true;
        }
    }
}

/// Two biquads with shared settings, one per channel.
#[derive(Debug, Clone)]
pub struct StereoBiquad {
    left: BiquadFilter,
    right: BiquadFilter,
}

impl StereoBiquad {
    pub fn new(filter_type: FilterType, frequency: f64, q: f64, sample_rate: f64) -> Self {
        let f = BiquadFilter::with(filter_type, frequency, q, sample_rate);
        StereoBiquad {
            left: f.clone(),
            right: f,
        }
    }

    pub fn set_type(&mut self, filter_type: FilterType) {
        self.left.set_type(filter_type);
        self.right.set_type(filter_type);
    }

    pub fn set_frequency(&mut self, freq: f64) {
        self.left.set_frequency(freq);
        self.right.set_frequency(freq);
    }

    pub fn set_q(&mut self, q: f64) {
        self.left.set_q(q);
        self.right.set_q(q);
    }

    pub fn set_gain_db(&mut self, gain_db: f64) {
        self.left.set_gain_db(gain_db);
        self.right.set_gain_db(gain_db);
    }

    pub fn frequency(&self) -> f64 {
        self.left.frequency()
    }

    #[inline]
    pub fn process(&mut self, left: f32, right: f32) -> (f32, f32) {
        (
            self.left.process(left as f64) as f32,
            self.right.process(right as f64) as f32,
        )
    }

    pub fn process_block(&mut self, left: &mut [f32], right: &mut [f32]) {
        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            (*l, *r) = self.process(*l, *r);
        }
    }

    pub fn reset(&mut self) {
        self.left.reset();
        self.right.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settle_dc(filter: &mut BiquadFilter) -> f64 {
        let mut out = 0.0;
        for _ in 0..4000 {
            out = filter.process(1.0);
        }
        out
    }

    fn sine_peak(filter: &mut BiquadFilter, freq: f64) -> f64 {
        let mut peak = 0.0_f64;
        for i in 0..8820 {
            let input = (2.0 * PI * freq * i as f64 / 44100.0).sin();
            let out = filter.process(input);
            if i > 2000 {
                peak = peak.max(out.abs());
            }
        }
        peak
    }

    #[test]
    fn lowpass_passes_dc_highpass_blocks_it() {
        let mut lp = BiquadFilter::with(FilterType::Lowpass, 5000.0, 0.707, 44100.0);
        let mut hp = BiquadFilter::with(FilterType::Highpass, 1000.0, 0.707, 44100.0);
        assert!((settle_dc(&mut lp) - 1.0).abs() < 1e-3);
        assert!(settle_dc(&mut hp).abs() < 1e-3);
    }

    #[test]
    fn lowpass_attenuates_high_freq() {
        let mut f = BiquadFilter::with(FilterType::Lowpass, 200.0, 0.707, 44100.0);
        assert!(sine_peak(&mut f, 10_000.0) < 0.01);
    }

    #[test]
    fn low_shelf_boosts_bass_only() {
        let mut f = BiquadFilter::with(FilterType::Lowshelf, 300.0, 0.707, 44100.0);
        f.set_gain_db(12.0);
        let dc = settle_dc(&mut f);
        assert!((dc - 10.0_f64.powf(12.0 / 20.0)).abs() < 0.05, "dc gain {dc}");
        let mut f = BiquadFilter::with(FilterType::Lowshelf, 300.0, 0.707, 44100.0);
        f.set_gain_db(12.0);
        assert!((sine_peak(&mut f, 10_000.0) - 1.0).abs() < 0.1);
    }

    #[test]
    fn high_shelf_cut_leaves_dc() {
        let mut f = BiquadFilter::with(FilterType::Highshelf, 3000.0, 0.707, 44100.0);
        f.set_gain_db(-12.0);
        assert!((settle_dc(&mut f) - 1.0).abs() < 0.01);
    }

    #[test]
    fn out_of_range_frequency_stays_finite() {
        let mut f = BiquadFilter::with(FilterType::Bandpass, 90_000.0, 0.0, 44100.0);
        for i in 0..10_000 {
            let input = if i % 100 == 0 { 1.0 } else { 0.0 };
            assert!(f.process(input).is_finite());
        }
    }

    #[test]
    fn stereo_pair_processes_channels_independently() {
        let mut f = StereoBiquad::new(FilterType::Lowpass, 1000.0, 0.707, 44100.0);
        let mut l = vec![1.0_f32; 2000];
        let mut r = vec![0.0_f32; 2000];
        f.process_block(&mut l, &mut r);
        assert!((l[1999] - 1.0).abs() < 1e-3);
        assert_eq!(r[1999], 0.0);
    }
}
