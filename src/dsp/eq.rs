//! Three-band equalizer: low shelf, peaking mid, high shelf.

use super::filter::{FilterType, StereoBiquad};

#[derive(Debug, Clone)]
pub struct ThreeBandEq {
    low: StereoBiquad,
    mid: StereoBiquad,
    high: StereoBiquad,
}

impl ThreeBandEq {
    pub fn new(sample_rate: f64) -> Self {
        ThreeBandEq {
            low: StereoBiquad::new(FilterType::Lowshelf, 250.0, 0.707, sample_rate),
            mid: StereoBiquad::new(FilterType::Peaking, 1000.0, 0.9, sample_rate),
            high: StereoBiquad::new(FilterType::Highshelf, 4000.0, 0.707, sample_rate),
        }
    }

    /// Band gains in dB.
    pub fn set_gains(&mut self, low: f64, mid: f64, high: f64) {
        self.low.set_gain_db(low.clamp(-40.0, 24.0));
        self.mid.set_gain_db(mid.clamp(-40.0, 24.0));
        self.high.set_gain_db(high.clamp(-40.0, 24.0));
    }

    /// Shelf corner and mid centre frequencies in Hz.
    pub fn set_frequencies(&mut self, low: f64, mid: f64, high: f64) {
        self.low.set_frequency(low);
        self.mid.set_frequency(mid);
        self.high.set_frequency(high);
    }

    #[inline]
    pub fn process(&mut self, left: f32, right: f32) -> (f32, f32) {
        let (l, r) = self.low.process(left, right);
        let (l, r) = self.mid.process(l, r);
        self.high.process(l, r)
    }

    pub fn process_block(&mut self, left: &mut [f32], right: &mut [f32]) {
        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            (*l, *r) = self.process(*l, *r);
        }
    }
}
