//! LFO modulation effects: tremolo (amplitude) and vibrato (pitch).

use std::f64::consts::PI;

use super::chorus::Chorus;

#[derive(Debug, Clone)]
pub struct Tremolo {
    phase: f64,
    sample_rate: f64,
    /// Hz.
    pub rate: f64,
    /// 0 leaves the signal untouched, 1 swings the gain down to silence.
    pub depth: f64,
}

impl Tremolo {
    pub fn new(sample_rate: f64) -> Self {
        Tremolo {
            phase: 0.0,
            sample_rate,
            rate: 5.0,
            depth: 0.5,
        }
    }

    #[inline]
    pub fn process(&mut self, left: f32, right: f32) -> (f32, f32) {
        let lfo = (self.phase * 2.0 * PI).sin() * 0.5 + 0.5;
        let gain = (1.0 - self.depth.clamp(0.0, 1.0) * (1.0 - lfo)) as f32;
        self.phase = (self.phase + self.rate / self.sample_rate).fract();
        (left * gain, right * gain)
    }

    pub fn process_block(&mut self, left: &mut [f32], right: &mut [f32]) {
        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            (*l, *r) = self.process(*l, *r);
        }
    }
}

/// Fully wet modulated delay centred on half the buffer.
#[derive(Debug, Clone)]
pub struct Vibrato {
    buffer_l: Vec<f32>,
    buffer_r: Vec<f32>,
    write_pos: usize,
    phase: f64,
    sample_rate: f64,
    /// Hz.
    pub rate: f64,
    /// Peak delay swing in seconds.
    pub depth: f64,
}

/// Largest supported swing in seconds.
const MAX_VIBRATO_DEPTH: f64 = 0.01;

impl Vibrato {
    pub fn new(sample_rate: f64) -> Self {
        let size = (sample_rate * MAX_VIBRATO_DEPTH * 2.0) as usize + 4;
        Vibrato {
            buffer_l: vec![0.0; size],
            buffer_r: vec![0.0; size],
            write_pos: 0,
            phase: 0.0,
            sample_rate,
            rate: 5.0,
            depth: 0.002,
        }
    }

    #[inline]
    pub fn process(&mut self, left: f32, right: f32) -> (f32, f32) {
        let len = self.buffer_l.len();
        self.buffer_l[self.write_pos] = left;
        self.buffer_r[self.write_pos] = right;

        let centre = (len / 2) as f64;
        let swing = self.depth.clamp(0.0, MAX_VIBRATO_DEPTH) * self.sample_rate * (self.phase * 2.0 * PI).sin();
        let delay = (centre + swing).clamp(1.0, (len - 2) as f64);

        let out_l = Chorus::read_interpolated(&self.buffer_l, self.write_pos, delay);
        let out_r = Chorus::read_interpolated(&self.buffer_r, self.write_pos, delay);

        self.write_pos = (self.write_pos + 1) % len;
        self.phase = (self.phase + self.rate / self.sample_rate).fract();
        (out_l, out_r)
    }

    pub fn process_block(&mut self, left: &mut [f32], right: &mut [f32]) {
        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            (*l, *r) = self.process(*l, *r);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tremolo_swings_between_floor_and_unity() {
        let mut t = Tremolo::new(1000.0);
        t.rate = 10.0;
        t.depth = 1.0;
        let gains: Vec<f32> = (0..1000).map(|_| t.process(1.0, 1.0).0).collect();
        let min = gains.iter().cloned().fold(f32::MAX, f32::min);
        let max = gains.iter().cloned().fold(f32::MIN, f32::max);
        assert!(min < 0.01, "min {min}");
        assert!(max > 0.99, "max {max}");
    }

    #[test]
    fn tremolo_without_depth_is_transparent() {
        let mut t = Tremolo::new(44100.0);
        t.depth = 0.0;
        assert_eq!(t.process(0.4, -0.4), (0.4, -0.4));
    }

    #[test]
    fn vibrato_passes_steady_signal_after_fill() {
        let mut v = Vibrato::new(44100.0);
        for _ in 0..2000 {
            v.process(0.5, 0.5);
        }
        let (l, r) = v.process(0.5, 0.5);
        assert!((l - 0.5).abs() < 1e-4 && (r - 0.5).abs() < 1e-4);
    }
}
