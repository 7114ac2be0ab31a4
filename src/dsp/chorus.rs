//! Stereo chorus: LFO-modulated delay with quadrature L/R phases.

use std::f64::consts::PI;

/// Longest base delay plus depth the buffer can hold (seconds).
const MAX_DELAY: f64 = 0.05;

#[derive(Debug, Clone)]
pub struct Chorus {
    buffer_l: Vec<f32>,
    buffer_r: Vec<f32>,
    write_pos: usize,
    sample_rate: f64,
    phase_l: f64,
    phase_r: f64,

    /// LFO rate in Hz.
    pub rate: f64,
    /// Modulation depth in seconds.
    pub depth: f64,
    /// Base delay in seconds.
    pub delay: f64,
    pub mix: f64,
}

impl Chorus {
    pub fn new(sample_rate: f64) -> Self {
        let size = (sample_rate * MAX_DELAY) as usize + 2;
        Chorus {
            buffer_l: vec![0.0; size],
            buffer_r: vec![0.0; size],
            write_pos: 0,
            sample_rate,
            phase_l: 0.0,
            phase_r: 0.25,
            rate: 1.5,
            depth: 0.002,
            delay: 0.015,
            mix: 0.5,
        }
    }

    pub fn set_rate(&mut self, rate: f64) {
        self.rate = rate.clamp(0.05, 10.0);
    }

    pub fn set_depth(&mut self, depth: f64) {
        self.depth = depth.clamp(0.0, 0.01);
    }

    pub fn set_delay(&mut self, delay: f64) {
        self.delay = delay.clamp(0.001, 0.035);
    }

    pub fn set_mix(&mut self, mix: f64) {
        self.mix = mix.clamp(0.0, 1.0);
    }

    /// Fractional read `delay_samples` behind `write_pos`.
    #[inline]
    pub(crate) fn read_interpolated(buffer: &[f32], write_pos: usize, delay_samples: f64) -> f32 {
        let len = buffer.len();
        let whole = delay_samples as usize;
        let frac = (delay_samples - whole as f64) as f32;
        let p0 = (write_pos + len - whole % len) % len;
        let p1 = (p0 + len - 1) % len;
        buffer[p0] + frac * (buffer[p1] - buffer[p0])
    }

    #[inline]
    pub fn process(&mut self, left: f32, right: f32) -> (f32, f32) {
        let len = self.buffer_l.len();
        self.buffer_l[self.write_pos] = left;
        self.buffer_r[self.write_pos] = right;

        let max = (len - 2) as f64;
        let delay_l = ((self.delay + self.depth * (2.0 * PI * self.phase_l).sin()) * self.sample_rate).clamp(1.0, max);
        let delay_r = ((self.delay + self.depth * (2.0 * PI * self.phase_r).sin()) * self.sample_rate).clamp(1.0, max);

        let wet_l = Self::read_interpolated(&self.buffer_l, self.write_pos, delay_l);
        let wet_r = Self::read_interpolated(&self.buffer_r, self.write_pos, delay_r);

        self.write_pos = (self.write_pos + 1) % len;
        let inc = self.rate / self.sample_rate;
        self.phase_l = (self.phase_l + inc) % 1.0;
        self.phase_r = (self.phase_r + inc) % 1.0;

        let mix = self.mix as f32;
        (left * (1.0 - mix) + wet_l * mix, right * (1.0 - mix) + wet_r * mix)
    }

    pub fn process_block(&mut self, left: &mut [f32], right: &mut [f32]) {
        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            (*l, *r) = self.process(*l, *r);
        }
    }

    pub fn clear(&mut self) {
        self.buffer_l.fill(0.0);
        self.buffer_r.fill(0.0);
        self.write_pos = 0;
        self.phase_l = 0.0;
        self.phase_r = 0.25;
    }
}
