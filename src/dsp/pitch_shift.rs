//! Delay-line pitch shifter: two read heads half a window apart, crossfaded.

use std::f32::consts::PI;

#[derive(Debug, Clone)]
struct Channel {
    buffer: Vec<f32>,
}

impl Channel {
    fn read(&self, write_pos: usize, delay: f32) -> f32 {
        let len = self.buffer.len();
        let pos = (write_pos as f32 - delay).rem_euclid(len as f32);
        let i = pos as usize % len;
        let frac = pos.fract();
        self.buffer[i] * (1.0 - frac) + self.buffer[(i + 1) % len] * frac
    }
}

#[derive(Debug, Clone)]
pub struct PitchShifter {
    left: Channel,
    right: Channel,
    write_pos: usize,
    /// Read-head delay in samples, sweeping through the window.
    sweep: f32,
    window: f32,
    ratio: f32,
    pub mix: f32,
}

impl PitchShifter {
    pub fn new(sample_rate: f64) -> Self {
        let size = (sample_rate * 0.1) as usize + 2;
        let mut p = PitchShifter {
            left: Channel { buffer: vec![0.0; size] },
            right: Channel { buffer: vec![0.0; size] },
            write_pos: 0,
            sweep: 0.0,
            window: (sample_rate * 0.05) as f32,
            ratio: 1.0,
            mix: 1.0,
        };
        p.set_window(0.05, sample_rate);
        p
    }

    /// Shift in semitones, clamped to one octave either way.
    pub fn set_semitones(&mut self, semitones: f64) {
        self.ratio = 2.0_f32.powf(semitones.clamp(-12.0, 12.0) as f32 / 12.0);
    }

    pub fn ratio(&self) -> f32 {
        self.ratio
    }

    /// Grain window in seconds (10..100 ms).
    pub fn set_window(&mut self, seconds: f64, sample_rate: f64) {
        let max = (self.left.buffer.len() - 2) as f32;
        self.window = ((seconds.clamp(0.01, 0.1) * sample_rate) as f32).min(max);
    }

    #[inline]
    pub fn process(&mut self, left: f32, right: f32) -> (f32, f32) {
        let len = self.left.buffer.len();
        self.left.buffer[self.write_pos] = left;
        self.right.buffer[self.write_pos] = right;

        // Delay shrinks when pitching up, grows when pitching down.
        self.sweep = (self.sweep + 1.0 - self.ratio).rem_euclid(self.window);
        let d1 = self.sweep;
        let d2 = (self.sweep + self.window * 0.5) % self.window;
        // Each head is silent at its wrap point.
        let g1 = (PI * d1 / self.window).sin();
        let g2 = (PI * d2 / self.window).sin();

        let wet_l = self.left.read(self.write_pos, d1) * g1 + self.left.read(self.write_pos, d2) * g2;
        let wet_r = self.right.read(self.write_pos, d1) * g1 + self.right.read(self.write_pos, d2) * g2;

        self.write_pos = (self.write_pos + 1) % len;
        let dry = 1.0 - self.mix;
        (left * dry + wet_l * self.mix, right * dry + wet_r * self.mix)
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

    fn zero_crossings(buf: &[f32]) -> usize {
        buf.windows(2).filter(|w| w[0] <= 0.0 && w[1] > 0.0).count()
    }

    fn shifted(semitones: f64, freq: f32) -> Vec<f32> {
        let mut p = PitchShifter::new(44100.0);
        p.set_semitones(semitones);
        (0..44100)
            .map(|i| {
                let x = (2.0 * PI * freq * i as f32 / 44100.0).sin();
                p.process(x, x).0
            })
            .skip(4410)
            .collect()
    }

    #[test]
    fn octave_up_roughly_doubles_crossings() {
        let out = shifted(12.0, 220.0);
        let crossings = zero_crossings(&out) as f32 / 0.9;
        assert!(crossings > 350.0 && crossings < 560.0, "crossings/s {crossings}");
    }

    #[test]
    fn octave_down_roughly_halves_crossings() {
        let out = shifted(-12.0, 440.0);
        let crossings = zero_crossings(&out) as f32 / 0.9;
        assert!(crossings > 160.0 && crossings < 300.0, "crossings/s {crossings}");
    }

    #[test]
    fn semitones_are_clamped() {
        let mut p = PitchShifter::new(44100.0);
        p.set_semitones(48.0);
        assert!((p.ratio() - 2.0).abs() < 1e-6);
    }
}
