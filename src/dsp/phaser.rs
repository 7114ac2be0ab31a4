//! Stereo phaser: an LFO-swept chain of first-order allpass stages.

use std::f32::consts::PI;

#[derive(Debug, Clone, Copy, Default)]
struct AllpassState {
    x1: f32,
    y1: f32,
}

#[derive(Debug, Clone)]
pub struct Phaser {
    stages_l: Vec<AllpassState>,
    stages_r: Vec<AllpassState>,
    phase: f32,
    sample_rate: f32,
    last_l: f32,
    last_r: f32,
    /// LFO rate in Hz.
    pub rate: f32,
    /// Sweep depth in [0, 1].
    pub depth: f32,
    pub feedback: f32,
    pub mix: f32,
    /// Lowest notch frequency in Hz.
    pub base_frequency: f32,
}

impl Phaser {
    pub fn new(sample_rate: f64, stages: usize) -> Self {
        let stages = stages.clamp(2, 12);
        Phaser {
            stages_l: vec![AllpassState::default(); stages],
            stages_r: vec![AllpassState::default(); stages],
            phase: 0.0,
            sample_rate: sample_rate as f32,
            last_l: 0.0,
            last_r: 0.0,
            rate: 0.5,
            depth: 0.7,
            feedback: 0.3,
            mix: 0.5,
            base_frequency: 200.0,
        }
    }

    pub fn stage_count(&self) -> usize {
        self.stages_l.len()
    }

    /// Resize the allpass chain, clearing its state.
    pub fn set_stages(&mut self, stages: usize) {
        let stages = stages.clamp(2, 12);
        self.stages_l = vec![AllpassState::default(); stages];
        self.stages_r = vec![AllpassState::default(); stages];
    }

    #[inline]
    fn run_chain(stages: &mut [AllpassState], input: f32, alpha: f32) -> f32 {
        let mut signal = input;
        for state in stages {
            let out = alpha * signal + state.x1 - alpha * state.y1;
            state.x1 = signal;
            state.y1 = out;
            signal = out;
        }
        signal
    }

    #[inline]
    pub fn process(&mut self, left: f32, right: f32) -> (f32, f32) {
        let lfo = (self.phase * 2.0 * PI).sin() * 0.5 + 0.5;
        let freq = (self.base_frequency + self.depth.clamp(0.0, 1.0) * lfo * 1800.0).min(self.sample_rate * 0.45);
        let t = (PI * freq / self.sample_rate).tan();
        let alpha = (t - 1.0) / (t + 1.0);
        let feedback = self.feedback.clamp(0.0, 0.9);

        let wet_l = Self::run_chain(&mut self.stages_l, left + self.last_l * feedback, alpha);
        let wet_r = Self::run_chain(&mut self.stages_r, right + self.last_r * feedback, alpha);
        self.last_l = wet_l;
        self.last_r = wet_r;

        self.phase = (self.phase + self.rate / self.sample_rate).fract();

        let dry = 1.0 - self.mix;
        (left * dry + wet_l * self.mix, right * dry + wet_r * self.mix)
    }

    pub fn process_block(&mut self, left: &mut [f32], right: &mut [f32]) {
        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            (*l, *r) = self.process(*l, *r);
        }
    }
}
