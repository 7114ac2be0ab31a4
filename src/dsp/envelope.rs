//! ADSR envelope generator.

use serde::{Deserialize, Serialize};

/// ADSR timings in seconds, sustain as a level in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Adsr {
    pub attack: f64,
    pub decay: f64,
    pub sustain: f64,
    pub release: f64,
}

impl Adsr {
    pub const fn new(attack: f64, decay: f64, sustain: f64, release: f64) -> Self {
        Adsr {
            attack,
            decay,
            sustain,
            release,
        }
    }

    /// Seconds from gate-on until silence for a note held `gate` seconds.
    pub fn tail(&self, gate: f64) -> f64 {
        gate.max(self.attack) + self.release
    }
}

impl Default for Adsr {
    fn default() -> Self {
        Adsr::new(0.01, 0.1, 0.7, 0.3)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Stage {
    Idle,
    Attack,
    Decay,
    Sustain,
    Release,
}

/// Linear-segment ADSR.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub adsr: Adsr,
    stage: Stage,
    level: f64,
    sample_rate: f64,
    stage_samples: usize,
    stage_counter: usize,
    /// Level at the start of the current stage.
    start_level: f64,
}

impl Envelope {
    pub fn new(adsr: Adsr, sample_rate: f64) -> Self {
        Envelope {
            adsr,
            stage: Stage::Idle,
            level: 0.0,
            sample_rate,
            stage_samples: 0,
            stage_counter: 0,
            start_level: 0.0,
        }
    }

    /// Note on. Retriggers from the current level.
    pub fn gate_on(&mut self) {
        self.enter(Stage::Attack, self.adsr.attack);
    }

    /// Note off. Ignored while idle.
    pub fn gate_off(&mut self) {
        if self.stage != Stage::Idle {
            self.enter(Stage::Release, self.adsr.release);
        }
    }

    fn enter(&mut self, stage: Stage, seconds: f64) {
        self.stage = stage;
        self.stage_samples = (seconds.max(0.0) * self.sample_rate) as usize;
        self.stage_counter = 0;
        self.start_level = self.level;
    }

    /// Fraction of the current stage completed, advancing one sample.
    fn step(&mut self) -> Option<f64> {
        if self.stage_samples == 0 || self.stage_counter >= self.stage_samples {
            return None;
        }
        let t = self.stage_counter as f64 / self.stage_samples as f64;
        self.stage_counter += 1;
        Some(t)
    }

    pub fn next_sample(&mut self) -> f64 {
        match self.stage {
            Stage::Idle => self.level = 0.0,
            Stage::Attack => match self.step() {
                Some(t) => self.level = self.start_level + (1.0 - self.start_level) * t,
                None => {
                    self.level = 1.0;
                    self.enter(Stage::Decay, self.adsr.decay);
                }
            },
            Stage::Decay => match self.step() {
                Some(t) => self.level = 1.0 - (1.0 - self.adsr.sustain) * t,
                None => {
                    self.level = self.adsr.sustain;
                    self.stage = Stage::Sustain;
                }
            },
            Stage::Sustain => self.level = self.adsr.sustain,
            Stage::Release => match self.step() {
                Some(t) => self.level = self.start_level * (1.0 - t),
                None => {
                    self.level = 0.0;
                    self.stage = Stage::Idle;
                }
            },
        }
        self.level
    }

    pub fn is_finished(&self) -> bool {
        self.stage == Stage::Idle
    }

    pub fn is_releasing(&self) -> bool {
        self.stage == Stage::Release
    }
}
