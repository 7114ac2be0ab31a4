//! Voice: oscillator(s) shaped by an ADSR envelope.

use serde::{Deserialize, Serialize};

use super::envelope::{Adsr, Envelope};
use super::oscillator::{Oscillator, Waveform};

/// Sound of a synthesized instrument part.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VoicePatch {
    pub waveform: Waveform,
    pub adsr: Adsr,
    /// Cents between the two unison oscillators; 0 uses a single oscillator.
    pub spread: f64,
}

impl VoicePatch {
    pub const fn new(waveform: Waveform, adsr: Adsr) -> Self {
        VoicePatch {
            waveform,
            adsr,
            spread: 0.0,
        }
    }

    pub const fn with_spread(mut self, cents: f64) -> Self {
        self.spread = cents;
        self
    }
}

#[derive(Debug, Clone)]
pub struct Voice {
    primary: Oscillator,
    unison: Option<Oscillator>,
    pub envelope: Envelope,
    pub velocity: f64,
    finished: bool,
}

impl Voice {
    pub fn new(patch: &VoicePatch, sample_rate: f64) -> Self {
        let mut primary = Oscillator::new(patch.waveform, sample_rate);
        let unison = (patch.spread != 0.0).then(|| {
            let mut osc = Oscillator::new(patch.waveform, sample_rate);
            primary.detune = -patch.spread / 2.0;
            osc.detune = patch.spread / 2.0;
            osc
        });
        Voice {
            primary,
            unison,
            envelope: Envelope::new(patch.adsr, sample_rate),
            velocity: 1.0,
            finished: true,
        }
    }

    pub fn note_on(&mut self, frequency: f64, velocity: f64) {
        self.set_frequency(frequency);
        self.primary.reset();
        if let Some(osc) = &mut self.unison {
            osc.reset();
        }
        self.velocity = velocity;
        self.finished = false;
        self.envelope.gate_on();
    }

    pub fn note_off(&mut self) {
        self.envelope.gate_off();
    }

    pub fn set_frequency(&mut self, frequency: f64) {
        self.primary.frequency = frequency;
        if let Some(osc) = &mut self.unison {
            osc.frequency = frequency;
        }
    }

    pub fn next_sample(&mut self) -> f64 {
        if self.finished {
            return 0.0;
        }
        let osc = match &mut self.unison {
            Some(second) => (self.primary.next_sample() + second.next_sample()) * 0.5,
            None => self.primary.next_sample(),
        };
        let env = self.envelope.next_sample();
        if self.envelope.is_finished() {
            self.finished = true;
        }
        osc * env * self.velocity
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLUCK: VoicePatch = VoicePatch::new(Waveform::Triangle, Adsr::new(0.001, 0.001, 0.5, 0.01));

    #[test]
    fn silent_until_note_on() {
        let mut v = Voice::new(&PLUCK, 44100.0);
        assert!(v.is_finished());
        assert_eq!(v.next_sample(), 0.0);
    }

    #[test]
    fn sounds_then_finishes_after_release() {
        let mut v = Voice::new(&PLUCK, 44100.0);
        v.note_on(440.0, 1.0);
        let loud = (0..500).map(|_| v.next_sample().abs()).fold(0.0, f64::max);
        assert!(loud > 0.1);
        v.note_off();
        for _ in 0..2000 {
            v.next_sample();
        }
        assert!(v.is_finished());
    }

    #[test]
    fn unison_stays_in_range() {
        let patch = VoicePatch::new(Waveform::Sawtooth, Adsr::new(0.01, 0.1, 0.8, 0.2)).with_spread(12.0);
        let mut v = Voice::new(&patch, 44100.0);
        v.note_on(110.0, 1.0);
        for _ in 0..44100 {
            assert!(v.next_sample().abs() <= 1.5);
        }
    }
}
