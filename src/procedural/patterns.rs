//! Step patterns for each generated part.
//!
//! A pattern is one bar of sixteenth-note steps. Each hit names a chord tone
//! or scale degree relative to the current chord, plus velocity and length.

use serde::{Deserialize, Serialize};

use crate::dsp::envelope::Adsr;
use crate::dsp::oscillator::Waveform;
use crate::dsp::voice::VoicePatch;

use super::theory::safe_index;

/// Steps per beat (sixteenth notes).
pub const STEPS_PER_BEAT: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Part {
    Drums,
    Bass,
    Arpeggio,
    Lead,
    Pad,
    Ambient,
}

impl Part {
    pub const ALL: [Part; 6] = [Part::Drums, Part::Bass, Part::Arpeggio, Part::Lead, Part::Pad, Part::Ambient];

    /// Volume per intensity tier (see [`intensity_tier`]).
    pub fn tier_volumes(self) -> [f64; 4] {
        match self {
            Part::Drums => [0.0, 0.35, 0.5, 0.6],
            Part::Bass => [0.3, 0.4, 0.5, 0.55],
            Part::Arpeggio => [0.0, 0.0, 0.25, 0.35],
            Part::Lead => [0.0, 0.0, 0.0, 0.3],
            Part::Pad => [0.35, 0.3, 0.25, 0.2],
            Part::Ambient => [0.25, 0.2, 0.1, 0.05],
        }
    }

    pub fn volume(self, tier: usize) -> f64 {
        self.tier_volumes()[tier.min(3)]
    }

    /// Octaves above the procedural root.
    pub fn octave(self) -> i32 {
        match self {
            Part::Drums | Part::Bass | Part::Ambient => 0,
            Part::Pad => 1,
            Part::Arpeggio | Part::Lead => 2,
        }
    }

    pub fn patch(self) -> VoicePatch {
        match self {
            // Drums are synthesized per hit; this is the kick body.
            Part::Drums => VoicePatch::new(Waveform::Sine, Adsr::new(0.001, 0.12, 0.0, 0.05)),
            Part::Bass => VoicePatch::new(Waveform::Sawtooth, Adsr::new(0.005, 0.2, 0.6, 0.1)),
            Part::Arpeggio => VoicePatch::new(Waveform::Square, Adsr::new(0.002, 0.08, 0.3, 0.08)),
            Part::Lead => VoicePatch::new(Waveform::Triangle, Adsr::new(0.02, 0.15, 0.7, 0.2)).with_spread(6.0),
            Part::Pad => VoicePatch::new(Waveform::Sawtooth, Adsr::new(0.6, 0.5, 0.8, 1.2)).with_spread(8.0),
            Part::Ambient => VoicePatch::new(Waveform::Sine, Adsr::new(1.5, 1.0, 0.9, 2.0)),
        }
    }
}

/// Lower bounds of intensity tiers 1, 2 and 3.
pub const TIER_BOUNDS: [f64; 3] = [0.25, 0.5, 0.75];

/// Discrete tier 0..=3 for an intensity in [0, 1].
pub fn intensity_tier(intensity: f64) -> usize {
    TIER_BOUNDS.iter().filter(|b| intensity >= **b).count()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Hit {
    /// Kick drum.
    Kick,
    /// Noise hi-hat.
    Hat,
    /// Chord tone index (0 root, 1 third, 2 fifth; wraps upward).
    ChordTone(i64),
    /// Scale degree above the chord root.
    Degree(i64),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Step {
    pub hit: Hit,
    pub velocity: f64,
    /// Length in steps.
    pub length: u32,
}

const fn step(hit: Hit, velocity: f64, length: u32) -> Option<Step> {
    Some(Step { hit, velocity, length })
}

const REST: Option<Step> = None;

#[derive(Debug, Clone, PartialEq)]
pub struct Pattern {
    pub steps: Vec<Option<Step>>,
}

impl Pattern {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Step at any index, wrapped into the bar.
    pub fn at(&self, index: i64) -> Option<Step> {
        self.steps.get(safe_index(index, self.steps.len())).copied().flatten()
    }

    /// Every hit of one part, stacked over several voices.
    pub fn hits_at(patterns: &[Pattern], index: i64) -> Vec<Step> {
        patterns.iter().filter_map(|p| p.at(index)).collect()
    }
}

/// The pattern stack for `part` at intensity `tier`. Several patterns play
/// at once (a pad chord is three).
pub fn patterns_for(part: Part, tier: usize) -> Vec<Pattern> {
    use Hit::*;
    let bar = |steps: [Option<Step>; 16]| Pattern { steps: steps.to_vec() };
    match part {
        Part::Drums => {
            let kick = if tier >= 3 {
                bar([
                    step(Kick, 1.0, 1), REST, REST, REST, step(Kick, 0.8, 1), REST, REST, REST,
                    step(Kick, 1.0, 1), REST, step(Kick, 0.7, 1), REST, step(Kick, 0.8, 1), REST, REST, REST,
                ])
            } else {
                bar([
                    step(Kick, 1.0, 1), REST, REST, REST, REST, REST, REST, REST,
                    step(Kick, 0.9, 1), REST, step(Kick, 0.6, 1), REST, REST, REST, REST, REST,
                ])
            };
            let hat = bar([
                REST, REST, step(Hat, 0.5, 1), REST, REST, REST, step(Hat, 0.6, 1), REST,
                REST, REST, step(Hat, 0.5, 1), REST, REST, REST, step(Hat, 0.6, 1), step(Hat, 0.3, 1),
            ]);
            vec![kick, hat]
        }
        Part::Bass => vec![if tier >= 2 {
            bar([
                step(ChordTone(0), 1.0, 2), REST, step(ChordTone(0), 0.7, 1), REST,
                step(ChordTone(2), 0.8, 2), REST, step(ChordTone(0), 0.7, 1), REST,
                step(ChordTone(0), 1.0, 2), REST, step(ChordTone(1), 0.7, 1), REST,
                step(ChordTone(2), 0.8, 2), REST, step(Degree(-1), 0.6, 1), REST,
            ])
        } else {
            bar([
                step(ChordTone(0), 1.0, 6), REST, REST, REST, REST, REST, REST, REST,
                step(ChordTone(2), 0.8, 6), REST, REST, REST, REST, REST, REST, REST,
            ])
        }],
        Part::Arpeggio => vec![bar([
            step(ChordTone(0), 0.9, 1), step(ChordTone(1), 0.6, 1), step(ChordTone(2), 0.7, 1), step(ChordTone(3), 0.6, 1),
            step(ChordTone(2), 0.8, 1), step(ChordTone(1), 0.6, 1), step(ChordTone(0), 0.7, 1), step(ChordTone(1), 0.6, 1),
            step(ChordTone(0), 0.9, 1), step(ChordTone(2), 0.6, 1), step(ChordTone(3), 0.7, 1), step(ChordTone(4), 0.6, 1),
            step(ChordTone(3), 0.8, 1), step(ChordTone(2), 0.6, 1), step(ChordTone(1), 0.7, 1), step(ChordTone(2), 0.6, 1),
        ])],
        Part::Lead => vec![bar([
            step(Degree(4), 0.9, 3), REST, REST, step(Degree(2), 0.7, 1),
            step(Degree(4), 0.8, 2), REST, step(Degree(5), 0.7, 2), REST,
            step(Degree(4), 0.9, 4), REST, REST, REST,
            step(Degree(2), 0.7, 2), REST, step(Degree(1), 0.6, 2), REST,
        ])],
        // Three sustained chord tones per bar.
        Part::Pad => (0..3)
            .map(|tone| {
                let mut steps = vec![REST; 16];
                steps[0] = step(ChordTone(tone), 0.6, 15);
                Pattern { steps }
            })
            .collect(),
        Part::Ambient => {
            let mut steps = vec![REST; 16];
            steps[0] = step(ChordTone(0), 0.5, 16);
            vec![Pattern { steps }]
        }
    }
}
