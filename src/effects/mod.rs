//! Insertable effects: strongly typed parameters and the processors they drive.
//!
//! [`EffectParams`] is a tagged union with one variant per effect kind. It is
//! the unit of configuration for [`EffectsChain`] and the JSON shape of an
//! [`EffectPreset`] entry (`{"type": "reverb", "roomSize": 0.8, ...}`).

pub mod chain;
pub mod presets;

use serde::{Deserialize, Serialize};

pub use chain::EffectsChain;
pub use presets::{EffectPreset, PresetEffect};

use crate::dsp::chorus::Chorus;
use crate::dsp::compressor::Compressor;
use crate::dsp::delay::Delay;
use crate::dsp::distortion::{Distortion, ShapeCurve};
use crate::dsp::eq::ThreeBandEq;
use crate::dsp::filter::{FilterType, StereoBiquad};
use crate::dsp::limiter::Limiter;
use crate::dsp::modulation::{Tremolo, Vibrato};
use crate::dsp::phaser::Phaser;
use crate::dsp::pitch_shift::PitchShifter;
use crate::dsp::reverb::Reverb;

/// Longest delay time a delay effect accepts (seconds).
pub const MAX_DELAY_TIME: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EffectKind {
    Reverb,
    Delay,
    Distortion,
    Chorus,
    Phaser,
    Tremolo,
    Vibrato,
    Filter,
    ThreeBandEq,
    Compressor,
    Limiter,
    PitchShift,
}

impl EffectKind {
    pub const ALL: [EffectKind; 12] = [
        EffectKind::Reverb,
        EffectKind::Delay,
        EffectKind::Distortion,
        EffectKind::Chorus,
        EffectKind::Phaser,
        EffectKind::Tremolo,
        EffectKind::Vibrato,
        EffectKind::Filter,
        EffectKind::ThreeBandEq,
        EffectKind::Compressor,
        EffectKind::Limiter,
        EffectKind::PitchShift,
    ];
}

impl std::fmt::Display for EffectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EffectKind::Reverb => "reverb",
            EffectKind::Delay => "delay",
            EffectKind::Distortion => "distortion",
            EffectKind::Chorus => "chorus",
            EffectKind::Phaser => "phaser",
            EffectKind::Tremolo => "tremolo",
            EffectKind::Vibrato => "vibrato",
            EffectKind::Filter => "filter",
            EffectKind::ThreeBandEq => "threeBandEq",
            EffectKind::Compressor => "compressor",
            EffectKind::Limiter => "limiter",
            EffectKind::PitchShift => "pitchShift",
        };
        f.write_str(name)
    }
}

// ── Parameter sets ──────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ReverbParams {
    pub room_size: f64,
    pub damping: f64,
    pub mix: f64,
    pub width: f64,
}

impl Default for ReverbParams {
    fn default() -> Self {
        ReverbParams {
            room_size: 0.7,
            damping: 0.5,
            mix: 0.3,
            width: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DelayParams {
    /// Seconds, up to [`MAX_DELAY_TIME`].
    pub time: f64,
    pub feedback: f64,
    pub mix: f64,
}

impl Default for DelayParams {
    fn default() -> Self {
        DelayParams {
            time: 0.25,
            feedback: 0.3,
            mix: 0.3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DistortionParams {
    /// 0..1, mapped onto drive.
    pub amount: f64,
    pub curve: ShapeCurve,
    pub mix: f64,
}

impl Default for DistortionParams {
    fn default() -> Self {
        DistortionParams {
            amount: 0.4,
            curve: ShapeCurve::Soft,
            mix: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ChorusParams {
    pub rate: f64,
    pub depth: f64,
    pub delay: f64,
    pub mix: f64,
}

impl Default for ChorusParams {
    fn default() -> Self {
        ChorusParams {
            rate: 1.5,
            depth: 0.002,
            delay: 0.015,
            mix: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PhaserParams {
    pub rate: f64,
    pub depth: f64,
    pub feedback: f64,
    pub mix: f64,
    pub stages: usize,
    pub base_frequency: f64,
}

impl Default for PhaserParams {
    fn default() -> Self {
        PhaserParams {
            rate: 0.5,
            depth: 0.7,
            feedback: 0.3,
            mix: 0.5,
            stages: 4,
            base_frequency: 200.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TremoloParams {
    pub rate: f64,
    pub depth: f64,
}

impl Default for TremoloParams {
    fn default() -> Self {
        TremoloParams { rate: 5.0, depth: 0.5 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct VibratoParams {
    pub rate: f64,
    /// Peak delay swing in seconds.
    pub depth: f64,
}

impl Default for VibratoParams {
    fn default() -> Self {
        VibratoParams { rate: 5.0, depth: 0.002 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FilterParams {
    pub filter_type: FilterType,
    pub frequency: f64,
    pub q: f64,
    /// Only used by the peaking and shelving types.
    pub gain: f64,
}

impl Default for FilterParams {
    fn default() -> Self {
        FilterParams {
            filter_type: FilterType::Lowpass,
            frequency: 1000.0,
            q: std::f64::consts::FRAC_1_SQRT_2,
            gain: 0.0,
        }
    }
}

/// Band gains in dB.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EqParams {
    pub low: f64,
    pub mid: f64,
    pub high: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CompressorParams {
    pub threshold: f64,
    pub ratio: f64,
    pub knee: f64,
    pub attack: f64,
    pub release: f64,
    pub makeup: f64,
}

impl Default for CompressorParams {
    fn default() -> Self {
        CompressorParams {
            threshold: -24.0,
            ratio: 4.0,
            knee: 6.0,
            attack: 0.003,
            release: 0.25,
            makeup: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LimiterParams {
    /// dBFS.
    pub ceiling: f64,
    pub release: f64,
}

impl Default for LimiterParams {
    fn default() -> Self {
        LimiterParams {
            ceiling: -1.0,
            release: 0.05,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PitchShiftParams {
    pub semitones: f64,
    /// Grain window in seconds.
    pub window: f64,
    pub mix: f64,
}

impl Default for PitchShiftParams {
    fn default() -> Self {
        PitchShiftParams {
            semitones: 0.0,
            window: 0.05,
            mix: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EffectParams {
    Reverb(ReverbParams),
    Delay(DelayParams),
    Distortion(DistortionParams),
    Chorus(ChorusParams),
    Phaser(PhaserParams),
    Tremolo(TremoloParams),
    Vibrato(VibratoParams),
    Filter(FilterParams),
    ThreeBandEq(EqParams),
    Compressor(CompressorParams),
    Limiter(LimiterParams),
    PitchShift(PitchShiftParams),
}

impl EffectParams {
    pub fn kind(&self) -> EffectKind {
        match self {
            EffectParams::Reverb(_) => EffectKind::Reverb,
            EffectParams::Delay(_) => EffectKind::Delay,
            EffectParams::Distortion(_) => EffectKind::Distortion,
            EffectParams::Chorus(_) => EffectKind::Chorus,
            EffectParams::Phaser(_) => EffectKind::Phaser,
            EffectParams::Tremolo(_) => EffectKind::Tremolo,
            EffectParams::Vibrato(_) => EffectKind::Vibrato,
            EffectParams::Filter(_) => EffectKind::Filter,
            EffectParams::ThreeBandEq(_) => EffectKind::ThreeBandEq,
            EffectParams::Compressor(_) => EffectKind::Compressor,
            EffectParams::Limiter(_) => EffectKind::Limiter,
            EffectParams::PitchShift(_) => EffectKind::PitchShift,
        }
    }

    /// Default parameters for `kind`.
    pub fn defaults(kind: EffectKind) -> EffectParams {
        match kind {
            EffectKind::Reverb => EffectParams::Reverb(ReverbParams::default()),
            EffectKind::Delay => EffectParams::Delay(DelayParams::default()),
            EffectKind::Distortion => EffectParams::Distortion(DistortionParams::default()),
            EffectKind::Chorus => EffectParams::Chorus(ChorusParams::default()),
            EffectKind::Phaser => EffectParams::Phaser(PhaserParams::default()),
            EffectKind::Tremolo => EffectParams::Tremolo(TremoloParams::default()),
            EffectKind::Vibrato => EffectParams::Vibrato(VibratoParams::default()),
            EffectKind::Filter => EffectParams::Filter(FilterParams::default()),
            EffectKind::ThreeBandEq => EffectParams::ThreeBandEq(EqParams::default()),
            EffectKind::Compressor => EffectParams::Compressor(CompressorParams::default()),
            EffectKind::Limiter => EffectParams::Limiter(LimiterParams::default()),
            EffectKind::PitchShift => EffectParams::PitchShift(PitchShiftParams::default()),
        }
    }
}

// ── Processors ──────────────────────────────────────────────

#[derive(Debug, Clone)]
enum Unit {
    Reverb(Reverb),
    Delay(Delay),
    Distortion(Distortion),
    Chorus(Chorus),
    Phaser(Phaser),
    Tremolo(Tremolo),
    Vibrato(Vibrato),
    Filter(StereoBiquad),
    ThreeBandEq(ThreeBandEq),
    Compressor(Compressor),
    Limiter(Limiter),
    PitchShift(PitchShifter),
}

/// One effect instance, configured from [`EffectParams`] and processed in
/// place by the graph.
#[derive(Debug, Clone)]
pub struct EffectProcessor {
    unit: Unit,
    sample_rate: f64,
}

impl EffectProcessor {
    pub fn new(params: &EffectParams, sample_rate: f64) -> Self {
        let unit = match params {
            EffectParams::Reverb(_) => Unit::Reverb(Reverb::new(sample_rate)),
            EffectParams::Delay(_) => Unit::Delay(Delay::new(sample_rate, MAX_DELAY_TIME)),
            EffectParams::Distortion(_) => Unit::Distortion(Distortion::default()),
            EffectParams::Chorus(_) => Unit::Chorus(Chorus::new(sample_rate)),
            EffectParams::Phaser(p) => Unit::Phaser(Phaser::new(sample_rate, p.stages)),
            EffectParams::Tremolo(_) => Unit::Tremolo(Tremolo::new(sample_rate)),
            EffectParams::Vibrato(_) => Unit::Vibrato(Vibrato::new(sample_rate)),
            EffectParams::Filter(p) => Unit::Filter(StereoBiquad::new(p.filter_type, p.frequency, p.q, sample_rate)),
            EffectParams::ThreeBandEq(_) => Unit::ThreeBandEq(ThreeBandEq::new(sample_rate)),
            EffectParams::Compressor(_) => Unit::Compressor(Compressor::new(sample_rate)),
            EffectParams::Limiter(_) => Unit::Limiter(Limiter::new(sample_rate)),
            EffectParams::PitchShift(_) => Unit::PitchShift(PitchShifter::new(sample_rate)),
        };
        let mut processor = EffectProcessor { unit, sample_rate };
        processor.apply(params);
        processor
    }

    pub fn kind(&self) -> EffectKind {
        match self.unit {
            Unit::Reverb(_) => EffectKind::Reverb,
            Unit::Delay(_) => EffectKind::Delay,
            Unit::Distortion(_) => EffectKind::Distortion,
            Unit::Chorus(_) => EffectKind::Chorus,
            Unit::Phaser(_) => EffectKind::Phaser,
            Unit::Tremolo(_) => EffectKind::Tremolo,
            Unit::Vibrato(_) => EffectKind::Vibrato,
            Unit::Filter(_) => EffectKind::Filter,
            Unit::ThreeBandEq(_) => EffectKind::ThreeBandEq,
            Unit::Compressor(_) => EffectKind::Compressor,
            Unit::Limiter(_) => EffectKind::Limiter,
            Unit::PitchShift(_) => EffectKind::PitchShift,
        }
    }

    /// Update parameters in place. Returns false (and changes nothing) when
    /// `params` is for a different kind.
    pub fn apply(&mut self, params: &EffectParams) -> bool {
        match (&mut self.unit, params) {
            (Unit::Reverb(r), EffectParams::Reverb(p)) => {
                r.set_room_size(p.room_size);
                r.set_damping(p.damping);
                r.set_mix(p.mix);
                r.set_width(p.width);
            }
            (Unit::Delay(d), EffectParams::Delay(p)) => {
                d.set_time(p.time.clamp(0.0, MAX_DELAY_TIME));
                d.set_feedback(p.feedback);
                d.set_mix(p.mix);
            }
            (Unit::Distortion(d), EffectParams::Distortion(p)) => {
                d.set_amount(p.amount);
                d.curve = p.curve;
                d.mix = p.mix.clamp(0.0, 1.0) as f32;
            }
            (Unit::Chorus(c), EffectParams::Chorus(p)) => {
                c.set_rate(p.rate);
                c.set_depth(p.depth);
                c.set_delay(p.delay);
                c.set_mix(p.mix);
            }
            (Unit::Phaser(ph), EffectParams::Phaser(p)) => {
                ph.set_stages(p.stages);
                ph.rate = p.rate.max(0.0) as f32;
                ph.depth = p.depth.clamp(0.0, 1.0) as f32;
                ph.feedback = p.feedback.clamp(-0.95, 0.95) as f32;
                ph.mix = p.mix.clamp(0.0, 1.0) as f32;
                ph.base_frequency = p.base_frequency.max(20.0) as f32;
            }
            (Unit::Tremolo(t), EffectParams::Tremolo(p)) => {
                t.rate = p.rate.max(0.0);
                t.depth = p.depth.clamp(0.0, 1.0);
            }
            (Unit::Vibrato(v), EffectParams::Vibrato(p)) => {
                v.rate = p.rate.max(0.0);
                v.depth = p.depth.max(0.0);
            }
            (Unit::Filter(f), EffectParams::Filter(p)) => {
                f.set_type(p.filter_type);
                f.set_frequency(p.frequency);
                f.set_q(p.q);
                f.set_gain_db(p.gain);
            }
            (Unit::ThreeBandEq(eq), EffectParams::ThreeBandEq(p)) => eq.set_gains(p.low, p.mid, p.high),
            (Unit::Compressor(c), EffectParams::Compressor(p)) => {
                c.configure(p.threshold, p.ratio, p.knee, p.attack, p.release);
                c.makeup = p.makeup;
            }
            (Unit::Limiter(l), EffectParams::Limiter(p)) => l.configure(p.ceiling, p.release),
            (Unit::PitchShift(ps), EffectParams::PitchShift(p)) => {
                ps.set_semitones(p.semitones);
                ps.set_window(p.window, self.sample_rate);
                ps.mix = p.mix.clamp(0.0, 1.0) as f32;
            }
            _ => return false,
        }
        true
    }

    pub fn process_block(&mut self, left: &mut [f32], right: &mut [f32]) {
        match &mut self.unit {
            Unit::Reverb(u) => u.process_block(left, right),
            Unit::Delay(u) => u.process_block(left, right),
            Unit::Distortion(u) => u.process_block(left, right),
            Unit::Chorus(u) => u.process_block(left, right),
            Unit::Phaser(u) => u.process_block(left, right),
            Unit::Tremolo(u) => u.process_block(left, right),
            Unit::Vibrato(u) => u.process_block(left, right),
            Unit::Filter(u) => u.process_block(left, right),
            Unit::ThreeBandEq(u) => u.process_block(left, right),
            Unit::Compressor(u) => u.process_block(left, right),
            Unit::Limiter(u) => u.process_block(left, right),
            Unit::PitchShift(u) => u.process_block(left, right),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_use_a_type_tag() {
        let params: EffectParams = serde_json::from_str(r#"{"type":"reverb","roomSize":0.9}"#).unwrap();
        match &params {
            EffectParams::Reverb(p) => {
                assert_eq!(p.room_size, 0.9);
                assert_eq!(p.mix, 0.3);
            }
            other => panic!("expected reverb, got {other:?}"),
        }
        let json = serde_json::to_value(EffectParams::defaults(EffectKind::PitchShift)).unwrap();
        assert_eq!(json["type"], "pitchShift");
    }

    #[test]
    fn every_kind_builds_and_reports_itself() {
        for kind in EffectKind::ALL {
            let params = EffectParams::defaults(kind);
            assert_eq!(params.kind(), kind);
            let processor = EffectProcessor::new(&params, 44100.0);
            assert_eq!(processor.kind(), kind);
        }
    }

    #[test]
    fn mismatched_params_are_rejected() {
        let mut p = EffectProcessor::new(&EffectParams::defaults(EffectKind::Delay), 44100.0);
        assert!(!p.apply(&EffectParams::defaults(EffectKind::Reverb)));
        assert!(p.apply(&EffectParams::Delay(DelayParams {
            time: 0.5,
            ..Default::default()
        })));
    }

    #[test]
    fn processors_stay_finite_on_loud_input() {
        for kind in EffectKind::ALL {
            let mut p = EffectProcessor::new(&EffectParams::defaults(kind), 44100.0);
            let mut l: Vec<f32> = (0..512).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
            let mut r = l.clone();
            p.process_block(&mut l, &mut r);
            assert!(l.iter().chain(r.iter()).all(|s| s.is_finite()), "{kind} produced non-finite output");
        }
    }
}
