//! Named effect-chain presets.

use serde::{Deserialize, Serialize};

use super::{
    ChorusParams, CompressorParams, DelayParams, DistortionParams, EffectParams, FilterParams, LimiterParams,
    ReverbParams,
};
use crate::dsp::distortion::ShapeCurve;
use crate::dsp::filter::FilterType;
use crate::error::Result;

/// One chain entry: an id plus the flattened, type-tagged parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresetEffect {
    pub id: String,
    #[serde(flatten)]
    pub params: EffectParams,
}

impl PresetEffect {
    pub fn new(id: &str, params: EffectParams) -> Self {
        PresetEffect {
            id: id.to_string(),
            params,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectPreset {
    pub name: String,
    #[serde(default)]
    pub effects: Vec<PresetEffect>,
}

impl EffectPreset {
    pub const BUILTIN: [&'static str; 5] = ["clean", "space", "underwater", "danger", "radio"];

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn builtin(name: &str) -> Option<EffectPreset> {
        let effects = match name {
            "clean" => vec![],
            "space" => vec![
                PresetEffect::new(
                    "reverb",
                    EffectParams::Reverb(ReverbParams {
                        room_size: 0.9,
                        damping: 0.3,
                        mix: 0.45,
                        width: 1.0,
                    }),
                ),
                PresetEffect::new(
                    "echo",
                    EffectParams::Delay(DelayParams {
                        time: 0.375,
                        feedback: 0.4,
                        mix: 0.25,
                    }),
                ),
            ],
            "underwater" => vec![
                PresetEffect::new(
                    "muffle",
                    EffectParams::Filter(FilterParams {
                        filter_type: FilterType::Lowpass,
                        frequency: 600.0,
                        q: 1.2,
                        gain: 0.0,
                    }),
                ),
                PresetEffect::new(
                    "wobble",
                    EffectParams::Chorus(ChorusParams {
                        rate: 0.4,
                        depth: 0.004,
                        delay: 0.02,
                        mix: 0.6,
                    }),
                ),
            ],
            "danger" => vec![
                PresetEffect::new(
                    "grit",
                    EffectParams::Distortion(DistortionParams {
                        amount: 0.3,
                        curve: ShapeCurve::Soft,
                        mix: 0.5,
                    }),
                ),
                PresetEffect::new(
                    "glue",
                    EffectParams::Compressor(CompressorParams {
                        threshold: -18.0,
                        ratio: 6.0,
                        ..Default::default()
                    }),
                ),
                PresetEffect::new("ceiling", EffectParams::Limiter(LimiterParams::default())),
            ],
            "radio" => vec![
                PresetEffect::new(
                    "band",
                    EffectParams::Filter(FilterParams {
                        filter_type: FilterType::Bandpass,
                        frequency: 1800.0,
                        q: 1.5,
                        gain: 0.0,
                    }),
                ),
                PresetEffect::new(
                    "crunch",
                    EffectParams::Distortion(DistortionParams {
                        amount: 0.15,
                        curve: ShapeCurve::Hard,
                        mix: 0.7,
                    }),
                ),
                PresetEffect::new("level", EffectParams::Compressor(CompressorParams::default())),
            ],
            _ => return None,
        };
        Some(EffectPreset {
            name: name.to_string(),
            effects,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::EffectKind;

    #[test]
    fn every_builtin_resolves() {
        for name in EffectPreset::BUILTIN {
            let preset = EffectPreset::builtin(name).unwrap();
            assert_eq!(preset.name, name);
        }
        assert!(EffectPreset::builtin("nope").is_none());
        assert!(EffectPreset::builtin("clean").unwrap().effects.is_empty());
    }

    #[test]
    fn json_entries_are_flat() {
        let json = r#"{
            "name": "custom",
            "effects": [
                {"id": "verb", "type": "reverb", "mix": 0.5},
                {"id": "eq", "type": "threeBandEq", "low": 3.0}
            ]
        }"#;
        let preset = EffectPreset::from_json(json).unwrap();
        assert_eq!(preset.effects.len(), 2);
        assert_eq!(preset.effects[1].params.kind(), EffectKind::ThreeBandEq);

        let again = EffectPreset::from_json(&preset.to_json().unwrap()).unwrap();
        assert_eq!(again, preset);
    }
}
