//! Engine configuration.
//!
//! Loaded from JSON (camelCase keys). Every field has a default so a config
//! file only needs to name what it overrides.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::procedural::theory::note_to_midi;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    pub sample_rate: u32,
    /// Frames rendered per block; scheduled actions fire on block boundaries.
    pub block_size: usize,
    /// Master volume used when the settings store has no persisted value.
    pub default_volume: f64,
    /// Ramp applied to the master gain on volume changes (seconds).
    pub volume_ramp: f64,
    /// Ramp applied to the master gain on mute toggles (seconds).
    pub mute_ramp: f64,
    /// Buffer id used for menu music.
    pub menu_track: String,
    pub music: MusicConfig,
    pub procedural: ProceduralConfig,
    pub sfx: SfxConfig,
    /// Assets loaded by `preload_essentials`.
    pub essentials: Vec<ManifestEntry>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            sample_rate: 44100,
            block_size: 128,
            default_volume: 0.7,
            volume_ramp: 0.05,
            mute_ramp: 0.1,
            menu_track: "menu".to_string(),
            music: MusicConfig::default(),
            procedural: ProceduralConfig::default(),
            sfx: SfxConfig::default(),
            essentials: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MusicConfig {
    pub fade_in: f64,
    pub fade_out: f64,
    pub layer_fade: f64,
    pub volume: f64,
}

impl Default for MusicConfig {
    fn default() -> Self {
        MusicConfig {
            fade_in: 1.0,
            fade_out: 1.0,
            layer_fade: 2.0,
            volume: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProceduralConfig {
    pub base_tempo: f64,
    /// Extra BPM reached at intensity 1.0.
    pub tempo_range: f64,
    /// Root note used until the environment picks another (e.g. "A2").
    pub root_note: String,
    pub beats_per_bar: u32,
    pub min_reverb_mix: f64,
    pub max_reverb_mix: f64,
    pub min_cutoff: f64,
    pub max_cutoff: f64,
    pub fade_out: f64,
    pub volume: f64,
    /// How far ahead of the render position notes are scheduled (seconds).
    pub lookahead: f64,
    pub seed: u64,
}

impl Default for ProceduralConfig {
    fn default() -> Self {
        ProceduralConfig {
            base_tempo: 90.0,
            tempo_range: 50.0,
            root_note: "A2".to_string(),
            beats_per_bar: 4,
            min_reverb_mix: 0.15,
            max_reverb_mix: 0.6,
            min_cutoff: 800.0,
            max_cutoff: 6000.0,
            fade_out: 2.0,
            volume: 0.6,
            lookahead: 0.1,
            seed: 0x5eed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SfxConfig {
    /// Seconds past an effect's nominal duration before its nodes are disposed.
    pub dispose_margin: f64,
    pub volume: f64,
}

impl Default for SfxConfig {
    fn default() -> Self {
        SfxConfig {
            dispose_margin: 0.1,
            volume: 0.8,
        }
    }
}

/// One asset of the preload manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    pub id: String,
    pub url: String,
    /// A failure of a critical entry fails the whole preload.
    #[serde(default)]
    pub critical: bool,
    /// Hex SHA-256 of the encoded asset bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

impl ManifestEntry {
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        ManifestEntry {
            id: id.into(),
            url: url.into(),
            critical: false,
            sha256: None,
        }
    }

    pub fn critical(mut self) -> Self {
        self.critical = true;
        self
    }
}

impl EngineConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if !(8000..=192_000).contains(&self.sample_rate) {
            return Err(EngineError::Config(format!(
                "sampleRate {} outside 8000..=192000",
                self.sample_rate
            )));
        }
        if self.block_size == 0 || self.block_size > 8192 {
            return Err(EngineError::Config(format!(
                "blockSize {} outside 1..=8192",
                self.block_size
            )));
        }
        if !(0.0..=1.0).contains(&self.default_volume) {
            return Err(EngineError::Config(format!(
                "defaultVolume {} outside 0..=1",
                self.default_volume
            )));
        }
        if self.procedural.beats_per_bar == 0 {
            return Err(EngineError::Config("procedural.beatsPerBar must be > 0".into()));
        }
        if note_to_midi(&self.procedural.root_note).is_none() {
            return Err(EngineError::Config(format!(
                "procedural.rootNote '{}' is not a note name",
                self.procedural.root_note
            )));
        }
        if self.procedural.base_tempo <= 0.0 {
            return Err(EngineError::Config("procedural.baseTempo must be > 0".into()));
        }
        let ramps = [
            ("volumeRamp", self.volume_ramp),
            ("muteRamp", self.mute_ramp),
            ("music.fadeIn", self.music.fade_in),
            ("music.fadeOut", self.music.fade_out),
            ("music.layerFade", self.music.layer_fade),
            ("procedural.fadeOut", self.procedural.fade_out),
            ("sfx.disposeMargin", self.sfx.dispose_margin),
        ];
        for (name, value) in ramps {
            if !value.is_finite() || value < 0.0 {
                return Err(EngineError::Config(format!("{name} must be a finite, non-negative duration")));
            }
        }
        Ok(())
    }

    pub fn block_duration(&self) -> f64 {
        self.block_size as f64 / self.sample_rate as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.block_size, 128);
        assert_eq!(config.menu_track, "menu");
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = EngineConfig::from_json(
            r#"{
                "sampleRate": 48000,
                "music": { "layerFade": 0.5 },
                "essentials": [
                    { "id": "menu", "url": "music/menu.wav", "critical": true },
                    { "id": "laser", "url": "sfx/laser.wav" }
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(config.sample_rate, 48000);
        assert_eq!(config.music.layer_fade, 0.5);
        assert_eq!(config.music.fade_in, 1.0);
        assert_eq!(config.essentials.len(), 2);
        assert!(config.essentials[0].critical);
        assert!(!config.essentials[1].critical);
        assert_eq!(config.procedural.root_note, "A2");
    }

    #[test]
    fn rejects_bad_block_size() {
        let err = EngineConfig::from_json(r#"{ "blockSize": 0 }"#).unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[test]
    fn rejects_negative_ramp() {
        let err = EngineConfig::from_json(r#"{ "muteRamp": -1.0 }"#).unwrap_err();
        assert!(err.to_string().contains("muteRamp"));
    }

    #[test]
    fn rejects_unknown_root_note() {
        let err = EngineConfig::from_json(r#"{ "procedural": { "rootNote": "H9" } }"#).unwrap_err();
        assert!(err.to_string().contains("rootNote"));
    }

    #[test]
    fn malformed_json_is_json_error() {
        let err = EngineConfig::from_json("{ not json").unwrap_err();
        assert!(matches!(err, EngineError::Json(_)));
    }
}
