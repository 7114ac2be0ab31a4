//! Game-state inputs and the musical parameters derived from them.

use serde::{Deserialize, Serialize};

use crate::config::ProceduralConfig;

use super::patterns::intensity_tier;
use super::theory::{Scale, note_to_midi};

/// Where the player is. Each environment has its own root note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Environment {
    #[default]
    Space,
    Nebula,
    Station,
    AsteroidField,
}

impl Environment {
    pub fn root_note(self) -> &'static str {
        match self {
            Environment::Space => "A2",
            Environment::Nebula => "D2",
            Environment::Station => "E2",
            Environment::AsteroidField => "C2",
        }
    }

    pub fn root_midi(self) -> i32 {
        note_to_midi(self.root_note()).unwrap_or(45)
    }

    /// Semitones between this environment's root and the root of `Space`.
    pub fn transpose(self) -> i32 {
        self.root_midi() - Environment::Space.root_midi()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GameState {
    pub intensity: f64,
    pub danger: f64,
    pub environment: Environment,
    pub success: f64,
}

impl Default for GameState {
    fn default() -> Self {
        GameState {
            intensity: 0.0,
            danger: 0.0,
            environment: Environment::Space,
            success: 0.5,
        }
    }
}

/// Partial update; absent fields keep their value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GameStateUpdate {
    pub intensity: Option<f64>,
    pub danger: Option<f64>,
    pub environment: Option<Environment>,
    pub success: Option<f64>,
}

impl GameStateUpdate {
    pub fn intensity(value: f64) -> Self {
        GameStateUpdate {
            intensity: Some(value),
            ..Default::default()
        }
    }
}

impl GameState {
    /// Merge `update` in, clamping every level to [0, 1].
    pub fn merge(&mut self, update: &GameStateUpdate) {
        if let Some(v) = update.intensity {
            self.intensity = clamp_unit("intensity", v);
        }
        if let Some(v) = update.danger {
            self.danger = clamp_unit("danger", v);
        }
        if let Some(v) = update.success {
            self.success = clamp_unit("success", v);
        }
        if let Some(env) = update.environment {
            self.environment = env;
        }
    }

    pub fn tier(&self) -> usize {
        intensity_tier(self.intensity)
    }

    pub fn scale(&self) -> Scale {
        Scale::for_success(self.success)
    }

    pub fn tempo(&self, config: &ProceduralConfig) -> f64 {
        config.base_tempo + self.intensity * config.tempo_range
    }

    /// Reverb wetness rises with danger.
    pub fn reverb_mix(&self, config: &ProceduralConfig) -> f64 {
        lerp(config.min_reverb_mix, config.max_reverb_mix, self.danger)
    }

    /// Filter cutoff falls as danger rises.
    pub fn cutoff(&self, config: &ProceduralConfig) -> f64 {
        lerp(config.max_cutoff, config.min_cutoff, self.danger)
    }
}

pub(crate) fn clamp_unit(field: &str, value: f64) -> f64 {
    let clamped = if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) };
    if clamped != value {
        tracing::warn!(field, rejected = value, stored = clamped, "game state value out of range");
    }
    clamped
}

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

/// Snapshot of the generator for hosts and tests.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProceduralState {
    pub is_playing: bool,
    pub current_scale: Scale,
    pub current_root: i32,
    pub chord_index: i64,
    pub game_state: GameState,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn merge_clamps_and_keeps_absent_fields() {
        let mut state = GameState::default();
        state.merge(&GameStateUpdate {
            intensity: Some(1.5),
            danger: Some(-0.2),
            ..Default::default()
        });
        assert_eq!(state.intensity, 1.0);
        assert_eq!(state.danger, 0.0);
        assert_eq!(state.success, 0.5);

        state.merge(&GameStateUpdate::intensity(f64::NAN));
        assert_eq!(state.intensity, 0.0);
    }

    #[test]
    fn derived_parameters_follow_state() {
        let config = ProceduralConfig::default();
        let mut state = GameState::default();
        assert_relative_eq!(state.tempo(&config), config.base_tempo);
        assert_relative_eq!(state.cutoff(&config), config.max_cutoff);

        state.merge(&GameStateUpdate {
            intensity: Some(1.0),
            danger: Some(1.0),
            success: Some(0.9),
            ..Default::default()
        });
        assert_relative_eq!(state.tempo(&config), config.base_tempo + config.tempo_range);
        assert_relative_eq!(state.reverb_mix(&config), config.max_reverb_mix);
        assert_relative_eq!(state.cutoff(&config), config.min_cutoff);
        assert_eq!(state.scale(), Scale::Major);
        assert_eq!(state.tier(), 3);
    }

    #[test]
    fn environments_have_roots() {
        assert_eq!(Environment::Space.root_midi(), 45);
        assert_eq!(Environment::AsteroidField.root_midi(), 36);
        assert_eq!(Environment::Space.transpose(), 0);
        assert_eq!(Environment::Station.transpose(), -5);
        let update: GameStateUpdate = serde_json::from_str(r#"{ "environment": "asteroidField" }"#).unwrap();
        assert_eq!(update.environment, Some(Environment::AsteroidField));
    }
}
