//! wasm-bindgen facade for browser hosts.
//!
//! The host owns the AudioWorklet: it calls [`WasmGameAudio::render`] once
//! per quantum with the two output channels.

use wasm_bindgen::prelude::*;

use crate::buffers::{AudioBuffer, decode_audio};
use crate::config::EngineConfig;
use crate::effects::EffectPreset;
use crate::engine::GameAudio;
use crate::music::PlayOptions;
use crate::procedural::GameStateUpdate;
use crate::sfx::{ExplosionSize, SfxId, WeaponCategory};

fn js_error(e: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&e.to_string())
}

fn parse_name<T: serde::de::DeserializeOwned>(name: &str) -> Result<T, JsValue> {
    serde_json::from_value(serde_json::Value::String(name.to_string())).map_err(js_error)
}

/// WASM-exposed: return the nebula_audio version string.
#[wasm_bindgen]
pub fn core_version() -> String {
    crate::VERSION.to_string()
}

#[wasm_bindgen]
pub struct WasmGameAudio {
    inner: GameAudio,
}

#[wasm_bindgen]
impl WasmGameAudio {
    /// Build an engine from an optional JSON config.
    #[wasm_bindgen(constructor)]
    pub fn new(config_json: Option<String>) -> Result<WasmGameAudio, JsValue> {
        let config = match config_json {
            Some(json) => EngineConfig::from_json(&json).map_err(js_error)?,
            None => EngineConfig::default(),
        };
        Ok(WasmGameAudio {
            inner: GameAudio::offline(config).map_err(js_error)?,
        })
    }

    pub fn initialize(&mut self) -> Result<(), JsValue> {
        self.inner.initialize().map_err(js_error)
    }

    pub fn suspend(&mut self) {
        self.inner.suspend();
    }

    pub fn render(&mut self, left: &mut [f32], right: &mut [f32]) {
        self.inner.render(left, right);
    }

    #[wasm_bindgen(js_name = registerSample)]
    pub fn register_sample(&mut self, id: &str, samples: Vec<f32>, sample_rate: u32, essential: bool) {
        self.inner.register_buffer(id, AudioBuffer::mono(samples, sample_rate), essential);
    }

    /// Decode WAV or MP3 bytes and register them under `id`.
    #[wasm_bindgen(js_name = registerSampleBytes)]
    pub fn register_sample_bytes(&mut self, id: &str, bytes: Vec<u8>, essential: bool) -> Result<(), JsValue> {
        let buffer = decode_audio(&bytes).map_err(js_error)?;
        self.inner.register_buffer(id, buffer, essential);
        Ok(())
    }

    #[wasm_bindgen(js_name = playSample)]
    pub fn play_sample(&mut self, id: &str, volume: f64, looping: bool) -> Option<u64> {
        self.inner.play_sample(id, volume, looping).map(|h| h.get())
    }

    #[wasm_bindgen(js_name = setVolume)]
    pub fn set_volume(&mut self, volume: f64) {
        self.inner.set_volume(volume);
    }

    #[wasm_bindgen(js_name = toggleMute)]
    pub fn toggle_mute(&mut self) -> bool {
        self.inner.toggle_mute()
    }

    #[wasm_bindgen(js_name = playMenuMusic)]
    pub fn play_menu_music(&mut self, procedural: bool) -> bool {
        self.inner.play_menu_music(procedural)
    }

    #[wasm_bindgen(js_name = stopMenuMusic)]
    pub fn stop_menu_music(&mut self) -> bool {
        self.inner.stop_menu_music()
    }

    #[wasm_bindgen(js_name = playMusic)]
    pub fn play_music(&mut self, track_id: &str, looping: bool) -> bool {
        let options = PlayOptions {
            looping,
            ..PlayOptions::from_config(&self.inner.config().music)
        };
        self.inner.play_music(track_id, options)
    }

    #[wasm_bindgen(js_name = startLayeredMusic)]
    pub fn start_layered_music(&mut self, base_id: &str) -> bool {
        self.inner.start_layered_music(base_id)
    }

    #[wasm_bindgen(js_name = addMusicLayer)]
    pub fn add_music_layer(&mut self, id: &str, volume: f64) -> bool {
        self.inner.add_music_layer(id, volume)
    }

    #[wasm_bindgen(js_name = setLayerVolume)]
    pub fn set_layer_volume(&mut self, id: &str, volume: f64) -> bool {
        self.inner.set_layer_volume(id, volume)
    }

    #[wasm_bindgen(js_name = removeMusicLayer)]
    pub fn remove_music_layer(&mut self, id: &str) -> bool {
        self.inner.remove_music_layer(id)
    }

    #[wasm_bindgen(js_name = stopLayeredMusic)]
    pub fn stop_layered_music(&mut self) -> bool {
        self.inner.stop_layered_music()
    }

    #[wasm_bindgen(js_name = startProceduralMusic)]
    pub fn start_procedural_music(&mut self) -> bool {
        self.inner.start_procedural_music()
    }

    #[wasm_bindgen(js_name = stopProceduralMusic)]
    pub fn stop_procedural_music(&mut self) -> bool {
        self.inner.stop_procedural_music()
    }

    /// Accepts `{ intensity?, danger?, environment?, success? }`.
    #[wasm_bindgen(js_name = updateGameState)]
    pub fn update_game_state(&mut self, update: JsValue) -> Result<(), JsValue> {
        let update: GameStateUpdate = serde_wasm_bindgen::from_value(update).map_err(js_error)?;
        self.inner.update_game_state(&update);
        Ok(())
    }

    #[wasm_bindgen(js_name = setIntensity)]
    pub fn set_intensity(&mut self, intensity: f64) {
        self.inner.set_intensity(intensity);
    }

    #[wasm_bindgen(js_name = proceduralState)]
    pub fn procedural_state(&self) -> Result<JsValue, JsValue> {
        serde_wasm_bindgen::to_value(&self.inner.procedural_state()).map_err(js_error)
    }

    #[wasm_bindgen(js_name = playLaserSound)]
    pub fn play_laser_sound(&mut self, category: &str) -> Result<Option<u64>, JsValue> {
        let category: WeaponCategory = parse_name(category)?;
        Ok(self.inner.play_laser_sound(category).map(SfxId::get))
    }

    #[wasm_bindgen(js_name = playCollisionSound)]
    pub fn play_collision_sound(&mut self, intensity: f64) -> Option<u64> {
        self.inner.play_collision_sound(intensity).map(SfxId::get)
    }

    #[wasm_bindgen(js_name = playExplosionSound)]
    pub fn play_explosion_sound(&mut self, size: &str) -> Result<Option<u64>, JsValue> {
        let size: ExplosionSize = parse_name(size)?;
        Ok(self.inner.play_explosion_sound(size).map(SfxId::get))
    }

    #[wasm_bindgen(js_name = startEngineHum)]
    pub fn start_engine_hum(&mut self) -> Option<u64> {
        self.inner.start_engine_hum().map(SfxId::get)
    }

    #[wasm_bindgen(js_name = stopAllEffects)]
    pub fn stop_all_effects(&mut self, fade_out: f64) -> usize {
        self.inner.stop_all_effects(fade_out)
    }

    /// Apply a built-in preset by name, or a preset given as JSON.
    #[wasm_bindgen(js_name = applyPreset)]
    pub fn apply_preset(&mut self, name_or_json: &str) -> Result<bool, JsValue> {
        if name_or_json.trim_start().starts_with('{') {
            let preset = EffectPreset::from_json(name_or_json).map_err(js_error)?;
            self.inner.apply_preset(&preset).map_err(js_error)?;
            return Ok(true);
        }
        self.inner.apply_builtin_preset(name_or_json).map_err(js_error)
    }

    pub fn dispose(&mut self) {
        self.inner.dispose();
    }
}
