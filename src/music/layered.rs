//! Layered music: several looping stems locked to the shared transport.
//!
//! The base layer starts with the transport at position 0. Later layers
//! start at the transport's elapsed time as their buffer offset, so every
//! stem reads the same musical position. Layer removal and the final stop are
//! scheduled in beats, not seconds.

use crate::buffers::BufferManager;
use crate::clock::BeatTime;
use crate::config::MusicConfig;
use crate::engine::Runtime;
use crate::error::{EngineError, Result};
use crate::graph::NodeId;
use crate::scheduler::{Deferred, ScheduleToken};

use super::PlaybackVoice;

#[derive(Debug)]
pub struct MusicLayer {
    pub id: String,
    pub voice: PlaybackVoice,
    pub target_volume: f64,
    /// Transport position the layer joined at.
    pub start_time: BeatTime,
    generation: u64,
    removal: Option<ScheduleToken>,
}

impl MusicLayer {
    pub fn is_removing(&self) -> bool {
        self.removal.is_some()
    }
}

#[derive(Debug)]
pub struct LayeredMusic {
    layers: Vec<MusicLayer>,
    output: NodeId,
    config: MusicConfig,
    active: bool,
    /// Session generation; a scheduled final stop carries the value it was
    /// scheduled under.
    generation: u64,
    next_layer_generation: u64,
    stop: Option<ScheduleToken>,
    disposed_layers: usize,
}

impl LayeredMusic {
    pub fn new(output: NodeId, config: MusicConfig) -> Self {
        LayeredMusic {
            layers: Vec::new(),
            output,
            config,
            active: false,
            generation: 0,
            next_layer_generation: 0,
            stop: None,
            disposed_layers: 0,
        }
    }

    /// Reset the transport to 0 and start `base_id` as the first layer.
    pub fn start(&mut self, rt: &mut Runtime, buffers: &BufferManager, base_id: &str) -> Result<()> {
        let buffer = buffers
            .get_buffer(base_id)
            .ok_or_else(|| EngineError::MissingBuffer(base_id.to_string()))?;
        self.teardown(rt);

        rt.clock.transport.reset();
        rt.clock.transport.start();
        self.active = true;
        self.generation += 1;

        let now = rt.clock.now().secs();
        let voice = PlaybackVoice::create(&mut rt.graph, base_id, buffer, true, 0.0, self.output)?;
        voice.start(&mut rt.graph, now, 0.0)?;
        voice.fade_to(&mut rt.graph, self.config.volume, now, self.config.fade_in)?;
        self.push_layer(base_id, voice, self.config.volume, BeatTime(0.0));
        tracing::info!(base_id, "layered music started");
        Ok(())
    }

    /// Join `id` in phase with the running layers and fade it in. Returns
    /// `Ok(false)` when layered music is not running.
    pub fn add_layer(
        &mut self,
        rt: &mut Runtime,
        buffers: &BufferManager,
        id: &str,
        volume: f64,
        fade_in: f64,
    ) -> Result<bool> {
        if !self.active {
            tracing::warn!(id, "add_layer without layered music running");
            return Ok(false);
        }
        let volume = clamp_volume(id, volume);
        let now = rt.clock.now().secs();

        if let Some(layer) = self.layers.iter_mut().find(|l| l.id == id) {
            if let Some(token) = layer.removal.take() {
                rt.scheduler.cancel(token);
            }
            layer.target_volume = volume;
            layer.voice.fade_to(&mut rt.graph, volume, now, fade_in)?;
            return Ok(true);
        }

        let buffer = buffers
            .get_buffer(id)
            .ok_or_else(|| EngineError::MissingBuffer(id.to_string()))?;
        let offset = rt.clock.transport.seconds();
        let voice = PlaybackVoice::create(&mut rt.graph, id, buffer, true, 0.0, self.output)?;
        voice.start(&mut rt.graph, now, offset)?;
        voice.fade_to(&mut rt.graph, volume, now, fade_in)?;
        let position = rt.clock.transport.position();
        self.push_layer(id, voice, volume, position);
        tracing::debug!(id, volume, %position, "layer added");
        Ok(true)
    }

    fn push_layer(&mut self, id: &str, voice: PlaybackVoice, volume: f64, start_time: BeatTime) {
        self.next_layer_generation += 1;
        self.layers.push(MusicLayer {
            id: id.to_string(),
            voice,
            target_volume: volume,
            start_time,
            generation: self.next_layer_generation,
            removal: None,
        });
    }

    pub fn set_layer_volume(&mut self, rt: &mut Runtime, id: &str, volume: f64, ramp: f64) -> bool {
        let volume = clamp_volume(id, volume);
        let now = rt.clock.now().secs();
        let Some(layer) = self.layers.iter_mut().find(|l| l.id == id && l.removal.is_none()) else {
            return false;
        };
        layer.target_volume = volume;
        layer.voice.fade_to(&mut rt.graph, volume, now, ramp).is_ok()
    }

    /// Fade `id` out; it is disposed once the transport has covered the fade.
    pub fn remove_layer(&mut self, rt: &mut Runtime, id: &str, fade_out: f64) -> bool {
        let now = rt.clock.now().secs();
        let transport = &rt.clock.transport;
        let at = transport.position().after(transport.beats_from_seconds(fade_out));
        let Some(layer) = self.layers.iter_mut().find(|l| l.id == id && l.removal.is_none()) else {
            return false;
        };
        if let Err(e) = layer.voice.fade_to(&mut rt.graph, 0.0, now, fade_out) {
            tracing::warn!(id, error = %e, "layer fade failed");
        }
        layer.removal = Some(rt.scheduler.schedule_at_beat(
            at,
            Deferred::RemoveLayer {
                id: id.to_string(),
                generation: layer.generation,
            },
        ));
        tracing::debug!(id, %at, "layer removal scheduled");
        true
    }

    /// Run a scheduled layer removal.
    pub fn complete_removal(&mut self, rt: &mut Runtime, id: &str, generation: u64) {
        let Some(index) = self.layers.iter().position(|l| l.id == id && l.generation == generation) else {
            tracing::debug!(id, generation, "stale layer removal ignored");
            return;
        };
        let layer = self.layers.remove(index);
        layer.voice.dispose(&mut rt.graph);
        self.disposed_layers += 1;
        tracing::debug!(id, "layer disposed");
    }

    /// Fade every layer out, then stop the transport and dispose them.
    pub fn stop(&mut self, rt: &mut Runtime, fade_out: f64) -> bool {
        if !self.active || self.stop.is_some() {
            return false;
        }
        let now = rt.clock.now().secs();
        for layer in &mut self.layers {
            if let Some(token) = layer.removal.take() {
                rt.scheduler.cancel(token);
            }
            if let Err(e) = layer.voice.fade_to(&mut rt.graph, 0.0, now, fade_out) {
                tracing::warn!(id = %layer.id, error = %e, "layer fade failed");
            }
        }
        let transport = &rt.clock.transport;
        let at = transport.position().after(transport.beats_from_seconds(fade_out));
        self.stop = Some(rt.scheduler.schedule_at_beat(
            at,
            Deferred::StopLayered {
                generation: self.generation,
            },
        ));
        tracing::info!(%at, "layered music stopping");
        true
    }

    /// Run a scheduled final stop.
    pub fn complete_stop(&mut self, rt: &mut Runtime, generation: u64) {
        if generation != self.generation || !self.active {
            tracing::debug!(generation, "stale layered stop ignored");
            return;
        }
        self.stop = None;
        self.teardown(rt);
        tracing::info!("layered music stopped");
    }

    /// Dispose everything now and stop the transport.
    pub fn teardown(&mut self, rt: &mut Runtime) {
        if let Some(token) = self.stop.take() {
            rt.scheduler.cancel(token);
        }
        for layer in self.layers.drain(..) {
            if let Some(token) = layer.removal {
                rt.scheduler.cancel(token);
            }
            layer.voice.dispose(&mut rt.graph);
            self.disposed_layers += 1;
        }
        if self.active {
            rt.clock.transport.stop();
            rt.clock.transport.reset();
        }
        self.active = false;
        self.generation += 1;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Layers that are playing and not being removed.
    pub fn active_layers(&self) -> Vec<&str> {
        self.layers
            .iter()
            .filter(|l| l.removal.is_none())
            .map(|l| l.id.as_str())
            .collect()
    }

    pub fn layer(&self, id: &str) -> Option<&MusicLayer> {
        self.layers.iter().find(|l| l.id == id)
    }

    /// Layers disposed since construction.
    pub fn disposed_layers(&self) -> usize {
        self.disposed_layers
    }

    pub fn config(&self) -> &MusicConfig {
        &self.config
    }
}

fn clamp_volume(id: &str, volume: f64) -> f64 {
    let clamped = if volume.is_nan() { 0.0 } else { volume.clamp(0.0, 1.0) };
    if clamped != volume {
        tracing::warn!(id, rejected = volume, stored = clamped, "layer volume out of range");
    }
    clamped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffers::{AudioBuffer, MemorySource};
    use crate::clock::ClockState;
    use crate::config::EngineConfig;
    use std::sync::Arc;

    fn setup() -> (Runtime, BufferManager, LayeredMusic) {
        let mut rt = Runtime::new(&EngineConfig::default());
        rt.clock.set_state(ClockState::Running);
        let buffers = BufferManager::new(Arc::new(MemorySource::new()));
        buffers.insert("base", AudioBuffer::mono(vec![0.3; 88200], 44100), false);
        buffers.insert("pad", AudioBuffer::mono(vec![0.2; 88200], 44100), false);
        let dest = rt.graph.destination();
        (rt, buffers, LayeredMusic::new(dest, MusicConfig::default()))
    }

    fn dispatch(rt: &mut Runtime, music: &mut LayeredMusic) {
        for action in rt.take_due() {
            match action {
                Deferred::RemoveLayer { id, generation } => music.complete_removal(rt, &id, generation),
                Deferred::StopLayered { generation } => music.complete_stop(rt, generation),
                _ => {}
            }
        }
    }

    #[test]
    fn missing_base_fails_without_side_effects() {
        let (mut rt, buffers, mut music) = setup();
        assert!(music.start(&mut rt, &buffers, "nope").is_err());
        assert!(!music.is_active());
        assert!(!rt.clock.transport.is_running());
    }

    #[test]
    fn late_layer_joins_at_transport_time() {
        let (mut rt, buffers, mut music) = setup();
        music.start(&mut rt, &buffers, "base").unwrap();
        rt.render_for(0.5);
        assert!(music.add_layer(&mut rt, &buffers, "pad", 0.7, 0.5).unwrap());
        let layer = music.layer("pad").unwrap();
        assert!(layer.start_time.beats() > 0.0);
        rt.render_for(0.1);
        let source = layer.voice.source;
        let pos = rt.graph.source(source).unwrap().player.position_secs();
        assert!((pos - rt.clock.transport.seconds()).abs() < 0.01);
    }

    #[test]
    fn removed_layer_is_disposed_once() {
        let (mut rt, buffers, mut music) = setup();
        music.start(&mut rt, &buffers, "base").unwrap();
        music.add_layer(&mut rt, &buffers, "pad", 0.7, 0.1).unwrap();
        assert!(music.remove_layer(&mut rt, "pad", 0.5));
        assert!(!music.remove_layer(&mut rt, "pad", 0.5));
        assert_eq!(music.active_layers(), vec!["base"]);
        rt.render_for(0.6);
        dispatch(&mut rt, &mut music);
        assert!(music.layer("pad").is_none());
        assert_eq!(music.disposed_layers(), 1);
        assert_eq!(rt.graph.live_count(), 2);
    }

    #[test]
    fn readding_cancels_removal() {
        let (mut rt, buffers, mut music) = setup();
        music.start(&mut rt, &buffers, "base").unwrap();
        music.add_layer(&mut rt, &buffers, "pad", 0.7, 0.1).unwrap();
        music.remove_layer(&mut rt, "pad", 0.5);
        music.add_layer(&mut rt, &buffers, "pad", 0.4, 0.1).unwrap();
        rt.render_for(1.0);
        dispatch(&mut rt, &mut music);
        assert_eq!(music.active_layers(), vec!["base", "pad"]);
        assert_eq!(music.layer("pad").unwrap().target_volume, 0.4);
    }

    #[test]
    fn stop_fades_then_disposes_everything() {
        let (mut rt, buffers, mut music) = setup();
        music.start(&mut rt, &buffers, "base").unwrap();
        music.add_layer(&mut rt, &buffers, "pad", 0.5, 0.1).unwrap();
        assert!(music.stop(&mut rt, 0.5));
        rt.render_for(0.3);
        dispatch(&mut rt, &mut music);
        assert!(music.is_active());
        rt.render_for(0.3);
        dispatch(&mut rt, &mut music);
        assert!(!music.is_active());
        assert!(!rt.clock.transport.is_running());
        assert_eq!(rt.graph.live_count(), 0);
        assert_eq!(music.disposed_layers(), 2);
    }

    #[test]
    fn layer_volume_is_clamped() {
        let (mut rt, buffers, mut music) = setup();
        music.start(&mut rt, &buffers, "base").unwrap();
        music.add_layer(&mut rt, &buffers, "pad", 3.0, 0.0).unwrap();
        assert_eq!(music.layer("pad").unwrap().target_volume, 1.0);
        assert!(music.set_layer_volume(&mut rt, "pad", -1.0, 0.0));
        assert_eq!(music.layer("pad").unwrap().target_volume, 0.0);
    }
}
