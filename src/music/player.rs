//! Single-track music with fade in/out and race-free restart.

use std::collections::HashMap;

use crate::buffers::BufferManager;
use crate::config::MusicConfig;
use crate::engine::Runtime;
use crate::error::{EngineError, Result};
use crate::graph::NodeId;
use crate::scheduler::{Deferred, ScheduleToken};

use super::PlaybackVoice;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayOptions {
    pub looping: bool,
    pub fade_in: f64,
    pub volume: f64,
}

impl PlayOptions {
    pub fn from_config(config: &MusicConfig) -> Self {
        PlayOptions {
            looping: true,
            fade_in: config.fade_in,
            volume: config.volume,
        }
    }
}

#[derive(Debug)]
struct Slot {
    voice: PlaybackVoice,
    /// Bumped on every play; a stop scheduled under an older value is stale.
    generation: u64,
    pending_stop: Option<ScheduleToken>,
    /// Stopped but kept for a fast restart.
    parked: bool,
}

/// Voices registered under named slots, at most one per slot.
#[derive(Debug)]
pub struct MusicPlayer {
    slots: HashMap<String, Slot>,
    output: NodeId,
    config: MusicConfig,
}

impl MusicPlayer {
    pub fn new(output: NodeId, config: MusicConfig) -> Self {
        MusicPlayer {
            slots: HashMap::new(),
            output,
            config,
        }
    }

    /// Play `track_id` in the slot of the same name.
    pub fn play(&mut self, rt: &mut Runtime, buffers: &BufferManager, track_id: &str, options: PlayOptions) -> Result<()> {
        self.play_in_slot(rt, buffers, track_id, track_id, options)
    }

    /// Play buffer `track_id` in `slot`. A voice already in the slot for the
    /// same buffer is rewound and faded back in; its pending stop is cancelled.
    pub fn play_in_slot(
        &mut self,
        rt: &mut Runtime,
        buffers: &BufferManager,
        slot_name: &str,
        track_id: &str,
        options: PlayOptions,
    ) -> Result<()> {
        let now = rt.clock.now().secs();
        let volume = options.volume.clamp(0.0, 1.0);

        if let Some(slot) = self.slots.get_mut(slot_name) {
            if slot.voice.buffer_id == track_id {
                if let Some(token) = slot.pending_stop.take() {
                    rt.scheduler.cancel(token);
                }
                slot.generation += 1;
                slot.parked = false;
                rt.graph.source(slot.voice.source)?.seek(0.0);
                if !slot.voice.is_playing(&mut rt.graph, now) {
                    slot.voice.start(&mut rt.graph, now, 0.0)?;
                }
                slot.voice.fade_to(&mut rt.graph, volume, now, options.fade_in)?;
                tracing::debug!(slot = slot_name, track_id, "music restarted");
                return Ok(());
            }
        }
        self.release(rt, slot_name);

        let buffer = buffers
            .get_buffer(track_id)
            .ok_or_else(|| EngineError::MissingBuffer(track_id.to_string()))?;
        let voice = PlaybackVoice::create(&mut rt.graph, track_id, buffer, options.looping, 0.0, self.output)?;
        voice.start(&mut rt.graph, now, 0.0)?;
        voice.fade_to(&mut rt.graph, volume, now, options.fade_in)?;
        self.slots.insert(
            slot_name.to_string(),
            Slot {
                voice,
                generation: 1,
                pending_stop: None,
                parked: false,
            },
        );
        tracing::info!(slot = slot_name, track_id, "music started");
        Ok(())
    }

    /// Fade `slot_name` out. With `retain` the voice is parked for reuse,
    /// otherwise it is disposed once silent.
    pub fn stop(&mut self, rt: &mut Runtime, slot_name: &str, fade_out: f64, retain: bool) -> bool {
        let Some(slot) = self.slots.get_mut(slot_name) else {
            return false;
        };
        let now = rt.clock.now();
        if let Some(token) = slot.pending_stop.take() {
            rt.scheduler.cancel(token);
        }
        if let Err(e) = slot.voice.fade_to(&mut rt.graph, 0.0, now.secs(), fade_out) {
            tracing::warn!(slot = slot_name, error = %e, "music fade failed");
        }
        let token = rt.scheduler.schedule_at(
            now.after(fade_out),
            Deferred::StopMusicSlot {
                slot: slot_name.to_string(),
                generation: slot.generation,
                retain,
            },
        );
        slot.pending_stop = Some(token);
        true
    }

    pub fn stop_all(&mut self, rt: &mut Runtime, fade_out: f64, retain: bool) {
        let names: Vec<String> = self.slots.keys().cloned().collect();
        for name in names {
            self.stop(rt, &name, fade_out, retain);
        }
    }

    /// Fade out every slot but `keep` and dispose them once silent. Parked
    /// slots are disposed at once. Returns how many slots were affected.
    pub fn stop_others(&mut self, rt: &mut Runtime, keep: &str, fade_out: f64) -> usize {
        let names: Vec<String> = self.slots.keys().filter(|name| *name != keep).cloned().collect();
        for name in &names {
            if self.slots.get(name).is_some_and(|s| s.parked) {
                self.release(rt, name);
            } else {
                self.stop(rt, name, fade_out, false);
            }
        }
        names.len()
    }

    /// Run a scheduled stop. Stale generations are ignored.
    pub fn complete_stop(&mut self, rt: &mut Runtime, slot_name: &str, generation: u64, retain: bool) {
        let Some(slot) = self.slots.get_mut(slot_name) else {
            return;
        };
        if slot.generation != generation {
            tracing::debug!(slot = slot_name, generation, current = slot.generation, "stale stop ignored");
            return;
        }
        slot.pending_stop = None;
        if retain {
            let now = rt.clock.now().secs();
            if let Err(e) = slot.voice.stop(&mut rt.graph, now) {
                tracing::warn!(slot = slot_name, error = %e, "music stop failed");
            }
            slot.parked = true;
            tracing::debug!(slot = slot_name, "music parked");
        } else {
            self.release(rt, slot_name);
        }
    }

    /// Dispose one slot immediately.
    pub fn release(&mut self, rt: &mut Runtime, slot_name: &str) -> bool {
        let Some(slot) = self.slots.remove(slot_name) else {
            return false;
        };
        if let Some(token) = slot.pending_stop {
            rt.scheduler.cancel(token);
        }
        slot.voice.dispose(&mut rt.graph);
        tracing::debug!(slot = slot_name, "music voice disposed");
        true
    }

    /// Dispose every slot immediately, no fade.
    pub fn teardown(&mut self, rt: &mut Runtime) {
        let names: Vec<String> = self.slots.keys().cloned().collect();
        for name in names {
            self.release(rt, &name);
        }
    }

    /// Whether any slot is audible or fading.
    pub fn is_active(&self) -> bool {
        self.slots.values().any(|s| !s.parked)
    }

    /// Playing and not on its way out.
    pub fn is_playing(&self, rt: &mut Runtime, slot_name: &str) -> bool {
        let now = rt.clock.now().secs();
        self.slots
            .get(slot_name)
            .is_some_and(|s| !s.parked && s.pending_stop.is_none() && s.voice.is_playing(&mut rt.graph, now))
    }

    pub fn has_pending_stop(&self, slot_name: &str) -> bool {
        self.slots.get(slot_name).is_some_and(|s| s.pending_stop.is_some())
    }

    pub fn voice(&self, slot_name: &str) -> Option<&PlaybackVoice> {
        self.slots.get(slot_name).map(|s| &s.voice)
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn config(&self) -> &MusicConfig {
        &self.config
    }
}
