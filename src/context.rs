//! Clock lifecycle and the master output stage.
//!
//! [`ContextManager`] brings the clock up through the host backend, owns the
//! master gain node every sub-graph feeds into, and persists volume and mute
//! through the injected settings store.

use crate::backend::AudioBackend;
use crate::clock::{AudioClock, ClockState};
use crate::config::EngineConfig;
use crate::dsp::param::{RampCurve, gain_to_db};
use crate::engine::Runtime;
use crate::error::{BackendError, Result};
use crate::graph::{AudioGraph, NodeId};
use crate::settings::{MUTED_KEY, SettingsStore, VOLUME_KEY};

pub use crate::dsp::param::db_to_gain;

/// Linear volume (0..1) to decibels, floored at -100 dB.
pub fn volume_to_db(volume: f64) -> f64 {
    gain_to_db(volume)
}

pub struct ContextManager {
    backend: Box<dyn AudioBackend>,
    settings: Box<dyn SettingsStore>,
    master: NodeId,
    volume: f64,
    muted: bool,
    volume_ramp: f64,
    mute_ramp: f64,
}

impl std::fmt::Debug for ContextManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextManager")
            .field("master", &self.master)
            .field("volume", &self.volume)
            .field("muted", &self.muted)
            .finish()
    }
}

impl ContextManager {
    /// Create the master gain, wired into the graph destination, at the
    /// persisted level.
    pub fn new(
        config: &EngineConfig,
        backend: Box<dyn AudioBackend>,
        settings: Box<dyn SettingsStore>,
        graph: &mut AudioGraph,
    ) -> Result<Self> {
        let volume = settings
            .get(VOLUME_KEY)
            .and_then(|v| v.parse::<f64>().ok())
            .filter(|v| v.is_finite())
            .unwrap_or(config.default_volume)
            .clamp(0.0, 1.0);
        let muted = settings.get(MUTED_KEY).is_some_and(|v| v == "true");

        let master = graph.add_gain(if muted { 0.0 } else { master_gain(volume) });
        graph.connect(master, graph.destination())?;

        Ok(ContextManager {
            backend,
            settings,
            master,
            volume,
            muted,
            volume_ramp: config.volume_ramp,
            mute_ramp: config.mute_ramp,
        })
    }

    /// Start the clock. A no-op while already running. A blocked start is
    /// logged and swallowed; call again after the next user gesture.
    pub fn initialize(&mut self, clock: &mut AudioClock) -> Result<()> {
        if clock.is_running() {
            tracing::debug!("audio clock already running");
            return Ok(());
        }
        match self.backend.resume() {
            Ok(()) => {
                clock.set_state(ClockState::Running);
                tracing::info!(sample_rate = self.backend.sample_rate(), "audio clock running");
                Ok(())
            }
            Err(BackendError::Blocked(reason)) => {
                clock.set_state(ClockState::Suspended);
                tracing::warn!(%reason, "audio start blocked, waiting for a user gesture");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Pause the clock (host backgrounded). `initialize` resumes it.
    pub fn suspend(&mut self, clock: &mut AudioClock) {
        if clock.is_running() {
            self.backend.suspend();
            clock.set_state(ClockState::Suspended);
            tracing::info!("audio clock suspended");
        }
    }

    pub fn set_volume(&mut self, rt: &mut Runtime, volume: f64) {
        let clamped = if volume.is_nan() { 0.0 } else { volume.clamp(0.0, 1.0) };
        if clamped != volume {
            tracing::warn!(field = "volume", rejected = volume, stored = clamped, "volume out of range");
        }
        self.volume = clamped;
        self.persist(VOLUME_KEY, &clamped.to_string());
        if !self.muted {
            let now = rt.clock.now().secs();
            self.ramp_master(rt, master_gain(clamped), now, self.volume_ramp);
        }
    }

    pub fn volume(&self) -> f64 {
        self.volume
    }

    /// Flip mute and return the new state.
    pub fn toggle_mute(&mut self, rt: &mut Runtime) -> bool {
        self.muted = !self.muted;
        let target = if self.muted { 0.0 } else { master_gain(self.volume) };
        let now = rt.clock.now().secs();
        self.ramp_master(rt, target, now, self.mute_ramp);
        self.persist(MUTED_KEY, if self.muted { "true" } else { "false" });
        tracing::debug!(muted = self.muted, "mute toggled");
        self.muted
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    /// Gain the master stage is heading to.
    pub fn effective_gain(&self, graph: &mut AudioGraph) -> f64 {
        graph.gain(self.master).map_or(0.0, |g| g.target_value())
    }

    pub fn master(&self) -> NodeId {
        self.master
    }

    pub fn sample_rate(&self) -> u32 {
        self.backend.sample_rate()
    }

    pub fn can_play_audio(&self, clock: &AudioClock) -> bool {
        clock.is_running()
    }

    fn ramp_master(&self, rt: &mut Runtime, target: f64, now: f64, duration: f64) {
        match rt.graph.gain(self.master) {
            Ok(gain) => gain.ramp_to(target, now, duration, RampCurve::Linear),
            Err(e) => tracing::warn!(error = %e, "master gain missing"),
        }
    }

    fn persist(&mut self, key: &str, value: &str) {
        if let Err(e) = self.settings.set(key, value) {
            tracing::warn!(key, error = %e, "failed to persist setting");
        }
    }
}

fn master_gain(volume: f64) -> f64 {
    if volume <= 0.0 {
        0.0
    } else {
        db_to_gain(volume_to_db(volume))
    }
}
