//! The engine facade and the render runtime it drives.
//!
//! [`Runtime`] bundles the three pieces every component mutates: the audio
//! graph, the clock (with its transport) and the deferred-action scheduler.
//! [`GameAudio`] owns a runtime plus every component, routes their output
//!
//! ```text
//! music / layers / procedural -> music bus --\
//!                                             +-> effects chain -> master -> destination
//! samples / sound effects     -> sfx bus  ---/
//! ```
//!
//! and fires scheduled actions on block boundaries while rendering.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::backend::{AudioBackend, OfflineBackend};
use crate::buffers::{AssetSource, AudioBuffer, BufferManager, CleanupReport, MemorySource, PreloadReport};
use crate::clock::{AudioClock, ClockState};
use crate::config::EngineConfig;
use crate::context::ContextManager;
use crate::effects::{EffectParams, EffectPreset, EffectsChain};
use crate::error::{EngineError, Result};
use crate::graph::{AudioGraph, Node, NodeId};
use crate::music::{LayeredMusic, MusicMode, MusicPlayer, PlayOptions, PlaybackVoice};
use crate::procedural::{GameStateUpdate, ProceduralGenerator, ProceduralState};
use crate::scheduler::{Deferred, ScheduleToken, Scheduler};
use crate::settings::{MemorySettings, SettingsStore};
use crate::sfx::{ExplosionSize, SfxId, SoundEffectSynthesizer, WeaponCategory};

/// Graph, clock and scheduler: the state shared by every component.
#[derive(Debug)]
pub struct Runtime {
    pub graph: AudioGraph,
    pub clock: AudioClock,
    pub scheduler: Scheduler,
    block_size: usize,
}

impl Runtime {
    pub fn new(config: &EngineConfig) -> Self {
        let sr = config.sample_rate;
        Runtime {
            graph: AudioGraph::new(sr as f64),
            clock: AudioClock::new(sr, config.procedural.base_tempo, config.procedural.beats_per_bar),
            scheduler: Scheduler::new(),
            block_size: config.block_size.max(1),
        }
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Render one block and advance the clock. A clock that is not running
    /// renders silence and stays where it is.
    pub fn render_block(&mut self, left: &mut [f32], right: &mut [f32]) {
        let frames = left.len().min(right.len());
        if !self.clock.is_running() {
            left.fill(0.0);
            right.fill(0.0);
            return;
        }
        let now = self.clock.now().secs();
        self.graph.render(now, &mut left[..frames], &mut right[..frames]);
        self.clock.advance_frames(frames);
    }

    /// Render and discard `seconds` of audio in block-sized steps. Scheduled
    /// actions are not fired; see [`Runtime::take_due`].
    pub fn render_for(&mut self, seconds: f64) {
        let mut remaining = (seconds.max(0.0) * self.clock.sample_rate()).round() as usize;
        let mut left = vec![0.0; self.block_size];
        let mut right = vec![0.0; self.block_size];
        while remaining > 0 {
            let n = remaining.min(self.block_size);
            self.render_block(&mut left[..n], &mut right[..n]);
            remaining -= n;
        }
    }

    /// Actions due at the current clock time and transport position.
    pub fn take_due(&mut self) -> Vec<Deferred> {
        let now = self.clock.now();
        let beat = self.clock.transport.position();
        self.scheduler.take_due(now, beat)
    }
}

/// Handle to a sample started with [`GameAudio::play_sample`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VoiceHandle(u64);

impl VoiceHandle {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for VoiceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "voice#{}", self.0)
    }
}

#[derive(Debug)]
struct SampleVoice {
    voice: PlaybackVoice,
    panner: Option<NodeId>,
    disposal: Option<ScheduleToken>,
}

#[derive(Debug)]
pub struct GameAudio {
    config: EngineConfig,
    rt: Runtime,
    context: ContextManager,
    buffers: Arc<BufferManager>,
    chain: EffectsChain,
    music_bus: NodeId,
    sfx_bus: NodeId,
    music: MusicPlayer,
    layered: LayeredMusic,
    procedural: ProceduralGenerator,
    sfx: SoundEffectSynthesizer,
    samples: HashMap<VoiceHandle, SampleVoice>,
    next_voice: u64,
    mode: MusicMode,
    disposed: bool,
}

impl GameAudio {
    pub fn new(
        mut config: EngineConfig,
        backend: Box<dyn AudioBackend>,
        settings: Box<dyn SettingsStore>,
        source: Arc<dyn AssetSource>,
    ) -> Result<Self> {
        let device_rate = backend.sample_rate();
        if device_rate != config.sample_rate {
            tracing::warn!(
                configured = config.sample_rate,
                device = device_rate,
                "sample rate differs from the backend, rendering at the backend rate"
            );
            config.sample_rate = device_rate;
        }
        config.validate()?;
        let mut rt = Runtime::new(&config);
        let context = ContextManager::new(&config, backend, settings, &mut rt.graph)?;

        let chain = EffectsChain::new(&mut rt.graph)?;
        rt.graph.connect(chain.output(), context.master())?;
        let music_bus = rt.graph.add_gain(1.0);
        let sfx_bus = rt.graph.add_gain(1.0);
        rt.graph.connect(music_bus, chain.input())?;
        rt.graph.connect(sfx_bus, chain.input())?;

        tracing::info!(
            sample_rate = config.sample_rate,
            block_size = config.block_size,
            "audio engine created"
        );
        Ok(GameAudio {
            music: MusicPlayer::new(music_bus, config.music.clone()),
            layered: LayeredMusic::new(music_bus, config.music.clone()),
            procedural: ProceduralGenerator::new(music_bus, config.procedural.clone()),
            sfx: SoundEffectSynthesizer::new(sfx_bus, config.sfx.clone()),
            buffers: Arc::new(BufferManager::new(source)),
            samples: HashMap::new(),
            next_voice: 0,
            mode: MusicMode::Idle,
            disposed: false,
            config,
            rt,
            context,
            chain,
            music_bus,
            sfx_bus,
        })
    }

    /// An engine with no device: offline backend, in-memory settings and an
    /// empty in-memory asset source.
    pub fn offline(config: EngineConfig) -> Result<Self> {
        let backend = Box::new(OfflineBackend::new(config.sample_rate));
        Self::new(config, backend, Box::new(MemorySettings::new()), Arc::new(MemorySource::new()))
    }

    fn ensure_live(&self) -> Result<()> {
        if self.disposed {
            return Err(EngineError::Disposed);
        }
        Ok(())
    }

    fn is_live(&self, operation: &str) -> bool {
        if self.disposed {
            tracing::warn!(operation, "engine has been disposed");
        }
        !self.disposed
    }

    // ── Context ─────────────────────────────────────────────

    /// Start the audio clock. Idempotent; a start blocked by the host is
    /// logged and returns `Ok`.
    pub fn initialize(&mut self) -> Result<()> {
        self.ensure_live()?;
        self.context.initialize(&mut self.rt.clock)
    }

    pub fn suspend(&mut self) {
        if self.is_live("suspend") {
            self.context.suspend(&mut self.rt.clock);
        }
    }

    pub fn set_volume(&mut self, volume: f64) {
        if self.is_live("set_volume") {
            self.context.set_volume(&mut self.rt, volume);
        }
    }

    pub fn volume(&self) -> f64 {
        self.context.volume()
    }

    /// Flip mute and return the new state.
    pub fn toggle_mute(&mut self) -> bool {
        if !self.is_live("toggle_mute") {
            return self.context.is_muted();
        }
        self.context.toggle_mute(&mut self.rt)
    }

    pub fn is_muted(&self) -> bool {
        self.context.is_muted()
    }

    /// Gain the master stage is heading to.
    pub fn effective_gain(&mut self) -> f64 {
        self.context.effective_gain(&mut self.rt.graph)
    }

    pub fn sample_rate(&self) -> u32 {
        self.context.sample_rate()
    }

    pub fn can_play_audio(&self) -> bool {
        !self.disposed && self.context.can_play_audio(&self.rt.clock)
    }

    pub fn clock_state(&self) -> ClockState {
        self.rt.clock.state()
    }

    // ── Buffers ─────────────────────────────────────────────

    pub async fn load_sample(&self, url: &str, id: &str, essential: bool) -> Result<()> {
        self.ensure_live()?;
        self.buffers.load_sample(url, id, essential).await.map(|_| ())
    }

    /// Load every manifest entry from the config's `essentials`.
    pub async fn preload_essential_audio(&self) -> Result<PreloadReport> {
        self.ensure_live()?;
        self.buffers.preload_essentials(&self.config.essentials).await
    }

    pub fn cleanup_unused_audio(&self, preserve_essential: bool) -> CleanupReport {
        self.buffers.cleanup_unused(preserve_essential)
    }

    /// Register already-decoded audio under `id`.
    pub fn register_buffer(&self, id: &str, buffer: AudioBuffer, essential: bool) {
        self.buffers.insert(id, buffer, essential);
    }

    pub fn buffers(&self) -> &Arc<BufferManager> {
        &self.buffers
    }

    // ── Samples ─────────────────────────────────────────────

    /// Play a cached buffer on the sfx bus. `None` (and a warning) when the
    /// buffer is missing.
    pub fn play_sample(&mut self, id: &str, volume: f64, looping: bool) -> Option<VoiceHandle> {
        self.start_sample(id, volume, looping, None)
    }

    /// [`GameAudio::play_sample`] through an equal-power panner (-1 left, 1 right).
    pub fn play_sample_panned(&mut self, id: &str, volume: f64, looping: bool, pan: f64) -> Option<VoiceHandle> {
        self.start_sample(id, volume, looping, Some(pan))
    }

    fn start_sample(&mut self, id: &str, volume: f64, looping: bool, pan: Option<f64>) -> Option<VoiceHandle> {
        if !self.is_live("play_sample") {
            return None;
        }
        let Some(buffer) = self.buffers.get_buffer(id) else {
            tracing::warn!(id, "play_sample: no buffer cached");
            return None;
        };
        match self.build_sample(id, buffer, volume, looping, pan) {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::warn!(id, error = %e, "play_sample failed");
                None
            }
        }
    }

    fn build_sample(
        &mut self,
        id: &str,
        buffer: Arc<AudioBuffer>,
        volume: f64,
        looping: bool,
        pan: Option<f64>,
    ) -> Result<VoiceHandle> {
        let volume = if volume.is_nan() { 0.0 } else { volume.clamp(0.0, 1.0) };
        let graph = &mut self.rt.graph;
        let panner = pan.map(|p| graph.add(Node::panner(p)));
        let output = panner.unwrap_or(self.sfx_bus);
        let duration = buffer.duration();
        let voice = match PlaybackVoice::create(graph, id, buffer, looping, volume, output) {
            Ok(voice) => voice,
            Err(e) => {
                if let Some(p) = panner {
                    graph.dispose(p);
                }
                return Err(e);
            }
        };
        if let Some(p) = panner {
            if let Err(e) = graph.connect(p, self.sfx_bus) {
                voice.dispose(graph);
                graph.dispose(p);
                return Err(e);
            }
        }
        let now = self.rt.clock.now();
        if let Err(e) = voice.start(graph, now.secs(), 0.0) {
            voice.dispose(graph);
            if let Some(p) = panner {
                graph.dispose(p);
            }
            return Err(e);
        }

        self.next_voice += 1;
        let handle = VoiceHandle(self.next_voice);
        let disposal = (!looping).then(|| {
            self.rt
                .scheduler
                .schedule_at(now.after(duration + self.config.sfx.dispose_margin), Deferred::DisposeVoice(handle))
        });
        self.samples.insert(
            handle,
            SampleVoice {
                voice,
                panner,
                disposal,
            },
        );
        tracing::debug!(%handle, id, looping, "sample started");
        Ok(handle)
    }

    /// Fade a sample out and dispose it. False for unknown handles.
    pub fn stop_sample(&mut self, handle: VoiceHandle, fade_out: f64) -> bool {
        let Some(sample) = self.samples.get_mut(&handle) else {
            return false;
        };
        let rt = &mut self.rt;
        let now = rt.clock.now();
        if let Some(token) = sample.disposal.take() {
            rt.scheduler.cancel(token);
        }
        if let Err(e) = sample
            .voice
            .fade_to(&mut rt.graph, 0.0, now.secs(), fade_out)
            .and_then(|_| sample.voice.stop(&mut rt.graph, now.secs() + fade_out))
        {
            tracing::warn!(%handle, error = %e, "sample stop failed");
        }
        sample.disposal = Some(rt.scheduler.schedule_at(now.after(fade_out), Deferred::DisposeVoice(handle)));
        true
    }

    fn release_sample(&mut self, handle: VoiceHandle) {
        let Some(sample) = self.samples.remove(&handle) else {
            tracing::debug!(%handle, "sample already released");
            return;
        };
        if let Some(token) = sample.disposal {
            self.rt.scheduler.cancel(token);
        }
        sample.voice.dispose(&mut self.rt.graph);
        if let Some(p) = sample.panner {
            self.rt.graph.dispose(p);
        }
        tracing::trace!(%handle, "sample disposed");
    }

    pub fn active_samples(&self) -> usize {
        self.samples.len()
    }

    // ── Music ───────────────────────────────────────────────

    /// Tear down every music mode except `mode`.
    fn enter_mode(&mut self, mode: MusicMode) {
        if mode != MusicMode::SingleTrack && self.music.slot_count() > 0 {
            self.music.teardown(&mut self.rt);
        }
        if mode != MusicMode::Layered && self.layered.is_active() {
            self.layered.teardown(&mut self.rt);
        }
        if mode != MusicMode::Procedural && self.procedural.is_playing() {
            self.procedural.teardown(&mut self.rt);
        }
        if self.mode != mode {
            tracing::debug!(from = ?self.mode, to = ?mode, "music mode changed");
        }
        self.mode = mode;
    }

    /// The music mode that is actually sounding.
    pub fn music_mode(&self) -> MusicMode {
        match self.mode {
            MusicMode::SingleTrack if self.music.is_active() => MusicMode::SingleTrack,
            MusicMode::Layered if self.layered.is_active() => MusicMode::Layered,
            MusicMode::Procedural if self.procedural.is_playing() => MusicMode::Procedural,
            _ => MusicMode::Idle,
        }
    }

    /// Every music component currently reporting itself active.
    pub fn active_music_modes(&self) -> Vec<MusicMode> {
        let mut modes = Vec::new();
        if self.music.is_active() {
            modes.push(MusicMode::SingleTrack);
        }
        if self.layered.is_active() {
            modes.push(MusicMode::Layered);
        }
        if self.procedural.is_playing() {
            modes.push(MusicMode::Procedural);
        }
        modes
    }

    /// Menu music: the configured menu track, or the procedural score.
    pub fn play_menu_music(&mut self, procedural: bool) -> bool {
        if procedural {
            return self.start_procedural_music();
        }
        let track = self.config.menu_track.clone();
        self.play_music(&track, PlayOptions::from_config(&self.config.music))
    }

    pub fn stop_menu_music(&mut self) -> bool {
        let fade = self.config.music.fade_out;
        match self.mode {
            MusicMode::Procedural => self.procedural.stop(&mut self.rt, self.config.procedural.fade_out),
            _ => {
                let track = self.config.menu_track.clone();
                self.music.stop(&mut self.rt, &track, fade, true)
            }
        }
    }

    /// Play `track_id` as single-track music, restarting it if it is already
    /// in its slot. Any other track fades out and is disposed.
    pub fn play_music(&mut self, track_id: &str, options: PlayOptions) -> bool {
        if !self.is_live("play_music") {
            return false;
        }
        if !self.buffers.has_buffer(track_id) {
            tracing::warn!(track_id, "play_music: no buffer cached");
            return false;
        }
        self.enter_mode(MusicMode::SingleTrack);
        let crossfaded = self.music.stop_others(&mut self.rt, track_id, self.config.music.fade_out);
        if crossfaded > 0 {
            tracing::debug!(track_id, crossfaded, "fading out previous tracks");
        }
        match self.music.play(&mut self.rt, &self.buffers, track_id, options) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(track_id, error = %e, "play_music failed");
                false
            }
        }
    }

    /// Fade `track_id` out. With `retain` the voice is parked for a fast restart.
    pub fn stop_music(&mut self, track_id: &str, fade_out: f64, retain: bool) -> bool {
        self.music.stop(&mut self.rt, track_id, fade_out, retain)
    }

    pub fn is_music_playing(&mut self, track_id: &str) -> bool {
        self.music.is_playing(&mut self.rt, track_id)
    }

    pub fn start_layered_music(&mut self, base_id: &str) -> bool {
        if !self.is_live("start_layered_music") {
            return false;
        }
        if !self.buffers.has_buffer(base_id) {
            tracing::warn!(base_id, "start_layered_music: no buffer cached");
            return false;
        }
        self.enter_mode(MusicMode::Layered);
        match self.layered.start(&mut self.rt, &self.buffers, base_id) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(base_id, error = %e, "start_layered_music failed");
                false
            }
        }
    }

    pub fn add_music_layer(&mut self, id: &str, volume: f64) -> bool {
        let fade = self.config.music.layer_fade;
        match self.layered.add_layer(&mut self.rt, &self.buffers, id, volume, fade) {
            Ok(added) => added,
            Err(e) => {
                tracing::warn!(id, error = %e, "add_music_layer failed");
                false
            }
        }
    }

    pub fn set_layer_volume(&mut self, id: &str, volume: f64) -> bool {
        let ramp = self.config.volume_ramp;
        self.layered.set_layer_volume(&mut self.rt, id, volume, ramp)
    }

    pub fn remove_music_layer(&mut self, id: &str) -> bool {
        let fade = self.config.music.layer_fade;
        self.layered.remove_layer(&mut self.rt, id, fade)
    }

    pub fn stop_layered_music(&mut self) -> bool {
        let fade = self.config.music.fade_out;
        self.layered.stop(&mut self.rt, fade)
    }

    pub fn active_layers(&self) -> Vec<String> {
        self.layered.active_layers().into_iter().map(str::to_string).collect()
    }

    pub fn music(&self) -> &MusicPlayer {
        &self.music
    }

    pub fn layered(&self) -> &LayeredMusic {
        &self.layered
    }

    // ── Procedural ──────────────────────────────────────────

    pub fn start_procedural_music(&mut self) -> bool {
        if !self.is_live("start_procedural_music") {
            return false;
        }
        self.enter_mode(MusicMode::Procedural);
        match self.procedural.start(&mut self.rt) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "procedural start failed");
                false
            }
        }
    }

    pub fn stop_procedural_music(&mut self) -> bool {
        let fade = self.config.procedural.fade_out;
        self.procedural.stop(&mut self.rt, fade)
    }

    pub fn update_game_state(&mut self, update: &GameStateUpdate) {
        self.procedural.update_game_state(&mut self.rt, update);
    }

    /// Clamped to [0, 1].
    pub fn set_intensity(&mut self, intensity: f64) {
        self.procedural.set_intensity(&mut self.rt, intensity);
    }

    pub fn procedural_state(&self) -> ProceduralState {
        self.procedural.snapshot()
    }

    pub fn procedural(&self) -> &ProceduralGenerator {
        &self.procedural
    }

    // ── Sound effects ───────────────────────────────────────

    fn log_sfx(kind: &str, result: Result<SfxId>) -> Option<SfxId> {
        result
            .map_err(|e| tracing::warn!(kind, error = %e, "sound effect failed"))
            .ok()
    }

    pub fn play_laser_sound(&mut self, category: WeaponCategory) -> Option<SfxId> {
        if !self.is_live("play_laser_sound") {
            return None;
        }
        Self::log_sfx("laser", self.sfx.play_laser(&mut self.rt, category))
    }

    pub fn play_collision_sound(&mut self, intensity: f64) -> Option<SfxId> {
        if !self.is_live("play_collision_sound") {
            return None;
        }
        Self::log_sfx("collision", self.sfx.play_collision(&mut self.rt, intensity))
    }

    pub fn play_explosion_sound(&mut self, size: ExplosionSize) -> Option<SfxId> {
        if !self.is_live("play_explosion_sound") {
            return None;
        }
        Self::log_sfx("explosion", self.sfx.play_explosion(&mut self.rt, size))
    }

    pub fn start_engine_hum(&mut self) -> Option<SfxId> {
        if !self.is_live("start_engine_hum") {
            return None;
        }
        Self::log_sfx("engine_hum", self.sfx.start_engine_hum(&mut self.rt))
    }

    pub fn stop_effect(&mut self, id: SfxId, fade_out: f64) -> bool {
        self.sfx.stop_effect(&mut self.rt, id, fade_out)
    }

    pub fn stop_all_effects(&mut self, fade_out: f64) -> usize {
        self.sfx.stop_all(&mut self.rt, fade_out)
    }

    pub fn sfx(&self) -> &SoundEffectSynthesizer {
        &self.sfx
    }

    // ── Effects chain ───────────────────────────────────────

    pub fn add_effect(&mut self, id: &str, params: EffectParams) -> Result<()> {
        self.ensure_live()?;
        self.chain.add_effect(&mut self.rt.graph, id, params).map(|_| ())
    }

    pub fn remove_effect(&mut self, id: &str) -> Result<bool> {
        self.ensure_live()?;
        self.chain.remove_effect(&mut self.rt.graph, id)
    }

    pub fn update_effect(&mut self, id: &str, params: EffectParams) -> Result<()> {
        self.ensure_live()?;
        self.chain.update_effect(&mut self.rt.graph, id, params)
    }

    pub fn clear_effects(&mut self) -> Result<()> {
        self.ensure_live()?;
        self.chain.clear(&mut self.rt.graph)
    }

    pub fn apply_preset(&mut self, preset: &EffectPreset) -> Result<()> {
        self.ensure_live()?;
        self.chain.apply_preset(&mut self.rt.graph, preset)
    }

    /// Apply a built-in preset by name. False for unknown names.
    pub fn apply_builtin_preset(&mut self, name: &str) -> Result<bool> {
        let Some(preset) = EffectPreset::builtin(name) else {
            tracing::warn!(name, "unknown effect preset");
            return Ok(false);
        };
        self.apply_preset(&preset).map(|_| true)
    }

    pub fn effects_chain(&self) -> &EffectsChain {
        &self.chain
    }

    /// Chain nodes in processing order, as wired in the graph.
    pub fn effects_signal_path(&self) -> Vec<NodeId> {
        self.chain.signal_path(&self.rt.graph)
    }

    // ── Rendering ───────────────────────────────────────────

    /// Fill the host's buffers. Due actions fire at each block boundary.
    pub fn render(&mut self, left: &mut [f32], right: &mut [f32]) {
        let frames = left.len().min(right.len());
        if self.disposed {
            left.fill(0.0);
            right.fill(0.0);
            return;
        }
        let block = self.rt.block_size();
        let mut offset = 0;
        while offset < frames {
            let end = (offset + block).min(frames);
            self.fire_due();
            self.procedural.schedule_ahead(&mut self.rt);
            self.rt.render_block(&mut left[offset..end], &mut right[offset..end]);
            offset = end;
        }
    }

    /// Render and discard `seconds` of audio.
    pub fn advance(&mut self, seconds: f64) {
        let frames = (seconds.max(0.0) * self.config.sample_rate as f64).round() as usize;
        let block = self.rt.block_size();
        let mut left = vec![0.0; block];
        let mut right = vec![0.0; block];
        let mut remaining = frames;
        while remaining > 0 && !self.disposed {
            let n = remaining.min(block);
            self.render(&mut left[..n], &mut right[..n]);
            remaining -= n;
        }
    }

    fn fire_due(&mut self) {
        for action in self.rt.take_due() {
            self.dispatch(action);
        }
    }

    /// Run one deferred action. Nothing here may fail the render loop:
    /// problems are logged and the action is dropped.
    fn dispatch(&mut self, action: Deferred) {
        tracing::trace!(?action, "deferred action due");
        match action {
            Deferred::DisposeNodes(nodes) => {
                let freed = self.rt.graph.dispose_all(&nodes);
                if freed != nodes.len() {
                    tracing::debug!(expected = nodes.len(), freed, "some nodes were already disposed");
                }
            }
            Deferred::DisposeVoice(handle) => self.release_sample(handle),
            Deferred::DisposeEffect(id) => {
                if self.sfx.complete_dispose(&mut self.rt, id) == 0 {
                    tracing::debug!(%id, "effect already disposed");
                }
            }
            Deferred::StopMusicSlot {
                slot,
                generation,
                retain,
            } => self.music.complete_stop(&mut self.rt, &slot, generation, retain),
            Deferred::RemoveLayer { id, generation } => self.layered.complete_removal(&mut self.rt, &id, generation),
            Deferred::StopLayered { generation } => self.layered.complete_stop(&mut self.rt, generation),
            Deferred::ProceduralTeardown { generation } => self.procedural.complete_teardown(&mut self.rt, generation),
        }
    }

    pub fn runtime(&self) -> &Runtime {
        &self.rt
    }

    pub fn graph(&self) -> &AudioGraph {
        &self.rt.graph
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn music_bus(&self) -> NodeId {
        self.music_bus
    }

    pub fn sfx_bus(&self) -> NodeId {
        self.sfx_bus
    }

    // ── Teardown ────────────────────────────────────────────

    /// Tear down every voice, layer, sequence and effect, drop the cache and
    /// stop the clock. Safe to call more than once.
    pub fn dispose(&mut self) {
        if self.disposed {
            tracing::debug!("dispose called on a disposed engine");
            return;
        }
        let rt = &mut self.rt;
        self.music.teardown(rt);
        self.layered.teardown(rt);
        self.procedural.teardown(rt);
        self.sfx.teardown(rt);
        let handles: Vec<VoiceHandle> = self.samples.keys().copied().collect();
        for handle in handles {
            self.release_sample(handle);
        }
        let dropped = self.rt.scheduler.clear();
        for action in dropped {
            if let Deferred::DisposeNodes(nodes) = action {
                self.rt.graph.dispose_all(&nodes);
            }
        }
        self.chain.dispose(&mut self.rt.graph);
        self.rt.graph.clear();
        self.context.suspend(&mut self.rt.clock);
        self.rt.clock.set_state(ClockState::Uninitialized);
        self.buffers.clear();
        self.mode = MusicMode::Idle;
        self.disposed = true;
        tracing::info!(
            created = self.rt.graph.created(),
            disposed = self.rt.graph.disposed(),
            "audio engine disposed"
        );
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }
}
