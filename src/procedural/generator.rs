//! The adaptive score: a step sequencer locked to the shared transport.
//!
//! Each part owns a gain node; parts feed one lowpass filter, one reverb and
//! a bus gain. Notes are synthesized voice nodes created a little ahead of
//! the render position by [`ProceduralGenerator::schedule_ahead`] and
//! disposed once their release tail has passed. Harmony changes (scale and
//! root) wait for the next bar line.

use crate::clock::BeatTime;
use crate::config::ProceduralConfig;
use crate::dsp::filter::FilterType;
use crate::dsp::noise::NoiseColor;
use crate::dsp::param::RampCurve;
use crate::effects::{EffectParams, EffectProcessor, ReverbParams};
use crate::engine::Runtime;
use crate::error::Result;
use crate::graph::{AudioGraph, FilterNode, Node, NodeId, NoiseNode, VoiceNode};
use crate::scheduler::{Deferred, ScheduleToken};

use super::patterns::{Hit, Part, Pattern, STEPS_PER_BEAT, Step, patterns_for};
use super::state::{Environment, GameState, GameStateUpdate, ProceduralState};
use super::theory::{Scale, chord_notes, lookup, note_frequency, note_to_midi, safe_index, scale_note};

/// Seconds over which tier, cutoff and tempo changes glide.
const MODULATION_RAMP: f64 = 0.5;
const KICK_HZ: f64 = 55.0;
const HAT_SECONDS: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GeneratorState {
    #[default]
    Idle,
    Playing,
}

#[derive(Debug)]
struct Bus {
    parts: Vec<(Part, NodeId)>,
    filter: NodeId,
    reverb: NodeId,
    output: NodeId,
}

impl Bus {
    fn nodes(&self) -> Vec<NodeId> {
        let mut nodes: Vec<NodeId> = self.parts.iter().map(|(_, id)| *id).collect();
        nodes.extend([self.filter, self.reverb, self.output]);
        nodes
    }

    fn part(&self, part: Part) -> Option<NodeId> {
        self.parts.iter().find(|(p, _)| *p == part).map(|(_, id)| *id)
    }
}

#[derive(Debug)]
struct ActiveNote {
    nodes: Vec<NodeId>,
    /// Context time after which the note is silent.
    end: f64,
}

#[derive(Debug)]
pub struct ProceduralGenerator {
    config: ProceduralConfig,
    output: NodeId,
    state: GeneratorState,
    game_state: GameState,
    scale: Scale,
    root: i32,
    /// Configured root, heard in `Space`; other environments transpose from it.
    base_root: i32,
    /// Harmony waiting for the next bar line.
    pending_harmony: Option<(Scale, i32)>,
    chord_index: i64,
    bar: i64,
    next_step: i64,
    tier: usize,
    patterns: Vec<(Part, Vec<Pattern>)>,
    bus: Option<Bus>,
    notes: Vec<ActiveNote>,
    generation: u64,
    teardown: Option<ScheduleToken>,
    rng: fastrand::Rng,
    notes_scheduled: u64,
}

impl ProceduralGenerator {
    pub fn new(output: NodeId, config: ProceduralConfig) -> Self {
        let root = note_to_midi(&config.root_note).unwrap_or_else(|| {
            tracing::warn!(root_note = %config.root_note, "unparseable root note, using A2");
            Environment::Space.root_midi()
        });
        let rng = fastrand::Rng::with_seed(config.seed);
        ProceduralGenerator {
            config,
            output,
            state: GeneratorState::Idle,
            game_state: GameState::default(),
            scale: Scale::default(),
            root,
            base_root: root,
            pending_harmony: None,
            chord_index: 0,
            bar: -1,
            next_step: 0,
            tier: 0,
            patterns: Vec::new(),
            bus: None,
            notes: Vec::new(),
            generation: 0,
            teardown: None,
            rng,
            notes_scheduled: 0,
        }
    }

    /// Build the part graph and start the transport. A no-op while playing,
    /// except that a pending teardown is cancelled and the bus restored.
    pub fn start(&mut self, rt: &mut Runtime) -> Result<()> {
        if self.state == GeneratorState::Playing {
            if let Some(token) = self.teardown.take() {
                rt.scheduler.cancel(token);
                self.generation += 1;
                let now = rt.clock.now().secs();
                if let Some(bus) = &self.bus {
                    rt.graph
                        .gain(bus.output)?
                        .ramp_to(self.config.volume, now, MODULATION_RAMP, RampCurve::Linear);
                }
                tracing::info!("procedural teardown cancelled by restart");
            } else {
                tracing::debug!("procedural music already playing");
            }
            return Ok(());
        }

        let bus = self.build_bus(&mut rt.graph)?;
        self.bus = Some(bus);
        self.scale = self.game_state.scale();
        self.root = self.root_for(self.game_state.environment);
        self.pending_harmony = None;
        self.chord_index = 0;
        self.bar = -1;
        self.next_step = 0;
        self.set_tier(self.game_state.tier());

        let transport = &mut rt.clock.transport;
        transport.reset();
        transport.set_bpm(self.game_state.tempo(&self.config));
        transport.set_beats_per_bar(self.config.beats_per_bar);
        transport.start();

        self.state = GeneratorState::Playing;
        self.generation += 1;
        tracing::info!(
            scale = ?self.scale,
            root = self.root,
            bpm = rt.clock.transport.bpm(),
            "procedural music started"
        );
        Ok(())
    }

    fn build_bus(&self, graph: &mut AudioGraph) -> Result<Bus> {
        let sr = graph.sample_rate();
        let tier = self.game_state.tier();
        let filter = graph.add(Node::Filter(FilterNode::new(
            FilterType::Lowpass,
            self.game_state.cutoff(&self.config),
            0.9,
            sr,
        )));
        let reverb = graph.add(Node::Effect(Box::new(EffectProcessor::new(
            &self.reverb_params(),
            sr,
        ))));
        let output = graph.add_gain(self.config.volume);
        let parts: Vec<(Part, NodeId)> = Part::ALL
            .iter()
            .map(|part| (*part, graph.add_gain(part.volume(tier))))
            .collect();
        let bus = Bus {
            parts,
            filter,
            reverb,
            output,
        };

        let wired = bus
            .parts
            .iter()
            .try_for_each(|(_, id)| graph.connect(*id, filter))
            .and_then(|_| graph.connect(filter, reverb))
            .and_then(|_| graph.connect(reverb, output))
            .and_then(|_| graph.connect(output, self.output));
        if let Err(e) = wired {
            graph.dispose_all(&bus.nodes());
            return Err(e);
        }
        Ok(bus)
    }

    fn reverb_params(&self) -> EffectParams {
        EffectParams::Reverb(ReverbParams {
            room_size: 0.85,
            damping: 0.4,
            mix: self.game_state.reverb_mix(&self.config),
            width: 1.0,
        })
    }

    fn set_tier(&mut self, tier: usize) {
        self.tier = tier;
        self.patterns = Part::ALL.iter().map(|p| (*p, patterns_for(*p, tier))).collect();
    }

    /// Fade the bus out, then dispose everything on the transport beat the
    /// fade ends. Returns false when idle or already stopping.
    pub fn stop(&mut self, rt: &mut Runtime, fade_out: f64) -> bool {
        if self.state != GeneratorState::Playing || self.teardown.is_some() {
            return false;
        }
        let now = rt.clock.now().secs();
        if let Some(bus) = &self.bus {
            match rt.graph.gain(bus.output) {
                Ok(gain) => gain.ramp_to(0.0, now, fade_out, RampCurve::Linear),
                Err(e) => tracing::warn!(error = %e, "procedural bus missing"),
            }
        }
        let transport = &rt.clock.transport;
        let at = transport.position().after(transport.beats_from_seconds(fade_out));
        self.teardown = Some(rt.scheduler.schedule_at_beat(
            at,
            Deferred::ProceduralTeardown {
                generation: self.generation,
            },
        ));
        tracing::info!(%at, "procedural music stopping");
        true
    }

    /// Run a scheduled teardown. Stale generations are ignored.
    pub fn complete_teardown(&mut self, rt: &mut Runtime, generation: u64) {
        if generation != self.generation || self.teardown.is_none() {
            tracing::debug!(generation, current = self.generation, "stale procedural teardown ignored");
            return;
        }
        self.teardown = None;
        self.teardown(rt);
        tracing::info!("procedural music stopped");
    }

    /// Dispose every note and bus node now and stop the transport.
    pub fn teardown(&mut self, rt: &mut Runtime) {
        if let Some(token) = self.teardown.take() {
            rt.scheduler.cancel(token);
        }
        let mut disposed = 0;
        for note in self.notes.drain(..) {
            disposed += rt.graph.dispose_all(&note.nodes);
        }
        if let Some(bus) = self.bus.take() {
            disposed += rt.graph.dispose_all(&bus.nodes());
        }
        if self.state == GeneratorState::Playing {
            rt.clock.transport.stop();
            rt.clock.transport.reset();
        }
        self.state = GeneratorState::Idle;
        self.pending_harmony = None;
        self.generation += 1;
        tracing::debug!(disposed, "procedural graph disposed");
    }

    /// Merge a game-state change. While playing, tempo, tiers, cutoff and
    /// reverb follow at once; scale and root wait for the next bar.
    pub fn update_game_state(&mut self, rt: &mut Runtime, update: &GameStateUpdate) {
        self.game_state.merge(update);
        if self.state != GeneratorState::Playing {
            return;
        }
        let now = rt.clock.now().secs();
        let state = self.game_state;

        rt.clock
            .transport
            .ramp_bpm(state.tempo(&self.config), MODULATION_RAMP);

        let tier = state.tier();
        if tier != self.tier {
            self.set_tier(tier);
            tracing::debug!(tier, "intensity tier changed");
        }
        if let Some(bus) = &self.bus {
            for (part, id) in &bus.parts {
                if let Ok(gain) = rt.graph.gain(*id) {
                    gain.ramp_to(part.volume(tier), now, MODULATION_RAMP, RampCurve::Linear);
                }
            }
            if let Ok(filter) = rt.graph.filter(bus.filter) {
                filter
                    .frequency
                    .ramp_to(state.cutoff(&self.config), now, MODULATION_RAMP, RampCurve::Exponential);
            }
            let params = self.reverb_params();
            if let Ok(reverb) = rt.graph.effect(bus.reverb) {
                reverb.apply(&params);
            }
        }

        let harmony = (state.scale(), self.root_for(state.environment));
        if harmony != (self.scale, self.root) {
            if self.pending_harmony != Some(harmony) {
                tracing::debug!(scale = ?harmony.0, root = harmony.1, "harmony change deferred to next bar");
            }
            self.pending_harmony = Some(harmony);
        } else {
            self.pending_harmony = None;
        }
    }

    fn root_for(&self, environment: Environment) -> i32 {
        self.base_root + environment.transpose()
    }

    /// Clamp `intensity` to [0, 1] and apply it.
    pub fn set_intensity(&mut self, rt: &mut Runtime, intensity: f64) {
        self.update_game_state(rt, &GameStateUpdate::intensity(intensity));
    }

    /// Create the notes that start within the lookahead window and dispose
    /// the ones that have finished. Called once per rendered block.
    pub fn schedule_ahead(&mut self, rt: &mut Runtime) {
        if self.state != GeneratorState::Playing || !rt.clock.transport.is_running() {
            return;
        }
        let now = rt.clock.now().secs();
        self.prune(&mut rt.graph, now);

        let transport = &rt.clock.transport;
        let position = transport.position().beats();
        let horizon = position + transport.beats_from_seconds(self.config.lookahead.max(0.0));
        let steps_per_beat = STEPS_PER_BEAT as f64;

        // Steps already behind the render position are skipped, not bunched.
        let current = (position * steps_per_beat).ceil() as i64;
        self.next_step = self.next_step.max(current);

        while (self.next_step as f64) / steps_per_beat < horizon {
            let step = self.next_step;
            self.next_step += 1;
            let beat = step as f64 / steps_per_beat;
            let at = now + rt.clock.transport.seconds_from_beats(beat - position).max(0.0);
            self.enter_bar(step);
            self.schedule_step(rt, step, at);
        }
    }

    fn enter_bar(&mut self, step: i64) {
        let steps_per_bar = self.config.beats_per_bar.max(1) as i64 * STEPS_PER_BEAT as i64;
        let bar = step.div_euclid(steps_per_bar);
        if bar <= self.bar {
            return;
        }
        self.bar = bar;
        self.chord_index = bar;
        if let Some((scale, root)) = self.pending_harmony.take() {
            tracing::debug!(?scale, root, bar, "harmony change applied");
            self.scale = scale;
            self.root = root;
        }
    }

    fn schedule_step(&mut self, rt: &mut Runtime, step: i64, at: f64) {
        let Some(bus) = &self.bus else {
            return;
        };
        let step_seconds = rt.clock.transport.seconds_per_beat() / STEPS_PER_BEAT as f64;
        let mut hits: Vec<(Part, NodeId, Step)> = Vec::new();
        for (part, patterns) in &self.patterns {
            if part.volume(self.tier) <= 0.0 {
                continue;
            }
            let Some(target) = bus.part(*part) else {
                continue;
            };
            for hit in Pattern::hits_at(patterns, step) {
                hits.push((*part, target, hit));
            }
        }

        for (part, target, hit) in hits {
            let mut velocity = hit.velocity;
            if part == Part::Lead {
                // Humanize the lead: drop some notes, vary the rest.
                if self.rng.f64() < 0.15 {
                    continue;
                }
                velocity *= 0.85 + self.rng.f64() * 0.15;
            }
            let length = hit.length.max(1) as f64 * step_seconds;
            let result = match hit.hit {
                Hit::Hat => self.hat(&mut rt.graph, target, at, velocity),
                Hit::Kick => self.voice(&mut rt.graph, part, target, KICK_HZ, velocity, at, length),
                Hit::ChordTone(_) | Hit::Degree(_) => {
                    let midi = self.pitch(part, hit.hit);
                    let freq = note_frequency(midi, self.root);
                    self.voice(&mut rt.graph, part, target, freq, velocity, at, length)
                }
            };
            match result {
                Ok(note) => {
                    self.notes.push(note);
                    self.notes_scheduled += 1;
                }
                Err(e) => tracing::warn!(?part, error = %e, "failed to schedule note"),
            }
        }
    }

    /// MIDI note of a pitched hit under the current chord.
    fn pitch(&self, part: Part, hit: Hit) -> i32 {
        let root = self.root + part.octave() * 12;
        match hit {
            Hit::ChordTone(tone) => {
                let chord = chord_notes(self.scale, root, self.chord_index);
                let octave = tone.div_euclid(3).clamp(-4, 4) as i32;
                chord[safe_index(tone, chord.len())] + octave * 12
            }
            Hit::Degree(degree) => {
                let chord_root = lookup(self.scale.progression(), self.chord_index).unwrap_or(0);
                scale_note(self.scale, root, chord_root.saturating_add(degree))
            }
            Hit::Kick | Hit::Hat => root,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn voice(
        &self,
        graph: &mut AudioGraph,
        part: Part,
        target: NodeId,
        frequency: f64,
        velocity: f64,
        at: f64,
        length: f64,
    ) -> Result<ActiveNote> {
        let patch = part.patch();
        let node = VoiceNode::new(&patch, frequency, velocity, at, at + length, graph.sample_rate());
        let id = graph.add(Node::Voice(Box::new(node)));
        if let Err(e) = graph.connect(id, target) {
            graph.dispose(id);
            return Err(e);
        }
        Ok(ActiveNote {
            nodes: vec![id],
            end: at + patch.adsr.tail(length) + 0.05,
        })
    }

    fn hat(&mut self, graph: &mut AudioGraph, target: NodeId, at: f64, velocity: f64) -> Result<ActiveNote> {
        let mut noise = NoiseNode::new(NoiseColor::White, self.rng.u64(..));
        noise.span.start = Some(at);
        noise.span.stop = Some(at + HAT_SECONDS);
        let source = graph.add(Node::Noise(noise));
        let gain = graph.add_gain(0.0);
        let env = graph.gain(gain)?;
        env.set_value_at(velocity * 0.3, at);
        env.exponential_ramp_to(0.0, at + HAT_SECONDS);
        let nodes = vec![source, gain];
        if let Err(e) = graph.connect(source, gain).and_then(|_| graph.connect(gain, target)) {
            graph.dispose_all(&nodes);
            return Err(e);
        }
        Ok(ActiveNote {
            nodes,
            end: at + HAT_SECONDS + 0.05,
        })
    }

    fn prune(&mut self, graph: &mut AudioGraph, now: f64) {
        self.notes.retain(|note| {
            if note.end > now {
                return true;
            }
            graph.dispose_all(&note.nodes);
            false
        });
    }

    pub fn generator_state(&self) -> GeneratorState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == GeneratorState::Playing
    }

    pub fn has_pending_teardown(&self) -> bool {
        self.teardown.is_some()
    }

    pub fn game_state(&self) -> &GameState {
        &self.game_state
    }

    pub fn intensity(&self) -> f64 {
        self.game_state.intensity
    }

    pub fn scale(&self) -> Scale {
        self.scale
    }

    pub fn root(&self) -> i32 {
        self.root
    }

    pub fn chord_index(&self) -> i64 {
        self.chord_index
    }

    pub fn tier(&self) -> usize {
        self.tier
    }

    /// Notes currently holding graph nodes.
    pub fn active_notes(&self) -> usize {
        self.notes.len()
    }

    pub fn notes_scheduled(&self) -> u64 {
        self.notes_scheduled
    }

    pub fn part_gain(&self, part: Part) -> Option<NodeId> {
        self.bus.as_ref().and_then(|b| b.part(part))
    }

    pub fn filter_node(&self) -> Option<NodeId> {
        self.bus.as_ref().map(|b| b.filter)
    }

    /// Transport beat the next step will be scheduled at.
    pub fn next_step_beat(&self) -> BeatTime {
        BeatTime(self.next_step as f64 / STEPS_PER_BEAT as f64)
    }

    pub fn snapshot(&self) -> ProceduralState {
        ProceduralState {
            is_playing: self.is_playing(),
            current_scale: self.scale,
            current_root: self.root,
            chord_index: self.chord_index,
            game_state: self.game_state,
        }
    }

    pub fn config(&self) -> &ProceduralConfig {
        &self.config
    }
}
