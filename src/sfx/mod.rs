//! Parametric sound effects.
//!
//! Each trigger builds a short-lived node graph (source, shaping stages,
//! envelope gain), starts it at the current clock time and schedules
//! disposal of every node it created after the sound's duration plus a
//! margin. Only looping effects (the engine hum) are remembered, so that
//! `stop_effect`/`stop_all` can reach them.

pub mod profiles;

use std::collections::HashMap;
use std::fmt;

pub use profiles::{CollisionSize, ENGINE_HUM, ExplosionSize, HumProfile, NoiseProfile, ToneProfile, WeaponCategory};

use crate::config::SfxConfig;
use crate::dsp::filter::FilterType;
use crate::dsp::oscillator::Waveform;
use crate::dsp::param::RampCurve;
use crate::effects::{DistortionParams, EffectParams, EffectProcessor};
use crate::engine::Runtime;
use crate::error::Result;
use crate::graph::{AudioGraph, FilterNode, Lifespan, Node, NodeId, NoiseNode, OscillatorNode};
use crate::scheduler::{Deferred, ScheduleToken};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SfxId(u64);

impl SfxId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SfxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sfx#{}", self.0)
    }
}

#[derive(Debug)]
struct LiveEffect {
    kind: &'static str,
    nodes: Vec<NodeId>,
    gain: NodeId,
    disposal: Option<ScheduleToken>,
}

#[derive(Debug)]
pub struct SoundEffectSynthesizer {
    output: NodeId,
    config: SfxConfig,
    issued: u64,
    live: HashMap<SfxId, LiveEffect>,
}

impl SoundEffectSynthesizer {
    pub fn new(output: NodeId, config: SfxConfig) -> Self {
        SoundEffectSynthesizer {
            output,
            config,
            issued: 0,
            live: HashMap::new(),
        }
    }

    fn next_id(&mut self) -> SfxId {
        self.issued += 1;
        SfxId(self.issued)
    }

    /// Build a fire-and-forget effect and queue its disposal.
    fn one_shot(
        &mut self,
        rt: &mut Runtime,
        kind: &'static str,
        duration: f64,
        build: impl FnOnce(&mut AudioGraph, &mut Vec<NodeId>) -> Result<()>,
    ) -> Result<SfxId> {
        let mut nodes = Vec::new();
        if let Err(e) = build(&mut rt.graph, &mut nodes) {
            rt.graph.dispose_all(&nodes);
            return Err(e);
        }
        let id = self.next_id();
        let at = rt.clock.now().after(duration + self.config.dispose_margin);
        tracing::debug!(%id, kind, nodes = nodes.len(), %at, "sound effect triggered");
        rt.scheduler.schedule_at(at, Deferred::DisposeNodes(nodes));
        Ok(id)
    }

    /// A falling pitch sweep; the category picks waveform and timing.
    pub fn play_laser(&mut self, rt: &mut Runtime, category: WeaponCategory) -> Result<SfxId> {
        let profile = category.profile();
        let now = rt.clock.now().secs();
        let (output, level) = (self.output, self.config.volume);
        self.one_shot(rt, "laser", profile.duration, |graph, nodes| {
            tone(graph, nodes, &profile, level, now, output)
        })
    }

    /// Filtered noise impact with a low thump for heavier hits. `intensity`
    /// is clamped to [0, 1] and picks the size bucket.
    pub fn play_collision(&mut self, rt: &mut Runtime, intensity: f64) -> Result<SfxId> {
        let intensity = clamp_intensity(intensity);
        let profile = CollisionSize::from_intensity(intensity).profile();
        let now = rt.clock.now().secs();
        let (output, seed) = (self.output, self.seed());
        let level = self.config.volume * (0.4 + 0.6 * intensity);
        self.one_shot(rt, "collision", profile.duration, |graph, nodes| {
            burst(graph, nodes, &profile, level, now, output, seed)
        })
    }

    pub fn play_explosion(&mut self, rt: &mut Runtime, size: ExplosionSize) -> Result<SfxId> {
        let profile = size.profile();
        let now = rt.clock.now().secs();
        let (output, seed, level) = (self.output, self.seed(), self.config.volume);
        self.one_shot(rt, "explosion", profile.duration, |graph, nodes| {
            burst(graph, nodes, &profile, level, now, output, seed)
        })
    }

    /// Start the looping engine drone. It plays until stopped.
    pub fn start_engine_hum(&mut self, rt: &mut Runtime) -> Result<SfxId> {
        let hum = ENGINE_HUM;
        let now = rt.clock.now().secs();
        let graph = &mut rt.graph;
        let sr = graph.sample_rate();
        let mut nodes = Vec::new();

        let filter = graph.add(Node::Filter(FilterNode::new(FilterType::Lowpass, hum.cutoff, 0.9, sr)));
        nodes.push(filter);
        let gain = graph.add_gain(0.0);
        nodes.push(gain);
        let mut wire = || -> Result<()> {
            for detune in [-hum.detune / 2.0, hum.detune / 2.0] {
                let mut osc = OscillatorNode::new(hum.waveform, hum.frequency, sr);
                osc.osc.detune = detune;
                osc.span.start = Some(now);
                let id = graph.add(Node::Oscillator(osc));
                nodes.push(id);
                graph.connect(id, filter)?;
            }
            graph.connect(filter, gain)?;
            graph.connect(gain, self.output)?;
            graph
                .gain(gain)?
                .ramp_to(hum.level * self.config.volume, now, hum.fade_in, RampCurve::Linear);
            Ok(())
        };
        if let Err(e) = wire() {
            graph.dispose_all(&nodes);
            return Err(e);
        }

        let id = self.next_id();
        self.live.insert(
            id,
            LiveEffect {
                kind: "engine_hum",
                nodes,
                gain,
                disposal: None,
            },
        );
        tracing::debug!(%id, "engine hum started");
        Ok(id)
    }

    /// Fade a looping effect out and dispose it once silent. Returns false
    /// for unknown ids and effects already stopping.
    pub fn stop_effect(&mut self, rt: &mut Runtime, id: SfxId, fade_out: f64) -> bool {
        let Some(effect) = self.live.get_mut(&id) else {
            return false;
        };
        if effect.disposal.is_some() {
            return false;
        }
        let now = rt.clock.now();
        if let Ok(gain) = rt.graph.gain(effect.gain) {
            gain.ramp_to(0.0, now.secs(), fade_out, RampCurve::Linear);
        }
        effect.disposal = Some(rt.scheduler.schedule_at(now.after(fade_out), Deferred::DisposeEffect(id)));
        tracing::debug!(%id, kind = effect.kind, fade_out, "sound effect stopping");
        true
    }

    /// Stop every looping effect; returns how many were stopped.
    pub fn stop_all(&mut self, rt: &mut Runtime, fade_out: f64) -> usize {
        let mut ids: Vec<SfxId> = self.live.keys().copied().collect();
        ids.sort();
        ids.into_iter().filter(|id| self.stop_effect(rt, *id, fade_out)).count()
    }

    /// Run a scheduled disposal; returns the number of nodes freed.
    pub fn complete_dispose(&mut self, rt: &mut Runtime, id: SfxId) -> usize {
        match self.live.remove(&id) {
            Some(effect) => rt.graph.dispose_all(&effect.nodes),
            None => 0,
        }
    }

    /// Dispose every looping effect now.
    pub fn teardown(&mut self, rt: &mut Runtime) {
        for (_, effect) in self.live.drain() {
            if let Some(token) = effect.disposal {
                rt.scheduler.cancel(token);
            }
            rt.graph.dispose_all(&effect.nodes);
        }
    }

    pub fn is_live(&self, id: SfxId) -> bool {
        self.live.contains_key(&id)
    }

    /// Looping effects currently registered.
    pub fn live_effects(&self) -> usize {
        self.live.len()
    }

    /// Effects triggered since construction.
    pub fn issued(&self) -> u64 {
        self.issued
    }

    fn seed(&self) -> u64 {
        (self.issued + 1).wrapping_mul(0x9e37_79b9_7f4a_7c15)
    }
}

fn clamp_intensity(intensity: f64) -> f64 {
    let clamped = if intensity.is_nan() { 0.0 } else { intensity.clamp(0.0, 1.0) };
    if clamped != intensity {
        tracing::warn!(field = "intensity", rejected = intensity, stored = clamped, "collision intensity out of range");
    }
    clamped
}

/// Attack to `peak`, then an exponential decay to silence at `now + duration`.
fn envelope(
    graph: &mut AudioGraph,
    nodes: &mut Vec<NodeId>,
    peak: f64,
    attack: f64,
    duration: f64,
    now: f64,
) -> Result<NodeId> {
    let id = graph.add_gain(0.0);
    nodes.push(id);
    let gain = graph.gain(id)?;
    gain.set_value_at(0.0, now);
    gain.linear_ramp_to(peak, now + attack);
    gain.exponential_ramp_to(0.0, now + duration);
    Ok(id)
}

fn sweep_oscillator(
    graph: &mut AudioGraph,
    nodes: &mut Vec<NodeId>,
    waveform: Waveform,
    start_hz: f64,
    end_hz: f64,
    now: f64,
    duration: f64,
) -> NodeId {
    let mut osc = OscillatorNode::new(waveform, start_hz, graph.sample_rate());
    osc.span = Lifespan {
        start: Some(now),
        stop: Some(now + duration),
    };
    osc.frequency.ramp_to(end_hz, now, duration, RampCurve::Exponential);
    let id = graph.add(Node::Oscillator(osc));
    nodes.push(id);
    id
}

fn tone(
    graph: &mut AudioGraph,
    nodes: &mut Vec<NodeId>,
    profile: &ToneProfile,
    level: f64,
    now: f64,
    output: NodeId,
) -> Result<()> {
    let sweep = profile.sweep;
    let mut tail = sweep_oscillator(
        graph,
        nodes,
        profile.waveform,
        sweep.start_hz,
        sweep.end_hz,
        now,
        profile.duration,
    );
    if let Some((filter_type, frequency)) = profile.filter {
        let sr = graph.sample_rate();
        let filter = graph.add(Node::Filter(FilterNode::new(
            filter_type,
            frequency,
            std::f64::consts::FRAC_1_SQRT_2,
            sr,
        )));
        nodes.push(filter);
        graph.connect(tail, filter)?;
        tail = filter;
    }
    let env = envelope(graph, nodes, level * profile.level, profile.attack, profile.duration, now)?;
    graph.connect(tail, env)?;
    graph.connect(env, output)
}

fn burst(
    graph: &mut AudioGraph,
    nodes: &mut Vec<NodeId>,
    profile: &NoiseProfile,
    level: f64,
    now: f64,
    output: NodeId,
    seed: u64,
) -> Result<()> {
    let sr = graph.sample_rate();
    let mut noise = NoiseNode::new(profile.color, seed);
    noise.span = Lifespan {
        start: Some(now),
        stop: Some(now + profile.duration),
    };
    let source = graph.add(Node::Noise(noise));
    nodes.push(source);

    let mut filter = FilterNode::new(profile.filter, profile.cutoff.start_hz, profile.q, sr);
    filter
        .frequency
        .ramp_to(profile.cutoff.end_hz, now, profile.duration, RampCurve::Exponential);
    let filter = graph.add(Node::Filter(filter));
    nodes.push(filter);
    graph.connect(source, filter)?;
    let mut tail = filter;

    if profile.drive > 0.0 {
        let params = EffectParams::Distortion(DistortionParams {
            amount: profile.drive,
            ..Default::default()
        });
        let drive = graph.add(Node::Effect(Box::new(EffectProcessor::new(&params, sr))));
        nodes.push(drive);
        graph.connect(tail, drive)?;
        tail = drive;
    }

    let env = envelope(graph, nodes, level * profile.level, profile.attack, profile.duration, now)?;
    graph.connect(tail, env)?;
    graph.connect(env, output)?;

    if let Some(thump) = profile.thump {
        let body = profile.duration * 0.6;
        let osc = sweep_oscillator(graph, nodes, Waveform::Sine, thump.start_hz, thump.end_hz, now, body);
        let thump_env = envelope(graph, nodes, level * profile.level * 0.8, profile.attack, body, now)?;
        graph.connect(osc, thump_env)?;
        graph.connect(thump_env, output)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ClockState;
    use crate::config::EngineConfig;
    use crate::dsp::mixer::peak;

    fn setup() -> (Runtime, SoundEffectSynthesizer) {
        let config = EngineConfig::default();
        let mut rt = Runtime::new(&config);
        rt.clock.set_state(ClockState::Running);
        let dest = rt.graph.destination();
        (rt, SoundEffectSynthesizer::new(dest, config.sfx))
    }

    fn dispatch(rt: &mut Runtime, sfx: &mut SoundEffectSynthesizer) {
        for action in rt.take_due() {
            match action {
                Deferred::DisposeNodes(nodes) => {
                    rt.graph.dispose_all(&nodes);
                }
                Deferred::DisposeEffect(id) => {
                    sfx.complete_dispose(rt, id);
                }
                _ => {}
            }
        }
    }

    fn loudest(rt: &mut Runtime, seconds: f64) -> f32 {
        let frames = (seconds * rt.clock.sample_rate()) as usize;
        let (mut l, mut r) = (vec![0.0; frames], vec![0.0; frames]);
        rt.render_block(&mut l, &mut r);
        peak(&l)
    }

    #[test]
    fn laser_is_audible_then_disposed() {
        let (mut rt, mut sfx) = setup();
        let id = sfx.play_laser(&mut rt, WeaponCategory::Laser).unwrap();
        assert_eq!(id.get(), 1);
        assert!(rt.graph.live_count() >= 3);
        assert!(loudest(&mut rt, 0.05) > 0.05);

        let profile = WeaponCategory::Laser.profile();
        rt.render_for(profile.duration + sfx.config.dispose_margin);
        dispatch(&mut rt, &mut sfx);
        assert_eq!(rt.graph.live_count(), 0);
        assert_eq!(rt.graph.created(), rt.graph.disposed());
        assert_eq!(sfx.live_effects(), 0);
    }

    #[test]
    fn disposal_waits_for_the_margin() {
        let (mut rt, mut sfx) = setup();
        sfx.play_laser(&mut rt, WeaponCategory::Pulse).unwrap();
        rt.render_for(WeaponCategory::Pulse.profile().duration);
        dispatch(&mut rt, &mut sfx);
        assert!(rt.graph.live_count() > 0);
    }

    #[test]
    fn collision_and_explosion_build_composites() {
        let (mut rt, mut sfx) = setup();
        sfx.play_collision(&mut rt, 2.0).unwrap();
        let heavy = rt.graph.live_count();
        sfx.play_collision(&mut rt, 0.1).unwrap();
        assert!(heavy > rt.graph.live_count() - heavy);
        sfx.play_explosion(&mut rt, ExplosionSize::Large).unwrap();
        assert!(loudest(&mut rt, 0.1) > 0.0);
        assert_eq!(sfx.issued(), 3);

        rt.render_for(ExplosionSize::Large.profile().duration + 0.2);
        dispatch(&mut rt, &mut sfx);
        assert_eq!(rt.graph.live_count(), 0);
    }

    #[test]
    fn engine_hum_loops_until_stopped() {
        let (mut rt, mut sfx) = setup();
        let id = sfx.start_engine_hum(&mut rt).unwrap();
        rt.render_for(3.0);
        dispatch(&mut rt, &mut sfx);
        assert!(sfx.is_live(id));
        assert!(loudest(&mut rt, 0.05) > 0.01);

        assert_eq!(sfx.stop_all(&mut rt, 0.2), 1);
        assert!(!sfx.stop_effect(&mut rt, id, 0.2));
        rt.render_for(0.25);
        dispatch(&mut rt, &mut sfx);
        assert!(!sfx.is_live(id));
        assert_eq!(rt.graph.live_count(), 0);
    }

    #[test]
    fn unknown_effect_cannot_be_stopped() {
        let (mut rt, mut sfx) = setup();
        assert!(!sfx.stop_effect(&mut rt, SfxId(42), 0.1));
        sfx.start_engine_hum(&mut rt).unwrap();
        sfx.teardown(&mut rt);
        assert_eq!(rt.graph.live_count(), 0);
        assert_eq!(rt.scheduler.pending(), 0);
    }
}
