//! Node kinds of the audio graph and their per-block processing.

use std::f32::consts::SQRT_2;
use std::sync::Arc;

use crate::buffers::AudioBuffer;
use crate::dsp::filter::{FilterType, StereoBiquad};
use crate::dsp::mixer::{equal_power_pan, soft_clip_block};
use crate::dsp::noise::{Noise, NoiseColor};
use crate::dsp::oscillator::{Oscillator, Waveform};
use crate::dsp::param::Param;
use crate::dsp::sampler::BufferPlayer;
use crate::dsp::voice::{Voice, VoicePatch};
use crate::effects::EffectProcessor;

/// Planar stereo block.
#[derive(Debug, Clone, Default)]
pub struct StereoBuffer {
    pub left: Vec<f32>,
    pub right: Vec<f32>,
}

impl StereoBuffer {
    pub fn new(frames: usize) -> Self {
        StereoBuffer {
            left: vec![0.0; frames],
            right: vec![0.0; frames],
        }
    }

    pub fn frames(&self) -> usize {
        self.left.len()
    }

    /// Resize to `frames` and zero.
    pub fn clear(&mut self, frames: usize) {
        self.left.clear();
        self.left.resize(frames, 0.0);
        self.right.clear();
        self.right.resize(frames, 0.0);
    }

    pub fn copy_from(&mut self, other: &StereoBuffer) {
        self.left.clear();
        self.left.extend_from_slice(&other.left);
        self.right.clear();
        self.right.extend_from_slice(&other.right);
    }
}

/// Start/stop window shared by the scheduled sources.
#[derive(Debug, Clone, Copy, Default)]
pub struct Lifespan {
    pub start: Option<f64>,
    pub stop: Option<f64>,
}

impl Lifespan {
    #[inline]
    fn active(&self, t: f64) -> bool {
        self.start.is_some_and(|s| t >= s) && self.stop.is_none_or(|s| t < s)
    }

    fn ended(&self, t: f64) -> bool {
        self.stop.is_some_and(|s| t >= s)
    }
}

#[derive(Debug, Clone)]
pub struct GainNode {
    pub gain: Param,
}

/// Plays a decoded buffer between its start and stop times.
#[derive(Debug, Clone)]
pub struct SourceNode {
    pub player: BufferPlayer,
    pub span: Lifespan,
    /// Seek target applied when playback begins.
    pending_offset: Option<f64>,
}

impl SourceNode {
    pub fn new(buffer: Arc<AudioBuffer>, sample_rate: f64) -> Self {
        SourceNode {
            player: BufferPlayer::new(buffer, sample_rate),
            span: Lifespan::default(),
            pending_offset: None,
        }
    }

    /// Begin at context time `at`, `offset` seconds into the buffer.
    pub fn start(&mut self, at: f64, offset: f64) {
        self.span = Lifespan {
            start: Some(at),
            stop: None,
        };
        self.pending_offset = Some(offset);
    }

    pub fn stop(&mut self, at: f64) {
        self.span.stop = Some(at);
    }

    /// Rewind (or jump) without interrupting playback.
    pub fn seek(&mut self, offset: f64) {
        self.player.seek(offset);
        self.span.stop = None;
    }

    pub fn is_playing(&self, now: f64) -> bool {
        self.span.start.is_some() && !self.span.ended(now) && !self.player.is_finished()
    }

    fn process(&mut self, out: &mut StereoBuffer, t0: f64, sr: f64) {
        for i in 0..out.frames() {
            let t = t0 + i as f64 / sr;
            if !self.span.active(t) {
                continue;
            }
            if let Some(offset) = self.pending_offset.take() {
                self.player.seek(offset);
            }
            let (l, r) = self.player.next_frame();
            out.left[i] = l;
            out.right[i] = r;
        }
    }
}

#[derive(Debug, Clone)]
pub struct OscillatorNode {
    pub osc: Oscillator,
    pub frequency: Param,
    pub span: Lifespan,
}

impl OscillatorNode {
    pub fn new(waveform: Waveform, frequency: f64, sample_rate: f64) -> Self {
        OscillatorNode {
            osc: Oscillator::new(waveform, sample_rate),
            frequency: Param::new(frequency),
            span: Lifespan::default(),
        }
    }

    fn process(&mut self, out: &mut StereoBuffer, t0: f64, sr: f64) {
        for i in 0..out.frames() {
            let t = t0 + i as f64 / sr;
            let freq = self.frequency.next_value(t);
            if !self.span.active(t) {
                continue;
            }
            self.osc.frequency = freq;
            let s = self.osc.next_sample() as f32;
            out.left[i] = s;
            out.right[i] = s;
        }
    }
}

#[derive(Debug, Clone)]
pub struct NoiseNode {
    pub noise: Noise,
    pub span: Lifespan,
}

impl NoiseNode {
    pub fn new(color: NoiseColor, seed: u64) -> Self {
        NoiseNode {
            noise: Noise::new(color, seed),
            span: Lifespan::default(),
        }
    }

    fn process(&mut self, out: &mut StereoBuffer, t0: f64, sr: f64) {
        for i in 0..out.frames() {
            if self.span.active(t0 + i as f64 / sr) {
                let s = self.noise.next_sample() as f32;
                out.left[i] = s;
                out.right[i] = s;
            }
        }
    }
}

/// A synthesized note: gate on at `start`, gate off at `release`.
#[derive(Debug, Clone)]
pub struct VoiceNode {
    pub voice: Voice,
    pub frequency: f64,
    pub velocity: f64,
    pub start: f64,
    pub release: Option<f64>,
    triggered: bool,
    released: bool,
}

impl VoiceNode {
    pub fn new(patch: &VoicePatch, frequency: f64, velocity: f64, start: f64, release: f64, sample_rate: f64) -> Self {
        VoiceNode {
            voice: Voice::new(patch, sample_rate),
            frequency,
            velocity,
            start,
            release: Some(release),
            triggered: false,
            released: false,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.triggered && self.voice.is_finished()
    }

    fn process(&mut self, out: &mut StereoBuffer, t0: f64, sr: f64) {
        for i in 0..out.frames() {
            let t = t0 + i as f64 / sr;
            if !self.triggered {
                if t < self.start {
                    continue;
                }
                self.voice.note_on(self.frequency, self.velocity);
                self.triggered = true;
            }
            if !self.released && self.release.is_some_and(|r| t >= r) {
                self.voice.note_off();
                self.released = true;
            }
            let s = self.voice.next_sample() as f32;
            out.left[i] = s;
            out.right[i] = s;
        }
    }
}

#[derive(Debug, Clone)]
pub struct FilterNode {
    pub filter: StereoBiquad,
    pub frequency: Param,
}

impl FilterNode {
    pub fn new(filter_type: FilterType, frequency: f64, q: f64, sample_rate: f64) -> Self {
        FilterNode {
            filter: StereoBiquad::new(filter_type, frequency, q, sample_rate),
            frequency: Param::new(frequency),
        }
    }

    fn process(&mut self, input: &StereoBuffer, out: &mut StereoBuffer, t0: f64, sr: f64) {
        out.copy_from(input);
        if !self.frequency.is_automating() {
            self.filter.set_frequency(self.frequency.value());
            self.filter.process_block(&mut out.left, &mut out.right);
            return;
        }
        for i in 0..out.frames() {
            self.filter.set_frequency(self.frequency.next_value(t0 + i as f64 / sr));
            (out.left[i], out.right[i]) = self.filter.process(out.left[i], out.right[i]);
        }
    }
}

#[derive(Debug, Clone)]
pub struct PannerNode {
    /// -1 (left) to 1 (right).
    pub pan: Param,
}

#[derive(Debug)]
pub enum Node {
    Gain(GainNode),
    Source(Box<SourceNode>),
    Oscillator(OscillatorNode),
    Noise(NoiseNode),
    Voice(Box<VoiceNode>),
    Filter(FilterNode),
    Panner(PannerNode),
    Effect(Box<EffectProcessor>),
    Destination,
}

impl Node {
    pub fn gain(value: f64) -> Node {
        Node::Gain(GainNode {
            gain: Param::new(value),
        })
    }

    pub fn panner(pan: f64) -> Node {
        Node::Panner(PannerNode {
            pan: Param::new(pan.clamp(-1.0, 1.0)),
        })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Node::Gain(_) => "gain",
            Node::Source(_) => "source",
            Node::Oscillator(_) => "oscillator",
            Node::Noise(_) => "noise",
            Node::Voice(_) => "voice",
            Node::Filter(_) => "filter",
            Node::Panner(_) => "panner",
            Node::Effect(_) => "effect",
            Node::Destination => "destination",
        }
    }

    /// Render one block. `input` is the sum of every connected input.
    pub(crate) fn process(&mut self, input: &StereoBuffer, out: &mut StereoBuffer, t0: f64, sr: f64) {
        let frames = input.frames();
        match self {
            Node::Gain(node) => {
                for i in 0..frames {
                    let g = node.gain.next_value(t0 + i as f64 / sr) as f32;
                    out.left[i] = input.left[i] * g;
                    out.right[i] = input.right[i] * g;
                }
            }
            Node::Source(node) => node.process(out, t0, sr),
            Node::Oscillator(node) => node.process(out, t0, sr),
            Node::Noise(node) => node.process(out, t0, sr),
            Node::Voice(node) => node.process(out, t0, sr),
            Node::Filter(node) => node.process(input, out, t0, sr),
            Node::Panner(node) => {
                for i in 0..frames {
                    let (gl, gr) = equal_power_pan(node.pan.next_value(t0 + i as f64 / sr) as f32);
                    let mono = (input.left[i] + input.right[i]) * 0.5 * SQRT_2;
                    out.left[i] = mono * gl;
                    out.right[i] = mono * gr;
                }
            }
            Node::Effect(effect) => {
                out.copy_from(input);
                effect.process_block(&mut out.left, &mut out.right);
            }
            Node::Destination => {
                out.copy_from(input);
                soft_clip_block(&mut out.left);
                soft_clip_block(&mut out.right);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifespan_window() {
        let span = Lifespan {
            start: Some(1.0),
            stop: Some(2.0),
        };
        assert!(!span.active(0.5));
        assert!(span.active(1.0));
        assert!(!span.active(2.0));
        assert!(span.ended(2.0));
        assert!(!Lifespan::default().active(10.0));
    }

    #[test]
    fn oscillator_is_silent_outside_span() {
        let mut node = Node::Oscillator(OscillatorNode::new(Waveform::Square, 100.0, 1000.0));
        if let Node::Oscillator(osc) = &mut node {
            osc.span.start = Some(0.05);
        }
        let input = StereoBuffer::new(100);
        let mut out = StereoBuffer::new(100);
        node.process(&input, &mut out, 0.0, 1000.0);
        assert!(out.left[..50].iter().all(|s| *s == 0.0));
        assert!(out.left[50..].iter().any(|s| s.abs() > 0.5));
    }

    #[test]
    fn gain_follows_its_param() {
        let mut node = Node::gain(0.0);
        if let Node::Gain(g) = &mut node {
            g.gain.ramp_to(1.0, 0.0, 0.1, crate::dsp::param::RampCurve::Linear);
        }
        let mut input = StereoBuffer::new(100);
        input.left.fill(1.0);
        input.right.fill(1.0);
        let mut out = StereoBuffer::new(100);
        node.process(&input, &mut out, 0.0, 1000.0);
        assert!((out.left[50] - 0.5).abs() < 1e-6);
        assert!((out.right[99] - 0.99).abs() < 1e-5);
    }

    #[test]
    fn hard_left_pan_empties_right_channel() {
        let mut node = Node::panner(-1.0);
        let mut input = StereoBuffer::new(4);
        input.left.fill(0.5);
        input.right.fill(0.5);
        let mut out = StereoBuffer::new(4);
        node.process(&input, &mut out, 0.0, 1000.0);
        assert!(out.right.iter().all(|s| s.abs() < 1e-6));
        assert!((out.left[0] - 0.5 * SQRT_2).abs() < 1e-6);
    }
}
