//! File-based music: single tracks with fades, and phase-locked layers.

pub mod layered;
pub mod player;

use std::sync::Arc;

pub use layered::{LayeredMusic, MusicLayer};
pub use player::{MusicPlayer, PlayOptions};

use crate::buffers::AudioBuffer;
use crate::dsp::param::RampCurve;
use crate::error::Result;
use crate::graph::{AudioGraph, Node, NodeId, SourceNode};

/// Which music source currently owns the music bus. Entering one mode tears
/// the others down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MusicMode {
    #[default]
    Idle,
    SingleTrack,
    Layered,
    Procedural,
}

/// One playing buffer: a source node feeding its own gain node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackVoice {
    pub buffer_id: String,
    pub source: NodeId,
    pub gain: NodeId,
    pub looping: bool,
}

impl PlaybackVoice {
    /// Build `source -> gain -> output`. The source is not started.
    pub fn create(
        graph: &mut AudioGraph,
        buffer_id: &str,
        buffer: Arc<AudioBuffer>,
        looping: bool,
        gain: f64,
        output: NodeId,
    ) -> Result<Self> {
        let mut node = SourceNode::new(buffer, graph.sample_rate());
        node.player.set_looping(looping);
        let source = graph.add(Node::Source(Box::new(node)));
        let gain_node = graph.add_gain(gain);
        let voice = PlaybackVoice {
            buffer_id: buffer_id.to_string(),
            source,
            gain: gain_node,
            looping,
        };
        if let Err(e) = graph.connect(source, gain_node).and_then(|_| graph.connect(gain_node, output)) {
            voice.dispose(graph);
            return Err(e);
        }
        Ok(voice)
    }

    /// Start at context time `at`, `offset` seconds into the buffer.
    pub fn start(&self, graph: &mut AudioGraph, at: f64, offset: f64) -> Result<()> {
        graph.source(self.source)?.start(at, offset);
        Ok(())
    }

    pub fn stop(&self, graph: &mut AudioGraph, at: f64) -> Result<()> {
        graph.source(self.source)?.stop(at);
        Ok(())
    }

    /// Override the loop region (seconds).
    pub fn set_loop_points(&self, graph: &mut AudioGraph, start: f64, end: f64) -> Result<()> {
        graph.source(self.source)?.player.set_loop_points(start, end);
        Ok(())
    }

    /// Glide the voice gain from its current value.
    pub fn fade_to(&self, graph: &mut AudioGraph, target: f64, now: f64, seconds: f64) -> Result<()> {
        graph.gain(self.gain)?.ramp_to(target, now, seconds, RampCurve::Linear);
        Ok(())
    }

    pub fn is_playing(&self, graph: &mut AudioGraph, now: f64) -> bool {
        graph.source(self.source).is_ok_and(|s| s.is_playing(now))
    }

    pub fn nodes(&self) -> [NodeId; 2] {
        [self.source, self.gain]
    }

    /// Dispose both nodes; returns how many were still alive.
    pub fn dispose(&self, graph: &mut AudioGraph) -> usize {
        graph.dispose_all(&self.nodes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn voice_owns_two_nodes() {
        let mut graph = AudioGraph::new(1000.0);
        let buffer = Arc::new(AudioBuffer::mono(vec![0.5; 100], 1000));
        let dest = graph.destination();
        let voice = PlaybackVoice::create(&mut graph, "tone", buffer, false, 1.0, dest).unwrap();
        assert_eq!(graph.live_count(), 2);
        voice.start(&mut graph, 0.0, 0.0).unwrap();
        assert!(voice.is_playing(&mut graph, 0.0));

        let (mut l, mut r) = (vec![0.0; 10], vec![0.0; 10]);
        graph.render(0.0, &mut l, &mut r);
        assert!(l.iter().all(|s| *s > 0.4));

        assert_eq!(voice.dispose(&mut graph), 2);
        assert_eq!(voice.dispose(&mut graph), 0);
        assert_eq!(graph.live_count(), 0);
    }
}
