//! Ordered effects chain between a fixed input and output node.

use crate::error::{EngineError, Result};
use crate::graph::{AudioGraph, Node, NodeId};

use super::{EffectParams, EffectPreset, EffectProcessor};

#[derive(Debug, Clone)]
struct Slot {
    id: String,
    node: NodeId,
    params: EffectParams,
}

/// `input -> effect1 -> ... -> effectN -> output`, rebuilt in full whenever
/// the list changes. Parameter updates never touch the wiring.
#[derive(Debug)]
pub struct EffectsChain {
    input: NodeId,
    output: NodeId,
    effects: Vec<Slot>,
    rebuilds: usize,
}

impl EffectsChain {
    /// Create the input and output nodes, connected straight through.
    pub fn new(graph: &mut AudioGraph) -> Result<Self> {
        let input = graph.add_gain(1.0);
        let output = graph.add_gain(1.0);
        let mut chain = EffectsChain {
            input,
            output,
            effects: Vec::new(),
            rebuilds: 0,
        };
        chain.rebuild(graph)?;
        Ok(chain)
    }

    /// Node sources connect into.
    pub fn input(&self) -> NodeId {
        self.input
    }

    /// Node the chain's owner routes onward.
    pub fn output(&self) -> NodeId {
        self.output
    }

    /// Add `params` under `id`. An existing effect with that id is replaced
    /// in its current position.
    pub fn add_effect(&mut self, graph: &mut AudioGraph, id: &str, params: EffectParams) -> Result<NodeId> {
        let node = graph.add(Node::Effect(Box::new(EffectProcessor::new(&params, graph.sample_rate()))));
        let slot = Slot {
            id: id.to_string(),
            node,
            params,
        };
        match self.effects.iter_mut().find(|s| s.id == id) {
            Some(existing) => {
                graph.dispose(existing.node);
                *existing = slot;
            }
            None => self.effects.push(slot),
        }
        tracing::debug!(id, %node, "effect added");
        self.rebuild(graph)?;
        Ok(node)
    }

    pub fn remove_effect(&mut self, graph: &mut AudioGraph, id: &str) -> Result<bool> {
        let Some(index) = self.effects.iter().position(|s| s.id == id) else {
            return Ok(false);
        };
        let slot = self.effects.remove(index);
        graph.dispose(slot.node);
        tracing::debug!(id, "effect removed");
        self.rebuild(graph)?;
        Ok(true)
    }

    /// Change an effect's parameters in place.
    pub fn update_effect(&mut self, graph: &mut AudioGraph, id: &str, params: EffectParams) -> Result<()> {
        let slot = self
            .effects
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| EngineError::UnknownEffect(id.to_string()))?;
        if slot.params.kind() != params.kind() {
            return Err(EngineError::EffectKindMismatch {
                id: id.to_string(),
                expected: slot.params.kind(),
                found: params.kind(),
            });
        }
        graph.effect(slot.node)?.apply(&params);
        slot.params = params;
        Ok(())
    }

    /// Remove every effect, leaving input wired straight to output.
    pub fn clear(&mut self, graph: &mut AudioGraph) -> Result<()> {
        for slot in self.effects.drain(..) {
            graph.dispose(slot.node);
        }
        self.rebuild(graph)
    }

    /// Replace the chain with the preset's effects, in order.
    pub fn apply_preset(&mut self, graph: &mut AudioGraph, preset: &EffectPreset) -> Result<()> {
        for slot in self.effects.drain(..) {
            graph.dispose(slot.node);
        }
        let sr = graph.sample_rate();
        for entry in &preset.effects {
            let node = graph.add(Node::Effect(Box::new(EffectProcessor::new(&entry.params, sr))));
            match self.effects.iter_mut().find(|s| s.id == entry.id) {
                Some(dup) => {
                    graph.dispose(dup.node);
                    dup.node = node;
                    dup.params = entry.params.clone();
                }
                None => self.effects.push(Slot {
                    id: entry.id.clone(),
                    node,
                    params: entry.params.clone(),
                }),
            }
        }
        tracing::debug!(preset = %preset.name, effects = self.effects.len(), "preset applied");
        self.rebuild(graph)
    }

    fn rebuild(&mut self, graph: &mut AudioGraph) -> Result<()> {
        graph.disconnect_outputs(self.input);
        for slot in &self.effects {
            graph.disconnect_outputs(slot.node);
        }
        let mut previous = self.input;
        for slot in &self.effects {
            graph.connect(previous, slot.node)?;
            previous = slot.node;
        }
        graph.connect(previous, self.output)?;
        self.rebuilds += 1;
        tracing::trace!(effects = self.effects.len(), "effects chain rebuilt");
        Ok(())
    }

    /// Effect ids in processing order.
    pub fn effect_ids(&self) -> Vec<&str> {
        self.effects.iter().map(|s| s.id.as_str()).collect()
    }

    pub fn params(&self, id: &str) -> Option<&EffectParams> {
        self.effects.iter().find(|s| s.id == id).map(|s| &s.params)
    }

    pub fn node_of(&self, id: &str) -> Option<NodeId> {
        self.effects.iter().find(|s| s.id == id).map(|s| s.node)
    }

    pub fn len(&self) -> usize {
        self.effects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    pub fn rebuild_count(&self) -> usize {
        self.rebuilds
    }

    /// Follow the wiring from input to output as the graph holds it.
    pub fn signal_path(&self, graph: &AudioGraph) -> Vec<NodeId> {
        let mut path = vec![self.input];
        let mut current = self.input;
        while current != self.output && path.len() <= self.effects.len() + 1 {
            let next = graph
                .outputs_of(current)
                .into_iter()
                .find(|n| *n == self.output || self.effects.iter().any(|s| s.node == *n));
            match next {
                Some(n) => {
                    path.push(n);
                    current = n;
                }
                None => break,
            }
        }
        path
    }

    /// Dispose every node the chain owns.
    pub fn dispose(&mut self, graph: &mut AudioGraph) {
        for slot in self.effects.drain(..) {
            graph.dispose(slot.node);
        }
        graph.dispose(self.input);
        graph.dispose(self.output);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::{DelayParams, EffectKind, ReverbParams};

    fn setup() -> (AudioGraph, EffectsChain) {
        let mut graph = AudioGraph::new(44100.0);
        let chain = EffectsChain::new(&mut graph).unwrap();
        (graph, chain)
    }

    #[test]
    fn empty_chain_passes_straight_through() {
        let (graph, chain) = setup();
        assert_eq!(chain.signal_path(&graph), vec![chain.input(), chain.output()]);
    }

    #[test]
    fn removing_the_first_effect_leaves_input_delay_output() {
        let (mut graph, mut chain) = setup();
        chain.add_effect(&mut graph, "r", EffectParams::defaults(EffectKind::Reverb)).unwrap();
        let d = chain.add_effect(&mut graph, "d", EffectParams::defaults(EffectKind::Delay)).unwrap();
        assert!(chain.remove_effect(&mut graph, "r").unwrap());
        assert_eq!(chain.signal_path(&graph), vec![chain.input(), d, chain.output()]);
        assert_eq!(chain.effect_ids(), vec!["d"]);
        assert!(!chain.remove_effect(&mut graph, "r").unwrap());
    }

    #[test]
    fn replacing_an_id_keeps_its_position() {
        let (mut graph, mut chain) = setup();
        let first = chain.add_effect(&mut graph, "a", EffectParams::defaults(EffectKind::Reverb)).unwrap();
        chain.add_effect(&mut graph, "b", EffectParams::defaults(EffectKind::Delay)).unwrap();
        let replaced = chain.add_effect(&mut graph, "a", EffectParams::defaults(EffectKind::Chorus)).unwrap();
        assert!(!graph.contains(first));
        assert_eq!(chain.effect_ids(), vec!["a", "b"]);
        assert_eq!(chain.signal_path(&graph)[1], replaced);
    }

    #[test]
    fn updates_do_not_rebuild() {
        let (mut graph, mut chain) = setup();
        chain.add_effect(&mut graph, "d", EffectParams::defaults(EffectKind::Delay)).unwrap();
        let rebuilds = chain.rebuild_count();
        let params = EffectParams::Delay(DelayParams {
            time: 0.5,
            ..Default::default()
        });
        chain.update_effect(&mut graph, "d", params.clone()).unwrap();
        assert_eq!(chain.rebuild_count(), rebuilds);
        assert_eq!(chain.params("d"), Some(&params));
    }

    #[test]
    fn update_errors() {
        let (mut graph, mut chain) = setup();
        chain.add_effect(&mut graph, "d", EffectParams::defaults(EffectKind::Delay)).unwrap();
        let reverb = EffectParams::Reverb(ReverbParams::default());
        assert!(matches!(
            chain.update_effect(&mut graph, "d", reverb.clone()),
            Err(EngineError::EffectKindMismatch { .. })
        ));
        assert!(matches!(
            chain.update_effect(&mut graph, "x", reverb),
            Err(EngineError::UnknownEffect(_))
        ));
    }

    #[test]
    fn clear_and_dispose_release_nodes() {
        let (mut graph, mut chain) = setup();
        chain.add_effect(&mut graph, "a", EffectParams::defaults(EffectKind::Reverb)).unwrap();
        chain.add_effect(&mut graph, "b", EffectParams::defaults(EffectKind::Limiter)).unwrap();
        chain.clear(&mut graph).unwrap();
        assert!(chain.is_empty());
        assert_eq!(graph.live_count(), 2);
        chain.dispose(&mut graph);
        assert_eq!(graph.live_count(), 0);
        assert_eq!(graph.created(), graph.disposed());
    }
}
