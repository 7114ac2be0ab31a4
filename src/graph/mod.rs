//! The audio graph: an arena of processing nodes wired input-to-output.
//!
//! Nodes are owned by the graph and addressed by [`NodeId`]. Nothing is
//! garbage collected: every node created must eventually be passed to
//! [`AudioGraph::dispose`], and the created/disposed counters make leaks
//! observable. Rendering walks the graph depth-first from the destination,
//! so only nodes that can reach the destination are processed.

pub mod node;

use std::collections::{HashMap, HashSet};
use std::fmt;

pub use node::{
    FilterNode, GainNode, Lifespan, Node, NoiseNode, OscillatorNode, PannerNode, SourceNode, StereoBuffer, VoiceNode,
};

use crate::dsp::mixer::mix_into;
use crate::dsp::param::Param;
use crate::effects::EffectProcessor;
use crate::error::{EngineError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

#[derive(Debug)]
struct Slot {
    node: Node,
    inputs: Vec<NodeId>,
    output: StereoBuffer,
}

#[derive(Debug)]
pub struct AudioGraph {
    nodes: HashMap<NodeId, Slot>,
    next_id: u64,
    destination: NodeId,
    sample_rate: f64,
    /// Render order, recomputed after topology changes.
    order: Vec<NodeId>,
    order_dirty: bool,
    scratch: StereoBuffer,
    created: u64,
    disposed: u64,
}

impl AudioGraph {
    pub fn new(sample_rate: f64) -> Self {
        let mut graph = AudioGraph {
            nodes: HashMap::new(),
            next_id: 0,
            destination: NodeId(0),
            sample_rate,
            order: Vec::new(),
            order_dirty: true,
            scratch: StereoBuffer::default(),
            created: 0,
            disposed: 0,
        };
        graph.destination = graph.insert(Node::Destination);
        // The destination is permanent and not counted as a live node.
        graph.created = 0;
        graph
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn destination(&self) -> NodeId {
        self.destination
    }

    fn insert(&mut self, node: Node) -> NodeId {
        self.next_id += 1;
        let id = NodeId(self.next_id);
        tracing::trace!(%id, kind = node.kind(), "node created");
        self.nodes.insert(
            id,
            Slot {
                node,
                inputs: Vec::new(),
                output: StereoBuffer::default(),
            },
        );
        self.created += 1;
        id
    }

    pub fn add(&mut self, node: Node) -> NodeId {
        self.insert(node)
    }

    pub fn add_gain(&mut self, value: f64) -> NodeId {
        self.insert(Node::gain(value))
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Route `from`'s output into `to`. Connecting twice is a no-op.
    pub fn connect(&mut self, from: NodeId, to: NodeId) -> Result<()> {
        if !self.contains(from) {
            return Err(EngineError::UnknownNode(from));
        }
        if !self.contains(to) {
            return Err(EngineError::UnknownNode(to));
        }
        if from == to || self.depends_on(from, to) {
            return Err(EngineError::GraphCycle { from, to });
        }
        if let Some(slot) = self.nodes.get_mut(&to) {
            if !slot.inputs.contains(&from) {
                slot.inputs.push(from);
                self.order_dirty = true;
            }
        }
        Ok(())
    }

    /// Whether `node` already pulls (directly or not) from `upstream`.
    fn depends_on(&self, node: NodeId, upstream: NodeId) -> bool {
        let mut stack = vec![node];
        let mut seen = HashSet::new();
        while let Some(id) = stack.pop() {
            if id == upstream {
                return true;
            }
            if !seen.insert(id) {
                continue;
            }
            if let Some(slot) = self.nodes.get(&id) {
                stack.extend(slot.inputs.iter().copied());
            }
        }
        false
    }

    pub fn disconnect(&mut self, from: NodeId, to: NodeId) -> bool {
        let Some(slot) = self.nodes.get_mut(&to) else {
            return false;
        };
        let before = slot.inputs.len();
        slot.inputs.retain(|i| *i != from);
        let changed = before != slot.inputs.len();
        self.order_dirty |= changed;
        changed
    }

    /// Remove every connection leaving `from`.
    pub fn disconnect_outputs(&mut self, from: NodeId) {
        for slot in self.nodes.values_mut() {
            slot.inputs.retain(|i| *i != from);
        }
        self.order_dirty = true;
    }

    /// Nodes `id` feeds into.
    pub fn outputs_of(&self, id: NodeId) -> Vec<NodeId> {
        let mut outs: Vec<NodeId> = self
            .nodes
            .iter()
            .filter(|(_, slot)| slot.inputs.contains(&id))
            .map(|(to, _)| *to)
            .collect();
        outs.sort();
        outs
    }

    pub fn inputs_of(&self, id: NodeId) -> &[NodeId] {
        self.nodes.get(&id).map_or(&[], |slot| slot.inputs.as_slice())
    }

    /// Disconnect and free a node. Returns false if it was already gone.
    pub fn dispose(&mut self, id: NodeId) -> bool {
        if id == self.destination || self.nodes.remove(&id).is_none() {
            return false;
        }
        for slot in self.nodes.values_mut() {
            slot.inputs.retain(|i| *i != id);
        }
        self.disposed += 1;
        self.order_dirty = true;
        tracing::trace!(%id, "node disposed");
        true
    }

    pub fn dispose_all(&mut self, ids: &[NodeId]) -> usize {
        ids.iter().filter(|id| self.dispose(**id)).count()
    }

    pub fn created(&self) -> u64 {
        self.created
    }

    pub fn disposed(&self) -> u64 {
        self.disposed
    }

    /// Nodes currently alive, not counting the destination.
    pub fn live_count(&self) -> usize {
        self.nodes.len() - 1
    }

    pub fn node(&self, id: NodeId) -> Result<&Node> {
        self.nodes.get(&id).map(|s| &s.node).ok_or(EngineError::UnknownNode(id))
    }

    pub fn node_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.nodes
            .get_mut(&id)
            .map(|s| &mut s.node)
            .ok_or(EngineError::UnknownNode(id))
    }

    /// The automatable parameter of a gain node.
    pub fn gain(&mut self, id: NodeId) -> Result<&mut Param> {
        match self.node_mut(id)? {
            Node::Gain(g) => Ok(&mut g.gain),
            _ => Err(EngineError::UnknownNode(id)),
        }
    }

    pub fn source(&mut self, id: NodeId) -> Result<&mut SourceNode> {
        match self.node_mut(id)? {
            Node::Source(s) => Ok(&mut **s),
            _ => Err(EngineError::UnknownNode(id)),
        }
    }

    pub fn oscillator(&mut self, id: NodeId) -> Result<&mut OscillatorNode> {
        match self.node_mut(id)? {
            Node::Oscillator(o) => Ok(o),
            _ => Err(EngineError::UnknownNode(id)),
        }
    }

    pub fn noise(&mut self, id: NodeId) -> Result<&mut NoiseNode> {
        match self.node_mut(id)? {
            Node::Noise(n) => Ok(n),
            _ => Err(EngineError::UnknownNode(id)),
        }
    }

    pub fn filter(&mut self, id: NodeId) -> Result<&mut FilterNode> {
        match self.node_mut(id)? {
            Node::Filter(f) => Ok(f),
            _ => Err(EngineError::UnknownNode(id)),
        }
    }

    pub fn panner(&mut self, id: NodeId) -> Result<&mut PannerNode> {
        match self.node_mut(id)? {
            Node::Panner(p) => Ok(p),
            _ => Err(EngineError::UnknownNode(id)),
        }
    }

    pub fn effect(&mut self, id: NodeId) -> Result<&mut EffectProcessor> {
        match self.node_mut(id)? {
            Node::Effect(e) => Ok(&mut **e),
            _ => Err(EngineError::UnknownNode(id)),
        }
    }

    fn rebuild_order(&mut self) {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut visited = HashSet::new();
        // Iterative post-order DFS from the destination.
        let mut stack = vec![(self.destination, false)];
        while let Some((id, expanded)) = stack.pop() {
            if expanded {
                order.push(id);
                continue;
            }
            if !visited.insert(id) {
                continue;
            }
            stack.push((id, true));
            if let Some(slot) = self.nodes.get(&id) {
                for input in slot.inputs.iter().rev() {
                    if !visited.contains(input) {
                        stack.push((*input, false));
                    }
                }
            }
        }
        self.order = order;
        self.order_dirty = false;
    }

    /// Number of nodes the next render will process.
    pub fn active_count(&mut self) -> usize {
        if self.order_dirty {
            self.rebuild_order();
        }
        self.order.len()
    }

    /// Render `left.len()` frames starting at context time `t0` into the
    /// caller's buffers.
    pub fn render(&mut self, t0: f64, left: &mut [f32], right: &mut [f32]) {
        let frames = left.len().min(right.len());
        if self.order_dirty {
            self.rebuild_order();
        }
        let sr = self.sample_rate;
        for idx in 0..self.order.len() {
            let id = self.order[idx];
            self.scratch.clear(frames);
            if let Some(slot) = self.nodes.get(&id) {
                for input in &slot.inputs {
                    if let Some(src) = self.nodes.get(input) {
                        mix_into(&mut self.scratch.left, &src.output.left, 1.0);
                        mix_into(&mut self.scratch.right, &src.output.right, 1.0);
                    }
                }
            }
            if let Some(slot) = self.nodes.get_mut(&id) {
                slot.output.clear(frames);
                slot.node.process(&self.scratch, &mut slot.output, t0, sr);
            }
        }
        match self.nodes.get(&self.destination) {
            Some(dest) if dest.output.frames() >= frames => {
                left[..frames].copy_from_slice(&dest.output.left[..frames]);
                right[..frames].copy_from_slice(&dest.output.right[..frames]);
            }
            _ => {
                left.fill(0.0);
                right.fill(0.0);
            }
        }
    }

    /// Dispose every node except the destination.
    pub fn clear(&mut self) {
        let ids: Vec<NodeId> = self.nodes.keys().copied().filter(|id| *id != self.destination).collect();
        self.dispose_all(&ids);
        if let Some(dest) = self.nodes.get_mut(&self.destination) {
            dest.inputs.clear();
        }
    }
}
