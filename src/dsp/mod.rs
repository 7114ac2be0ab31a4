//! Signal processing primitives.
//!
//! Every processor here is self-contained and sample-rate aware: sources
//! produce one sample (or stereo frame) per call, effects expose
//! `process(left, right)` plus an in-place `process_block`. The graph in
//! [`crate::graph`] wires them together; nothing in this module knows about
//! nodes, clocks or scheduling.

pub mod chorus;
pub mod compressor;
pub mod delay;
pub mod distortion;
pub mod envelope;
pub mod eq;
pub mod filter;
pub mod limiter;
pub mod mixer;
pub mod modulation;
pub mod noise;
pub mod oscillator;
pub mod param;
pub mod phaser;
pub mod pitch_shift;
pub mod reverb;
pub mod sampler;
pub mod voice;
