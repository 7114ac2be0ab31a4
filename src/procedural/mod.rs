//! Game-state-reactive procedural music.

pub mod generator;
pub mod patterns;
pub mod state;
pub mod theory;

pub use generator::{GeneratorState, ProceduralGenerator};
pub use patterns::Part;
pub use state::{Environment, GameState, GameStateUpdate, ProceduralState};
pub use theory::{Scale, safe_frequency, safe_index};
