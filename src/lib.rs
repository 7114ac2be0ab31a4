pub mod backend;
pub mod buffers;
pub mod clock;
pub mod config;
pub mod context;
pub mod dsp;
pub mod effects;
pub mod engine;
pub mod error;
pub mod graph;
pub mod music;
pub mod procedural;
pub mod renderer;
pub mod scheduler;
pub mod settings;
pub mod sfx;
#[cfg(feature = "wasm")]
pub mod wasm;

pub use backend::{AudioBackend, OfflineBackend};
pub use buffers::{AssetSource, AudioBuffer, BufferManager, FileSource, MemorySource};
pub use clock::{AudioClock, ClockState};
pub use config::{EngineConfig, ManifestEntry, MusicConfig, ProceduralConfig, SfxConfig};
pub use context::ContextManager;
pub use effects::{EffectKind, EffectParams, EffectPreset, EffectsChain};
pub use engine::{GameAudio, Runtime, VoiceHandle};
pub use error::{BackendError, EngineError, Result};
pub use music::{LayeredMusic, MusicMode, MusicPlayer, PlayOptions};
pub use procedural::{Environment, GameState, GameStateUpdate, ProceduralGenerator, ProceduralState};
pub use settings::{JsonFileSettings, MemorySettings, SettingsStore};
pub use sfx::{ExplosionSize, SfxId, SoundEffectSynthesizer, WeaponCategory};

/// The crate version, read from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
