use thiserror::Error;

use crate::effects::EffectKind;
use crate::graph::NodeId;

/// Failure reported by the host audio backend when the clock is asked to run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// The host refused to start audio until a user gesture (autoplay policy).
    /// Recoverable: `initialize()` logs this and the caller retries later.
    #[error("audio start blocked: {0}")]
    Blocked(String),
    /// No usable output device or context.
    #[error("audio backend unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("backend: {0}")]
    Backend(#[from] BackendError),

    #[error("failed to fetch '{url}': {reason}")]
    Fetch { url: String, reason: String },

    #[error("failed to decode audio: {reason}")]
    Decode { reason: String },

    #[error("failed to encode audio: {0}")]
    Encode(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[cfg(feature = "http")]
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),

    #[error("integrity check failed for '{id}': expected {expected}, got {actual}")]
    Integrity {
        id: String,
        expected: String,
        actual: String,
    },

    #[error("critical asset '{id}' failed to load: {source}")]
    CriticalAsset {
        id: String,
        #[source]
        source: Box<EngineError>,
    },

    #[error("no buffer cached under '{0}'")]
    MissingBuffer(String),

    #[error("unknown graph node {0}")]
    UnknownNode(NodeId),

    #[error("connecting {from} -> {to} would create a cycle")]
    GraphCycle { from: NodeId, to: NodeId },

    #[error("no effect named '{0}' in the chain")]
    UnknownEffect(String),

    #[error("effect '{id}' is a {expected:?}, cannot apply {found:?} parameters")]
    EffectKindMismatch {
        id: String,
        expected: EffectKind,
        found: EffectKind,
    },

    #[error("invalid config: {0}")]
    Config(String),

    #[error("settings store: {0}")]
    Settings(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("engine has been disposed")]
    Disposed,
}

impl EngineError {
    /// Whether the caller can reasonably retry the same operation later.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            EngineError::Backend(BackendError::Blocked(_))
                | EngineError::Fetch { .. }
                | EngineError::MissingBuffer(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
