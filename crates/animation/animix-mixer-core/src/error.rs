//! Error types for configuration and clip loading.
//!
//! Per-frame structural problems (dead targets, bad sub-paths, unresolved
//! nodes) are logged and skipped; they never surface here.

use animix_api_core::PathError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum MixerError {
    #[error("invalid name '{0}': must be non-empty and not contain '/', ':', ',' or '['")]
    InvalidName(String),

    #[error("invalid library name '{0}': must not contain '/', ':', ',' or '['")]
    InvalidLibraryName(String),

    #[error("animation library '{0}' already exists")]
    DuplicateLibrary(String),

    #[error("animation library is already registered as '{0}'")]
    LibraryAlreadyAdded(String),

    #[error("animation library not found: {0}")]
    LibraryNotFound(String),

    #[error("animation '{name}' already exists in library '{library}'")]
    DuplicateAnimation { library: String, name: String },

    #[error("animation not found: {0}")]
    AnimationNotFound(String),

    #[error("invalid root node '{path}': {reason}")]
    InvalidRootNode { path: String, reason: String },

    #[error("audio polyphony must be between 1 and 128, got {0}")]
    InvalidPolyphony(usize),

    #[error("no RESET animation is registered")]
    NoResetAnimation,

    #[error("invalid animation: {0}")]
    InvalidAnimation(#[from] ClipError),

    #[error("config error: {0}")]
    Config(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum ClipError {
    #[error("clip '{name}': length must be finite and >= 0, got {length}")]
    InvalidLength { name: String, length: f64 },

    #[error("clip '{name}': track {track} key {key} has invalid time {time}")]
    InvalidKeyTime {
        name: String,
        track: usize,
        key: usize,
        time: f64,
    },

    #[error("clip '{name}': track {track} keys are not sorted by time")]
    UnsortedKeys { name: String, track: usize },

    #[error("clip '{name}': blend shape track {track} needs exactly one sub-name")]
    BlendShapePath { name: String, track: usize },

    #[error(transparent)]
    Path(#[from] PathError),

    #[error("clip parse error: {0}")]
    Parse(String),
}
