//! Animix mixer core (engine-agnostic)
//!
//! Blends any number of concurrently playing clips into one value per animated
//! property and applies the result through host traits. A frame runs the
//! pipeline init -> pre-process -> total weight -> process -> apply, over a
//! track cache rebuilt lazily when the registered clips change. Audio,
//! deferred method calls and nested-player commands leave the mixer as
//! command lists in `Outputs`.

pub mod audio;
pub mod backup;
pub mod cache;
pub mod config;
pub mod data;
pub mod error;
pub mod host;
pub mod ids;
pub mod library;
pub mod mixer;
pub mod outputs;
pub mod pipeline;
pub mod playback;
pub mod sampling;
pub mod scene;

// Re-exports for hosts
pub use backup::Backup;
pub use cache::{CacheKey, CachePayload, TrackCache, TrackCacheMap};
pub use config::{CallbackModeMethod, CallbackModeProcess, MixerConfig};
pub use data::{
    Animation, AudioKey, AudioStreamRef, BezierKey, Interpolation, Key, LoopMode, LoopedFlag,
    MethodKey, Track, TrackData, TrackType, UpdateMode, RESET_ANIMATION, STOP_KEY,
};
pub use error::{ClipError, MixerError};
pub use host::{AudioBackend, HostTick, SceneAccess};
pub use ids::{LibraryId, ObjectId, PlaybackId, VoiceId};
pub use library::{AnimationEntry, AnimationLibrary};
pub use mixer::Mixer;
pub use outputs::{AudioCommand, MethodCall, NestedAction, NestedCommand, Outputs};
pub use pipeline::{BlendContext, DefaultHooks, MixerHooks};
pub use playback::{AnimationInstance, PlaybackInfo};
pub use scene::{RecordedCall, RecordingAudio, SceneTree};
pub use animix_api_core::{PropertyPath, Value, ValueKind};
