//! Narrow interfaces to the host: object property access and audio playback.

use animix_api_core::{PropertyPath, Value};

use crate::data::AudioStreamRef;
use crate::ids::{ObjectId, PlaybackId, VoiceId};

/// Scene-side property access used by cache setup, apply, backup and restore.
///
/// Sub-paths are the track path's sub-names (`["position", "x"]`); an empty
/// sub-path addresses the object itself (method calls, nested players, audio).
/// Every accessor must tolerate stale ids by returning `None`/`false`.
pub trait SceneAccess {
    /// Resolve a node path (sub-names ignored) relative to the host root.
    fn resolve(&self, path: &PropertyPath) -> Option<ObjectId>;

    fn is_alive(&self, id: ObjectId) -> bool;

    fn read(&self, id: ObjectId, subpath: &[String]) -> Option<Value>;

    fn write(&mut self, id: ObjectId, subpath: &[String], value: &Value) -> bool;

    /// Index of a named blend shape on a mesh object.
    fn blend_shape_index(&self, id: ObjectId, name: &str) -> Option<usize>;

    fn read_blend_shape(&self, id: ObjectId, shape: usize) -> Option<f32>;

    fn write_blend_shape(&mut self, id: ObjectId, shape: usize, value: f32) -> bool;

    /// Invoke a method on an object. Unknown methods are the host's concern.
    fn call(&mut self, id: ObjectId, method: &str, args: &[Value]);
}

/// Fire-and-forget polyphonic audio backend.
///
/// Ids are allocated by the mixer; the backend only maps them to its own
/// handles. Volume is in decibels.
pub trait AudioBackend {
    fn open(&mut self, playback: PlaybackId, object: ObjectId, max_polyphony: usize);
    fn start(&mut self, playback: PlaybackId, voice: VoiceId, stream: &AudioStreamRef, offset: f64);
    fn set_volume(&mut self, voice: VoiceId, volume_db: f32);
    fn set_pitch(&mut self, voice: VoiceId, pitch_scale: f32);
    fn stop(&mut self, voice: VoiceId);
    fn close(&mut self, playback: PlaybackId);
}

/// A host scheduling tick. The mixer advances only on ticks matching its
/// configured process mode.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum HostTick {
    Physics(f64),
    Idle(f64),
}

impl HostTick {
    pub fn delta(&self) -> f64 {
        match self {
            HostTick::Physics(d) | HostTick::Idle(d) => *d,
        }
    }
}
