//! Outbound command lists produced by the apply stage.
//!
//! The mixer never calls the audio backend or queues host events itself.
//! Apply appends commands here in track order; the host drains them once per
//! tick (`flush_deferred`, `drain_audio`) or ships them elsewhere (serde).

use serde::{Deserialize, Serialize};

use crate::data::AudioStreamRef;
use crate::host::{AudioBackend, SceneAccess};
use crate::ids::{ObjectId, PlaybackId, VoiceId};
use animix_api_core::Value;

/// A method-track call queued for deferred invocation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MethodCall {
    pub object: ObjectId,
    pub method: String,
    pub args: Vec<Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum AudioCommand {
    /// A polyphonic playback was created for an audio track's target.
    Open {
        playback: PlaybackId,
        object: ObjectId,
        max_polyphony: usize,
    },
    Start {
        playback: PlaybackId,
        voice: VoiceId,
        stream: AudioStreamRef,
        offset: f64,
    },
    SetVolume {
        voice: VoiceId,
        volume_db: f32,
    },
    SetPitch {
        voice: VoiceId,
        pitch_scale: f32,
    },
    Stop {
        voice: VoiceId,
    },
    Close {
        playback: PlaybackId,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum NestedAction {
    Play {
        animation: String,
    },
    /// Move the nested player to `time` within `animation`; `play` resumes
    /// playback, otherwise the animation is only assigned and evaluated.
    Seek {
        animation: String,
        time: f64,
        play: bool,
    },
    Stop,
}

/// A command for a nested animation player object.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NestedCommand {
    pub object: ObjectId,
    #[serde(flatten)]
    pub action: NestedAction,
}

/// Everything the host must carry out after a pipeline run.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Outputs {
    /// Deferred method calls, in insertion order.
    pub deferred_calls: Vec<MethodCall>,
    pub audio: Vec<AudioCommand>,
    pub nested: Vec<NestedCommand>,
}

impl Outputs {
    pub fn is_empty(&self) -> bool {
        self.deferred_calls.is_empty() && self.audio.is_empty() && self.nested.is_empty()
    }

    pub fn clear(&mut self) {
        self.deferred_calls.clear();
        self.audio.clear();
        self.nested.clear();
    }

    /// Invoke every deferred call on live objects, in queue order. Returns the
    /// number of calls delivered.
    pub fn flush_deferred(&mut self, scene: &mut dyn SceneAccess) -> usize {
        let mut delivered = 0;
        for call in self.deferred_calls.drain(..) {
            if !scene.is_alive(call.object) {
                log::debug!("deferred call '{}' dropped: target gone", call.method);
                continue;
            }
            scene.call(call.object, &call.method, &call.args);
            delivered += 1;
        }
        delivered
    }

    /// Hand every queued audio command to `backend`, in order.
    pub fn drain_audio(&mut self, backend: &mut dyn AudioBackend) {
        for cmd in self.audio.drain(..) {
            match cmd {
                AudioCommand::Open {
                    playback,
                    object,
                    max_polyphony,
                } => backend.open(playback, object, max_polyphony),
                AudioCommand::Start {
                    playback,
                    voice,
                    stream,
                    offset,
                } => backend.start(playback, voice, &stream, offset),
                AudioCommand::SetVolume { voice, volume_db } => {
                    backend.set_volume(voice, volume_db)
                }
                AudioCommand::SetPitch { voice, pitch_scale } => {
                    backend.set_pitch(voice, pitch_scale)
                }
                AudioCommand::Stop { voice } => backend.stop(voice),
                AudioCommand::Close { playback } => backend.close(playback),
            }
        }
    }

    /// Move every command out, leaving this list empty.
    pub fn take(&mut self) -> Outputs {
        std::mem::take(self)
    }
}
