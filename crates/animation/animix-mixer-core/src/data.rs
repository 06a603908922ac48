//! Clip data model consumed by the mixer.
//!
//! A clip (`Animation`) is immutable once registered: edits go through the
//! mixer, which swaps the shared clip and bumps its update pass. Key times are
//! in seconds; keys on each track must be sorted ascending.

use animix_api_core::{PropertyPath, Value};
use serde::{Deserialize, Serialize};

use crate::error::ClipError;

/// Name of the clip whose first keys define each property's rest pose.
pub const RESET_ANIMATION: &str = "RESET";

/// Nested-animation key value that stops the nested player.
pub const STOP_KEY: &str = "[stop]";

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopMode {
    #[default]
    None,
    Linear,
    PingPong,
}

/// Loop boundary crossed by the playhead during the frame's delta.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopedFlag {
    #[default]
    None,
    /// Crossed the clip end (wrapped to the start, or bounced for ping-pong).
    End,
    /// Crossed the clip start moving backward.
    Start,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateMode {
    #[default]
    Continuous,
    /// Snap to the key at or below the current time.
    Discrete,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Interpolation {
    Nearest,
    #[default]
    Linear,
    /// Linear along the shortest angular path (radians).
    LinearAngle,
    Cubic,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackType {
    Value,
    BlendShape,
    Bezier,
    Method,
    Audio,
    Animation,
}

/// A keyframe: time in seconds plus a payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Key<T> {
    pub time: f64,
    pub value: T,
}

impl<T> Key<T> {
    pub fn new(time: f64, value: T) -> Self {
        Self { time, value }
    }
}

/// Bezier key with handles relative to the key (x in seconds, y in value units).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BezierKey {
    pub time: f64,
    pub value: f32,
    #[serde(default)]
    pub in_handle: [f32; 2],
    #[serde(default)]
    pub out_handle: [f32; 2],
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MethodKey {
    pub method: String,
    #[serde(default)]
    pub args: Vec<Value>,
}

/// Opaque reference to an audio stream resource owned by the host.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AudioStreamRef {
    pub id: String,
    /// Stream length in seconds; 0 when unknown.
    #[serde(default)]
    pub length: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AudioKey {
    pub stream: AudioStreamRef,
    #[serde(default)]
    pub start_offset: f64,
    #[serde(default)]
    pub end_offset: f64,
    #[serde(default = "unit_pitch")]
    pub pitch_scale: f32,
}

fn unit_pitch() -> f32 {
    1.0
}

fn enabled_by_default() -> bool {
    true
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TrackData {
    Value {
        keys: Vec<Key<Value>>,
        #[serde(default)]
        update_mode: UpdateMode,
        #[serde(default)]
        interpolation: Interpolation,
    },
    BlendShape {
        keys: Vec<Key<f32>>,
        #[serde(default)]
        interpolation: Interpolation,
    },
    Bezier {
        keys: Vec<BezierKey>,
    },
    Method {
        keys: Vec<Key<MethodKey>>,
    },
    Audio {
        keys: Vec<Key<AudioKey>>,
        #[serde(default = "enabled_by_default")]
        use_blend: bool,
    },
    Animation {
        keys: Vec<Key<String>>,
    },
}

impl TrackData {
    pub fn track_type(&self) -> TrackType {
        match self {
            TrackData::Value { .. } => TrackType::Value,
            TrackData::BlendShape { .. } => TrackType::BlendShape,
            TrackData::Bezier { .. } => TrackType::Bezier,
            TrackData::Method { .. } => TrackType::Method,
            TrackData::Audio { .. } => TrackType::Audio,
            TrackData::Animation { .. } => TrackType::Animation,
        }
    }

    pub fn key_count(&self) -> usize {
        match self {
            TrackData::Value { keys, .. } => keys.len(),
            TrackData::BlendShape { keys, .. } => keys.len(),
            TrackData::Bezier { keys } => keys.len(),
            TrackData::Method { keys } => keys.len(),
            TrackData::Audio { keys, .. } => keys.len(),
            TrackData::Animation { keys } => keys.len(),
        }
    }

    pub fn key_time(&self, idx: usize) -> Option<f64> {
        match self {
            TrackData::Value { keys, .. } => keys.get(idx).map(|k| k.time),
            TrackData::BlendShape { keys, .. } => keys.get(idx).map(|k| k.time),
            TrackData::Bezier { keys } => keys.get(idx).map(|k| k.time),
            TrackData::Method { keys } => keys.get(idx).map(|k| k.time),
            TrackData::Audio { keys, .. } => keys.get(idx).map(|k| k.time),
            TrackData::Animation { keys } => keys.get(idx).map(|k| k.time),
        }
    }
}

/// One property's keyframe stream within a clip.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub path: PropertyPath,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    #[serde(flatten)]
    pub data: TrackData,
}

impl Track {
    pub fn new(path: PropertyPath, data: TrackData) -> Self {
        Self {
            path,
            enabled: true,
            data,
        }
    }

    /// Parse `path` and build an enabled track.
    pub fn parse(path: &str, data: TrackData) -> Result<Self, ClipError> {
        Ok(Self::new(PropertyPath::parse(path)?, data))
    }

    #[inline]
    pub fn track_type(&self) -> TrackType {
        self.data.track_type()
    }
}

/// An immutable timeline of per-property keyframes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Animation {
    pub name: String,
    /// Clip length in seconds.
    pub length: f64,
    #[serde(default)]
    pub loop_mode: LoopMode,
    #[serde(default)]
    pub tracks: Vec<Track>,
}

impl Animation {
    pub fn new(name: impl Into<String>, length: f64) -> Self {
        Self {
            name: name.into(),
            length,
            loop_mode: LoopMode::None,
            tracks: Vec::new(),
        }
    }

    pub fn with_loop_mode(mut self, mode: LoopMode) -> Self {
        self.loop_mode = mode;
        self
    }

    pub fn with_track(mut self, track: Track) -> Self {
        self.tracks.push(track);
        self
    }

    /// Parse and validate a clip from JSON.
    pub fn from_json(s: &str) -> Result<Self, ClipError> {
        let anim: Animation = serde_json::from_str(s).map_err(|e| ClipError::Parse(e.to_string()))?;
        anim.validate()?;
        Ok(anim)
    }

    /// Validate basic invariants: finite non-negative length, sorted non-negative key times,
    /// and single sub-name blend shape paths.
    pub fn validate(&self) -> Result<(), ClipError> {
        if !self.length.is_finite() || self.length < 0.0 {
            return Err(ClipError::InvalidLength {
                name: self.name.clone(),
                length: self.length,
            });
        }
        for (ti, track) in self.tracks.iter().enumerate() {
            if track.track_type() == TrackType::BlendShape && track.path.subnames.len() != 1 {
                return Err(ClipError::BlendShapePath {
                    name: self.name.clone(),
                    track: ti,
                });
            }
            let mut last = f64::NEG_INFINITY;
            for ki in 0..track.data.key_count() {
                let t = track.data.key_time(ki).unwrap_or(f64::NAN);
                if !t.is_finite() || t < 0.0 || t > self.length {
                    return Err(ClipError::InvalidKeyTime {
                        name: self.name.clone(),
                        track: ti,
                        key: ki,
                        time: t,
                    });
                }
                if t < last {
                    return Err(ClipError::UnsortedKeys {
                        name: self.name.clone(),
                        track: ti,
                    });
                }
                last = t;
            }
        }
        Ok(())
    }

    #[inline]
    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    pub fn track_type(&self, track: usize) -> Option<TrackType> {
        self.tracks.get(track).map(Track::track_type)
    }

    pub fn track_path(&self, track: usize) -> Option<&PropertyPath> {
        self.tracks.get(track).map(|t| &t.path)
    }

    /// Continuous value tracks (and every other interpolating track type) blend;
    /// discrete value tracks snap.
    pub fn track_is_continuous(&self, track: usize) -> bool {
        match self.tracks.get(track).map(|t| &t.data) {
            Some(TrackData::Value { update_mode, .. }) => *update_mode == UpdateMode::Continuous,
            Some(TrackData::BlendShape { .. }) | Some(TrackData::Bezier { .. }) => true,
            _ => false,
        }
    }

    pub fn track_uses_angle(&self, track: usize) -> bool {
        matches!(
            self.tracks.get(track).map(|t| &t.data),
            Some(TrackData::Value {
                interpolation: Interpolation::LinearAngle,
                ..
            })
        )
    }

    pub fn is_looping(&self) -> bool {
        self.loop_mode != LoopMode::None
    }

    /// Find the track of the given type addressing `path`.
    pub fn find_track(&self, path: &PropertyPath, ty: TrackType) -> Option<usize> {
        self.tracks
            .iter()
            .position(|t| t.track_type() == ty && &t.path == path)
    }

    /// Value of the first key of a value-like track, used as a rest pose.
    pub fn first_key_value(&self, track: usize) -> Option<Value> {
        match &self.tracks.get(track)?.data {
            TrackData::Value { keys, .. } => keys.first().map(|k| k.value.clone()),
            TrackData::BlendShape { keys, .. } => keys.first().map(|k| Value::Float(k.value)),
            TrackData::Bezier { keys } => keys.first().map(|k| Value::Float(k.value)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tagged_tracks_from_json() {
        let json = r#"{
            "name": "walk",
            "length": 1.0,
            "loop_mode": "linear",
            "tracks": [
                { "path": "Body:position:x", "type": "value",
                  "keys": [ { "time": 0.0, "value": { "type": "float", "data": 0.0 } },
                            { "time": 1.0, "value": { "type": "float", "data": 2.0 } } ] },
                { "path": "Body", "type": "method", "enabled": false,
                  "keys": [ { "time": 0.5, "value": { "method": "step" } } ] },
                { "path": "Speaker", "type": "audio",
                  "keys": [ { "time": 0.0, "value": { "stream": { "id": "thud", "length": 0.3 } } } ] }
            ]
        }"#;
        let anim = Animation::from_json(json).unwrap();
        assert_eq!(anim.loop_mode, LoopMode::Linear);
        assert_eq!(anim.track_count(), 3);
        assert_eq!(anim.track_type(0), Some(TrackType::Value));
        assert!(!anim.tracks[1].enabled);
        match &anim.tracks[2].data {
            TrackData::Audio { keys, use_blend } => {
                assert!(*use_blend);
                assert_eq!(keys[0].value.pitch_scale, 1.0);
            }
            other => panic!("unexpected track {other:?}"),
        }
    }

    #[test]
    fn validation_rejects_unsorted_keys() {
        let anim = Animation::new("bad", 1.0).with_track(
            Track::parse(
                "A:x",
                TrackData::Value {
                    keys: vec![Key::new(0.5, Value::Float(1.0)), Key::new(0.2, Value::Float(0.0))],
                    update_mode: UpdateMode::Continuous,
                    interpolation: Interpolation::Linear,
                },
            )
            .unwrap(),
        );
        assert!(matches!(anim.validate(), Err(ClipError::UnsortedKeys { track: 0, .. })));
    }

    #[test]
    fn validation_rejects_keys_past_the_end() {
        let track = |last: f64| {
            Track::parse(
                "A:x",
                TrackData::Value {
                    keys: vec![Key::new(0.0, Value::Float(0.0)), Key::new(last, Value::Float(1.0))],
                    update_mode: UpdateMode::Continuous,
                    interpolation: Interpolation::Linear,
                },
            )
            .unwrap()
        };
        let late = Animation::new("late", 1.0).with_track(track(5.0));
        assert!(matches!(
            late.validate(),
            Err(ClipError::InvalidKeyTime { track: 0, key: 1, .. })
        ));
        let at_end = Animation::new("end", 1.0).with_track(track(1.0));
        assert_eq!(at_end.validate(), Ok(()));
    }

    #[test]
    fn validation_rejects_negative_length() {
        let anim = Animation::new("neg", -1.0);
        assert!(matches!(anim.validate(), Err(ClipError::InvalidLength { .. })));
    }
}
