//! Per-frame playback descriptors and the instances built from them.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::data::{Animation, LoopedFlag};

/// Where an instance's clip is this frame and how it got there.
///
/// `time` is the clip-local position after moving `delta` seconds (negative
/// when playing backward). `track_weights` is indexed by the cache's blend
/// index (`TrackCache::blend_idx`); tracks without an override use `weight`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackInfo {
    pub time: f64,
    pub delta: f64,
    pub seeked: bool,
    pub is_external_seeking: bool,
    pub looped_flag: LoopedFlag,
    pub weight: f32,
    pub track_weights: Vec<f32>,
}

impl Default for PlaybackInfo {
    fn default() -> Self {
        Self {
            time: 0.0,
            delta: 0.0,
            seeked: false,
            is_external_seeking: false,
            looped_flag: LoopedFlag::None,
            weight: 1.0,
            track_weights: Vec::new(),
        }
    }
}

impl PlaybackInfo {
    /// Playback that moved `delta` seconds and landed at `time`.
    pub fn new(time: f64, delta: f64) -> Self {
        Self {
            time,
            delta,
            ..Self::default()
        }
    }

    /// A jump to `time` (not a continuous move).
    pub fn seek(time: f64, external: bool) -> Self {
        Self {
            time,
            seeked: true,
            is_external_seeking: external,
            ..Self::default()
        }
    }

    pub fn with_weight(mut self, weight: f32) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_looped(mut self, flag: LoopedFlag) -> Self {
        self.looped_flag = flag;
        self
    }

    pub fn with_track_weights(mut self, weights: Vec<f32>) -> Self {
        self.track_weights = weights;
        self
    }

    /// Effective blend for the track at `blend_idx`, clamped to [0, 1].
    pub fn track_blend(&self, blend_idx: usize) -> f32 {
        let weight = self.weight.clamp(0.0, 1.0);
        match self.track_weights.get(blend_idx) {
            Some(w) => w.clamp(0.0, 1.0) * weight,
            None => weight,
        }
    }

    pub fn is_backward(&self) -> bool {
        self.delta.is_sign_negative() && self.delta != 0.0
    }
}

/// One clip's playback for the current frame. Consumed by `advance`.
#[derive(Clone, Debug)]
pub struct AnimationInstance {
    /// Qualified name in the mixer's animation set.
    pub name: String,
    pub animation: Arc<Animation>,
    pub playback: PlaybackInfo,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn track_blend_clamps_weights() {
        let info = PlaybackInfo::new(0.0, 0.0)
            .with_weight(1.5)
            .with_track_weights(vec![0.5, -1.0]);
        assert_eq!(info.track_blend(0), 0.5);
        assert_eq!(info.track_blend(1), 0.0);
        assert_eq!(info.track_blend(7), 1.0);
    }
}
