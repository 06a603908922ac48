//! Track cache: one mutable accumulation record per animated property.
//!
//! Entries are keyed by `(object, concatenated sub-names)` so two clips that
//! address the same property through different node paths share one entry.
//! The cache is rebuilt lazily when the animation set changed since the last
//! pass (or after `clear_caches`). A rebuild touches every entry referenced by
//! an enabled track; untouched entries are pruned.

use std::collections::BTreeMap;
use std::sync::Arc;

use animix_api_core::{PropertyPath, Value};
use hashbrown::HashMap;

use crate::audio::PlayingAudioTrack;
use crate::data::{Animation, Track, TrackData, TrackType, RESET_ANIMATION};
use crate::error::MixerError;
use crate::host::SceneAccess;
use crate::ids::{ObjectId, PlaybackId};
use crate::mixer::Mixer;
use crate::outputs::{AudioCommand, NestedAction, NestedCommand};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    pub object: ObjectId,
    /// Sub-names joined with ':' (empty for object-level tracks).
    pub subpath: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ValueCache {
    pub init_value: Value,
    pub value: Value,
    pub is_continuous: bool,
    pub is_using_angle: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BlendShapeCache {
    pub shape_index: usize,
    pub init_value: f32,
    pub value: f32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BezierCache {
    pub init_value: f32,
    pub value: f32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AudioCache {
    pub playback: PlaybackId,
    /// In-flight playback keyed by the driving clip's qualified name.
    pub playing_streams: BTreeMap<String, PlayingAudioTrack>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AnimationCache {
    pub playing: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub enum CachePayload {
    Value(ValueCache),
    BlendShape(BlendShapeCache),
    Bezier(BezierCache),
    Method,
    Audio(AudioCache),
    Animation(AnimationCache),
}

impl CachePayload {
    pub fn track_type(&self) -> TrackType {
        match self {
            CachePayload::Value(_) => TrackType::Value,
            CachePayload::BlendShape(_) => TrackType::BlendShape,
            CachePayload::Bezier(_) => TrackType::Bezier,
            CachePayload::Method => TrackType::Method,
            CachePayload::Audio(_) => TrackType::Audio,
            CachePayload::Animation(_) => TrackType::Animation,
        }
    }

    /// Current blended value for value-like payloads.
    pub fn value(&self) -> Option<Value> {
        match self {
            CachePayload::Value(v) => Some(v.value.clone()),
            CachePayload::BlendShape(b) => Some(Value::Float(b.value)),
            CachePayload::Bezier(b) => Some(Value::Float(b.value)),
            _ => None,
        }
    }

    pub fn init_value(&self) -> Option<Value> {
        match self {
            CachePayload::Value(v) => Some(v.init_value.clone()),
            CachePayload::BlendShape(b) => Some(Value::Float(b.init_value)),
            CachePayload::Bezier(b) => Some(Value::Float(b.init_value)),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TrackCache {
    pub object: ObjectId,
    pub subpath: Vec<String>,
    /// Path of the first track that created this entry (for diagnostics).
    pub path: PropertyPath,
    /// Sum of contributing blends this frame.
    pub total_weight: f32,
    /// Running weight for normalized blending (starts at the rest weight).
    pub blend_accum: f32,
    /// Index into `PlaybackInfo::track_weights`.
    pub blend_idx: usize,
    pub setup_pass: u64,
    pub payload: CachePayload,
}

impl TrackCache {
    #[inline]
    pub fn track_type(&self) -> TrackType {
        self.payload.track_type()
    }
}

/// All entries plus their blend order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TrackCacheMap {
    pub(crate) entries: HashMap<CacheKey, TrackCache>,
    pub(crate) order: Vec<CacheKey>,
}

impl TrackCacheMap {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &CacheKey) -> Option<&TrackCache> {
        self.entries.get(key)
    }

    /// Entry for `object` at the ':'-joined `subpath`.
    pub fn find(&self, object: ObjectId, subpath: &str) -> Option<&TrackCache> {
        self.entries.get(&CacheKey {
            object,
            subpath: subpath.to_string(),
        })
    }

    /// Entries in blend order.
    pub fn iter(&self) -> impl Iterator<Item = (&CacheKey, &TrackCache)> {
        self.order
            .iter()
            .filter_map(move |k| self.entries.get_key_value(k))
    }

    pub fn contains_object(&self, object: ObjectId) -> bool {
        self.entries.keys().any(|k| k.object == object)
    }
}

/// Per-clip mapping from track index to cache entry.
#[derive(Clone, Debug)]
pub(crate) struct Binding {
    pub animation: Arc<Animation>,
    pub slots: Vec<Option<CacheKey>>,
}

/// First key of the matching RESET track, if any.
fn reset_value(reset: Option<&Animation>, track: &Track) -> Option<Value> {
    let reset = reset?;
    let idx = reset.find_track(&track.path, track.track_type())?;
    reset.first_key_value(idx)
}

/// Build a fresh payload for `track` on `object`; None when the target
/// cannot hold it (unknown property, missing blend shape).
fn create_payload(
    mixer: &mut Mixer,
    scene: &dyn SceneAccess,
    object: ObjectId,
    anim: &Animation,
    track_idx: usize,
    reset: Option<&Animation>,
) -> Option<CachePayload> {
    let track = &anim.tracks[track_idx];
    let subpath = &track.path.subnames;
    Some(match &track.data {
        TrackData::Value { .. } => {
            let init = reset_value(reset, track).or_else(|| scene.read(object, subpath));
            let Some(init) = init else {
                log::warn!("value track '{}': property not found on target", track.path);
                return None;
            };
            CachePayload::Value(ValueCache {
                value: init.clone(),
                init_value: init,
                is_continuous: anim.track_is_continuous(track_idx),
                is_using_angle: anim.track_uses_angle(track_idx),
            })
        }
        TrackData::BlendShape { .. } => {
            let name = subpath.first()?;
            let Some(shape_index) = scene.blend_shape_index(object, name) else {
                log::warn!("blend shape track '{}': no shape named '{name}'", track.path);
                return None;
            };
            let init = reset_value(reset, track)
                .and_then(|v| v.as_float())
                .or_else(|| scene.read_blend_shape(object, shape_index))
                .unwrap_or(0.0);
            CachePayload::BlendShape(BlendShapeCache {
                shape_index,
                init_value: init,
                value: init,
            })
        }
        TrackData::Bezier { .. } => {
            let init = reset_value(reset, track)
                .or_else(|| scene.read(object, subpath))
                .and_then(|v| v.as_float());
            let Some(init) = init else {
                log::warn!("bezier track '{}': property is not a float", track.path);
                return None;
            };
            CachePayload::Bezier(BezierCache {
                init_value: init,
                value: init,
            })
        }
        TrackData::Method { .. } => CachePayload::Method,
        TrackData::Audio { .. } => {
            let playback = mixer.ids.alloc_playback();
            mixer.outputs.audio.push(AudioCommand::Open {
                playback,
                object,
                max_polyphony: mixer.config.audio_max_polyphony,
            });
            CachePayload::Audio(AudioCache {
                playback,
                playing_streams: BTreeMap::new(),
            })
        }
        TrackData::Animation { .. } => CachePayload::Animation(AnimationCache { playing: false }),
    })
}

impl Mixer {
    /// Rebuild the track cache if the animation set changed since the last
    /// pass. Returns an error only when the root node cannot be resolved.
    pub(crate) fn update_caches(&mut self, scene: &dyn SceneAccess) -> Result<(), MixerError> {
        let stale = self.animation_set.latest_update() > self.cache_pass;
        if self.cache_valid && !stale {
            return Ok(());
        }
        self.setup_pass += 1;
        let pass = self.setup_pass;

        if scene.resolve(&self.root).is_none() {
            self.cache_valid = false;
            return Err(MixerError::InvalidRootNode {
                path: self.config.root_node.clone(),
                reason: "node not found".to_string(),
            });
        }

        let reset_entry = self.animation_set.get(RESET_ANIMATION).cloned();
        let reset_changed = reset_entry
            .as_ref()
            .is_some_and(|e| e.last_update > self.cache_pass);
        let reset = reset_entry.as_ref().map(|e| Arc::clone(&e.animation));

        let mut bindings = HashMap::new();
        let mut order: Vec<CacheKey> = Vec::new();
        let entries: Vec<(String, Arc<Animation>)> = self
            .animation_set
            .iter()
            .map(|e| (e.name.clone(), Arc::clone(&e.animation)))
            .collect();

        for (name, anim) in entries {
            let mut slots = Vec::with_capacity(anim.track_count());
            for (i, track) in anim.tracks.iter().enumerate() {
                let slot = self.bind_track(
                    scene,
                    &anim,
                    i,
                    track,
                    pass,
                    reset.as_deref(),
                    reset_changed,
                    &mut order,
                );
                slots.push(slot);
            }
            bindings.insert(
                name,
                Binding {
                    animation: anim,
                    slots,
                },
            );
        }

        self.prune_caches(pass);
        for (idx, key) in order.iter().enumerate() {
            if let Some(entry) = self.cache.entries.get_mut(key) {
                entry.blend_idx = idx;
            }
        }
        self.cache.order = order;
        self.bindings = bindings;
        self.cache_pass = self.animation_set.latest_update();
        self.cache_valid = true;
        log::debug!(
            "track cache rebuilt: {} entries at setup pass {pass}",
            self.cache.len()
        );
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn bind_track(
        &mut self,
        scene: &dyn SceneAccess,
        anim: &Animation,
        track_idx: usize,
        track: &Track,
        pass: u64,
        reset: Option<&Animation>,
        reset_changed: bool,
        order: &mut Vec<CacheKey>,
    ) -> Option<CacheKey> {
        if !track.enabled {
            return None;
        }
        let node_path = self.root.join(&track.path.node_path());
        let Some(object) = scene.resolve(&node_path) else {
            log::warn!(
                "animation '{}': track {track_idx} target '{}' not found",
                anim.name,
                track.path
            );
            return None;
        };
        let key = CacheKey {
            object,
            subpath: track.path.concatenated_subnames(),
        };
        let ty = track.track_type();

        let replace = match self.cache.entries.get(&key) {
            None => true,
            Some(existing) if existing.track_type() == ty => false,
            Some(existing) if existing.setup_pass == pass => {
                log::warn!(
                    "animation '{}': track {track_idx} '{}' is {:?} but another clip animates it as {:?}; skipped",
                    anim.name,
                    track.path,
                    ty,
                    existing.track_type()
                );
                return None;
            }
            Some(_) => true,
        };

        if replace {
            let payload = create_payload(self, scene, object, anim, track_idx, reset)?;
            if let Some(old) = self.cache.entries.remove(&key) {
                self.release_entry(&key, old);
            }
            self.cache.entries.insert(
                key.clone(),
                TrackCache {
                    object,
                    subpath: track.path.subnames.clone(),
                    path: track.path.clone(),
                    total_weight: 0.0,
                    blend_accum: 0.0,
                    blend_idx: 0,
                    setup_pass: pass,
                    payload,
                },
            );
            order.push(key.clone());
            return Some(key);
        }

        let entry = self.cache.entries.get_mut(&key)?;
        let first_touch = entry.setup_pass != pass;
        entry.setup_pass = pass;
        if first_touch {
            order.push(key.clone());
        }
        let refreshed = if reset_changed && first_touch {
            reset_value(reset, track)
        } else {
            None
        };
        match &mut entry.payload {
            CachePayload::Value(vc) => {
                let continuous = anim.track_is_continuous(track_idx);
                let angle = anim.track_uses_angle(track_idx);
                if first_touch {
                    vc.is_continuous = continuous;
                    vc.is_using_angle = angle;
                } else {
                    vc.is_continuous |= continuous;
                    vc.is_using_angle |= angle;
                }
                if let Some(v) = refreshed.filter(|v| v.kind() == vc.init_value.kind()) {
                    vc.init_value = v;
                }
            }
            CachePayload::BlendShape(bs) => {
                if let Some(v) = refreshed.and_then(|v| v.as_float()) {
                    bs.init_value = v;
                }
            }
            CachePayload::Bezier(bz) => {
                if let Some(v) = refreshed.and_then(|v| v.as_float()) {
                    bz.init_value = v;
                }
            }
            _ => {}
        }
        Some(key)
    }

    /// Drop entries not touched in `pass`, releasing their audio and nested playback.
    fn prune_caches(&mut self, pass: u64) {
        let stale: Vec<CacheKey> = self
            .cache
            .entries
            .iter()
            .filter(|(_, e)| e.setup_pass != pass)
            .map(|(k, _)| k.clone())
            .collect();
        for key in stale {
            if let Some(entry) = self.cache.entries.remove(&key) {
                log::debug!("pruned track cache entry '{}'", entry.path);
                self.release_entry(&key, entry);
            }
        }
    }

    /// Emit the stop/close commands owed by an entry that is going away.
    pub(crate) fn release_entry(&mut self, key: &CacheKey, entry: TrackCache) {
        match entry.payload {
            CachePayload::Audio(mut ac) => {
                crate::audio::stop_all(&mut ac, &mut self.outputs);
                self.outputs.audio.push(AudioCommand::Close {
                    playback: ac.playback,
                });
            }
            CachePayload::Animation(an) => {
                if an.playing {
                    self.outputs.nested.push(NestedCommand {
                        object: entry.object,
                        action: NestedAction::Stop,
                    });
                }
            }
            _ => {}
        }
        self.playing_caches.remove(key);
    }

    /// Force a full cache rebuild now.
    pub fn rebuild_caches(&mut self, scene: &dyn SceneAccess) -> Result<(), MixerError> {
        self.cache_valid = false;
        self.update_caches(scene)
    }

    /// Read-only view of the live track cache.
    pub fn track_cache(&self) -> &TrackCacheMap {
        &self.cache
    }
}
