//! The per-frame blend pipeline.
//!
//! init -> pre-process -> total weight -> process -> apply -> post-process.
//! Every stage runs to completion; the instance queue is always consumed.
//!
//! Non-deterministic blending keeps a running weight per entry that starts at
//! the rest weight `max(0, 1 - total_weight)`. Each contribution moves the
//! value toward its sample by `blend / running_weight`, so weights summing to
//! one yield their weighted average and a lone partial weight blends from the
//! initial value. Deterministic blending adds `(sample - init) * blend`.

use animix_api_core::{blend, Value};

use crate::audio::{self, AudioFrame};
use crate::cache::{CacheKey, CachePayload, TrackCache};
use crate::config::CallbackModeMethod;
use crate::data::{Animation, LoopMode, TrackData, STOP_KEY};
use crate::host::SceneAccess;
use crate::ids::ObjectId;
use crate::mixer::Mixer;
use crate::outputs::{MethodCall, NestedAction, NestedCommand};
use crate::playback::AnimationInstance;
use crate::sampling;

/// State handed to the pre-process hook.
pub struct BlendContext<'a> {
    pub delta: f64,
    /// Number of live track cache entries.
    pub track_count: usize,
    pub instances: &'a mut Vec<AnimationInstance>,
}

/// Extension points for derived mixing modes.
pub trait MixerHooks {
    /// Adjust or veto this frame's instances. Returning false skips blending.
    fn pre_process(&mut self, _ctx: &mut BlendContext<'_>) -> bool {
        true
    }

    /// Rewrite a sampled key value before it is blended.
    fn post_process_key_value(
        &mut self,
        _animation: &Animation,
        _track: usize,
        value: Value,
        _object: ObjectId,
    ) -> Value {
        value
    }

    /// Runs after apply (or after a vetoed frame).
    fn post_process(&mut self) {}
}

/// Hooks that change nothing.
#[derive(Debug, Default)]
pub struct DefaultHooks;

impl MixerHooks for DefaultHooks {}

/// Blend `sample` into an accumulated scalar.
fn blend_scalar(
    value: f32,
    init: f32,
    sample: f32,
    blend: f32,
    accum: &mut f32,
    deterministic: bool,
) -> f32 {
    if deterministic {
        return value + (sample - init) * blend;
    }
    *accum += blend;
    if *accum <= 0.0 {
        return value;
    }
    blend::lerp_f(value, sample, blend / *accum)
}

fn blend_value(entry: &mut TrackCache, sample: Value, blend: f32, deterministic: bool) {
    let accum = &mut entry.blend_accum;
    match &mut entry.payload {
        CachePayload::Value(vc) => {
            if sample.kind() != vc.init_value.kind() {
                log::debug!(
                    "'{}': sampled {:?} does not match property kind {:?}",
                    entry.path,
                    sample.kind(),
                    vc.init_value.kind()
                );
                return;
            }
            let interpolates = vc.is_continuous && sample.is_blendable();
            if deterministic {
                let delta = interpolates
                    .then(|| blend::subtract(&sample, &vc.init_value, vc.is_using_angle))
                    .flatten();
                vc.value = match delta {
                    Some(d) => blend::add_weighted(&vc.value, &d, blend),
                    None => blend::step(&vc.value, &sample, blend),
                };
                return;
            }
            *accum += blend;
            if *accum <= 0.0 {
                return;
            }
            let f = blend / *accum;
            vc.value = if interpolates {
                blend::interpolate(&vc.value, &sample, f, vc.is_using_angle)
            } else {
                blend::step(&vc.value, &sample, f)
            };
        }
        CachePayload::BlendShape(bs) => {
            if let Some(s) = sample.as_float() {
                bs.value = blend_scalar(bs.value, bs.init_value, s, blend, accum, deterministic);
            }
        }
        CachePayload::Bezier(bz) => {
            if let Some(s) = sample.as_float() {
                bz.value = blend_scalar(bz.value, bz.init_value, s, blend, accum, deterministic);
            }
        }
        _ => {}
    }
}

impl Mixer {
    /// Stage 1: reset per-frame accumulators; initial values are kept.
    pub(crate) fn blend_init(&mut self) {
        for entry in self.cache.entries.values_mut() {
            entry.total_weight = 0.0;
            entry.blend_accum = 0.0;
            match &mut entry.payload {
                CachePayload::Value(vc) => vc.value = vc.init_value.clone(),
                CachePayload::BlendShape(bs) => bs.value = bs.init_value,
                CachePayload::Bezier(bz) => bz.value = bz.init_value,
                CachePayload::Audio(ac) => audio::blend_init(ac),
                _ => {}
            }
        }
    }

    /// Drop queued instances whose clip was replaced or removed after they
    /// were enqueued. Runs before stage 3 so weights only count instances
    /// that will also be sampled.
    pub(crate) fn drop_stale_instances(&mut self) {
        let bindings = &self.bindings;
        self.instances.retain(|inst| match bindings.get(&inst.name) {
            Some(binding) if std::sync::Arc::ptr_eq(&binding.animation, &inst.animation) => true,
            Some(_) => {
                log::debug!("instance '{}' refers to a replaced clip; dropped", inst.name);
                false
            }
            None => {
                log::debug!("instance '{}' has no cache binding; dropped", inst.name);
                false
            }
        });
    }

    /// Stage 3 (non-deterministic only): sum blends per entry and seed the
    /// running weight with what is left for the initial value.
    pub(crate) fn blend_calc_total_weight(&mut self) {
        for inst in &self.instances {
            let Some(binding) = self.bindings.get(&inst.name) else {
                continue;
            };
            for key in binding.slots.iter().flatten() {
                if let Some(entry) = self.cache.entries.get_mut(key) {
                    entry.total_weight += inst.playback.track_blend(entry.blend_idx);
                }
            }
        }
        for entry in self.cache.entries.values_mut() {
            entry.blend_accum = (1.0 - entry.total_weight).max(0.0);
        }
    }

    /// Stage 4: sample every instance into the cache.
    pub(crate) fn blend_process(&mut self) {
        let deterministic = self.config.deterministic;
        let instances = std::mem::take(&mut self.instances);
        for inst in &instances {
            let Some(binding) = self.bindings.get(&inst.name) else {
                continue;
            };
            let slots = binding.slots.clone();
            for (track_idx, slot) in slots.iter().enumerate() {
                let Some(key) = slot else {
                    continue;
                };
                self.process_track(inst, track_idx, key, deterministic);
            }
        }
        self.instances = instances;
    }

    fn process_track(
        &mut self,
        inst: &AnimationInstance,
        track_idx: usize,
        key: &CacheKey,
        deterministic: bool,
    ) {
        let anim = &*inst.animation;
        let pi = &inst.playback;
        let Some(entry) = self.cache.entries.get_mut(key) else {
            return;
        };
        let blend = pi.track_blend(entry.blend_idx);
        if deterministic {
            entry.total_weight += blend;
        }
        let time = sampling::local_time(anim, pi.time);
        let data = &anim.tracks[track_idx].data;

        if let CachePayload::Audio(ac) = &mut entry.payload {
            let frame = AudioFrame {
                clip: &inst.name,
                animation: anim,
                track: track_idx,
                playback: pi,
                time,
                blend,
                max_polyphony: self.config.audio_max_polyphony,
            };
            audio::process(ac, frame, &mut self.ids, &mut self.outputs);
            return;
        }
        if blend <= 0.0 {
            return;
        }

        match data {
            TrackData::Value { .. } | TrackData::BlendShape { .. } | TrackData::Bezier { .. } => {
                let Some(sample) = sampling::sample(anim, track_idx, time) else {
                    log::debug!("'{}' track {track_idx}: no keys to sample", inst.name);
                    return;
                };
                let sample =
                    self.hooks
                        .post_process_key_value(anim, track_idx, sample, entry.object);
                blend_value(entry, sample, blend, deterministic);
            }
            TrackData::Method { keys } => {
                let fired: Vec<usize> = if pi.seeked {
                    if pi.is_external_seeking {
                        Vec::new()
                    } else {
                        sampling::key_at(data, time).into_iter().collect()
                    }
                } else {
                    sampling::crossed_keys(anim, track_idx, pi.time, pi.delta, pi.looped_flag)
                };
                for idx in fired {
                    let mk = &keys[idx].value;
                    self.frame_calls.push(MethodCall {
                        object: entry.object,
                        method: mk.method.clone(),
                        args: mk.args.clone(),
                    });
                }
            }
            TrackData::Animation { keys } => {
                let CachePayload::Animation(nested) = &mut entry.payload else {
                    return;
                };
                let object = entry.object;
                if pi.seeked {
                    let Some(idx) = sampling::key_at_or_before(data, time) else {
                        return;
                    };
                    let name = &keys[idx].value;
                    if name == STOP_KEY {
                        return;
                    }
                    let Some(target) = self.animation_set.get(name) else {
                        return;
                    };
                    let target = &target.animation;
                    let pos = time - keys[idx].time;
                    let at = match target.loop_mode {
                        LoopMode::None => pos.min(target.length),
                        LoopMode::Linear => sampling::fmod(pos, target.length),
                        LoopMode::PingPong => sampling::ping_pong(pos, target.length),
                    };
                    let play = nested.playing || !pi.is_external_seeking;
                    if play {
                        nested.playing = true;
                        self.playing_caches.insert(key.clone());
                    }
                    self.frame_nested.push(NestedCommand {
                        object,
                        action: NestedAction::Seek {
                            animation: name.clone(),
                            time: at,
                            play,
                        },
                    });
                    return;
                }
                let crossed =
                    sampling::crossed_keys(anim, track_idx, pi.time, pi.delta, pi.looped_flag);
                let Some(&idx) = crossed.last() else {
                    return;
                };
                let name = &keys[idx].value;
                if name == STOP_KEY || !self.animation_set.contains(name) {
                    if nested.playing {
                        nested.playing = false;
                        self.playing_caches.remove(key);
                        self.frame_nested.push(NestedCommand {
                            object,
                            action: NestedAction::Stop,
                        });
                    }
                } else {
                    nested.playing = true;
                    self.playing_caches.insert(key.clone());
                    self.frame_nested.push(NestedCommand {
                        object,
                        action: NestedAction::Play {
                            animation: name.clone(),
                        },
                    });
                }
            }
            TrackData::Audio { .. } => {}
        }
    }

    /// Stage 5: write blended values and commit queued commands.
    pub(crate) fn blend_apply(&mut self, scene: &mut dyn SceneAccess) {
        let deterministic = self.config.deterministic;
        let order = self.cache.order.clone();
        for key in &order {
            let Some(entry) = self.cache.entries.get_mut(key) else {
                continue;
            };
            if !scene.is_alive(entry.object) {
                log::debug!("'{}': target object is gone; skipped", entry.path);
                self.cache_valid = false;
                continue;
            }
            if let CachePayload::Audio(ac) = &mut entry.payload {
                audio::apply(ac, &mut self.outputs);
                continue;
            }
            if entry.payload.value().is_some() && (deterministic || entry.total_weight > 0.0) {
                write_entry(scene, entry, false);
            }
        }

        let calls = std::mem::take(&mut self.frame_calls);
        for call in calls {
            if !scene.is_alive(call.object) {
                continue;
            }
            match self.config.callback_mode_method {
                CallbackModeMethod::Immediate => scene.call(call.object, &call.method, &call.args),
                CallbackModeMethod::Deferred => self.outputs.deferred_calls.push(call),
            }
        }
        self.outputs.nested.append(&mut self.frame_nested);
    }
}

/// Write an entry's blended (or initial) value to its target. Shared by apply,
/// restore and reset.
pub(crate) fn write_entry(scene: &mut dyn SceneAccess, entry: &TrackCache, use_init: bool) -> bool {
    match &entry.payload {
        CachePayload::Value(vc) => {
            let v = if use_init { &vc.init_value } else { &vc.value };
            scene.write(entry.object, &entry.subpath, v)
        }
        CachePayload::BlendShape(bs) => {
            let v = if use_init { bs.init_value } else { bs.value };
            scene.write_blend_shape(entry.object, bs.shape_index, v)
        }
        CachePayload::Bezier(bz) => {
            let v = if use_init { bz.init_value } else { bz.value };
            scene.write(entry.object, &entry.subpath, &Value::Float(v))
        }
        _ => false,
    }
}
