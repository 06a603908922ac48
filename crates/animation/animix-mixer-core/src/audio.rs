//! Audio sub-mixer: polyphonic voices driven by audio tracks.
//!
//! Each audio cache entry tracks, per driving clip, which keys currently own
//! a voice. Process registers new voices (started lazily by apply), apply
//! sends volume updates and stops voices whose key region has been left.
//! Commands only flow outward through `Outputs`; the backend is never queried.

use std::collections::BTreeMap;

use crate::cache::AudioCache;
use crate::data::{Animation, AudioKey, AudioStreamRef, TrackData};
use crate::ids::{IdAllocator, VoiceId};
use crate::outputs::{AudioCommand, Outputs};
use crate::playback::PlaybackInfo;
use crate::sampling;

/// Volume sent for silent voices.
pub const MIN_VOLUME_DB: f32 = -80.0;

pub fn linear_to_db(linear: f32) -> f32 {
    if linear <= 0.0 {
        return MIN_VOLUME_DB;
    }
    (20.0 * linear.log10()).max(MIN_VOLUME_DB)
}

/// A voice registered for one key of an audio track.
#[derive(Clone, Debug, PartialEq)]
pub struct PlayingAudioStream {
    pub voice: VoiceId,
    /// Clip time at which the voice was started.
    pub start: f64,
    /// Playable length in seconds; 0 when the stream length is unknown.
    pub len: f64,
    /// Start request not yet sent to the backend.
    pub pending: Option<PendingStart>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PendingStart {
    pub stream: AudioStreamRef,
    pub offset: f64,
    pub pitch_scale: f32,
}

/// Per-clip playback state on one audio entry.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PlayingAudioTrack {
    pub length: f64,
    pub time: f64,
    /// Sum of this frame's blends from the clip.
    pub volume: f32,
    pub looped: bool,
    pub backward: bool,
    pub use_blend: bool,
    /// Voices keyed by key index.
    pub stream_info: BTreeMap<usize, PlayingAudioStream>,
}

/// Clip position of a [`PlayingAudioTrack`], without its voices.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Playhead {
    length: f64,
    time: f64,
    looped: bool,
    backward: bool,
}

impl PlayingAudioTrack {
    fn playhead(&self) -> Playhead {
        Playhead {
            length: self.length,
            time: self.time,
            looped: self.looped,
            backward: self.backward,
        }
    }
}

fn active_voices(ac: &AudioCache) -> usize {
    ac.playing_streams
        .values()
        .map(|t| t.stream_info.len())
        .sum()
}

fn stop_voice(stream: &PlayingAudioStream, outputs: &mut Outputs) {
    if stream.pending.is_none() {
        outputs.audio.push(AudioCommand::Stop {
            voice: stream.voice,
        });
    }
}

/// Stop every voice on the entry and forget all playback state.
pub(crate) fn stop_all(ac: &mut AudioCache, outputs: &mut Outputs) {
    for track in ac.playing_streams.values() {
        for stream in track.stream_info.values() {
            stop_voice(stream, outputs);
        }
    }
    ac.playing_streams.clear();
}

/// Zero the per-frame volume accumulators.
pub(crate) fn blend_init(ac: &mut AudioCache) {
    for track in ac.playing_streams.values_mut() {
        track.volume = 0.0;
    }
}

/// Everything `process` needs about the driving clip and track.
pub(crate) struct AudioFrame<'a> {
    pub clip: &'a str,
    pub animation: &'a Animation,
    pub track: usize,
    pub playback: &'a PlaybackInfo,
    pub time: f64,
    pub blend: f32,
    pub max_polyphony: usize,
}

/// Update the clip's playback record and register a voice for the key
/// entered this frame (or the key under the playhead after a seek).
pub(crate) fn process(
    ac: &mut AudioCache,
    frame: AudioFrame<'_>,
    ids: &mut IdAllocator,
    outputs: &mut Outputs,
) {
    let Some(TrackData::Audio { keys, use_blend }) =
        frame.animation.tracks.get(frame.track).map(|t| &t.data)
    else {
        return;
    };
    let pi = frame.playback;
    let data = &frame.animation.tracks[frame.track].data;

    let info = ac.playing_streams.entry(frame.clip.to_string()).or_default();
    info.length = frame.animation.length;
    info.time = frame.time;
    info.volume += frame.blend;
    info.looped = frame.animation.is_looping();
    info.backward = pi.is_backward();
    info.use_blend = *use_blend;

    let idx = if pi.seeked {
        let idx = sampling::key_at_or_before(data, frame.time);
        if let Some(previous) = idx.and_then(|i| info.stream_info.remove(&i)) {
            stop_voice(&previous, outputs);
        }
        idx
    } else {
        sampling::crossed_keys(frame.animation, frame.track, pi.time, pi.delta, pi.looped_flag)
            .last()
            .copied()
    };
    let Some(idx) = idx else {
        return;
    };
    if frame.blend <= 0.0 {
        return;
    }

    let key: &AudioKey = &keys[idx].value;
    let mut start_ofs = key.start_offset;
    if pi.seeked {
        start_ofs += frame.time - keys[idx].time;
    }
    let len = if key.stream.length > 0.0 {
        key.stream.length - start_ofs - key.end_offset
    } else {
        0.0
    };
    if key.stream.length > 0.0 && len <= 0.0 {
        log::debug!("audio key {idx} of '{}' has nothing left to play", frame.clip);
        return;
    }

    let superseded = ac
        .playing_streams
        .get(frame.clip)
        .is_some_and(|t| t.stream_info.contains_key(&idx));
    let in_use = active_voices(ac) - usize::from(superseded);
    if in_use >= frame.max_polyphony {
        log::debug!(
            "audio polyphony limit ({}) reached; dropped key {idx} of '{}'",
            frame.max_polyphony,
            frame.clip
        );
        return;
    }

    let Some(info) = ac.playing_streams.get_mut(frame.clip) else {
        return;
    };
    if let Some(previous) = info.stream_info.remove(&idx) {
        stop_voice(&previous, outputs);
    }
    info.stream_info.insert(
        idx,
        PlayingAudioStream {
            voice: ids.alloc_voice(),
            start: frame.time,
            len,
            pending: Some(PendingStart {
                stream: key.stream.clone(),
                offset: start_ofs,
                pitch_scale: key.pitch_scale,
            }),
        },
    );
}

/// Whether a started voice has left its key region.
fn should_stop(track: Playhead, stream: &PlayingAudioStream) -> bool {
    if !track.looped {
        let left = if track.backward {
            track.time > stream.start
        } else {
            track.time < stream.start
        };
        if left {
            return true;
        }
    }
    if stream.len > 0.0 {
        let elapsed = if !track.backward {
            if stream.start > track.time {
                (track.length - stream.start) + track.time
            } else {
                track.time - stream.start
            }
        } else if stream.start < track.time {
            (track.length - track.time) + stream.start
        } else {
            stream.start - track.time
        };
        if elapsed > stream.len {
            return true;
        }
    }
    false
}

/// Commit voice starts, volume changes and stops for one entry.
pub(crate) fn apply(ac: &mut AudioCache, outputs: &mut Outputs) {
    let playback = ac.playback;
    for track in ac.playing_streams.values_mut() {
        let volume_db = linear_to_db(if track.use_blend { track.volume } else { 1.0 });
        let head = track.playhead();
        let mut finished = Vec::new();
        for (idx, stream) in track.stream_info.iter_mut() {
            if let Some(start) = stream.pending.take() {
                outputs.audio.push(AudioCommand::Start {
                    playback,
                    voice: stream.voice,
                    stream: start.stream,
                    offset: start.offset,
                });
                if start.pitch_scale != 1.0 {
                    outputs.audio.push(AudioCommand::SetPitch {
                        voice: stream.voice,
                        pitch_scale: start.pitch_scale,
                    });
                }
                outputs.audio.push(AudioCommand::SetVolume {
                    voice: stream.voice,
                    volume_db,
                });
                continue;
            }
            if should_stop(head, stream) {
                outputs.audio.push(AudioCommand::Stop {
                    voice: stream.voice,
                });
                finished.push(*idx);
            } else {
                outputs.audio.push(AudioCommand::SetVolume {
                    voice: stream.voice,
                    volume_db,
                });
            }
        }
        for idx in finished {
            track.stream_info.remove(&idx);
        }
    }
    ac.playing_streams.retain(|_, t| !t.stream_info.is_empty());
}
