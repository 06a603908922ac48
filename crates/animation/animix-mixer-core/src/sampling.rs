//! Clip sampling and key-window queries.
//!
//! Model:
//! - Keys are sorted by time (seconds). A sample between two keys interpolates
//!   with the track's `Interpolation`; before the first / after the last key the
//!   edge key is held, unless the clip loops, in which case the segment wraps
//!   from the last key back to the first across the clip boundary.
//! - Discrete value tracks and Bool/Text payloads hold the key at or below `t`.
//! - Bezier tracks solve the curve's x(s) = t by bisection and return y(s).
//! - Method and audio tracks are never sampled; they are queried for the key
//!   indices crossed during a frame (`crossed_keys`).

use animix_api_core::{blend, Value};

use crate::data::{
    Animation, BezierKey, Interpolation, Key, LoopMode, LoopedFlag, TrackData, UpdateMode,
};

/// Tolerance used when matching a key exactly at a seek time.
pub const KEY_TIME_EPSILON: f64 = 1e-5;

const BEZIER_ITERATIONS: usize = 24;

pub(crate) fn fmod(a: f64, b: f64) -> f64 {
    if b == 0.0 {
        return 0.0;
    }
    let m = a % b;
    if (m < 0.0 && b > 0.0) || (m > 0.0 && b < 0.0) {
        m + b
    } else {
        m
    }
}

/// Reflect t into [0, span] with ping-pong behavior, where period = 2 * span.
pub(crate) fn ping_pong(t: f64, span: f64) -> f64 {
    if span <= 0.0 {
        return 0.0;
    }
    let m = fmod(t, 2.0 * span);
    if m <= span {
        m
    } else {
        2.0 * span - m
    }
}

/// Map a playback time into the clip's local range according to its loop mode.
pub fn local_time(anim: &Animation, time: f64) -> f64 {
    if anim.length <= 0.0 {
        return 0.0;
    }
    match anim.loop_mode {
        LoopMode::None => time.clamp(0.0, anim.length),
        // Exactly `length` stays at the end so a finished loop shows its last pose.
        LoopMode::Linear if time == anim.length => time,
        LoopMode::Linear => fmod(time, anim.length),
        LoopMode::PingPong => ping_pong(time, anim.length),
    }
}

/// Segment of a key list bracketing a time.
#[derive(Copy, Clone, Debug, PartialEq)]
struct Segment {
    from: usize,
    to: usize,
    t: f32,
}

impl Segment {
    fn hold(idx: usize) -> Self {
        Self {
            from: idx,
            to: idx,
            t: 0.0,
        }
    }
}

fn locate<T>(keys: &[Key<T>], time: f64, length: f64, looping: bool) -> Option<Segment> {
    locate_by(keys.len(), |i| keys[i].time, time, length, looping)
}

fn locate_by(
    n: usize,
    key_time: impl Fn(usize) -> f64,
    time: f64,
    length: f64,
    looping: bool,
) -> Option<Segment> {
    match n {
        0 => None,
        1 => Some(Segment::hold(0)),
        _ => {
            let idx = partition(n, |i| key_time(i) <= time);
            let first = key_time(0);
            let last = key_time(n - 1);
            let wrap_span = (length - last) + first;
            if idx == 0 || idx == n {
                if !looping || wrap_span <= 0.0 {
                    return Some(Segment::hold(if idx == 0 { 0 } else { n - 1 }));
                }
                let into = if idx == 0 {
                    time + length - last
                } else {
                    time - last
                };
                return Some(Segment {
                    from: n - 1,
                    to: 0,
                    t: (into / wrap_span).clamp(0.0, 1.0) as f32,
                });
            }
            let (from, to) = (idx - 1, idx);
            let span = key_time(to) - key_time(from);
            if span <= 0.0 {
                return Some(Segment::hold(from));
            }
            Some(Segment {
                from,
                to,
                t: ((time - key_time(from)) / span).clamp(0.0, 1.0) as f32,
            })
        }
    }
}

/// Number of leading indices in `0..n` for which `pred` holds (pred must be monotone).
fn partition(n: usize, pred: impl Fn(usize) -> bool) -> usize {
    let (mut lo, mut hi) = (0usize, n);
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if pred(mid) {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    lo
}

fn neighbours(seg: Segment, n: usize, looping: bool) -> (usize, usize) {
    let pre = match seg.from {
        0 if looping => n - 1,
        0 => 0,
        i => i - 1,
    };
    let post = if seg.to + 1 >= n {
        if looping {
            0
        } else {
            seg.to
        }
    } else {
        seg.to + 1
    };
    (pre, post)
}

/// Catmull-Rom interpolation between `p1` and `p2`.
fn catmull_rom(p0: f32, p1: f32, p2: f32, p3: f32, t: f32) -> f32 {
    let t2 = t * t;
    let t3 = t2 * t;
    0.5 * ((2.0 * p1)
        + (-p0 + p2) * t
        + (2.0 * p0 - 5.0 * p1 + 4.0 * p2 - p3) * t2
        + (-p0 + 3.0 * p1 - 3.0 * p2 + p3) * t3)
}

fn cubic_value(p0: &Value, p1: &Value, p2: &Value, p3: &Value, t: f32) -> Value {
    let slices = (p0.as_slice(), p1.as_slice(), p2.as_slice(), p3.as_slice());
    let (Some(a), Some(b), Some(c), Some(d)) = slices else {
        return blend::interpolate(p1, p2, t, false);
    };
    let same_len = a.len() == b.len() && c.len() == b.len() && d.len() == b.len();
    if matches!(p1, Value::Quat(_)) || !same_len {
        return blend::interpolate(p1, p2, t, false);
    }
    let mut out = p1.clone();
    let mixed: Vec<f32> = (0..b.len())
        .map(|i| catmull_rom(a[i], b[i], c[i], d[i], t))
        .collect();
    match &mut out {
        Value::Float(x) => *x = mixed[0],
        Value::Vec2(v) => v.copy_from_slice(&mixed),
        Value::Vec3(v) => v.copy_from_slice(&mixed),
        Value::Vec4(v) | Value::ColorRgba(v) => v.copy_from_slice(&mixed),
        Value::Vector(v) => *v = mixed,
        _ => {}
    }
    out
}

fn interpolate_keys(
    keys: &[Key<Value>],
    seg: Segment,
    interpolation: Interpolation,
    looping: bool,
) -> Value {
    let (a, b) = (&keys[seg.from].value, &keys[seg.to].value);
    if seg.from == seg.to || !a.is_blendable() {
        return a.clone();
    }
    match interpolation {
        Interpolation::Nearest => blend::step(a, b, seg.t),
        Interpolation::Linear => blend::interpolate(a, b, seg.t, false),
        Interpolation::LinearAngle => blend::interpolate(a, b, seg.t, true),
        Interpolation::Cubic => {
            let (pre, post) = neighbours(seg, keys.len(), looping);
            cubic_value(&keys[pre].value, a, b, &keys[post].value, seg.t)
        }
    }
}

fn interpolate_scalar(
    keys: &[Key<f32>],
    seg: Segment,
    interpolation: Interpolation,
    looping: bool,
) -> f32 {
    let (a, b) = (keys[seg.from].value, keys[seg.to].value);
    match interpolation {
        Interpolation::Nearest => {
            if seg.t < 0.5 {
                a
            } else {
                b
            }
        }
        Interpolation::Linear => blend::lerp_f(a, b, seg.t),
        Interpolation::LinearAngle => blend::lerp_angle(a, b, seg.t),
        Interpolation::Cubic => {
            let (pre, post) = neighbours(seg, keys.len(), looping);
            catmull_rom(keys[pre].value, a, b, keys[post].value, seg.t)
        }
    }
}

fn cubic_bezier(p0: f32, p1: f32, p2: f32, p3: f32, s: f32) -> f32 {
    let u = 1.0 - s;
    u * u * u * p0 + 3.0 * u * u * s * p1 + 3.0 * u * s * s * p2 + s * s * s * p3
}

fn sample_bezier(keys: &[BezierKey], time: f64) -> Option<f32> {
    let n = keys.len();
    if n == 0 {
        return None;
    }
    let idx = partition(n, |i| keys[i].time <= time);
    if idx == 0 {
        return Some(keys[0].value);
    }
    if idx == n {
        return Some(keys[n - 1].value);
    }
    let (a, b) = (&keys[idx - 1], &keys[idx]);
    let (x0, x3) = (a.time as f32, b.time as f32);
    let x1 = (x0 + a.out_handle[0]).clamp(x0, x3);
    let x2 = (x3 + b.in_handle[0]).clamp(x0, x3);
    let (y0, y3) = (a.value, b.value);
    let (y1, y2) = (y0 + a.out_handle[1], y3 + b.in_handle[1]);

    let target = time as f32;
    let (mut lo, mut hi) = (0.0f32, 1.0f32);
    for _ in 0..BEZIER_ITERATIONS {
        let mid = 0.5 * (lo + hi);
        if cubic_bezier(x0, x1, x2, x3, mid) < target {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    Some(cubic_bezier(y0, y1, y2, y3, 0.5 * (lo + hi)))
}

/// Sample an interpolating track of `anim` at clip-local `time`.
///
/// Returns None for method/audio/animation tracks, empty tracks and
/// out-of-range indices.
pub fn sample(anim: &Animation, track: usize, time: f64) -> Option<Value> {
    let looping = anim.is_looping();
    match &anim.tracks.get(track)?.data {
        TrackData::Value {
            keys,
            update_mode,
            interpolation,
        } => {
            let seg = locate(keys, time, anim.length, looping)?;
            if *update_mode == UpdateMode::Discrete {
                let held = if seg.t >= 1.0 { seg.to } else { seg.from };
                return Some(keys[held].value.clone());
            }
            Some(interpolate_keys(keys, seg, *interpolation, looping))
        }
        TrackData::BlendShape {
            keys,
            interpolation,
        } => {
            let seg = locate(keys, time, anim.length, looping)?;
            Some(Value::Float(interpolate_scalar(
                keys,
                seg,
                *interpolation,
                looping,
            )))
        }
        TrackData::Bezier { keys } => sample_bezier(keys, time).map(Value::Float),
        _ => None,
    }
}

/// Indices of keys whose time lies between `lo` and `hi`, ascending.
fn keys_between(
    data: &TrackData,
    lo: f64,
    hi: f64,
    lo_inclusive: bool,
    hi_inclusive: bool,
) -> Vec<usize> {
    let n = data.key_count();
    let time = |i: usize| data.key_time(i).unwrap_or(f64::NAN);
    let start = if lo_inclusive {
        partition(n, |i| time(i) < lo)
    } else {
        partition(n, |i| time(i) <= lo)
    };
    let end = if hi_inclusive {
        partition(n, |i| time(i) <= hi)
    } else {
        partition(n, |i| time(i) < hi)
    };
    (start..end.max(start)).collect()
}

fn push_unique(out: &mut Vec<usize>, items: impl IntoIterator<Item = usize>) {
    for i in items {
        if !out.contains(&i) {
            out.push(i);
        }
    }
}

/// Keys crossed by a playhead that moved `delta` seconds and landed at `time`.
///
/// Returned in the order the playhead passed them, without duplicates.
pub fn crossed_keys(
    anim: &Animation,
    track: usize,
    time: f64,
    delta: f64,
    looped: LoopedFlag,
) -> Vec<usize> {
    let Some(t) = anim.tracks.get(track) else {
        return Vec::new();
    };
    let data = &t.data;
    let length = anim.length;
    let prev = time - delta;
    let mut out = Vec::new();
    match (anim.loop_mode, looped) {
        (LoopMode::Linear, LoopedFlag::End) => {
            push_unique(&mut out, keys_between(data, prev + length, length, true, true));
            push_unique(&mut out, keys_between(data, 0.0, time, true, false));
        }
        (LoopMode::Linear, LoopedFlag::Start) => {
            let mut head = keys_between(data, 0.0, prev - length, true, true);
            head.reverse();
            let mut tail = keys_between(data, time, length, false, true);
            tail.reverse();
            push_unique(&mut out, head);
            push_unique(&mut out, tail);
        }
        (LoopMode::PingPong, LoopedFlag::End) => {
            let lo = (2.0 * length - time - delta.abs()).min(time);
            push_unique(&mut out, keys_between(data, lo, length, true, true));
        }
        (LoopMode::PingPong, LoopedFlag::Start) => {
            let hi = (delta.abs() - time).max(time);
            let mut keys = keys_between(data, 0.0, hi, true, true);
            keys.reverse();
            push_unique(&mut out, keys);
        }
        _ if delta >= 0.0 => {
            let include_end = !anim.is_looping() && time >= length;
            push_unique(&mut out, keys_between(data, prev, time, true, include_end));
        }
        _ => {
            let mut keys = keys_between(data, time, prev, false, true);
            keys.reverse();
            push_unique(&mut out, keys);
        }
    }
    out
}

/// Key exactly at `time` (within `KEY_TIME_EPSILON`).
pub fn key_at(data: &TrackData, time: f64) -> Option<usize> {
    let idx = key_at_or_before(data, time + KEY_TIME_EPSILON)?;
    let kt = data.key_time(idx)?;
    ((time - kt).abs() <= KEY_TIME_EPSILON).then_some(idx)
}

/// Last key with time <= `time`.
pub fn key_at_or_before(data: &TrackData, time: f64) -> Option<usize> {
    let n = data.key_count();
    let idx = partition(n, |i| data.key_time(i).is_some_and(|t| t <= time));
    idx.checked_sub(1)
}
