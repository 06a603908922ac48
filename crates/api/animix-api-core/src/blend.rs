//! Blending utilities for Value types.
//!
//! - f32 linear interpolation for floats and vector components
//! - shortest-arc angle interpolation for angle-flagged scalars
//! - quaternion slerp (shortest-arc), multiply and inverse
//! - transform TRS blending (pos/scale lerp, rot slerp)
//! - element-wise blending over the shared prefix of generic Vectors
//! - step blending for Bool/Text (right side wins once t >= 0.5)
//! - additive helpers (`subtract`, `add_weighted`) used by deterministic blending

use std::f32::consts::{PI, TAU};

use crate::Value;

/// Linear interpolation for f32
#[inline]
pub fn lerp_f(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

fn lerp_array<const N: usize>(a: &[f32; N], b: &[f32; N], t: f32) -> [f32; N] {
    let mut out = [0.0f32; N];
    for i in 0..N {
        out[i] = lerp_f(a[i], b[i], t);
    }
    out
}

/// Wrap an angle difference into `(-PI, PI]`.
#[inline]
pub fn angle_difference(from: f32, to: f32) -> f32 {
    let diff = (to - from) % TAU;
    let wrapped = (2.0 * diff) % TAU - diff;
    if wrapped <= -PI {
        wrapped + TAU
    } else {
        wrapped
    }
}

/// Interpolate between two angles (radians) along the shortest arc.
#[inline]
pub fn lerp_angle(from: f32, to: f32, t: f32) -> f32 {
    from + angle_difference(from, to) * t
}

/// Normalize a quaternion represented as [x,y,z,w]
pub fn normalize_quat(q: [f32; 4]) -> [f32; 4] {
    let mag = (q[0] * q[0] + q[1] * q[1] + q[2] * q[2] + q[3] * q[3]).sqrt();
    if mag == 0.0 {
        [0.0, 0.0, 0.0, 1.0]
    } else {
        [q[0] / mag, q[1] / mag, q[2] / mag, q[3] / mag]
    }
}

/// Hamilton product `a * b`.
pub fn quat_mul(a: [f32; 4], b: [f32; 4]) -> [f32; 4] {
    let [ax, ay, az, aw] = a;
    let [bx, by, bz, bw] = b;
    [
        aw * bx + ax * bw + ay * bz - az * by,
        aw * by - ax * bz + ay * bw + az * bx,
        aw * bz + ax * by - ay * bx + az * bw,
        aw * bw - ax * bx - ay * by - az * bz,
    ]
}

/// Inverse of a unit quaternion (its conjugate).
#[inline]
pub fn quat_inverse(q: [f32; 4]) -> [f32; 4] {
    [-q[0], -q[1], -q[2], q[3]]
}

/// Slerp between two unit quaternions q1, q2
pub fn slerp(q1: [f32; 4], q2: [f32; 4], t: f32) -> [f32; 4] {
    let qa = normalize_quat(q1);
    let mut qb = normalize_quat(q2);

    let mut dot = qa[0] * qb[0] + qa[1] * qb[1] + qa[2] * qb[2] + qa[3] * qb[3];

    // Take the short path.
    if dot < 0.0 {
        qb = [-qb[0], -qb[1], -qb[2], -qb[3]];
        dot = -dot;
    }

    const DOT_THRESHOLD: f32 = 0.9995;
    if dot > DOT_THRESHOLD {
        return normalize_quat(lerp_array(&qa, &qb, t));
    }

    let theta_0 = dot.clamp(-1.0, 1.0).acos();
    let theta = theta_0 * t;
    let sin_theta_0 = theta_0.sin();

    let s0 = (theta_0 - theta).sin() / sin_theta_0;
    let s1 = theta.sin() / sin_theta_0;

    [
        s0 * qa[0] + s1 * qb[0],
        s0 * qa[1] + s1 * qb[1],
        s0 * qa[2] + s1 * qb[2],
        s0 * qa[3] + s1 * qb[3],
    ]
}

fn lerp_prefix(a: &[f32], b: &[f32], t: f32, angle: bool) -> Vec<f32> {
    let mut out = a.to_vec();
    for (slot, target) in out.iter_mut().zip(b.iter()) {
        *slot = if angle {
            lerp_angle(*slot, *target, t)
        } else {
            lerp_f(*slot, *target, t)
        };
    }
    out
}

/// Interpolate `a` toward `b` by `t`.
///
/// `angle` selects shortest-arc interpolation for scalar components. Mismatched
/// kinds keep `a` (fail-soft); Bool/Text step to `b` once `t >= 0.5`.
pub fn interpolate(a: &Value, b: &Value, t: f32, angle: bool) -> Value {
    match (a, b) {
        (Value::Float(x), Value::Float(y)) => {
            if angle {
                Value::Float(lerp_angle(*x, *y, t))
            } else {
                Value::Float(lerp_f(*x, *y, t))
            }
        }
        (Value::Vec2(x), Value::Vec2(y)) => {
            let v = lerp_prefix(x, y, t, angle);
            Value::Vec2([v[0], v[1]])
        }
        (Value::Vec3(x), Value::Vec3(y)) => {
            let v = lerp_prefix(x, y, t, angle);
            Value::Vec3([v[0], v[1], v[2]])
        }
        (Value::Vec4(x), Value::Vec4(y)) => Value::Vec4(lerp_array(x, y, t)),
        (Value::ColorRgba(x), Value::ColorRgba(y)) => Value::ColorRgba(lerp_array(x, y, t)),
        (Value::Quat(x), Value::Quat(y)) => Value::Quat(slerp(*x, *y, t)),
        (
            Value::Transform {
                pos: pa,
                rot: ra,
                scale: sa,
            },
            Value::Transform {
                pos: pb,
                rot: rb,
                scale: sb,
            },
        ) => Value::Transform {
            pos: lerp_array(pa, pb, t),
            rot: slerp(*ra, *rb, t),
            scale: lerp_array(sa, sb, t),
        },
        (Value::Vector(x), Value::Vector(y)) => Value::Vector(lerp_prefix(x, y, t, angle)),
        (Value::Bool(_), Value::Bool(_)) | (Value::Text(_), Value::Text(_)) => step(a, b, t),
        _ => a.clone(),
    }
}

/// Step blend: choose `a` while `t < 0.5`, otherwise `b`.
#[inline]
pub fn step(a: &Value, b: &Value, t: f32) -> Value {
    if t < 0.5 {
        a.clone()
    } else {
        b.clone()
    }
}

/// `a - b` for numeric kinds; rotations yield the relative rotation `inv(b) * a`.
pub fn subtract(a: &Value, b: &Value, angle: bool) -> Option<Value> {
    Some(match (a, b) {
        (Value::Float(x), Value::Float(y)) => {
            if angle {
                Value::Float(angle_difference(*y, *x))
            } else {
                Value::Float(x - y)
            }
        }
        (Value::Vec2(x), Value::Vec2(y)) => Value::Vec2([x[0] - y[0], x[1] - y[1]]),
        (Value::Vec3(x), Value::Vec3(y)) => Value::Vec3([x[0] - y[0], x[1] - y[1], x[2] - y[2]]),
        (Value::Vec4(x), Value::Vec4(y)) => Value::Vec4(sub4(x, y)),
        (Value::ColorRgba(x), Value::ColorRgba(y)) => Value::ColorRgba(sub4(x, y)),
        (Value::Quat(x), Value::Quat(y)) => Value::Quat(quat_mul(quat_inverse(*y), *x)),
        (
            Value::Transform {
                pos: pa,
                rot: ra,
                scale: sa,
            },
            Value::Transform {
                pos: pb,
                rot: rb,
                scale: sb,
            },
        ) => Value::Transform {
            pos: [pa[0] - pb[0], pa[1] - pb[1], pa[2] - pb[2]],
            rot: quat_mul(quat_inverse(*rb), *ra),
            scale: [sa[0] - sb[0], sa[1] - sb[1], sa[2] - sb[2]],
        },
        (Value::Vector(x), Value::Vector(y)) => {
            Value::Vector(x.iter().zip(y.iter()).map(|(p, q)| p - q).collect())
        }
        _ => return None,
    })
}

fn sub4(x: &[f32; 4], y: &[f32; 4]) -> [f32; 4] {
    [x[0] - y[0], x[1] - y[1], x[2] - y[2], x[3] - y[3]]
}

/// Accumulate `delta * weight` onto `base`. Rotations compose with a slerp
/// from identity toward `delta` by `weight`. Non-numeric kinds step to `delta`
/// once `weight >= 0.5`.
pub fn add_weighted(base: &Value, delta: &Value, weight: f32) -> Value {
    const IDENTITY: [f32; 4] = [0.0, 0.0, 0.0, 1.0];
    match (base, delta) {
        (Value::Float(x), Value::Float(d)) => Value::Float(x + d * weight),
        (Value::Vec2(x), Value::Vec2(d)) => {
            Value::Vec2([x[0] + d[0] * weight, x[1] + d[1] * weight])
        }
        (Value::Vec3(x), Value::Vec3(d)) => Value::Vec3(add3(x, d, weight)),
        (Value::Vec4(x), Value::Vec4(d)) => Value::Vec4(add4(x, d, weight)),
        (Value::ColorRgba(x), Value::ColorRgba(d)) => Value::ColorRgba(add4(x, d, weight)),
        (Value::Quat(x), Value::Quat(d)) => {
            Value::Quat(normalize_quat(quat_mul(*x, slerp(IDENTITY, *d, weight))))
        }
        (
            Value::Transform {
                pos: pa,
                rot: ra,
                scale: sa,
            },
            Value::Transform {
                pos: pd,
                rot: rd,
                scale: sd,
            },
        ) => Value::Transform {
            pos: add3(pa, pd, weight),
            rot: normalize_quat(quat_mul(*ra, slerp(IDENTITY, *rd, weight))),
            scale: add3(sa, sd, weight),
        },
        (Value::Vector(x), Value::Vector(d)) => {
            let mut out = x.clone();
            for (slot, dd) in out.iter_mut().zip(d.iter()) {
                *slot += dd * weight;
            }
            Value::Vector(out)
        }
        _ => step(base, delta, weight),
    }
}

fn add3(x: &[f32; 3], d: &[f32; 3], w: f32) -> [f32; 3] {
    [x[0] + d[0] * w, x[1] + d[1] * w, x[2] + d[2] * w]
}

fn add4(x: &[f32; 4], d: &[f32; 4], w: f32) -> [f32; 4] {
    [
        x[0] + d[0] * w,
        x[1] + d[1] * w,
        x[2] + d[2] * w,
        x[3] + d[3] * w,
    ]
}
