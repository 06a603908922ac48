//! Value: the typed payload read from, blended for, and written to animated properties.
//! All numeric types use f32.

use serde::{Deserialize, Serialize};

/// Coarse kind of a [`Value`], used for dispatch and cache type checks.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    Float,
    Bool,
    Vec2,
    Vec3,
    Vec4,
    Quat,
    ColorRgba,
    Transform,
    Vector,
    Text,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum Value {
    /// Scalar float
    Float(f32),

    /// Boolean (step)
    Bool(bool),

    /// 2D vector
    Vec2([f32; 2]),

    /// 3D vector
    Vec3([f32; 3]),

    /// 4D vector
    Vec4([f32; 4]),

    /// Quaternion (x, y, z, w)
    Quat([f32; 4]),

    /// RGBA color (linear by convention)
    #[serde(rename = "color")]
    ColorRgba([f32; 4]),

    /// Transform with translation, rotation (quat), scale
    Transform {
        pos: [f32; 3],
        rot: [f32; 4],
        scale: [f32; 3],
    },

    /// Variable-length numeric vector; blended element-wise over the shared prefix.
    Vector(Vec<f32>),

    /// Text / string; step-only for interpolation
    Text(String),
}

impl Value {
    /// Return the coarse kind of this value.
    #[inline]
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Float(_) => ValueKind::Float,
            Value::Bool(_) => ValueKind::Bool,
            Value::Vec2(_) => ValueKind::Vec2,
            Value::Vec3(_) => ValueKind::Vec3,
            Value::Vec4(_) => ValueKind::Vec4,
            Value::Quat(_) => ValueKind::Quat,
            Value::ColorRgba(_) => ValueKind::ColorRgba,
            Value::Transform { .. } => ValueKind::Transform,
            Value::Vector(_) => ValueKind::Vector,
            Value::Text(_) => ValueKind::Text,
        }
    }

    /// True for kinds that interpolate numerically. Bool and Text only step.
    #[inline]
    pub fn is_blendable(&self) -> bool {
        !matches!(self, Value::Bool(_) | Value::Text(_))
    }

    /// Read a named component (`x y z w` or `r g b a`, `pos`/`rot`/`scale` on transforms).
    pub fn component(&self, name: &str) -> Option<Value> {
        match self {
            Value::Transform { pos, rot, scale } => match name {
                "pos" | "origin" => Some(Value::Vec3(*pos)),
                "rot" | "rotation" => Some(Value::Quat(*rot)),
                "scale" => Some(Value::Vec3(*scale)),
                _ => None,
            },
            Value::Vector(v) => name
                .parse::<usize>()
                .ok()
                .and_then(|i| v.get(i))
                .map(|x| Value::Float(*x)),
            _ => {
                let idx = component_index(self.kind(), name)?;
                self.as_slice().and_then(|s| s.get(idx)).map(|x| Value::Float(*x))
            }
        }
    }

    /// Write a named component in place. Returns false when the component
    /// does not exist or the value kind does not match.
    pub fn set_component(&mut self, name: &str, value: &Value) -> bool {
        match (self, value) {
            (Value::Transform { pos, .. }, Value::Vec3(v)) if matches!(name, "pos" | "origin") => {
                *pos = *v;
                true
            }
            (Value::Transform { rot, .. }, Value::Quat(q))
                if matches!(name, "rot" | "rotation") =>
            {
                *rot = *q;
                true
            }
            (Value::Transform { scale, .. }, Value::Vec3(v)) if name == "scale" => {
                *scale = *v;
                true
            }
            (Value::Vector(v), Value::Float(x)) => match name.parse::<usize>() {
                Ok(i) if i < v.len() => {
                    v[i] = *x;
                    true
                }
                _ => false,
            },
            (this, Value::Float(x)) => {
                let Some(idx) = component_index(this.kind(), name) else {
                    return false;
                };
                match this.as_mut_slice().and_then(|s| s.get_mut(idx)) {
                    Some(slot) => {
                        *slot = *x;
                        true
                    }
                    None => false,
                }
            }
            _ => false,
        }
    }

    /// Flat view over fixed-size numeric kinds.
    pub fn as_slice(&self) -> Option<&[f32]> {
        match self {
            Value::Float(x) => Some(std::slice::from_ref(x)),
            Value::Vec2(a) => Some(a),
            Value::Vec3(a) => Some(a),
            Value::Vec4(a) | Value::Quat(a) | Value::ColorRgba(a) => Some(a),
            Value::Vector(v) => Some(v),
            _ => None,
        }
    }

    fn as_mut_slice(&mut self) -> Option<&mut [f32]> {
        match self {
            Value::Float(x) => Some(std::slice::from_mut(x)),
            Value::Vec2(a) => Some(a),
            Value::Vec3(a) => Some(a),
            Value::Vec4(a) | Value::Quat(a) | Value::ColorRgba(a) => Some(a),
            Value::Vector(v) => Some(v),
            _ => None,
        }
    }

    /// Scalar view, if this is a float.
    pub fn as_float(&self) -> Option<f32> {
        match self {
            Value::Float(x) => Some(*x),
            _ => None,
        }
    }
}

fn component_index(kind: ValueKind, name: &str) -> Option<usize> {
    let idx = match (kind, name) {
        (ValueKind::ColorRgba, "r") => 0,
        (ValueKind::ColorRgba, "g") => 1,
        (ValueKind::ColorRgba, "b") => 2,
        (ValueKind::ColorRgba, "a") => 3,
        (ValueKind::ColorRgba, _) => return None,
        (_, "x") => 0,
        (_, "y") => 1,
        (_, "z") => 2,
        (_, "w") => 3,
        _ => return None,
    };
    let len = match kind {
        ValueKind::Vec2 => 2,
        ValueKind::Vec3 => 3,
        ValueKind::Vec4 | ValueKind::Quat | ValueKind::ColorRgba => 4,
        _ => 0,
    };
    (idx < len).then_some(idx)
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}
