//! In-memory reference host.
//!
//! `SceneTree` stores named nodes in a generational arena so stale ids from
//! removed nodes are rejected. Properties are whole `Value`s addressed by
//! name; further sub-names address components (`position:x`, `xform:pos:y`).
//! `RecordingAudio` is an `AudioBackend` that keeps a log and checks handle
//! bookkeeping.

use std::collections::BTreeMap;

use animix_api_core::{PropertyPath, Value};
use generational_arena::{Arena, Index};
use hashbrown::HashMap;

use crate::data::AudioStreamRef;
use crate::host::{AudioBackend, SceneAccess};
use crate::ids::{ObjectId, PlaybackId, VoiceId};

fn to_object(index: Index) -> ObjectId {
    let (slot, generation) = index.into_raw_parts();
    ObjectId::new(slot as u32, generation as u32)
}

fn to_index(id: ObjectId) -> Index {
    Index::from_raw_parts(id.index as usize, u64::from(id.generation))
}

/// A method call received by a node.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordedCall {
    pub method: String,
    pub args: Vec<Value>,
}

#[derive(Debug, Default)]
struct Node {
    name: String,
    parent: Option<Index>,
    children: Vec<Index>,
    properties: BTreeMap<String, Value>,
    blend_shapes: Vec<(String, f32)>,
    calls: Vec<RecordedCall>,
}

#[derive(Debug)]
pub struct SceneTree {
    nodes: Arena<Node>,
    root: Index,
}

impl Default for SceneTree {
    fn default() -> Self {
        Self::new()
    }
}

fn write_component(target: &mut Value, path: &[String], value: &Value) -> bool {
    match path {
        [] => {
            if target.kind() != value.kind() {
                return false;
            }
            *target = value.clone();
            true
        }
        [last] => target.set_component(last, value),
        [head, rest @ ..] => {
            let Some(mut inner) = target.component(head) else {
                return false;
            };
            write_component(&mut inner, rest, value) && target.set_component(head, &inner)
        }
    }
}

impl SceneTree {
    pub fn new() -> Self {
        let mut nodes = Arena::new();
        let root = nodes.insert(Node {
            name: "root".to_string(),
            ..Node::default()
        });
        Self { nodes, root }
    }

    pub fn root(&self) -> ObjectId {
        to_object(self.root)
    }

    fn node(&self, id: ObjectId) -> Option<&Node> {
        self.nodes.get(to_index(id))
    }

    fn node_mut(&mut self, id: ObjectId) -> Option<&mut Node> {
        self.nodes.get_mut(to_index(id))
    }

    /// Add a child named `name` under `parent`. Names are unique among siblings.
    pub fn add_node(&mut self, parent: ObjectId, name: &str) -> Option<ObjectId> {
        let parent_idx = to_index(parent);
        let siblings = &self.nodes.get(parent_idx)?.children;
        if siblings
            .iter()
            .any(|c| self.nodes.get(*c).is_some_and(|n| n.name == name))
        {
            return None;
        }
        let idx = self.nodes.insert(Node {
            name: name.to_string(),
            parent: Some(parent_idx),
            ..Node::default()
        });
        self.nodes.get_mut(parent_idx)?.children.push(idx);
        Some(to_object(idx))
    }

    /// Remove a node and its whole subtree. Ids into it become stale.
    pub fn remove_node(&mut self, id: ObjectId) -> bool {
        let idx = to_index(id);
        if idx == self.root {
            return false;
        }
        let Some(node) = self.nodes.remove(idx) else {
            return false;
        };
        if let Some(parent) = node.parent.and_then(|p| self.nodes.get_mut(p)) {
            parent.children.retain(|c| *c != idx);
        }
        let mut pending = node.children;
        while let Some(child) = pending.pop() {
            if let Some(n) = self.nodes.remove(child) {
                pending.extend(n.children);
            }
        }
        true
    }

    pub fn set_property(&mut self, id: ObjectId, name: &str, value: Value) -> bool {
        match self.node_mut(id) {
            Some(node) => {
                node.properties.insert(name.to_string(), value);
                true
            }
            None => false,
        }
    }

    pub fn property(&self, id: ObjectId, name: &str) -> Option<&Value> {
        self.node(id)?.properties.get(name)
    }

    pub fn add_blend_shape(&mut self, id: ObjectId, name: &str, value: f32) -> Option<usize> {
        let node = self.node_mut(id)?;
        node.blend_shapes.push((name.to_string(), value));
        Some(node.blend_shapes.len() - 1)
    }

    pub fn blend_shape(&self, id: ObjectId, name: &str) -> Option<f32> {
        self.node(id)?
            .blend_shapes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| *v)
    }

    /// Calls received by `id`, oldest first.
    pub fn calls(&self, id: ObjectId) -> &[RecordedCall] {
        self.node(id).map(|n| n.calls.as_slice()).unwrap_or(&[])
    }
}

impl SceneAccess for SceneTree {
    fn resolve(&self, path: &PropertyPath) -> Option<ObjectId> {
        let mut current = self.root;
        for name in &path.nodes {
            let node = self.nodes.get(current)?;
            current = *node
                .children
                .iter()
                .find(|c| self.nodes.get(**c).is_some_and(|n| &n.name == name))?;
        }
        Some(to_object(current))
    }

    fn is_alive(&self, id: ObjectId) -> bool {
        self.nodes.contains(to_index(id))
    }

    fn read(&self, id: ObjectId, subpath: &[String]) -> Option<Value> {
        let (name, rest) = subpath.split_first()?;
        let mut value = self.node(id)?.properties.get(name)?.clone();
        for component in rest {
            value = value.component(component)?;
        }
        Some(value)
    }

    fn write(&mut self, id: ObjectId, subpath: &[String], value: &Value) -> bool {
        let Some((name, rest)) = subpath.split_first() else {
            return false;
        };
        let Some(target) = self.node_mut(id).and_then(|n| n.properties.get_mut(name)) else {
            return false;
        };
        write_component(target, rest, value)
    }

    fn blend_shape_index(&self, id: ObjectId, name: &str) -> Option<usize> {
        self.node(id)?.blend_shapes.iter().position(|(n, _)| n == name)
    }

    fn read_blend_shape(&self, id: ObjectId, shape: usize) -> Option<f32> {
        self.node(id)?.blend_shapes.get(shape).map(|(_, v)| *v)
    }

    fn write_blend_shape(&mut self, id: ObjectId, shape: usize, value: f32) -> bool {
        match self.node_mut(id).and_then(|n| n.blend_shapes.get_mut(shape)) {
            Some(slot) => {
                slot.1 = value;
                true
            }
            None => false,
        }
    }

    fn call(&mut self, id: ObjectId, method: &str, args: &[Value]) {
        if let Some(node) = self.node_mut(id) {
            node.calls.push(RecordedCall {
                method: method.to_string(),
                args: args.to_vec(),
            });
        }
    }
}

/// State of one voice seen by `RecordingAudio`.
#[derive(Clone, Debug, PartialEq)]
pub struct VoiceState {
    pub playback: PlaybackId,
    pub stream: String,
    pub offset: f64,
    pub volume_db: f32,
    pub pitch_scale: f32,
}

/// Audio backend that records what it was asked to do.
#[derive(Debug, Default)]
pub struct RecordingAudio {
    playbacks: HashMap<PlaybackId, (ObjectId, usize)>,
    voices: HashMap<VoiceId, VoiceState>,
    started: usize,
    stopped: usize,
    /// Commands that referenced unknown handles or exceeded a playback's polyphony.
    pub errors: Vec<String>,
}

impl RecordingAudio {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn voice(&self, voice: VoiceId) -> Option<&VoiceState> {
        self.voices.get(&voice)
    }

    pub fn active_voices(&self) -> usize {
        self.voices.len()
    }

    pub fn open_playbacks(&self) -> usize {
        self.playbacks.len()
    }

    pub fn started(&self) -> usize {
        self.started
    }

    pub fn stopped(&self) -> usize {
        self.stopped
    }
}

impl AudioBackend for RecordingAudio {
    fn open(&mut self, playback: PlaybackId, object: ObjectId, max_polyphony: usize) {
        if self.playbacks.insert(playback, (object, max_polyphony)).is_some() {
            self.errors.push(format!("playback {playback:?} opened twice"));
        }
    }

    fn start(
        &mut self,
        playback: PlaybackId,
        voice: VoiceId,
        stream: &AudioStreamRef,
        offset: f64,
    ) {
        let Some((_, max)) = self.playbacks.get(&playback) else {
            self.errors.push(format!("start on unknown playback {playback:?}"));
            return;
        };
        let in_use = self.voices.values().filter(|v| v.playback == playback).count();
        if in_use >= *max {
            self.errors.push(format!("playback {playback:?} exceeded polyphony {max}"));
            return;
        }
        self.started += 1;
        self.voices.insert(
            voice,
            VoiceState {
                playback,
                stream: stream.id.clone(),
                offset,
                volume_db: 0.0,
                pitch_scale: 1.0,
            },
        );
    }

    fn set_volume(&mut self, voice: VoiceId, volume_db: f32) {
        match self.voices.get_mut(&voice) {
            Some(v) => v.volume_db = volume_db,
            None => self.errors.push(format!("volume on unknown voice {voice:?}")),
        }
    }

    fn set_pitch(&mut self, voice: VoiceId, pitch_scale: f32) {
        match self.voices.get_mut(&voice) {
            Some(v) => v.pitch_scale = pitch_scale,
            None => self.errors.push(format!("pitch on unknown voice {voice:?}")),
        }
    }

    fn stop(&mut self, voice: VoiceId) {
        if self.voices.remove(&voice).is_some() {
            self.stopped += 1;
        } else {
            self.errors.push(format!("stop on unknown voice {voice:?}"));
        }
    }

    fn close(&mut self, playback: PlaybackId) {
        if self.playbacks.remove(&playback).is_none() {
            self.errors.push(format!("close on unknown playback {playback:?}"));
        }
        self.voices.retain(|_, v| v.playback != playback);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_and_component_writes() {
        let mut tree = SceneTree::new();
        let body = tree.add_node(tree.root(), "Body").unwrap();
        let arm = tree.add_node(body, "Arm").unwrap();
        tree.set_property(arm, "position", Value::Vec3([1.0, 2.0, 3.0]));

        let path = PropertyPath::parse("Body/Arm").unwrap();
        assert_eq!(tree.resolve(&path), Some(arm));
        let sub = vec!["position".to_string(), "y".to_string()];
        assert_eq!(tree.read(arm, &sub), Some(Value::Float(2.0)));
        assert!(tree.write(arm, &sub, &Value::Float(5.0)));
        assert_eq!(tree.property(arm, "position"), Some(&Value::Vec3([1.0, 5.0, 3.0])));
        assert!(!tree.write(arm, &["position".to_string()], &Value::Float(0.0)));
    }

    #[test]
    fn removed_nodes_are_stale() {
        let mut tree = SceneTree::new();
        let a = tree.add_node(tree.root(), "A").unwrap();
        let b = tree.add_node(a, "B").unwrap();
        assert!(tree.remove_node(a));
        assert!(!tree.is_alive(a));
        assert!(!tree.is_alive(b));
        let again = tree.add_node(tree.root(), "A").unwrap();
        assert_ne!(again, a);
        assert!(!tree.write(a, &["x".to_string()], &Value::Float(1.0)));
    }

    #[test]
    fn recording_audio_tracks_handles() {
        let mut audio = RecordingAudio::new();
        let stream = AudioStreamRef {
            id: "beep".to_string(),
            length: 1.0,
        };
        audio.open(PlaybackId(0), ObjectId::new(1, 0), 1);
        audio.start(PlaybackId(0), VoiceId(0), &stream, 0.0);
        audio.start(PlaybackId(0), VoiceId(1), &stream, 0.0);
        assert_eq!(audio.active_voices(), 1);
        assert_eq!(audio.errors.len(), 1);
        audio.stop(VoiceId(0));
        assert_eq!(audio.stopped(), 1);
        audio.close(PlaybackId(0));
        assert_eq!(audio.open_playbacks(), 0);
    }
}
