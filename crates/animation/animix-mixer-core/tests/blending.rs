use animix_mixer_core::{
    Animation, BlendContext, Interpolation, Key, Mixer, MixerConfig, MixerHooks, ObjectId,
    PlaybackInfo, SceneTree, Track, TrackData, UpdateMode, Value,
};

fn approx(a: f32, b: f32, eps: f32) -> bool {
    (a - b).abs() <= eps
}

fn value_track(path: &str, keys: &[(f64, Value)], interpolation: Interpolation) -> Track {
    Track::parse(
        path,
        TrackData::Value {
            keys: keys.iter().map(|(t, v)| Key::new(*t, v.clone())).collect(),
            update_mode: UpdateMode::Continuous,
            interpolation,
        },
    )
    .unwrap()
}

fn constant_clip(name: &str, path: &str, value: f32) -> Animation {
    Animation::new(name, 1.0).with_track(value_track(
        path,
        &[(0.0, Value::Float(value))],
        Interpolation::Linear,
    ))
}

fn scene_with_box(x: f32) -> (SceneTree, ObjectId) {
    let mut scene = SceneTree::new();
    let node = scene.add_node(scene.root(), "Box").unwrap();
    scene.set_property(node, "x", Value::Float(x));
    scene.set_property(node, "y", Value::Float(0.0));
    (scene, node)
}

fn read_x(scene: &SceneTree, node: ObjectId) -> f32 {
    scene.property(node, "x").and_then(Value::as_float).unwrap()
}

fn mixer_with(clips: Vec<Animation>) -> Mixer {
    let mut mixer = Mixer::default();
    for clip in clips {
        let name = clip.name.clone();
        mixer.add_animation("", &name, clip).unwrap();
    }
    mixer
}

#[test]
fn weights_summing_to_one_give_weighted_average() {
    let (mut scene, node) = scene_with_box(0.0);
    let mut mixer = mixer_with(vec![
        constant_clip("low", "Box:x", 10.0),
        constant_clip("high", "Box:x", 20.0),
    ]);
    mixer
        .enqueue_instance("low", PlaybackInfo::new(0.0, 0.0).with_weight(0.3))
        .unwrap();
    mixer
        .enqueue_instance("high", PlaybackInfo::new(0.0, 0.0).with_weight(0.7))
        .unwrap();
    mixer.advance(0.0, &mut scene);
    let x = read_x(&scene, node);
    assert!(approx(x, 17.0, 1e-4), "got {x}");
}

#[test]
fn single_partial_weight_blends_from_initial_value() {
    let (mut scene, node) = scene_with_box(2.0);
    let mut mixer = mixer_with(vec![constant_clip("only", "Box:x", 10.0)]);
    mixer
        .enqueue_instance("only", PlaybackInfo::new(0.0, 0.0).with_weight(0.4))
        .unwrap();
    mixer.advance(0.0, &mut scene);
    let x = read_x(&scene, node);
    assert!(approx(x, 5.2, 1e-4), "got {x}");
}

#[test]
fn replacing_a_clip_drops_instances_queued_before_the_edit() {
    let (mut scene, node) = scene_with_box(0.0);
    let mut mixer = mixer_with(vec![constant_clip("move", "Box:x", 10.0)]);
    mixer.enqueue_instance("move", PlaybackInfo::new(0.0, 0.0)).unwrap();
    mixer.advance(0.0, &mut scene);
    assert!(approx(read_x(&scene, node), 10.0, 1e-6));

    mixer.enqueue_instance("move", PlaybackInfo::new(0.0, 0.0)).unwrap();
    mixer
        .replace_animation("", "move", constant_clip("move", "Box:x", 20.0))
        .unwrap();
    mixer.advance(0.0, &mut scene);
    assert!(approx(read_x(&scene, node), 10.0, 1e-6));
    assert_eq!(mixer.track_cache().find(node, "x").unwrap().total_weight, 0.0);

    mixer.enqueue_instance("move", PlaybackInfo::new(0.0, 0.0)).unwrap();
    mixer.advance(0.0, &mut scene);
    assert!(approx(read_x(&scene, node), 20.0, 1e-6));
}

#[test]
fn zero_weight_leaves_initial_value() {
    let (mut scene, node) = scene_with_box(3.0);
    let mut mixer = mixer_with(vec![constant_clip("a", "Box:x", 10.0)]);
    mixer
        .enqueue_instance("a", PlaybackInfo::new(0.0, 0.0).with_weight(0.0))
        .unwrap();
    mixer.advance(0.0, &mut scene);
    assert_eq!(read_x(&scene, node), 3.0);

    let entry = mixer.track_cache().find(node, "x").unwrap();
    assert_eq!(entry.payload.value(), Some(Value::Float(3.0)));
    assert_eq!(entry.payload.init_value(), Some(Value::Float(3.0)));

    // A frame with no instances does not zero the property either.
    mixer.advance(0.016, &mut scene);
    assert_eq!(read_x(&scene, node), 3.0);
}

#[test]
fn weights_are_clamped() {
    let (mut scene, node) = scene_with_box(0.0);
    let mut mixer = mixer_with(vec![constant_clip("a", "Box:x", 10.0)]);
    mixer
        .enqueue_instance("a", PlaybackInfo::new(0.0, 0.0).with_weight(4.0))
        .unwrap();
    mixer.advance(0.0, &mut scene);
    assert!(approx(read_x(&scene, node), 10.0, 1e-5));
}

#[test]
fn deterministic_mode_accumulates_without_renormalizing() {
    let (mut scene, node) = scene_with_box(5.0);
    let mut mixer = Mixer::new(MixerConfig {
        deterministic: true,
        ..MixerConfig::default()
    })
    .unwrap();
    mixer.add_animation("", "a", constant_clip("a", "Box:x", 10.0)).unwrap();
    mixer.add_animation("", "b", constant_clip("b", "Box:x", 20.0)).unwrap();

    mixer
        .enqueue_instance("a", PlaybackInfo::new(0.0, 0.0).with_weight(0.3))
        .unwrap();
    mixer
        .enqueue_instance("b", PlaybackInfo::new(0.0, 0.0).with_weight(0.7))
        .unwrap();
    mixer.advance(0.0, &mut scene);
    assert!(approx(read_x(&scene, node), 17.0, 1e-4));

    mixer.enqueue_instance("a", PlaybackInfo::new(0.0, 0.0)).unwrap();
    mixer.enqueue_instance("b", PlaybackInfo::new(0.0, 0.0)).unwrap();
    mixer.advance(0.0, &mut scene);
    // 5 + (10 - 5) + (20 - 5)
    assert!(approx(read_x(&scene, node), 25.0, 1e-4));
}

#[test]
fn deterministic_mode_writes_untouched_entries_at_initial_value() {
    let (mut scene, node) = scene_with_box(5.0);
    let mut mixer = Mixer::new(MixerConfig {
        deterministic: true,
        ..MixerConfig::default()
    })
    .unwrap();
    mixer.add_animation("", "a", constant_clip("a", "Box:x", 10.0)).unwrap();
    mixer.enqueue_instance("a", PlaybackInfo::new(0.0, 0.0)).unwrap();
    mixer.advance(0.0, &mut scene);
    assert!(approx(read_x(&scene, node), 10.0, 1e-5));

    mixer.advance(0.0, &mut scene);
    assert!(approx(read_x(&scene, node), 5.0, 1e-5));
}

#[test]
fn discrete_tracks_snap_to_key_at_or_below() {
    let (mut scene, node) = scene_with_box(0.0);
    let track = Track::parse(
        "Box:x",
        TrackData::Value {
            keys: vec![Key::new(0.0, Value::Float(1.0)), Key::new(0.5, Value::Float(2.0))],
            update_mode: UpdateMode::Discrete,
            interpolation: Interpolation::Linear,
        },
    )
    .unwrap();
    let mut mixer = mixer_with(vec![Animation::new("steps", 1.0).with_track(track)]);

    mixer.enqueue_instance("steps", PlaybackInfo::new(0.49, 0.49)).unwrap();
    mixer.advance(0.49, &mut scene);
    assert_eq!(read_x(&scene, node), 1.0);

    mixer.enqueue_instance("steps", PlaybackInfo::new(0.5, 0.01)).unwrap();
    mixer.advance(0.01, &mut scene);
    assert_eq!(read_x(&scene, node), 2.0);
}

#[test]
fn bool_properties_step() {
    let (mut scene, node) = scene_with_box(0.0);
    scene.set_property(node, "visible", Value::Bool(false));
    let clip = Animation::new("show", 1.0).with_track(value_track(
        "Box:visible",
        &[(0.0, Value::Bool(true))],
        Interpolation::Linear,
    ));
    let mut mixer = mixer_with(vec![clip]);

    mixer
        .enqueue_instance("show", PlaybackInfo::new(0.0, 0.0).with_weight(0.3))
        .unwrap();
    mixer.advance(0.0, &mut scene);
    assert_eq!(scene.property(node, "visible"), Some(&Value::Bool(false)));

    mixer
        .enqueue_instance("show", PlaybackInfo::new(0.0, 0.0).with_weight(0.8))
        .unwrap();
    mixer.advance(0.0, &mut scene);
    assert_eq!(scene.property(node, "visible"), Some(&Value::Bool(true)));
}

#[test]
fn angle_tracks_blend_along_short_arc() {
    let (mut scene, node) = scene_with_box(0.0);
    let a = Animation::new("a", 1.0).with_track(value_track(
        "Box:x",
        &[(0.0, Value::Float(170f32.to_radians()))],
        Interpolation::LinearAngle,
    ));
    let b = Animation::new("b", 1.0).with_track(value_track(
        "Box:x",
        &[(0.0, Value::Float((-170f32).to_radians()))],
        Interpolation::LinearAngle,
    ));
    let mut mixer = mixer_with(vec![a, b]);
    mixer
        .enqueue_instance("a", PlaybackInfo::new(0.0, 0.0).with_weight(0.5))
        .unwrap();
    mixer
        .enqueue_instance("b", PlaybackInfo::new(0.0, 0.0).with_weight(0.5))
        .unwrap();
    mixer.advance(0.0, &mut scene);
    let x = read_x(&scene, node);
    assert!(approx(x.cos(), -1.0, 1e-4), "expected 180deg, got {}", x.to_degrees());
}

#[test]
fn component_tracks_write_into_vectors() {
    let mut scene = SceneTree::new();
    let arm = scene.add_node(scene.root(), "Arm").unwrap();
    scene.set_property(arm, "position", Value::Vec3([1.0, 2.0, 3.0]));
    let clip = Animation::new("lift", 1.0).with_track(value_track(
        "Arm:position:y",
        &[(0.0, Value::Float(2.0)), (1.0, Value::Float(4.0))],
        Interpolation::Linear,
    ));
    let mut mixer = mixer_with(vec![clip]);
    mixer.enqueue_instance("lift", PlaybackInfo::new(0.5, 0.5)).unwrap();
    mixer.advance(0.5, &mut scene);
    assert_eq!(scene.property(arm, "position"), Some(&Value::Vec3([1.0, 3.0, 3.0])));
}

#[test]
fn per_track_weights_follow_blend_order() {
    let (mut scene, node) = scene_with_box(0.0);
    let clip = Animation::new("both", 1.0)
        .with_track(value_track("Box:x", &[(0.0, Value::Float(10.0))], Interpolation::Linear))
        .with_track(value_track("Box:y", &[(0.0, Value::Float(10.0))], Interpolation::Linear));
    let mut mixer = mixer_with(vec![clip]);
    mixer
        .enqueue_instance(
            "both",
            PlaybackInfo::new(0.0, 0.0).with_track_weights(vec![0.0, 1.0]),
        )
        .unwrap();
    mixer.advance(0.0, &mut scene);
    assert_eq!(read_x(&scene, node), 0.0);
    assert_eq!(scene.property(node, "y"), Some(&Value::Float(10.0)));
}

#[test]
fn blend_shapes_blend_as_scalars() {
    let mut scene = SceneTree::new();
    let face = scene.add_node(scene.root(), "Face").unwrap();
    scene.add_blend_shape(face, "Smile", 0.0);
    let clip = Animation::new("smile", 1.0).with_track(
        Track::parse(
            "Face:Smile",
            TrackData::BlendShape {
                keys: vec![Key::new(0.0, 0.0), Key::new(1.0, 1.0)],
                interpolation: Interpolation::Linear,
            },
        )
        .unwrap(),
    );
    let mut mixer = mixer_with(vec![clip]);
    mixer
        .enqueue_instance("smile", PlaybackInfo::new(1.0, 1.0).with_weight(0.5))
        .unwrap();
    mixer.advance(1.0, &mut scene);
    let smile = scene.blend_shape(face, "Smile").unwrap();
    assert!(approx(smile, 0.5, 1e-5));
}

struct Doubler;

impl MixerHooks for Doubler {
    fn post_process_key_value(
        &mut self,
        _animation: &Animation,
        _track: usize,
        value: Value,
        _object: ObjectId,
    ) -> Value {
        match value {
            Value::Float(x) => Value::Float(x * 2.0),
            other => other,
        }
    }
}

struct Veto;

impl MixerHooks for Veto {
    fn pre_process(&mut self, ctx: &mut BlendContext<'_>) -> bool {
        assert_eq!(ctx.instances.len(), 1);
        false
    }
}

#[test]
fn hooks_can_rewrite_samples_and_veto_frames() {
    let (mut scene, node) = scene_with_box(0.0);
    let mut mixer = mixer_with(vec![constant_clip("a", "Box:x", 10.0)]);

    mixer.set_hooks(Box::new(Doubler));
    mixer.enqueue_instance("a", PlaybackInfo::new(0.0, 0.0)).unwrap();
    mixer.advance(0.0, &mut scene);
    assert!(approx(read_x(&scene, node), 20.0, 1e-5));

    scene.set_property(node, "x", Value::Float(1.0));
    mixer.set_hooks(Box::new(Veto));
    mixer.enqueue_instance("a", PlaybackInfo::new(0.0, 0.0)).unwrap();
    mixer.advance(0.0, &mut scene);
    assert_eq!(read_x(&scene, node), 1.0);
    assert_eq!(mixer.instance_count(), 0);
}
