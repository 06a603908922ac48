use animix_mixer_core::{
    Animation, Interpolation, Key, Mixer, MixerError, ObjectId, PlaybackInfo, SceneTree, Track,
    TrackData, UpdateMode, Value, RESET_ANIMATION,
};

fn constant_clip(name: &str, value: f32) -> Animation {
    Animation::new(name, 1.0).with_track(
        Track::parse(
            "Box:x",
            TrackData::Value {
                keys: vec![Key::new(0.0, Value::Float(value))],
                update_mode: UpdateMode::Continuous,
                interpolation: Interpolation::Linear,
            },
        )
        .unwrap(),
    )
}

fn scene_with_box(x: f32) -> (SceneTree, ObjectId) {
    let mut scene = SceneTree::new();
    let node = scene.add_node(scene.root(), "Box").unwrap();
    scene.set_property(node, "x", Value::Float(x));
    (scene, node)
}

fn x(scene: &SceneTree, node: ObjectId) -> Option<&Value> {
    scene.property(node, "x")
}

#[test]
fn backup_restores_values_from_before_playback() {
    let (mut scene, node) = scene_with_box(1.0);
    let mut mixer = Mixer::default();
    mixer.add_animation("", "move", constant_clip("move", 10.0)).unwrap();

    let backup = mixer.make_backup(&scene);
    assert_eq!(backup.len(), 1);
    let entry = backup.entries().find(node, "x").unwrap();
    assert_eq!(entry.payload.value(), Some(Value::Float(1.0)));
    assert_eq!(entry.total_weight, 1.0);

    mixer.enqueue_instance("move", PlaybackInfo::new(0.0, 0.0)).unwrap();
    mixer.advance(0.0, &mut scene);
    assert_eq!(x(&scene, node), Some(&Value::Float(10.0)));

    assert_eq!(mixer.restore(&backup, &mut scene), 1);
    assert_eq!(x(&scene, node), Some(&Value::Float(1.0)));
}

#[test]
fn backup_captures_externally_changed_values() {
    let (mut scene, node) = scene_with_box(1.0);
    let mut mixer = Mixer::default();
    mixer.add_animation("", "move", constant_clip("move", 10.0)).unwrap();
    mixer.rebuild_caches(&scene).unwrap();

    scene.set_property(node, "x", Value::Float(4.0));
    let backup = mixer.make_backup(&scene);
    scene.set_property(node, "x", Value::Float(-3.0));
    mixer.restore(&backup, &mut scene);
    assert_eq!(x(&scene, node), Some(&Value::Float(4.0)));

    // The live cache still remembers the value seen at creation.
    let live = mixer.track_cache().find(node, "x").unwrap();
    assert_eq!(live.payload.init_value(), Some(Value::Float(1.0)));
}

#[test]
fn restore_skips_removed_objects() {
    let (mut scene, node) = scene_with_box(1.0);
    let mut mixer = Mixer::default();
    mixer.add_animation("", "move", constant_clip("move", 10.0)).unwrap();
    let backup = mixer.make_backup(&scene);
    scene.remove_node(node);
    assert_eq!(mixer.restore(&backup, &mut scene), 0);
}

#[test]
fn reset_writes_rest_pose_and_is_idempotent() {
    let (mut scene, node) = scene_with_box(0.0);
    let mut mixer = Mixer::default();
    mixer
        .add_animation("", RESET_ANIMATION, constant_clip(RESET_ANIMATION, 1.5))
        .unwrap();
    mixer.add_animation("", "move", constant_clip("move", 10.0)).unwrap();
    assert!(mixer.can_apply_reset());

    mixer.enqueue_instance("move", PlaybackInfo::new(0.0, 0.0)).unwrap();
    mixer.advance(0.0, &mut scene);
    assert_eq!(x(&scene, node), Some(&Value::Float(10.0)));

    mixer.reset(&mut scene).unwrap();
    assert_eq!(x(&scene, node), Some(&Value::Float(1.5)));
    mixer.reset(&mut scene).unwrap();
    assert_eq!(x(&scene, node), Some(&Value::Float(1.5)));
}

#[test]
fn adding_reset_later_refreshes_initial_values() {
    let (mut scene, node) = scene_with_box(2.0);
    let mut mixer = Mixer::default();
    mixer.add_animation("", "move", constant_clip("move", 10.0)).unwrap();
    mixer.rebuild_caches(&scene).unwrap();
    let entry = mixer.track_cache().find(node, "x").unwrap();
    assert_eq!(entry.payload.init_value(), Some(Value::Float(2.0)));

    mixer
        .add_animation("", RESET_ANIMATION, constant_clip(RESET_ANIMATION, 1.5))
        .unwrap();
    mixer
        .enqueue_instance("move", PlaybackInfo::new(0.0, 0.0).with_weight(0.4))
        .unwrap();
    mixer.advance(0.0, &mut scene);

    let entry = mixer.track_cache().find(node, "x").unwrap();
    assert_eq!(entry.payload.init_value(), Some(Value::Float(1.5)));
    let Some(Value::Float(v)) = x(&scene, node) else {
        panic!("x should stay a float");
    };
    assert!((v - 4.9).abs() < 1e-4, "got {v}");
}

#[test]
fn reset_without_reset_clip_is_an_error() {
    let (mut scene, node) = scene_with_box(2.0);
    let mut mixer = Mixer::default();
    mixer.add_animation("", "move", constant_clip("move", 10.0)).unwrap();
    assert!(!mixer.can_apply_reset());
    assert_eq!(mixer.reset(&mut scene), Err(MixerError::NoResetAnimation));
    assert_eq!(x(&scene, node), Some(&Value::Float(2.0)));
}

#[test]
fn restore_right_after_backup_changes_nothing() {
    let (mut scene, node) = scene_with_box(1.0);
    let mut mixer = Mixer::default();
    mixer.add_animation("", "move", constant_clip("move", 10.0)).unwrap();
    mixer
        .enqueue_instance("move", PlaybackInfo::new(0.0, 0.0).with_weight(0.5))
        .unwrap();
    mixer.advance(0.0, &mut scene);
    let before = x(&scene, node).cloned();
    assert_eq!(before, Some(Value::Float(5.5)));

    let backup = mixer.make_backup(&scene);
    assert_eq!(mixer.restore(&backup, &mut scene), 1);
    assert_eq!(x(&scene, node).cloned(), before);
}

#[test]
fn advance_without_instances_after_reset_keeps_rest_pose() {
    for deterministic in [false, true] {
        let (mut scene, node) = scene_with_box(0.0);
        let mut mixer = Mixer::default();
        mixer.set_deterministic(deterministic);
        mixer
            .add_animation("", RESET_ANIMATION, constant_clip(RESET_ANIMATION, 1.5))
            .unwrap();
        mixer.add_animation("", "move", constant_clip("move", 10.0)).unwrap();
        mixer.enqueue_instance("move", PlaybackInfo::new(0.0, 0.0)).unwrap();
        mixer.advance(0.0, &mut scene);

        mixer.reset(&mut scene).unwrap();
        mixer.advance(0.0, &mut scene);
        assert_eq!(
            x(&scene, node),
            Some(&Value::Float(1.5)),
            "deterministic = {deterministic}"
        );
    }
}
