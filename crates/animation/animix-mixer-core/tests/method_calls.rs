use animix_mixer_core::{
    Animation, CallbackModeMethod, Key, LoopMode, LoopedFlag, MethodKey, Mixer, ObjectId,
    PlaybackInfo, SceneTree, Track, TrackData, Value,
};

fn method_track(path: &str, keys: &[(f64, &str)]) -> Track {
    Track::parse(
        path,
        TrackData::Method {
            keys: keys
                .iter()
                .map(|(t, m)| {
                    Key::new(
                        *t,
                        MethodKey {
                            method: m.to_string(),
                            args: vec![Value::Float(*t as f32)],
                        },
                    )
                })
                .collect(),
        },
    )
    .unwrap()
}

fn setup(clip: Animation) -> (Mixer, SceneTree, ObjectId) {
    let mut scene = SceneTree::new();
    let node = scene.add_node(scene.root(), "Box").unwrap();
    let mut mixer = Mixer::default();
    let name = clip.name.clone();
    mixer.add_animation("", &name, clip).unwrap();
    (mixer, scene, node)
}

fn call_names(mixer: &mut Mixer) -> Vec<String> {
    mixer
        .take_outputs()
        .deferred_calls
        .into_iter()
        .map(|c| c.method)
        .collect()
}

#[test]
fn key_fires_once_when_crossed() {
    let clip = Animation::new("beep", 1.0).with_track(method_track("Box", &[(0.5, "beep")]));
    let (mut mixer, mut scene, node) = setup(clip);

    mixer.enqueue_instance("beep", PlaybackInfo::new(0.6, 0.6)).unwrap();
    mixer.advance(0.6, &mut scene);
    let out = mixer.take_outputs();
    assert_eq!(out.deferred_calls.len(), 1);
    assert_eq!(out.deferred_calls[0].object, node);
    assert_eq!(out.deferred_calls[0].args, vec![Value::Float(0.5)]);

    mixer.enqueue_instance("beep", PlaybackInfo::new(0.9, 0.3)).unwrap();
    mixer.advance(0.3, &mut scene);
    assert!(call_names(&mut mixer).is_empty());
}

#[test]
fn window_is_half_open_across_frames() {
    let clip = Animation::new("beep", 1.0).with_track(method_track("Box", &[(0.5, "beep")]));
    let (mut mixer, mut scene, _) = setup(clip);

    mixer.enqueue_instance("beep", PlaybackInfo::new(0.4, 0.4)).unwrap();
    mixer.advance(0.4, &mut scene);
    assert!(call_names(&mut mixer).is_empty());

    mixer.enqueue_instance("beep", PlaybackInfo::new(0.5, 0.1)).unwrap();
    mixer.advance(0.1, &mut scene);
    assert!(call_names(&mut mixer).is_empty());

    mixer.enqueue_instance("beep", PlaybackInfo::new(0.6, 0.1)).unwrap();
    mixer.advance(0.1, &mut scene);
    assert_eq!(call_names(&mut mixer), vec!["beep".to_string()]);
}

#[test]
fn non_looping_clip_fires_key_at_its_end() {
    let clip = Animation::new("end", 1.0).with_track(method_track("Box", &[(1.0, "done")]));
    let (mut mixer, mut scene, _) = setup(clip);
    mixer.enqueue_instance("end", PlaybackInfo::new(1.0, 0.2)).unwrap();
    mixer.advance(0.2, &mut scene);
    assert_eq!(call_names(&mut mixer), vec!["done".to_string()]);
}

#[test]
fn backward_playback_fires_in_descending_order() {
    let clip = Animation::new("rev", 1.0)
        .with_track(method_track("Box", &[(0.2, "first"), (0.4, "second")]));
    let (mut mixer, mut scene, _) = setup(clip);
    mixer.enqueue_instance("rev", PlaybackInfo::new(0.1, -0.4)).unwrap();
    mixer.advance(0.4, &mut scene);
    assert_eq!(
        call_names(&mut mixer),
        vec!["second".to_string(), "first".to_string()]
    );
}

#[test]
fn loop_wrap_fires_tail_then_head() {
    let clip = Animation::new("loop", 1.0)
        .with_loop_mode(LoopMode::Linear)
        .with_track(method_track("Box", &[(0.1, "head"), (0.9, "tail")]));
    let (mut mixer, mut scene, _) = setup(clip);
    mixer
        .enqueue_instance(
            "loop",
            PlaybackInfo::new(0.2, 0.4).with_looped(LoopedFlag::End),
        )
        .unwrap();
    mixer.advance(0.4, &mut scene);
    assert_eq!(
        call_names(&mut mixer),
        vec!["tail".to_string(), "head".to_string()]
    );
}

#[test]
fn seeks_fire_only_exact_keys_and_never_when_external() {
    let clip = Animation::new("beep", 1.0).with_track(method_track("Box", &[(0.5, "beep")]));
    let (mut mixer, mut scene, _) = setup(clip);

    mixer.enqueue_instance("beep", PlaybackInfo::seek(0.5, false)).unwrap();
    mixer.advance(0.0, &mut scene);
    assert_eq!(call_names(&mut mixer), vec!["beep".to_string()]);

    mixer.enqueue_instance("beep", PlaybackInfo::seek(0.5, true)).unwrap();
    mixer.advance(0.0, &mut scene);
    assert!(call_names(&mut mixer).is_empty());

    mixer.enqueue_instance("beep", PlaybackInfo::seek(0.55, false)).unwrap();
    mixer.advance(0.0, &mut scene);
    assert!(call_names(&mut mixer).is_empty());
}

#[test]
fn zero_weight_suppresses_calls() {
    let clip = Animation::new("beep", 1.0).with_track(method_track("Box", &[(0.5, "beep")]));
    let (mut mixer, mut scene, _) = setup(clip);
    mixer
        .enqueue_instance("beep", PlaybackInfo::new(0.6, 0.6).with_weight(0.0))
        .unwrap();
    mixer.advance(0.6, &mut scene);
    assert!(call_names(&mut mixer).is_empty());
}

#[test]
fn immediate_mode_calls_during_apply() {
    let clip = Animation::new("beep", 1.0).with_track(method_track("Box", &[(0.5, "beep")]));
    let (mut mixer, mut scene, node) = setup(clip);
    mixer.set_callback_mode_method(CallbackModeMethod::Immediate);

    mixer.enqueue_instance("beep", PlaybackInfo::new(0.6, 0.6)).unwrap();
    let out = mixer.advance(0.6, &mut scene);
    assert!(out.deferred_calls.is_empty());
    assert_eq!(scene.calls(node).len(), 1);
    assert_eq!(scene.calls(node)[0].method, "beep");
}

#[test]
fn deferred_calls_are_delivered_on_flush() {
    let clip = Animation::new("beep", 1.0)
        .with_track(method_track("Box", &[(0.2, "one"), (0.4, "two")]));
    let (mut mixer, mut scene, node) = setup(clip);

    mixer.enqueue_instance("beep", PlaybackInfo::new(0.6, 0.6)).unwrap();
    mixer.advance(0.6, &mut scene);
    assert!(scene.calls(node).is_empty());

    let mut out = mixer.take_outputs();
    assert_eq!(out.flush_deferred(&mut scene), 2);
    let methods: Vec<&str> = scene.calls(node).iter().map(|c| c.method.as_str()).collect();
    assert_eq!(methods, vec!["one", "two"]);
    assert!(out.deferred_calls.is_empty());
}

#[test]
fn deferred_calls_to_removed_objects_are_dropped() {
    let clip = Animation::new("beep", 1.0).with_track(method_track("Box", &[(0.5, "beep")]));
    let (mut mixer, mut scene, node) = setup(clip);
    mixer.enqueue_instance("beep", PlaybackInfo::new(0.6, 0.6)).unwrap();
    mixer.advance(0.6, &mut scene);
    let mut out = mixer.take_outputs();
    assert!(scene.remove_node(node));
    assert_eq!(out.flush_deferred(&mut scene), 0);
}
