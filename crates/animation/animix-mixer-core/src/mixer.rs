//! The mixer: libraries, the instance queue and the frame driver.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use animix_api_core::PropertyPath;
use hashbrown::{HashMap, HashSet};

use crate::cache::{Binding, CacheKey, CachePayload, TrackCacheMap};
use crate::config::{
    CallbackModeMethod, CallbackModeProcess, MixerConfig, MAX_AUDIO_POLYPHONY, MIN_AUDIO_POLYPHONY,
};
use crate::data::{Animation, RESET_ANIMATION};
use crate::error::MixerError;
use crate::host::{HostTick, SceneAccess};
use crate::ids::IdAllocator;
use crate::library::{
    qualified_name, validate_animation_name, validate_library_name, AnimationEntry,
    AnimationLibrary, AnimationSet,
};
use crate::outputs::{MethodCall, NestedAction, NestedCommand, Outputs};
use crate::pipeline::{BlendContext, DefaultHooks, MixerHooks};
use crate::playback::{AnimationInstance, PlaybackInfo};

/// Parse a root node path. `""` and `"."` are the host root; sub-names are
/// not allowed.
pub(crate) fn parse_root(path: &str) -> Result<PropertyPath, MixerError> {
    if path.is_empty() || path == "." {
        return Ok(PropertyPath::default());
    }
    let parsed = PropertyPath::parse(path).map_err(|e| MixerError::InvalidRootNode {
        path: path.to_string(),
        reason: e.to_string(),
    })?;
    if parsed.has_subnames() {
        return Err(MixerError::InvalidRootNode {
            path: path.to_string(),
            reason: "root must be a node path".to_string(),
        });
    }
    Ok(parsed)
}

pub struct Mixer {
    pub(crate) config: MixerConfig,
    pub(crate) root: PropertyPath,
    pub(crate) libraries: BTreeMap<String, Arc<AnimationLibrary>>,
    pub(crate) animation_set: AnimationSet,
    pub(crate) instances: Vec<AnimationInstance>,
    pub(crate) cache: TrackCacheMap,
    pub(crate) bindings: HashMap<String, Binding>,
    pub(crate) setup_pass: u64,
    pub(crate) cache_pass: u64,
    pub(crate) cache_valid: bool,
    /// Nested-animation entries whose player is currently running.
    pub(crate) playing_caches: HashSet<CacheKey>,
    pub(crate) ids: IdAllocator,
    pub(crate) frame_calls: Vec<MethodCall>,
    pub(crate) frame_nested: Vec<NestedCommand>,
    pub(crate) outputs: Outputs,
    pub(crate) hooks: Box<dyn MixerHooks>,
}

impl fmt::Debug for Mixer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mixer")
            .field("config", &self.config)
            .field("animations", &self.animation_set.len())
            .field("instances", &self.instances.len())
            .field("cache_entries", &self.cache.len())
            .field("cache_valid", &self.cache_valid)
            .finish()
    }
}

impl Default for Mixer {
    fn default() -> Self {
        Self::with_root(MixerConfig::default(), PropertyPath::default())
    }
}

impl Mixer {
    pub fn new(config: MixerConfig) -> Result<Self, MixerError> {
        config.validate()?;
        let root = parse_root(&config.root_node)?;
        Ok(Self::with_root(config, root))
    }

    fn with_root(config: MixerConfig, root: PropertyPath) -> Self {
        Self {
            config,
            root,
            libraries: BTreeMap::new(),
            animation_set: AnimationSet::default(),
            instances: Vec::new(),
            cache: TrackCacheMap::default(),
            bindings: HashMap::new(),
            setup_pass: 0,
            cache_pass: 0,
            cache_valid: false,
            playing_caches: HashSet::new(),
            ids: IdAllocator::new(),
            frame_calls: Vec::new(),
            frame_nested: Vec::new(),
            outputs: Outputs::default(),
            hooks: Box::new(DefaultHooks),
        }
    }

    pub fn config(&self) -> &MixerConfig {
        &self.config
    }

    pub fn set_hooks(&mut self, hooks: Box<dyn MixerHooks>) {
        self.hooks = hooks;
    }

    // ----- configuration -----

    pub fn is_active(&self) -> bool {
        self.config.active
    }

    /// Deactivating stops nested players and every audio voice.
    pub fn set_active(&mut self, active: bool) {
        if self.config.active == active {
            return;
        }
        self.config.active = active;
        if !active {
            self.stop_playing_caches();
            self.stop_audio();
        }
    }

    pub fn is_deterministic(&self) -> bool {
        self.config.deterministic
    }

    pub fn set_deterministic(&mut self, deterministic: bool) {
        self.config.deterministic = deterministic;
    }

    pub fn root_node(&self) -> &PropertyPath {
        &self.root
    }

    /// Change the node every track path resolves against. Forces a rebuild.
    pub fn set_root_node(&mut self, path: &str) -> Result<(), MixerError> {
        self.root = parse_root(path)?;
        self.config.root_node = path.to_string();
        self.cache_valid = false;
        Ok(())
    }

    pub fn set_callback_mode_process(&mut self, mode: CallbackModeProcess) {
        self.config.callback_mode_process = mode;
    }

    pub fn set_callback_mode_method(&mut self, mode: CallbackModeMethod) {
        self.config.callback_mode_method = mode;
    }

    /// New voice starts are checked against the new limit from the next frame
    /// on. Playbacks already open keep the `max_polyphony` they were opened with.
    pub fn set_audio_max_polyphony(&mut self, max: usize) -> Result<(), MixerError> {
        if !(MIN_AUDIO_POLYPHONY..=MAX_AUDIO_POLYPHONY).contains(&max) {
            return Err(MixerError::InvalidPolyphony(max));
        }
        self.config.audio_max_polyphony = max;
        Ok(())
    }

    // ----- libraries -----

    pub fn add_animation_library(
        &mut self,
        name: &str,
        library: Arc<AnimationLibrary>,
    ) -> Result<(), MixerError> {
        validate_library_name(name)?;
        if self.libraries.contains_key(name) {
            return Err(MixerError::DuplicateLibrary(name.to_string()));
        }
        if let Some(existing) = self.find_animation_library(&library) {
            return Err(MixerError::LibraryAlreadyAdded(existing.to_string()));
        }
        self.libraries.insert(name.to_string(), library);
        self.animation_set_changed();
        Ok(())
    }

    pub fn remove_animation_library(
        &mut self,
        name: &str,
    ) -> Result<Arc<AnimationLibrary>, MixerError> {
        let lib = self
            .libraries
            .remove(name)
            .ok_or_else(|| MixerError::LibraryNotFound(name.to_string()))?;
        self.animation_set_changed();
        Ok(lib)
    }

    pub fn rename_animation_library(&mut self, from: &str, to: &str) -> Result<(), MixerError> {
        if from == to {
            return Ok(());
        }
        validate_library_name(to)?;
        if self.libraries.contains_key(to) {
            return Err(MixerError::DuplicateLibrary(to.to_string()));
        }
        let lib = self
            .libraries
            .remove(from)
            .ok_or_else(|| MixerError::LibraryNotFound(from.to_string()))?;
        self.libraries.insert(to.to_string(), lib);
        self.animation_set_changed();
        Ok(())
    }

    pub fn has_animation_library(&self, name: &str) -> bool {
        self.libraries.contains_key(name)
    }

    pub fn animation_library(&self, name: &str) -> Option<&Arc<AnimationLibrary>> {
        self.libraries.get(name)
    }

    /// Library names in lexicographic order.
    pub fn animation_library_list(&self) -> Vec<String> {
        self.libraries.keys().cloned().collect()
    }

    /// Name under which `library` is registered, matched by [`AnimationLibrary::id`].
    pub fn find_animation_library(&self, library: &AnimationLibrary) -> Option<&str> {
        self.libraries
            .iter()
            .find(|(_, l)| l.id() == library.id())
            .map(|(name, _)| name.as_str())
    }

    /// Edits go to the mixer's own copy once the caller shares the `Arc`;
    /// the copy keeps the library's id.
    fn library_mut(&mut self, library: &str) -> Result<&mut AnimationLibrary, MixerError> {
        let lib = self
            .libraries
            .get_mut(library)
            .ok_or_else(|| MixerError::LibraryNotFound(library.to_string()))?;
        Ok(Arc::make_mut(lib))
    }

    /// Add a clip to a library; the default library (`""`) is created on demand.
    pub fn add_animation(
        &mut self,
        library: &str,
        name: &str,
        animation: Animation,
    ) -> Result<(), MixerError> {
        validate_animation_name(name)?;
        if library.is_empty() && !self.libraries.contains_key("") {
            self.libraries
                .insert(String::new(), Arc::new(AnimationLibrary::new()));
        }
        let lib = self.library_mut(library)?;
        if lib.has_animation(name) {
            return Err(MixerError::DuplicateAnimation {
                library: library.to_string(),
                name: name.to_string(),
            });
        }
        lib.add_animation(name, animation)?;
        self.animation_set_changed();
        Ok(())
    }

    pub fn remove_animation(&mut self, library: &str, name: &str) -> Result<(), MixerError> {
        self.library_mut(library)?.remove_animation(name)?;
        self.animation_set_changed();
        Ok(())
    }

    pub fn rename_animation(
        &mut self,
        library: &str,
        from: &str,
        to: &str,
    ) -> Result<(), MixerError> {
        self.library_mut(library)?
            .rename_animation(from, to)
            .map_err(|e| match e {
                MixerError::DuplicateAnimation { name, .. } => MixerError::DuplicateAnimation {
                    library: library.to_string(),
                    name,
                },
                other => other,
            })?;
        self.animation_set_changed();
        Ok(())
    }

    /// Swap a clip's contents. Entries built from it are refreshed on the next frame.
    pub fn replace_animation(
        &mut self,
        library: &str,
        name: &str,
        animation: Animation,
    ) -> Result<(), MixerError> {
        self.library_mut(library)?.replace_animation(name, animation)?;
        self.animation_set_changed();
        Ok(())
    }

    fn animation_set_changed(&mut self) {
        self.animation_set.rebuild(&self.libraries);
        self.cache_valid = false;
    }

    // ----- animation set -----

    /// Qualified names in lexicographic order.
    pub fn animation_list(&self) -> Vec<String> {
        self.animation_set.names()
    }

    pub fn has_animation(&self, name: &str) -> bool {
        self.animation_set.contains(name)
    }

    pub fn animation(&self, name: &str) -> Option<&Arc<Animation>> {
        self.animation_set.get(name).map(|e| &e.animation)
    }

    pub fn animation_entry(&self, name: &str) -> Option<&AnimationEntry> {
        self.animation_set.get(name)
    }

    /// Qualified name of a registered clip.
    pub fn find_animation(&self, animation: &Arc<Animation>) -> Option<&str> {
        self.animation_set.find(animation)
    }

    pub fn can_apply_reset(&self) -> bool {
        self.animation_set.contains(RESET_ANIMATION)
    }

    // ----- frame driver -----

    /// Queue a playback of `name` for the next `advance`.
    pub fn enqueue_instance(
        &mut self,
        name: &str,
        playback: PlaybackInfo,
    ) -> Result<(), MixerError> {
        let entry = self
            .animation_set
            .get(name)
            .ok_or_else(|| MixerError::AnimationNotFound(name.to_string()))?;
        self.instances.push(AnimationInstance {
            name: entry.name.clone(),
            animation: Arc::clone(&entry.animation),
            playback,
        });
        Ok(())
    }

    /// Convenience for `enqueue_instance` with a `library/name` split.
    pub fn enqueue_library_instance(
        &mut self,
        library: &str,
        name: &str,
        playback: PlaybackInfo,
    ) -> Result<(), MixerError> {
        self.enqueue_instance(&qualified_name(library, name), playback)
    }

    pub fn clear_instances(&mut self) {
        self.instances.clear();
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    /// Run the full pipeline once. Commands accumulate in the returned
    /// outputs until the host takes them.
    pub fn advance(&mut self, delta: f64, scene: &mut dyn SceneAccess) -> &Outputs {
        self.process_animation(delta, scene);
        &self.outputs
    }

    /// Advance if the mixer is active and the tick matches the process mode.
    pub fn tick(&mut self, tick: HostTick, scene: &mut dyn SceneAccess) -> Option<&Outputs> {
        if !self.config.active {
            return None;
        }
        let matches = matches!(
            (tick, self.config.callback_mode_process),
            (HostTick::Physics(_), CallbackModeProcess::Physics)
                | (HostTick::Idle(_), CallbackModeProcess::Idle)
        );
        if !matches {
            return None;
        }
        Some(self.advance(tick.delta(), scene))
    }

    fn process_animation(&mut self, delta: f64, scene: &mut dyn SceneAccess) {
        if let Err(err) = self.update_caches(&*scene) {
            log::warn!("animation mixer skipped a frame: {err}");
            self.instances.clear();
            return;
        }
        self.blend_init();
        let proceed = {
            let mut ctx = BlendContext {
                delta,
                track_count: self.cache.len(),
                instances: &mut self.instances,
            };
            self.hooks.pre_process(&mut ctx)
        };
        if proceed {
            self.drop_stale_instances();
            if !self.config.deterministic {
                self.blend_calc_total_weight();
            }
            self.blend_process();
            self.blend_apply(scene);
        }
        self.hooks.post_process();
        self.instances.clear();
    }

    pub fn outputs(&self) -> &Outputs {
        &self.outputs
    }

    /// Move all pending commands out to the host.
    pub fn take_outputs(&mut self) -> Outputs {
        self.outputs.take()
    }

    // ----- teardown -----

    fn stop_playing_caches(&mut self) {
        for key in self.playing_caches.drain() {
            if let Some(entry) = self.cache.entries.get_mut(&key) {
                if let CachePayload::Animation(nested) = &mut entry.payload {
                    if nested.playing {
                        nested.playing = false;
                        self.outputs.nested.push(NestedCommand {
                            object: entry.object,
                            action: NestedAction::Stop,
                        });
                    }
                }
            }
        }
    }

    fn stop_audio(&mut self) {
        for key in &self.cache.order {
            if let Some(entry) = self.cache.entries.get_mut(key) {
                if let CachePayload::Audio(ac) = &mut entry.payload {
                    crate::audio::stop_all(ac, &mut self.outputs);
                }
            }
        }
    }

    /// Drop every cache entry, stopping nested players and audio and
    /// discarding unflushed per-frame state. Safe between frames.
    pub fn clear_caches(&mut self) {
        self.stop_playing_caches();
        let order = std::mem::take(&mut self.cache.order);
        for key in order {
            if let Some(entry) = self.cache.entries.remove(&key) {
                self.release_entry(&key, entry);
            }
        }
        let leftover: Vec<_> = self.cache.entries.drain().collect();
        for (key, entry) in leftover {
            self.release_entry(&key, entry);
        }
        self.bindings.clear();
        self.frame_calls.clear();
        self.frame_nested.clear();
        self.cache_valid = false;
    }
}
