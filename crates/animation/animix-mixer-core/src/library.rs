//! Animation libraries and the flattened animation set.
//!
//! Libraries are named collections of clips. The mixer flattens every
//! registered library into one animation set keyed by qualified name:
//! `name` for the default library (`""`), `library/name` otherwise.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::data::Animation;
use crate::error::MixerError;
use crate::ids::LibraryId;

const RESERVED_CHARS: [char; 4] = ['/', ':', ',', '['];

/// Validate a clip name: non-empty, no path or list separators.
pub fn validate_animation_name(name: &str) -> Result<(), MixerError> {
    if name.is_empty() || name.contains(RESERVED_CHARS) {
        return Err(MixerError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Validate a library name. The empty name is the default library.
pub fn validate_library_name(name: &str) -> Result<(), MixerError> {
    if name.contains(RESERVED_CHARS) {
        return Err(MixerError::InvalidLibraryName(name.to_string()));
    }
    Ok(())
}

/// Join a library and clip name into the qualified animation-set name.
pub fn qualified_name(library: &str, name: &str) -> String {
    if library.is_empty() {
        name.to_string()
    } else {
        format!("{library}/{name}")
    }
}

/// A named collection of clips, enumerated in lexicographic order.
///
/// `Clone` keeps the [`LibraryId`]; use [`AnimationLibrary::duplicate`] for
/// an independent library with the same clips.
#[derive(Clone, Debug)]
pub struct AnimationLibrary {
    id: LibraryId,
    animations: BTreeMap<String, Arc<Animation>>,
}

impl Default for AnimationLibrary {
    fn default() -> Self {
        Self {
            id: LibraryId::next(),
            animations: BTreeMap::new(),
        }
    }
}

impl AnimationLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn id(&self) -> LibraryId {
        self.id
    }

    /// Same clips under a fresh id.
    pub fn duplicate(&self) -> Self {
        Self {
            id: LibraryId::next(),
            animations: self.animations.clone(),
        }
    }

    /// Build a library keyed by each clip's own name.
    pub fn from_animations(
        animations: impl IntoIterator<Item = Animation>,
    ) -> Result<Self, MixerError> {
        let mut lib = Self::new();
        for anim in animations {
            let name = anim.name.clone();
            lib.add_animation(&name, anim)?;
        }
        Ok(lib)
    }

    pub fn add_animation(&mut self, name: &str, animation: Animation) -> Result<(), MixerError> {
        validate_animation_name(name)?;
        animation.validate()?;
        if self.animations.contains_key(name) {
            return Err(MixerError::DuplicateAnimation {
                library: String::new(),
                name: name.to_string(),
            });
        }
        self.animations.insert(name.to_string(), Arc::new(animation));
        Ok(())
    }

    pub fn remove_animation(&mut self, name: &str) -> Result<Arc<Animation>, MixerError> {
        self.animations
            .remove(name)
            .ok_or_else(|| MixerError::AnimationNotFound(name.to_string()))
    }

    pub fn rename_animation(&mut self, from: &str, to: &str) -> Result<(), MixerError> {
        validate_animation_name(to)?;
        if self.animations.contains_key(to) {
            return Err(MixerError::DuplicateAnimation {
                library: String::new(),
                name: to.to_string(),
            });
        }
        let anim = self.remove_animation(from)?;
        self.animations.insert(to.to_string(), anim);
        Ok(())
    }

    /// Swap the clip stored under `name`; the new clip counts as an edit.
    pub fn replace_animation(
        &mut self,
        name: &str,
        animation: Animation,
    ) -> Result<(), MixerError> {
        animation.validate()?;
        let slot = self
            .animations
            .get_mut(name)
            .ok_or_else(|| MixerError::AnimationNotFound(name.to_string()))?;
        *slot = Arc::new(animation);
        Ok(())
    }

    pub fn animation(&self, name: &str) -> Option<&Arc<Animation>> {
        self.animations.get(name)
    }

    pub fn has_animation(&self, name: &str) -> bool {
        self.animations.contains_key(name)
    }

    pub fn animation_names(&self) -> Vec<String> {
        self.animations.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Arc<Animation>)> {
        self.animations.iter()
    }

    pub fn len(&self) -> usize {
        self.animations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.animations.is_empty()
    }
}

/// One clip of the flattened animation set.
#[derive(Clone, Debug)]
pub struct AnimationEntry {
    /// Qualified name (`name` or `library/name`).
    pub name: String,
    pub animation: Arc<Animation>,
    pub library: String,
    /// Update pass at which this clip last changed; compared against the
    /// cache's pass to decide whether the track cache must be rebuilt.
    pub last_update: u64,
}

/// Qualified-name index over every registered library.
#[derive(Clone, Debug, Default)]
pub struct AnimationSet {
    entries: BTreeMap<String, AnimationEntry>,
    update_pass: u64,
}

impl AnimationSet {
    /// Re-flatten `libraries`. Entries whose clip is unchanged keep their
    /// `last_update`; new or edited clips get a fresh pass.
    pub fn rebuild(&mut self, libraries: &BTreeMap<String, Arc<AnimationLibrary>>) {
        self.update_pass += 1;
        let mut next = BTreeMap::new();
        for (lib_name, lib) in libraries {
            for (anim_name, anim) in lib.iter() {
                let name = qualified_name(lib_name, anim_name);
                let last_update = match self.entries.get(&name) {
                    Some(prev) if Arc::ptr_eq(&prev.animation, anim) => prev.last_update,
                    _ => self.update_pass,
                };
                next.insert(
                    name.clone(),
                    AnimationEntry {
                        name,
                        animation: Arc::clone(anim),
                        library: lib_name.clone(),
                        last_update,
                    },
                );
            }
        }
        log::trace!(
            "animation set rebuilt: {} clips at pass {}",
            next.len(),
            self.update_pass
        );
        self.entries = next;
    }

    pub fn get(&self, name: &str) -> Option<&AnimationEntry> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Entries in qualified-name order.
    pub fn iter(&self) -> impl Iterator<Item = &AnimationEntry> {
        self.entries.values()
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Latest pass at which any entry changed.
    pub fn latest_update(&self) -> u64 {
        self.entries.values().map(|e| e.last_update).max().unwrap_or(0)
    }

    /// Qualified name of the entry holding exactly this clip.
    pub fn find(&self, animation: &Arc<Animation>) -> Option<&str> {
        self.entries
            .values()
            .find(|e| Arc::ptr_eq(&e.animation, animation))
            .map(|e| e.name.as_str())
    }
}
