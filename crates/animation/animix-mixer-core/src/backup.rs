//! Snapshots of animated property values.

use crate::cache::{CachePayload, TrackCacheMap};
use crate::error::MixerError;
use crate::host::SceneAccess;
use crate::mixer::Mixer;
use crate::pipeline::write_entry;

/// An owned copy of the track cache whose values were read back from the
/// scene when the backup was taken.
#[derive(Clone, Debug, PartialEq)]
pub struct Backup {
    cache: TrackCacheMap,
}

impl Backup {
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn entries(&self) -> &TrackCacheMap {
        &self.cache
    }
}

impl Mixer {
    /// Capture the live value of every cached property.
    ///
    /// The cache is brought up to date first so properties of newly added
    /// clips are included.
    pub fn make_backup(&mut self, scene: &dyn SceneAccess) -> Backup {
        if let Err(err) = self.update_caches(scene) {
            log::warn!("backup taken from a stale track cache: {err}");
        }
        let mut cache = self.cache.clone();
        for entry in cache.entries.values_mut() {
            entry.total_weight = 1.0;
            if !scene.is_alive(entry.object) {
                continue;
            }
            match &mut entry.payload {
                CachePayload::Value(vc) => {
                    if let Some(v) = scene.read(entry.object, &entry.subpath) {
                        vc.value = v;
                    }
                }
                CachePayload::BlendShape(bs) => {
                    if let Some(v) = scene.read_blend_shape(entry.object, bs.shape_index) {
                        bs.value = v;
                    }
                }
                CachePayload::Bezier(bz) => {
                    let live = scene.read(entry.object, &entry.subpath);
                    if let Some(v) = live.and_then(|v| v.as_float()) {
                        bz.value = v;
                    }
                }
                _ => {}
            }
        }
        Backup { cache }
    }

    /// Write every value captured in `backup` back to its target. The live
    /// cache is not touched; entries whose target is gone are skipped.
    pub fn restore(&self, backup: &Backup, scene: &mut dyn SceneAccess) -> usize {
        let mut written = 0;
        for (_, entry) in backup.cache.iter() {
            if !scene.is_alive(entry.object) {
                continue;
            }
            if write_entry(scene, entry, false) {
                written += 1;
            }
        }
        written
    }

    /// Return every animated property to its rest pose (RESET first keys,
    /// or the value captured when the entry was created).
    pub fn reset(&mut self, scene: &mut dyn SceneAccess) -> Result<(), MixerError> {
        if !self.can_apply_reset() {
            return Err(MixerError::NoResetAnimation);
        }
        self.update_caches(&*scene)?;
        for (_, entry) in self.cache.iter() {
            if scene.is_alive(entry.object) {
                write_entry(scene, entry, true);
            }
        }
        Ok(())
    }
}
