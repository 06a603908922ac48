//! Identifiers for target objects, libraries and audio handles.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Generation-checked handle to a target object owned by the host.
///
/// The mixer never owns targets; a destroyed object is detected by the host
/// rejecting a stale generation.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId {
    pub index: u32,
    pub generation: u32,
}

impl ObjectId {
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }
}

/// One polyphonic stream playback opened for an audio track.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct PlaybackId(pub u32);

/// One voice started on a polyphonic playback.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct VoiceId(pub u32);

/// Identity of an animation library. Clones keep it, so a copy-on-write
/// edit does not turn a library into a different one.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct LibraryId(u64);

impl LibraryId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Monotonic allocator for playback and voice handles.
#[derive(Default, Debug)]
pub struct IdAllocator {
    next_playback: u32,
    next_voice: u32,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn alloc_playback(&mut self) -> PlaybackId {
        let id = PlaybackId(self.next_playback);
        self.next_playback = self.next_playback.wrapping_add(1);
        id
    }

    #[inline]
    pub fn alloc_voice(&mut self) -> VoiceId {
        let id = VoiceId(self.next_voice);
        self.next_voice = self.next_voice.wrapping_add(1);
        id
    }
}
