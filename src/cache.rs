//! Reusable-sound cache
//!
//! Wave presenters hand a fully received payload over once; later actions can
//! replay it instantly without streaming. The streaming path only writes here.

use crate::wave::WaveFormat;
use std::collections::HashMap;
use std::sync::Arc;

/// A complete, immutable PCM payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedSound {
    /// Format of `data`.
    pub format: WaveFormat,
    /// Sample bytes.
    pub data: Arc<[u8]>,
}

impl CachedSound {
    /// Wrap a payload.
    pub fn new(format: WaveFormat, data: Vec<u8>) -> Self {
        CachedSound {
            format,
            data: data.into(),
        }
    }

    /// Payload size in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True for an empty payload.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Sounds keyed by name.
#[derive(Debug, Default)]
pub struct SoundCache {
    sounds: HashMap<String, CachedSound>,
}

impl SoundCache {
    /// Empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a sound, replacing any previous entry of the same name.
    pub fn insert(&mut self, name: impl Into<String>, sound: CachedSound) {
        let name = name.into();
        log::debug!("cached '{}' ({} bytes)", name, sound.len());
        self.sounds.insert(name, sound);
    }

    /// Look up a sound.
    pub fn get(&self, name: &str) -> Option<&CachedSound> {
        self.sounds.get(name)
    }

    /// True if `name` is cached.
    pub fn contains(&self, name: &str) -> bool {
        self.sounds.contains_key(name)
    }

    /// Drop a sound.
    pub fn remove(&mut self, name: &str) -> Option<CachedSound> {
        self.sounds.remove(name)
    }

    /// Number of cached sounds.
    pub fn len(&self) -> usize {
        self.sounds.len()
    }

    /// True when nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.sounds.is_empty()
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.sounds.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_replace_remove() {
        let format = WaveFormat::pcm(8_000, 8, 1);
        let mut cache = SoundCache::new();
        cache.insert("door", CachedSound::new(format, vec![1, 2, 3]));
        cache.insert("door", CachedSound::new(format, vec![4]));

        assert_eq!(cache.len(), 1);
        assert_eq!(&*cache.get("door").unwrap().data, &[4]);
        assert!(cache.remove("door").is_some());
        assert!(cache.is_empty());
    }
}
