//! # Handle Cache
//!
//! Direct-mapped cache in front of a table's name index.
//!
//! Render submission resolves the same pass, pipeline and material names
//! every frame; in steady state those lookups hit here and never probe the
//! index. Slots use interior mutability so that read-only lookups can prime
//! the cache.

use std::cell::Cell;

use crate::error::{ResourceError, ResourceResult};

/// Hit and miss counters of a [`HandleCache`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups answered by the cache.
    pub hits: u64,
    /// Lookups that fell through to the index.
    pub misses: u64,
}

impl CacheStats {
    /// Fraction of lookups that hit, `0.0` before the first lookup.
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Direct-mapped (name hash → raw handle) cache.
#[derive(Debug)]
pub struct HandleCache {
    slots: Box<[Cell<Option<(u64, u32)>>]>,
    mask: u64,
    hits: Cell<u64>,
    misses: Cell<u64>,
}

impl HandleCache {
    /// Creates an empty cache with `slots` entries.
    ///
    /// # Errors
    ///
    /// `InvalidLayout` unless `slots` is a non-zero power of two.
    pub fn new(table: &'static str, slots: usize) -> ResourceResult<Self> {
        if !slots.is_power_of_two() {
            return Err(ResourceError::InvalidLayout {
                table,
                reason: "handle cache size must be a non-zero power of two",
            });
        }
        Ok(Self {
            slots: (0..slots).map(|_| Cell::new(None)).collect(),
            mask: slots as u64 - 1,
            hits: Cell::new(0),
            misses: Cell::new(0),
        })
    }

    /// Looks up `hash`, counting the hit or miss.
    #[inline]
    pub fn lookup(&self, hash: u64) -> Option<u32> {
        match self.slot(hash).get() {
            Some((cached, raw)) if cached == hash => {
                self.hits.set(self.hits.get() + 1);
                Some(raw)
            }
            _ => {
                self.misses.set(self.misses.get() + 1);
                None
            }
        }
    }

    /// Stores `hash → raw`, evicting whatever shared the slot.
    #[inline]
    pub fn insert(&self, hash: u64, raw: u32) {
        self.slot(hash).set(Some((hash, raw)));
    }

    /// Drops `hash` if it is cached.
    pub fn invalidate(&self, hash: u64) {
        let slot = self.slot(hash);
        if matches!(slot.get(), Some((cached, _)) if cached == hash) {
            slot.set(None);
        }
    }

    /// Empties every slot. Counters are kept.
    pub fn clear(&self) {
        for slot in self.slots.iter() {
            slot.set(None);
        }
    }

    /// Number of slots.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Always `false`: construction rejects an empty cache.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Hit and miss counts so far.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.get(),
            misses: self.misses.get(),
        }
    }

    #[inline]
    fn slot(&self, hash: u64) -> &Cell<Option<(u64, u32)>> {
        // Fold the high half into the slot index.
        let folded = hash ^ (hash >> 32);
        &self.slots[(folded & self.mask) as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_miss_then_hit() {
        let cache = HandleCache::new("test", 8).unwrap();
        assert_eq!(cache.lookup(42), None);
        cache.insert(42, 3);
        assert_eq!(cache.lookup(42), Some(3));
        assert_eq!(cache.stats(), CacheStats { hits: 1, misses: 1 });
        assert!((cache.stats().hit_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_conflicting_hash_evicts() {
        let cache = HandleCache::new("test", 4).unwrap();
        // Same slot: identical low bits after folding.
        cache.insert(1, 10);
        cache.insert(5, 50);
        assert_eq!(cache.lookup(1), None);
        assert_eq!(cache.lookup(5), Some(50));
    }

    #[test]
    fn test_invalidate_only_matching() {
        let cache = HandleCache::new("test", 4).unwrap();
        cache.insert(5, 50);
        cache.invalidate(1);
        assert_eq!(cache.lookup(5), Some(50));
        cache.invalidate(5);
        assert_eq!(cache.lookup(5), None);
    }

    #[test]
    fn test_size_must_be_power_of_two() {
        assert!(HandleCache::new("test", 0).is_err());
        assert!(HandleCache::new("test", 12).is_err());
        assert_eq!(HandleCache::new("test", 16).unwrap().len(), 16);
    }
}
