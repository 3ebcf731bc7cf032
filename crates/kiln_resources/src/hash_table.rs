//! # Fixed Hash Table
//!
//! A bucketed open-addressing map from [`ConstantString`] to a small value,
//! laid out once and never grown.
//!
//! ## Layout
//!
//! ```text
//! bucket 0: [ slot | slot | slot | slot ]   <- bucket_size slots
//! bucket 1: [ slot | slot | ....        ]
//! ...                                       <- bucket_count buckets
//! ```
//!
//! A key starts at bucket `hash % bucket_count` and may spill into the next
//! `max_probes - 1` buckets. Lookups always scan the full probe window, so
//! removal simply clears a slot.

use crate::error::{ResourceError, ResourceResult};
use crate::ConstantString;

#[derive(Clone, Copy, Debug)]
struct Entry<V> {
    key: ConstantString,
    value: V,
}

/// Fixed-layout hash map keyed by name hash.
///
/// Used standalone for entity-name maps and as the name index of every
/// [`ResourceManager`](crate::ResourceManager).
#[derive(Debug)]
pub struct FixedHashTable<V> {
    name: &'static str,
    slots: Box<[Option<Entry<V>>]>,
    bucket_count: usize,
    bucket_size: usize,
    max_probes: usize,
    len: usize,
}

impl<V: Copy> FixedHashTable<V> {
    /// Creates an empty table.
    ///
    /// # Arguments
    ///
    /// * `name` - Debug name reported in errors (e.g. `"map.entities"`)
    /// * `bucket_count` - Number of buckets
    /// * `bucket_size` - Slots per bucket
    /// * `max_probes` - Buckets scanned per key, clamped to `bucket_count`
    ///
    /// # Errors
    ///
    /// `InvalidLayout` if any dimension is zero or the slot count overflows.
    pub fn new(
        name: &'static str,
        bucket_count: usize,
        bucket_size: usize,
        max_probes: usize,
    ) -> ResourceResult<Self> {
        if bucket_count == 0 || bucket_size == 0 || max_probes == 0 {
            return Err(ResourceError::InvalidLayout {
                table: name,
                reason: "bucket count, bucket size and probe count must be non-zero",
            });
        }
        let slot_count = bucket_count
            .checked_mul(bucket_size)
            .ok_or(ResourceError::InvalidLayout {
                table: name,
                reason: "slot count overflows",
            })?;
        Ok(Self {
            name,
            slots: vec![None; slot_count].into_boxed_slice(),
            bucket_count,
            bucket_size,
            max_probes: max_probes.min(bucket_count),
            len: 0,
        })
    }

    /// Debug name of the table.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Number of entries.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Checks if the table has no entries.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Total number of slots.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Inserts or replaces the value for `key`.
    ///
    /// # Returns
    ///
    /// The previous value, if `key` was present.
    ///
    /// # Errors
    ///
    /// `IndexFull` if `key` is new and every slot in its probe window is
    /// taken.
    pub fn insert(&mut self, key: ConstantString, value: V) -> ResourceResult<Option<V>> {
        if let Some(slot) = self.find(key) {
            let previous = self.slots[slot].replace(Entry { key, value });
            return Ok(previous.map(|entry| entry.value));
        }
        let free = self
            .probe_window(key)
            .find(|&slot| self.slots[slot].is_none())
            .ok_or(ResourceError::IndexFull { table: self.name, name: key })?;
        self.slots[free] = Some(Entry { key, value });
        self.len += 1;
        Ok(None)
    }

    /// Looks up the value for `key`.
    #[must_use]
    pub fn get(&self, key: ConstantString) -> Option<V> {
        self.find(key).and_then(|slot| self.slots[slot]).map(|entry| entry.value)
    }

    /// Looks up the key as stored, which keeps the text it was inserted with.
    #[must_use]
    pub fn get_key(&self, key: ConstantString) -> Option<ConstantString> {
        self.find(key).and_then(|slot| self.slots[slot]).map(|entry| entry.key)
    }

    /// Checks if `key` is present.
    #[must_use]
    pub fn contains_key(&self, key: ConstantString) -> bool {
        self.find(key).is_some()
    }

    /// Removes `key`, returning its value.
    pub fn remove(&mut self, key: ConstantString) -> Option<V> {
        let slot = self.find(key)?;
        let entry = self.slots[slot].take()?;
        self.len -= 1;
        Some(entry.value)
    }

    /// Removes every entry.
    pub fn clear(&mut self) {
        self.slots.fill(None);
        self.len = 0;
    }

    /// Iterates over all entries in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (ConstantString, V)> + '_ {
        self.slots.iter().flatten().map(|entry| (entry.key, entry.value))
    }

    fn find(&self, key: ConstantString) -> Option<usize> {
        self.probe_window(key)
            .find(|&slot| self.slots[slot].is_some_and(|entry| entry.key == key))
    }

    /// Slot indices scanned for `key`, home bucket first.
    fn probe_window(&self, key: ConstantString) -> impl Iterator<Item = usize> {
        let home = (key.hash_value() % self.bucket_count as u64) as usize;
        let (bucket_count, bucket_size) = (self.bucket_count, self.bucket_size);
        (0..self.max_probes).flat_map(move |probe| {
            let start = ((home + probe) % bucket_count) * bucket_size;
            start..start + bucket_size
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Key with a chosen hash, so bucket placement is predictable.
    fn key(hash: u64) -> ConstantString {
        ConstantString::from_hash(hash)
    }

    #[test]
    fn test_insert_get_remove() {
        let mut table = FixedHashTable::new("map.entities", 30, 5, 5).unwrap();
        let player = ConstantString::new("entity.player");

        assert_eq!(table.insert(player, 7u32).unwrap(), None);
        assert_eq!(table.get(player), Some(7));
        assert_eq!(table.len(), 1);

        assert_eq!(table.insert(player, 9).unwrap(), Some(7));
        assert_eq!(table.len(), 1);

        assert_eq!(table.remove(player), Some(9));
        assert_eq!(table.get(player), None);
        assert!(table.is_empty());
    }

    #[test]
    fn test_spills_into_next_bucket() {
        let mut table = FixedHashTable::new("spill", 4, 2, 2).unwrap();
        // All four keys start at bucket 1.
        for (i, hash) in [1u64, 5, 9, 13].into_iter().enumerate() {
            table.insert(key(hash), i).unwrap();
        }
        for (i, hash) in [1u64, 5, 9, 13].into_iter().enumerate() {
            assert_eq!(table.get(key(hash)), Some(i));
        }
    }

    #[test]
    fn test_probe_limit_reports_full() {
        let mut table = FixedHashTable::new("tiny", 4, 1, 2).unwrap();
        table.insert(key(0), 0u8).unwrap();
        table.insert(key(4), 1).unwrap();
        assert!(matches!(
            table.insert(key(8), 2),
            Err(ResourceError::IndexFull { table: "tiny", .. })
        ));
        // Other home buckets still have room.
        table.insert(key(2), 3).unwrap();
    }

    #[test]
    fn test_lookup_after_removal_in_probe_chain() {
        let mut table = FixedHashTable::new("chain", 4, 1, 3).unwrap();
        table.insert(key(0), 'a').unwrap();
        table.insert(key(4), 'b').unwrap();
        table.insert(key(8), 'c').unwrap();
        table.remove(key(4));
        assert_eq!(table.get(key(8)), Some('c'));
        // The freed slot is reused.
        table.insert(key(12), 'd').unwrap();
        assert_eq!(table.get(key(12)), Some('d'));
    }

    #[test]
    fn test_stored_key_keeps_text() {
        let mut table = FixedHashTable::new("names", 8, 2, 2).unwrap();
        table.insert(ConstantString::new("pass.shadow"), ()).unwrap();
        let stored = table.get_key(ConstantString::from_runtime("pass.shadow")).unwrap();
        assert_eq!(stored.text(), Some("pass.shadow"));
    }

    #[test]
    fn test_zero_layout_rejected() {
        assert!(matches!(
            FixedHashTable::<u32>::new("bad", 0, 4, 4),
            Err(ResourceError::InvalidLayout { .. })
        ));
        assert!(matches!(
            FixedHashTable::<u32>::new("huge", usize::MAX, 2, 4),
            Err(ResourceError::InvalidLayout { reason: "slot count overflows", .. })
        ));
    }
}
