//! # Resource Manager
//!
//! Named, handle-addressed storage for heavyweight engine objects: GPU
//! buffers, pipelines, models, fonts.
//!
//! ## Lookup Paths
//!
//! ```text
//! Handle<T> ──────────────────────────────> slots[index]          O(1)
//! name ──> HandleCache ──hit──> Handle<T> ──> slots[index]
//!               │miss
//!               └──> FixedHashTable ──> Handle<T> (cache primed)
//! ```
//!
//! Objects live in a dense array indexed by handle. Removal empties a slot
//! but never compacts, so handles stay stable and are never reused.

use crate::cache::{CacheStats, HandleCache};
use crate::error::{ResourceError, ResourceResult};
use crate::hash_table::FixedHashTable;
use crate::{ConstantString, Handle};

/// Largest name index a table may reserve, in slots.
pub const MAX_INDEX_SLOTS: usize = 1 << 24;

/// Largest handle cache a table may reserve, in slots.
pub const MAX_CACHE_SLOTS: usize = 1 << 20;

/// Sizing of one [`ResourceManager`].
///
/// The name index must hold at least twice `capacity` names, so that a
/// table can always be filled before its probe windows run out.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ManagerLayout {
    /// Maximum number of objects ever registered.
    pub capacity: usize,
    /// Buckets in the name index.
    pub index_buckets: usize,
    /// Slots per name-index bucket.
    pub index_bucket_size: usize,
    /// Buckets probed per name.
    pub index_max_probes: usize,
    /// Handle cache slots (power of two).
    pub cache_slots: usize,
}

impl Default for ManagerLayout {
    fn default() -> Self {
        Self {
            capacity: 256,
            index_buckets: 128,
            index_bucket_size: 4,
            index_max_probes: 8,
            cache_slots: 32,
        }
    }
}

impl ManagerLayout {
    /// Total name-index slots, if the product does not overflow.
    #[inline]
    #[must_use]
    pub fn index_slots(&self) -> Option<usize> {
        self.index_buckets.checked_mul(self.index_bucket_size)
    }

    /// Checks that a table can be built with this layout and can reach its
    /// capacity.
    ///
    /// # Errors
    ///
    /// `InvalidLayout` naming the first violated rule.
    pub fn validate(&self, table: &'static str) -> ResourceResult<()> {
        let invalid = |reason| Err(ResourceError::InvalidLayout { table, reason });
        if self.capacity == 0 || self.capacity >= u32::MAX as usize {
            return invalid("capacity must be non-zero and below u32::MAX");
        }
        if self.index_buckets == 0 || self.index_bucket_size == 0 || self.index_max_probes == 0 {
            return invalid("index buckets, bucket size and probe count must be non-zero");
        }
        match self.index_slots() {
            Some(slots) if slots > MAX_INDEX_SLOTS => {
                return invalid("name index exceeds the maximum slot count");
            }
            Some(slots) if slots / 2 >= self.capacity => {}
            _ => return invalid("name index must hold at least twice the table capacity"),
        }
        if !self.cache_slots.is_power_of_two() || self.cache_slots > MAX_CACHE_SLOTS {
            return invalid("handle cache size must be a power of two within the maximum");
        }
        Ok(())
    }
}

struct Slot<T> {
    name: ConstantString,
    /// `None` once removed.
    value: Option<T>,
}

/// Keyed store mapping names to handles and handles to objects.
///
/// # Example
///
/// ```rust,ignore
/// const FONT_QUADS: ConstantString = ConstantString::new("model.font_quads");
///
/// let mut models: ResourceManager<Model> = ResourceManager::new("models", ManagerLayout::default())?;
/// let handle = models.register(FONT_QUADS)?;
/// models.get_mut(handle)?.index_count = 6;
///
/// // Later, anywhere that only knows the name:
/// let model = models.resolve(FONT_QUADS)?;
/// ```
pub struct ResourceManager<T> {
    name: &'static str,
    slots: Vec<Slot<T>>,
    capacity: usize,
    index: FixedHashTable<Handle<T>>,
    cache: HandleCache,
    live: usize,
}

impl<T> ResourceManager<T> {
    /// Creates an empty table. All storage is reserved upfront.
    ///
    /// # Arguments
    ///
    /// * `name` - Debug name reported in errors and logs
    /// * `layout` - Capacity, name-index and cache sizing
    ///
    /// # Errors
    ///
    /// `InvalidLayout` if [`ManagerLayout::validate`] rejects `layout`.
    pub fn new(name: &'static str, layout: ManagerLayout) -> ResourceResult<Self> {
        layout.validate(name)?;
        Ok(Self {
            name,
            slots: Vec::with_capacity(layout.capacity),
            capacity: layout.capacity,
            index: FixedHashTable::new(
                name,
                layout.index_buckets,
                layout.index_bucket_size,
                layout.index_max_probes,
            )?,
            cache: HandleCache::new(name, layout.cache_slots)?,
            live: 0,
        })
    }

    /// Registers `name` with a default-constructed object.
    ///
    /// Registration is idempotent: a name that is already registered returns
    /// its existing handle and leaves the object untouched.
    ///
    /// # Errors
    ///
    /// `TableFull`, `IndexFull`, or `HashCollision` if a different static
    /// text already owns this hash.
    pub fn register(&mut self, name: ConstantString) -> ResourceResult<Handle<T>>
    where
        T: Default,
    {
        self.insert_with(name, T::default).map(|(handle, _)| handle)
    }

    /// Registers `name` with `value` as the initial object.
    ///
    /// If `name` is already registered the existing handle is returned and
    /// `value` is dropped.
    ///
    /// # Errors
    ///
    /// Same as [`ResourceManager::register`].
    pub fn register_with(&mut self, name: ConstantString, value: T) -> ResourceResult<Handle<T>> {
        let (handle, created) = self.insert_with(name, || value)?;
        if !created {
            tracing::warn!(table = self.name, %name, "re-registration discarded initial data");
        }
        Ok(handle)
    }

    /// Resolves a handle.
    ///
    /// # Errors
    ///
    /// `InvalidHandle` for `Handle::NONE` or a handle this table never
    /// issued, `RemovedHandle` if its object was removed.
    pub fn get(&self, handle: Handle<T>) -> ResourceResult<&T> {
        self.slot(handle)?
            .value
            .as_ref()
            .ok_or(ResourceError::RemovedHandle {
                table: self.name,
                index: handle.index(),
            })
    }

    /// Resolves a handle mutably.
    ///
    /// # Errors
    ///
    /// Same as [`ResourceManager::get`].
    pub fn get_mut(&mut self, handle: Handle<T>) -> ResourceResult<&mut T> {
        let table = self.name;
        let len = self.slots.len();
        self.slots
            .get_mut(handle.index() as usize)
            .ok_or(ResourceError::InvalidHandle {
                table,
                index: handle.index(),
                len,
            })?
            .value
            .as_mut()
            .ok_or(ResourceError::RemovedHandle {
                table,
                index: handle.index(),
            })
    }

    /// Finds the handle registered under `name`.
    ///
    /// Checks the handle cache first; on a miss probes the name index and
    /// primes the cache with the result.
    ///
    /// # Errors
    ///
    /// `UnknownName` if `name` was never registered (or was removed),
    /// `HashCollision` if it shares a hash with a different registered text.
    pub fn get_by_name(&self, name: ConstantString) -> ResourceResult<Handle<T>> {
        if let Some(raw) = self.cache.lookup(name.hash_value()) {
            let handle = Handle::from_raw(raw);
            if let Ok(slot) = self.slot(handle) {
                if slot.value.is_some() && slot.name == name {
                    self.check_same_text(slot.name, name)?;
                    return Ok(handle);
                }
            }
        }

        tracing::debug!(table = self.name, %name, "handle cache miss");
        let handle = self.index.get(name).ok_or(ResourceError::UnknownName {
            table: self.name,
            name,
        })?;
        self.check_same_text(self.slot(handle)?.name, name)?;
        self.cache.insert(name.hash_value(), handle.index());
        Ok(handle)
    }

    /// Finds the object registered under `name`.
    ///
    /// # Errors
    ///
    /// Same as [`ResourceManager::get_by_name`].
    pub fn resolve(&self, name: ConstantString) -> ResourceResult<&T> {
        self.get(self.get_by_name(name)?)
    }

    /// Name the object was registered under.
    ///
    /// # Errors
    ///
    /// `InvalidHandle` for a handle this table never issued.
    pub fn name_of(&self, handle: Handle<T>) -> ResourceResult<ConstantString> {
        self.slot(handle).map(|slot| slot.name)
    }

    /// Removes the object, returning it.
    ///
    /// The handle is never issued again; the name becomes free to register
    /// anew (under a new handle).
    ///
    /// # Errors
    ///
    /// `InvalidHandle` or `RemovedHandle`.
    pub fn remove(&mut self, handle: Handle<T>) -> ResourceResult<T> {
        let table = self.name;
        let len = self.slots.len();
        let slot = self
            .slots
            .get_mut(handle.index() as usize)
            .ok_or(ResourceError::InvalidHandle {
                table,
                index: handle.index(),
                len,
            })?;
        let value = slot.value.take().ok_or(ResourceError::RemovedHandle {
            table,
            index: handle.index(),
        })?;
        let name = slot.name;
        self.index.remove(name);
        self.cache.invalidate(name.hash_value());
        self.live -= 1;
        tracing::trace!(table, %name, index = handle.index(), "removed");
        Ok(value)
    }

    /// Number of live objects.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.live
    }

    /// Checks if there are no live objects.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Maximum number of objects ever registered.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Debug name of the table.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Handle cache hit and miss counts.
    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Iterates over live objects in handle order.
    pub fn iter(&self) -> impl Iterator<Item = (Handle<T>, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.value
                .as_ref()
                .map(|value| (Handle::from_raw(index as u32), value))
        })
    }

    /// Returns `(handle, created)`.
    fn insert_with(
        &mut self,
        name: ConstantString,
        make: impl FnOnce() -> T,
    ) -> ResourceResult<(Handle<T>, bool)> {
        if let Some(existing) = self.index.get(name) {
            self.check_same_text(self.slot(existing)?.name, name)?;
            return Ok((existing, false));
        }
        if self.slots.len() >= self.capacity {
            return Err(ResourceError::TableFull {
                table: self.name,
                capacity: self.capacity,
            });
        }

        let handle = Handle::from_raw(self.slots.len() as u32);
        self.index.insert(name, handle)?;
        self.slots.push(Slot {
            name,
            value: Some(make()),
        });
        self.live += 1;
        self.cache.insert(name.hash_value(), handle.index());
        tracing::trace!(table = self.name, %name, index = handle.index(), "registered");
        Ok((handle, true))
    }

    fn slot(&self, handle: Handle<T>) -> ResourceResult<&Slot<T>> {
        self.slots
            .get(handle.index() as usize)
            .ok_or(ResourceError::InvalidHandle {
                table: self.name,
                index: handle.index(),
                len: self.slots.len(),
            })
    }

    /// Rejects two different static texts that share a hash. Names without
    /// text cannot be checked and are taken as equal.
    fn check_same_text(&self, stored: ConstantString, incoming: ConstantString) -> ResourceResult<()> {
        match (stored.text(), incoming.text()) {
            (Some(existing), Some(new)) if existing != new => Err(ResourceError::HashCollision {
                table: self.name,
                existing,
                incoming: new,
                hash: stored.hash_value(),
            }),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, PartialEq)]
    struct Pipeline {
        layout: u32,
    }

    const SHADOW: ConstantString = ConstantString::new("pipeline.shadow");
    const LIGHTING: ConstantString = ConstantString::new("pipeline.lighting");

    fn pipelines() -> ResourceManager<Pipeline> {
        ResourceManager::new("pipelines", ManagerLayout::default()).unwrap()
    }

    #[test]
    fn test_register_is_idempotent() {
        let mut table = pipelines();
        let first = table.register(SHADOW).unwrap();
        let second = table.register(SHADOW).unwrap();
        assert_eq!(first, second);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_register_with_keeps_first_value() {
        let mut table = pipelines();
        let handle = table.register_with(SHADOW, Pipeline { layout: 1 }).unwrap();
        let again = table.register_with(SHADOW, Pipeline { layout: 2 }).unwrap();
        assert_eq!(handle, again);
        assert_eq!(table.get(handle).unwrap().layout, 1);
    }

    #[test]
    fn test_get_by_name_round_trip() {
        let mut table = pipelines();
        let handle = table.register(LIGHTING).unwrap();
        table.get_mut(handle).unwrap().layout = 42;

        let found = table.get_by_name(LIGHTING).unwrap();
        assert_eq!(found, handle);
        assert_eq!(table.get(found).unwrap().layout, 42);
        assert_eq!(table.resolve(LIGHTING).unwrap(), &Pipeline { layout: 42 });
    }

    #[test]
    fn test_unknown_name_is_an_error() {
        let table = pipelines();
        assert!(matches!(
            table.get_by_name(SHADOW),
            Err(ResourceError::UnknownName { table: "pipelines", .. })
        ));
    }

    #[test]
    fn test_registration_primes_cache() {
        let mut table = pipelines();
        table.register(SHADOW).unwrap();
        table.get_by_name(SHADOW).unwrap();
        table.get_by_name(SHADOW).unwrap();
        assert_eq!(table.cache_stats().hits, 2);
        assert_eq!(table.cache_stats().misses, 0);
    }

    #[test]
    fn test_cache_miss_falls_back_to_index() {
        let layout = ManagerLayout {
            cache_slots: 1,
            ..ManagerLayout::default()
        };
        let mut table: ResourceManager<Pipeline> = ResourceManager::new("pipelines", layout).unwrap();
        let shadow = table.register(SHADOW).unwrap();
        let lighting = table.register(LIGHTING).unwrap();

        // One cache slot: LIGHTING evicted SHADOW.
        assert_eq!(table.get_by_name(SHADOW).unwrap(), shadow);
        assert_eq!(table.get_by_name(LIGHTING).unwrap(), lighting);
        assert_eq!(table.cache_stats().misses, 2);
    }

    #[test]
    fn test_invalid_handles() {
        let mut table = pipelines();
        table.register(SHADOW).unwrap();
        assert!(matches!(
            table.get(Handle::NONE),
            Err(ResourceError::InvalidHandle { .. })
        ));
        assert!(matches!(
            table.get(Handle::from_raw(1)),
            Err(ResourceError::InvalidHandle { index: 1, len: 1, .. })
        ));
    }

    #[test]
    fn test_remove_keeps_handles_stable() {
        let mut table = pipelines();
        let shadow = table.register(SHADOW).unwrap();
        let lighting = table.register_with(LIGHTING, Pipeline { layout: 7 }).unwrap();

        assert_eq!(table.remove(shadow).unwrap(), Pipeline::default());
        assert_eq!(table.len(), 1);
        assert!(matches!(table.get(shadow), Err(ResourceError::RemovedHandle { .. })));
        assert!(matches!(table.get_by_name(SHADOW), Err(ResourceError::UnknownName { .. })));
        assert_eq!(table.get(lighting).unwrap().layout, 7);

        // Re-registration gets a fresh handle.
        let again = table.register(SHADOW).unwrap();
        assert_ne!(again, shadow);
        assert!(matches!(table.remove(shadow), Err(ResourceError::RemovedHandle { .. })));
    }

    #[test]
    fn test_table_full() {
        let layout = ManagerLayout {
            capacity: 1,
            ..ManagerLayout::default()
        };
        let mut table: ResourceManager<Pipeline> = ResourceManager::new("tiny", layout).unwrap();
        table.register(SHADOW).unwrap();
        assert!(matches!(
            table.register(LIGHTING),
            Err(ResourceError::TableFull { capacity: 1, .. })
        ));
    }

    #[test]
    fn test_hash_collision_detected() {
        let mut table = pipelines();
        let existing = table.register(SHADOW).unwrap();
        let forged = ConstantString::forged(SHADOW.hash_value(), "pipeline.other");

        assert!(matches!(
            table.register(forged),
            Err(ResourceError::HashCollision {
                existing: "pipeline.shadow",
                incoming: "pipeline.other",
                ..
            })
        ));
        assert!(matches!(
            table.get_by_name(forged),
            Err(ResourceError::HashCollision { .. })
        ));

        // Names without text cannot be checked and alias the registered one.
        let textless = ConstantString::from_hash(SHADOW.hash_value());
        assert_eq!(table.get_by_name(textless).unwrap(), existing);
    }

    #[test]
    fn test_name_of_and_iter() {
        let mut table = pipelines();
        let shadow = table.register(SHADOW).unwrap();
        let lighting = table.register(LIGHTING).unwrap();
        table.remove(shadow).unwrap();

        assert_eq!(table.name_of(shadow).unwrap(), SHADOW);
        let handles: Vec<_> = table.iter().map(|(h, _)| h).collect();
        assert_eq!(handles, vec![lighting]);
    }

    #[test]
    fn test_default_layout_reaches_capacity() {
        let mut table: ResourceManager<u32> =
            ResourceManager::new("models", ManagerLayout::default()).unwrap();
        for i in 0..table.capacity() {
            let name = format!("model.{i}");
            table.register(ConstantString::from_runtime(&name)).unwrap();
        }
        assert_eq!(table.len(), 256);
        assert!(matches!(
            table.register(ConstantString::from_runtime("model.overflow")),
            Err(ResourceError::TableFull { capacity: 256, .. })
        ));
    }

    #[test]
    fn test_undersized_index_rejected() {
        let exact = ManagerLayout {
            index_buckets: 64,
            ..ManagerLayout::default()
        };
        assert!(matches!(
            ResourceManager::<u32>::new("models", exact),
            Err(ResourceError::InvalidLayout { table: "models", .. })
        ));

        let overflowing = ManagerLayout {
            index_buckets: usize::MAX,
            index_bucket_size: 2,
            ..ManagerLayout::default()
        };
        assert!(overflowing.validate("models").is_err());

        let oversized = ManagerLayout {
            index_buckets: MAX_INDEX_SLOTS,
            ..ManagerLayout::default()
        };
        assert!(oversized.validate("models").is_err());
        assert!(ManagerLayout::default().validate("models").is_ok());
    }
}
