//! # Pool Allocator
//!
//! General-purpose block allocator for data that outlives a frame and has no
//! natural nesting: persistent mesh storage, GPU buffer descriptors, streamed
//! world chunks.
//!
//! ## Policy
//!
//! - Block sizes are rounded up to [`GRANULE`] bytes
//! - Small blocks (up to 256 bytes) are recycled through per-size quick bins:
//!   release pushes, allocate pops, both O(1)
//! - Everything else is best-fit over an address-ordered free map that
//!   coalesces neighbours on release
//! - When best-fit fails the quick bins are flushed into the free map and the
//!   search is retried, so a fully drained pool always serves its whole
//!   capacity again

use std::collections::{BTreeMap, BTreeSet, HashMap};

use bytemuck::Pod;

use crate::error::{AllocSite, MemoryError, MemoryResult};
use crate::memory::storage::ArenaStorage;
use crate::memory::{byte_size_of, check_owner, Alignment, Arena, ArenaId, ArenaKind, BufferView, GRANULE};

/// Number of quick bins; bin `i` holds blocks of `(i + 1) * GRANULE` bytes.
const QUICK_BIN_COUNT: usize = 16;

/// Largest block size served from a quick bin.
const QUICK_BIN_MAX: u32 = (QUICK_BIN_COUNT * GRANULE) as u32;

/// A block handed out and not yet released.
#[derive(Clone, Copy, Debug)]
struct LiveBlock {
    size: u32,
    serial: u64,
}

/// A free-list allocator over one fixed block of memory.
///
/// Blocks can be allocated and released individually in any order. Every
/// view records the serial of the allocation that produced it, so a view
/// kept after its block was released (and possibly handed out again) is
/// rejected instead of aliasing the new owner.
///
/// # Thread Safety
///
/// This pool is NOT thread-safe. Use one pool per thread or wrap in a mutex.
///
/// # Example
///
/// ```rust,ignore
/// let mut pool = PoolAllocator::new(64 * 1024 * 1024)?;
///
/// let vertices = pool.alloc_slice::<[f32; 3]>(4096)?;
/// pool.get_mut(vertices)?.fill([0.0; 3]);
///
/// // Blocks go back individually
/// pool.release(vertices)?;
/// ```
pub struct PoolAllocator {
    /// The backing storage.
    storage: ArenaStorage,
    /// Free extents keyed by offset, value is size.
    free_by_offset: BTreeMap<u32, u32>,
    /// The same extents ordered by (size, offset) for best-fit.
    free_by_size: BTreeSet<(u32, u32)>,
    /// Exact-size recycled small blocks, not present in the free map.
    quick_bins: [Vec<u32>; QUICK_BIN_COUNT],
    /// Live blocks keyed by offset.
    live: HashMap<u32, LiveBlock>,
    /// Bytes held by live blocks.
    used: usize,
    next_serial: u64,
}

impl PoolAllocator {
    /// Creates a new pool with the specified capacity in bytes.
    ///
    /// All memory is reserved upfront.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Total size in bytes, rounded up to a whole granule
    ///
    /// # Errors
    ///
    /// `InvalidCapacity` if `capacity` is zero or does not fit a `u32`.
    pub fn new(capacity: usize) -> MemoryResult<Self> {
        let storage = ArenaStorage::new(ArenaKind::Pool, capacity)?;
        let mut pool = Self {
            free_by_offset: BTreeMap::new(),
            free_by_size: BTreeSet::new(),
            quick_bins: std::array::from_fn(|_| Vec::new()),
            live: HashMap::new(),
            used: 0,
            next_serial: 0,
            storage,
        };
        pool.add_free(0, pool.storage.capacity() as u32);
        Ok(pool)
    }

    /// Allocates a zeroed block of at least `byte_size` bytes.
    ///
    /// A zero-byte request returns the null view and allocates nothing.
    ///
    /// # Errors
    ///
    /// `CapacityExhausted` if no free extent is large enough, even after
    /// coalescing the quick bins.
    #[track_caller]
    pub fn allocate(&mut self, byte_size: usize) -> MemoryResult<BufferView<u8>> {
        let site = AllocSite::here("pool");
        let block = self.take_block(byte_size, site)?;
        Ok(self.view(block, byte_size as u32))
    }

    /// Allocates a zeroed block for `count` elements of `T`.
    ///
    /// # Errors
    ///
    /// `CapacityExhausted` if the request does not fit, `UnsupportedAlignment`
    /// if `T` needs more than 16-byte alignment.
    #[track_caller]
    pub fn alloc_slice<T: Pod>(&mut self, count: u32) -> MemoryResult<BufferView<T>> {
        let site = AllocSite::here(std::any::type_name::<T>());
        Alignment::of::<T>()?;
        let byte_size = byte_size_of::<T>(count).ok_or(MemoryError::CapacityExhausted {
            arena: ArenaKind::Pool,
            site,
            requested: (count as usize).saturating_mul(std::mem::size_of::<T>()),
            used: self.used,
            capacity: self.capacity(),
        })?;
        let block = self.take_block(byte_size, site)?;
        Ok(self.view(block, count))
    }

    /// Returns a block to the pool.
    ///
    /// Releasing the null view is a no-op.
    ///
    /// # Errors
    ///
    /// `ForeignView` if the view came from another arena, `DoubleRelease` if
    /// its block was already released.
    pub fn release<T>(&mut self, view: BufferView<T>) -> MemoryResult<()> {
        if view.is_null() {
            return Ok(());
        }
        check_owner(self.id(), &view)?;
        let offset = view.offset();
        let block = match self.live.get(&offset) {
            Some(block) if block.serial == view.stamp() => *block,
            _ => return Err(MemoryError::DoubleRelease { offset }),
        };
        self.live.remove(&offset);
        self.used -= block.size as usize;
        tracing::trace!(arena = %self.id(), offset, bytes = block.size, "pool release");

        match quick_bin(block.size) {
            Some(bin) => self.quick_bins[bin].push(offset),
            None => self.add_free(offset, block.size),
        }
        Ok(())
    }

    /// Number of blocks currently allocated.
    #[inline]
    #[must_use]
    pub fn live_blocks(&self) -> usize {
        self.live.len()
    }

    /// Bytes not held by live blocks.
    #[inline]
    #[must_use]
    pub fn free_bytes(&self) -> usize {
        self.capacity() - self.used
    }

    /// Largest block that can be served without coalescing the quick bins.
    #[must_use]
    pub fn largest_free_block(&self) -> usize {
        let mapped = self.free_by_size.last().map_or(0, |&(size, _)| size);
        let binned = self
            .quick_bins
            .iter()
            .rposition(|bin| !bin.is_empty())
            .map_or(0, bin_size);
        mapped.max(binned) as usize
    }

    /// Returns `(offset, serial)` of the new block, or `None` for a
    /// zero-byte request.
    fn take_block(&mut self, byte_size: usize, site: AllocSite) -> MemoryResult<Option<(u32, u64)>> {
        if byte_size == 0 {
            return Ok(None);
        }
        if byte_size > self.capacity() {
            return Err(self.exhausted(site, byte_size));
        }
        let size = Alignment::DEFAULT.align_up(byte_size) as u32;

        let recycled = quick_bin(size).and_then(|bin| self.quick_bins[bin].pop());
        let offset = match recycled {
            Some(offset) => offset,
            None => match self.best_fit(size) {
                Some(offset) => offset,
                None => {
                    self.flush_quick_bins();
                    self.best_fit(size)
                        .ok_or_else(|| self.exhausted(site, size as usize))?
                }
            },
        };

        let block = LiveBlock {
            size,
            serial: self.next_serial,
        };
        self.next_serial += 1;
        self.live.insert(offset, block);
        self.used += size as usize;
        self.storage.zero(offset as usize, size as usize);
        tracing::trace!(arena = %self.id(), offset, bytes = size, tag = site.tag, "pool alloc");
        Ok(Some((offset, block.serial)))
    }

    /// Carves `size` bytes out of the smallest free extent that holds them.
    fn best_fit(&mut self, size: u32) -> Option<u32> {
        let (extent, offset) = self.free_by_size.range((size, 0)..).next().copied()?;
        self.free_by_size.remove(&(extent, offset));
        self.free_by_offset.remove(&offset);
        if extent > size {
            self.insert_extent(offset + size, extent - size);
        }
        Some(offset)
    }

    /// Adds a free extent, merging it with free neighbours on both sides.
    fn add_free(&mut self, mut offset: u32, mut size: u32) {
        if let Some((&prev, &prev_size)) = self.free_by_offset.range(..offset).next_back() {
            if prev + prev_size == offset {
                self.remove_extent(prev, prev_size);
                offset = prev;
                size += prev_size;
            }
        }
        if let Some(&next_size) = self.free_by_offset.get(&(offset + size)) {
            self.remove_extent(offset + size, next_size);
            size += next_size;
        }
        self.insert_extent(offset, size);
    }

    fn insert_extent(&mut self, offset: u32, size: u32) {
        self.free_by_offset.insert(offset, size);
        self.free_by_size.insert((size, offset));
    }

    fn remove_extent(&mut self, offset: u32, size: u32) {
        self.free_by_offset.remove(&offset);
        self.free_by_size.remove(&(size, offset));
    }

    fn flush_quick_bins(&mut self) {
        let mut flushed = 0usize;
        for bin in 0..QUICK_BIN_COUNT {
            let size = bin_size(bin);
            while let Some(offset) = self.quick_bins[bin].pop() {
                self.add_free(offset, size);
                flushed += 1;
            }
        }
        if flushed > 0 {
            tracing::debug!(arena = %self.id(), blocks = flushed, "pool quick bins flushed");
        }
    }

    fn exhausted(&self, site: AllocSite, requested: usize) -> MemoryError {
        MemoryError::CapacityExhausted {
            arena: ArenaKind::Pool,
            site,
            requested,
            used: self.used,
            capacity: self.capacity(),
        }
    }

    fn view<T>(&self, block: Option<(u32, u64)>, count: u32) -> BufferView<T> {
        match block {
            Some((offset, serial)) if count > 0 => BufferView::new(self.id(), serial, offset, count),
            _ => BufferView::null(),
        }
    }

    fn check<T>(&self, view: &BufferView<T>) -> MemoryResult<()> {
        check_owner(self.id(), view)?;
        match self.live.get(&view.offset()) {
            Some(block)
                if block.serial == view.stamp()
                    && view.byte_len() <= block.size as usize =>
            {
                Ok(())
            }
            _ => Err(MemoryError::StaleView {
                arena: ArenaKind::Pool,
                offset: view.offset(),
            }),
        }
    }
}

/// Quick bin for an exact (granule-rounded) block size, if it is small.
#[inline]
fn quick_bin(size: u32) -> Option<usize> {
    (size <= QUICK_BIN_MAX).then(|| size as usize / GRANULE - 1)
}

#[inline]
fn bin_size(bin: usize) -> u32 {
    ((bin + 1) * GRANULE) as u32
}

impl Arena for PoolAllocator {
    #[inline]
    fn id(&self) -> ArenaId {
        self.storage.id()
    }

    #[inline]
    fn kind(&self) -> ArenaKind {
        ArenaKind::Pool
    }

    #[inline]
    fn capacity(&self) -> usize {
        self.storage.capacity()
    }

    #[inline]
    fn used(&self) -> usize {
        self.used
    }

    fn get<T: Pod>(&self, view: BufferView<T>) -> MemoryResult<&[T]> {
        if view.is_null() {
            return Ok(&[]);
        }
        self.check(&view)?;
        self.storage.slice(view.offset(), view.count())
    }

    fn get_mut<T: Pod>(&mut self, view: BufferView<T>) -> MemoryResult<&mut [T]> {
        if view.is_null() {
            return Ok(&mut []);
        }
        self.check(&view)?;
        self.storage.slice_mut(view.offset(), view.count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_allocate_release() {
        let mut pool = PoolAllocator::new(1024).unwrap();

        let view = pool.alloc_slice::<u32>(4).unwrap();
        pool.get_mut(view).unwrap().copy_from_slice(&[1, 2, 3, 4]);
        assert_eq!(pool.get(view).unwrap(), &[1, 2, 3, 4]);
        assert_eq!(pool.live_blocks(), 1);
        assert_eq!(pool.used(), 16);

        pool.release(view).unwrap();
        assert_eq!(pool.live_blocks(), 0);
        assert_eq!(pool.used(), 0);
        assert_eq!(pool.free_bytes(), 1024);
    }

    #[test]
    fn test_pool_full() {
        let mut pool = PoolAllocator::new(64).unwrap();

        let _ = pool.allocate(32).unwrap();
        let _ = pool.allocate(32).unwrap();
        assert!(matches!(
            pool.allocate(1),
            Err(MemoryError::CapacityExhausted {
                arena: ArenaKind::Pool,
                requested: 16,
                used: 64,
                ..
            })
        ));
    }

    #[test]
    fn test_pool_reuse() {
        let mut pool = PoolAllocator::new(1024).unwrap();

        let first = pool.allocate(40).unwrap();
        pool.release(first).unwrap();

        let second = pool.allocate(33).unwrap();
        // Same 48-byte size class, recycled from the quick bin.
        assert_eq!(first.offset(), second.offset());
    }

    #[test]
    fn test_coalescing_large_blocks() {
        let mut pool = PoolAllocator::new(1536).unwrap();
        let a = pool.allocate(512).unwrap();
        let b = pool.allocate(512).unwrap();
        let _c = pool.allocate(512).unwrap();

        pool.release(b).unwrap();
        pool.release(a).unwrap();
        assert_eq!(pool.largest_free_block(), 1024);

        let merged = pool.allocate(1024).unwrap();
        assert_eq!(merged.offset(), 0);
    }

    #[test]
    fn test_best_fit_prefers_smallest_extent() {
        let mut pool = PoolAllocator::new(4096).unwrap();
        let big = pool.allocate(1024).unwrap();
        let _guard1 = pool.allocate(16).unwrap();
        let small = pool.allocate(512).unwrap();
        let _guard2 = pool.allocate(16).unwrap();

        pool.release(big).unwrap();
        pool.release(small).unwrap();

        let fit = pool.allocate(300).unwrap();
        assert_eq!(fit.offset(), small.offset());
    }

    #[test]
    fn test_drained_small_blocks_serve_full_capacity() {
        let mut pool = PoolAllocator::new(256).unwrap();
        let blocks: Vec<_> = (0..16).map(|_| pool.allocate(16).unwrap()).collect();
        assert_eq!(pool.free_bytes(), 0);

        for block in blocks {
            pool.release(block).unwrap();
        }

        let whole = pool.allocate(256).unwrap();
        assert_eq!(whole.offset(), 0);
        assert_eq!(whole.count(), 256);
    }

    #[test]
    fn test_double_release() {
        let mut pool = PoolAllocator::new(256).unwrap();
        let view = pool.allocate(64).unwrap();
        pool.release(view).unwrap();
        assert!(matches!(
            pool.release(view),
            Err(MemoryError::DoubleRelease { offset: 0 })
        ));
    }

    #[test]
    fn test_release_after_reuse_is_detected() {
        let mut pool = PoolAllocator::new(256).unwrap();
        let old = pool.allocate(64).unwrap();
        pool.release(old).unwrap();
        let new = pool.allocate(64).unwrap();
        assert_eq!(old.offset(), new.offset());

        assert!(matches!(pool.get(old), Err(MemoryError::StaleView { .. })));
        assert!(matches!(pool.release(old), Err(MemoryError::DoubleRelease { .. })));
        pool.release(new).unwrap();
    }

    #[test]
    fn test_foreign_release() {
        let mut a = PoolAllocator::new(64).unwrap();
        let mut b = PoolAllocator::new(64).unwrap();
        let view = a.allocate(16).unwrap();
        assert!(matches!(b.release(view), Err(MemoryError::ForeignView { .. })));
    }

    #[test]
    fn test_zero_size_is_null() {
        let mut pool = PoolAllocator::new(64).unwrap();
        let view = pool.allocate(0).unwrap();
        assert!(view.is_null());
        assert_eq!(pool.live_blocks(), 0);
        pool.release(view).unwrap();
    }

    #[test]
    fn test_reused_block_is_zeroed() {
        let mut pool = PoolAllocator::new(64).unwrap();
        let view = pool.alloc_slice::<u64>(2).unwrap();
        pool.get_mut(view).unwrap().copy_from_slice(&[u64::MAX, u64::MAX]);
        pool.release(view).unwrap();
        let again = pool.alloc_slice::<u64>(2).unwrap();
        assert_eq!(pool.get(again).unwrap(), &[0, 0]);
    }
}
