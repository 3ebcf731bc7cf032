//! # Linear Allocator
//!
//! A bump allocator for per-frame scratch that is freed all at once.

use bytemuck::Pod;

use crate::error::{AllocSite, MemoryError, MemoryResult};
use crate::memory::storage::ArenaStorage;
use crate::memory::{byte_size_of, check_owner, Alignment, Arena, ArenaId, ArenaKind, BufferView};

/// A bump-pointer arena allocator.
///
/// Allocations are fast (just bump a cursor). Memory is freed all at once
/// when the arena is reset, which also bumps its generation so that every
/// outstanding view goes stale.
///
/// Every allocation is rounded up to [`Alignment::DEFAULT`]; there is no
/// per-call alignment parameter.
///
/// # Thread Safety
///
/// This arena is NOT thread-safe. The owning frame loop resets it between
/// frames, after all readers of its views are done.
///
/// # Example
///
/// ```rust,ignore
/// let mut linear = LinearAllocator::new(1024 * 1024)?; // 1MB
///
/// // Fast allocations
/// let scratch = linear.alloc_slice::<f32>(1000)?;
///
/// // Reset to free all allocations
/// linear.reset();
/// ```
pub struct LinearAllocator {
    /// The backing storage.
    storage: ArenaStorage,
    /// Current allocation offset.
    cursor: usize,
    /// Bumped on every reset; stamped into views.
    generation: u64,
    /// Largest cursor seen since creation.
    high_water_mark: usize,
}

impl LinearAllocator {
    /// Creates a new arena with the specified capacity in bytes.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Total size in bytes, rounded up to a whole granule
    ///
    /// # Errors
    ///
    /// `InvalidCapacity` if `capacity` is zero or does not fit a `u32`.
    pub fn new(capacity: usize) -> MemoryResult<Self> {
        Ok(Self {
            storage: ArenaStorage::new(ArenaKind::Linear, capacity)?,
            cursor: 0,
            generation: 0,
            high_water_mark: 0,
        })
    }

    /// Allocates `byte_size` bytes.
    ///
    /// The cursor advances by `byte_size` rounded up to the default alignment.
    /// The returned bytes are zeroed. A zero-byte request returns the null
    /// view and leaves the cursor untouched.
    ///
    /// # Errors
    ///
    /// `CapacityExhausted` if the request does not fit.
    #[track_caller]
    pub fn allocate(&mut self, byte_size: usize) -> MemoryResult<BufferView<u8>> {
        let site = AllocSite::here("linear");
        let offset = self.bump(byte_size, site)?;
        Ok(self.view(offset, byte_size as u32))
    }

    /// Allocates `count` zeroed elements of `T`.
    ///
    /// Zero elements, or a zero-sized `T`, give the null view.
    ///
    /// # Arguments
    ///
    /// * `count` - Number of elements
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
            arena: ArenaKind::Linear,
            site,
            requested: (count as usize).saturating_mul(std::mem::size_of::<T>()),
            used: self.cursor,
            capacity: self.capacity(),
        })?;
        let offset = self.bump(byte_size, site)?;
        // Zero-sized elements occupy no bytes and get the null view.
        Ok(self.view(offset, if byte_size == 0 { 0 } else { count }))
    }

    /// Resets the arena, invalidating all previous allocations.
    ///
    /// This is a **zero-cost** operation - no memory is freed or reallocated.
    /// Outstanding views fail to resolve afterwards.
    #[inline]
    pub fn reset(&mut self) {
        tracing::debug!(
            arena = %self.id(),
            used = self.cursor,
            generation = self.generation,
            "linear reset"
        );
        self.cursor = 0;
        self.generation = self.generation.wrapping_add(1);
    }

    /// Number of resets so far.
    #[inline]
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Largest number of bytes ever in use at once.
    #[inline]
    #[must_use]
    pub const fn high_water_mark(&self) -> usize {
        self.high_water_mark
    }

    fn bump(&mut self, byte_size: usize, site: AllocSite) -> MemoryResult<usize> {
        if byte_size == 0 {
            return Ok(self.cursor);
        }
        // Capacity fits a u32, so rounding cannot overflow past this check.
        let rounded = if byte_size > self.capacity() {
            byte_size
        } else {
            Alignment::DEFAULT.align_up(byte_size)
        };
        let new_cursor = self.cursor.saturating_add(rounded);
        if new_cursor > self.capacity() {
            return Err(MemoryError::CapacityExhausted {
                arena: ArenaKind::Linear,
                site,
                requested: rounded,
                used: self.cursor,
                capacity: self.capacity(),
            });
        }
        let offset = self.cursor;
        self.storage.zero(offset, rounded);
        self.cursor = new_cursor;
        self.high_water_mark = self.high_water_mark.max(new_cursor);
        tracing::trace!(arena = %self.id(), offset, bytes = rounded, "linear alloc");
        Ok(offset)
    }

    fn view<T>(&self, offset: usize, count: u32) -> BufferView<T> {
        if count == 0 {
            return BufferView::null();
        }
        BufferView::new(self.id(), self.generation, offset as u32, count)
    }

    fn check<T>(&self, view: &BufferView<T>) -> MemoryResult<()> {
        check_owner(self.id(), view)?;
        if view.stamp() != self.generation || view.end_offset() > self.cursor {
            return Err(MemoryError::StaleView {
                arena: ArenaKind::Linear,
                offset: view.offset(),
            });
        }
        Ok(())
    }
}

impl Arena for LinearAllocator {
    #[inline]
    fn id(&self) -> ArenaId {
        self.storage.id()
    }

    #[inline]
    fn kind(&self) -> ArenaKind {
        ArenaKind::Linear
    }

    #[inline]
    fn capacity(&self) -> usize {
        self.storage.capacity()
    }

    #[inline]
    fn used(&self) -> usize {
        self.cursor
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
