//! # Stack Allocator
//!
//! Scoped scratch memory with an explicit LIFO marker stack.
//!
//! Helpers that need temporary arrays push a marker, allocate, and pop back
//! to the marker before returning. Nested helpers nest their markers, so
//! scratch disappears the instant its scope ends without any per-call heap
//! allocation.
//!
//! ```text
//!  push A      alloc 16   push B   alloc 32   pop B      pop A
//!  |           |##        |##      |##|####   |##        |
//!  ^A          ^A         ^A ^B    ^A ^B      ^A
//! ```

use std::marker::PhantomData;
use std::panic::Location;

use bytemuck::Pod;

use crate::error::{AllocSite, MemoryError, MemoryResult};
use crate::memory::storage::ArenaStorage;
use crate::memory::{byte_size_of, check_owner, Alignment, Arena, ArenaId, ArenaKind, BufferView};

/// One allocation made since the outermost live marker.
#[derive(Clone, Copy, Debug)]
struct LiveAllocation {
    offset: u32,
    len: u32,
    serial: u64,
    site: AllocSite,
}

/// Saved state for one pushed marker.
#[derive(Clone, Copy, Debug)]
struct MarkerRecord {
    cursor: usize,
    live_len: usize,
    site: AllocSite,
}

/// Token for a pushed marker.
///
/// Consumed by [`StackAllocator::pop`]. Markers must be popped in the
/// reverse order they were pushed.
#[derive(Debug)]
#[must_use = "a pushed marker must be popped"]
pub struct Marker {
    arena: ArenaId,
    depth: usize,
}

impl Marker {
    /// Position of this marker on the marker stack (1 = outermost).
    #[inline]
    #[must_use]
    pub const fn depth(&self) -> usize {
        self.depth
    }
}

/// Bump allocator with LIFO markers and in-place growth of the top
/// allocation.
///
/// # Thread Safety
///
/// This arena is NOT thread-safe. Scopes must nest within one call stack.
///
/// # Example
///
/// ```rust,ignore
/// let families = stack.scope("queue_families", |stack| {
///     let list = stack.alloc_slice::<QueueFamily>(count, "queue_family_list")?;
///     fill(stack.get_mut(list)?);
///     Ok::<_, MemoryError>(pick_family(stack.get(list)?))
/// })?;
/// ```
pub struct StackAllocator {
    storage: ArenaStorage,
    cursor: usize,
    markers: Vec<MarkerRecord>,
    /// Allocations in address order; serials strictly increase.
    live: Vec<LiveAllocation>,
    next_serial: u64,
    /// Whether `live.last()` may still grow. Cleared by markers and pops.
    top_extendable: bool,
}

impl StackAllocator {
    /// Creates a stack arena with the specified capacity in bytes.
    ///
    /// # Errors
    ///
    /// `InvalidCapacity` if `capacity` is zero or does not fit a `u32`.
    pub fn new(capacity: usize) -> MemoryResult<Self> {
        Ok(Self {
            storage: ArenaStorage::new(ArenaKind::Stack, capacity)?,
            cursor: 0,
            markers: Vec::new(),
            live: Vec::new(),
            next_serial: 0,
            top_extendable: false,
        })
    }

    /// Allocates `byte_size` zeroed bytes at the given alignment.
    ///
    /// The allocation becomes the top allocation and may be grown with
    /// [`StackAllocator::extend_top`] until the next allocation or marker.
    /// A zero-byte request returns the null view but still becomes the
    /// (empty) top allocation.
    ///
    /// # Errors
    ///
    /// `CapacityExhausted` if the request does not fit.
    #[track_caller]
    pub fn allocate(
        &mut self,
        byte_size: usize,
        alignment: Alignment,
        tag: &'static str,
    ) -> MemoryResult<BufferView<u8>> {
        let record = self.bump(byte_size, alignment, AllocSite::here(tag))?;
        Ok(view_of(self.id(), &record, record.len))
    }

    /// Allocates `count` zeroed elements of `T`. A zero-sized `T` gets the
    /// null view, like a zero count.
    ///
    /// # Errors
    ///
    /// `CapacityExhausted` if the request does not fit, `UnsupportedAlignment`
    /// if `T` needs more than 16-byte alignment.
    #[track_caller]
    pub fn alloc_slice<T: Pod>(&mut self, count: u32, tag: &'static str) -> MemoryResult<BufferView<T>> {
        let site = AllocSite::here(tag);
        let alignment = Alignment::of::<T>()?;
        let byte_size = byte_size_of::<T>(count).ok_or_else(|| self.exhausted(site, usize::MAX))?;
        let record = self.bump(byte_size, alignment, site)?;
        Ok(view_of(self.id(), &record, if byte_size == 0 { 0 } else { count }))
    }

    /// Pushes a marker recording the current cursor.
    #[track_caller]
    pub fn push_marker(&mut self, tag: &'static str) -> Marker {
        let site = AllocSite::here(tag);
        self.markers.push(MarkerRecord {
            cursor: self.cursor,
            live_len: self.live.len(),
            site,
        });
        self.top_extendable = false;
        tracing::debug!(arena = %self.id(), depth = self.markers.len(), %site, "stack push");
        Marker {
            arena: self.id(),
            depth: self.markers.len(),
        }
    }

    /// Rewinds to `marker` and removes it from the marker stack.
    ///
    /// # Errors
    ///
    /// `EmptyMarkerStack` if no marker is pushed, `MarkerMismatch` if
    /// `marker` is not the most recent one, `ForeignView` if it belongs to
    /// another arena.
    pub fn pop(&mut self, marker: Marker) -> MemoryResult<()> {
        if marker.arena != self.id() {
            return Err(MemoryError::ForeignView {
                expected: self.id(),
                found: marker.arena,
            });
        }
        if self.markers.is_empty() {
            return Err(MemoryError::EmptyMarkerStack);
        }
        if marker.depth != self.markers.len() {
            return Err(MemoryError::MarkerMismatch {
                expected: self.markers.len(),
                found: marker.depth,
            });
        }
        self.pop_top()
    }

    /// Rewinds to the most recent marker, whatever it is.
    ///
    /// # Errors
    ///
    /// `EmptyMarkerStack` if no marker is pushed.
    pub fn pop_top(&mut self) -> MemoryResult<()> {
        let record = self.markers.pop().ok_or(MemoryError::EmptyMarkerStack)?;
        tracing::debug!(
            arena = %self.id(),
            depth = self.markers.len() + 1,
            released = self.cursor - record.cursor,
            site = %record.site,
            "stack pop"
        );
        self.cursor = record.cursor;
        self.live.truncate(record.live_len);
        self.top_extendable = false;
        Ok(())
    }

    /// Runs `f` inside a pushed marker and pops it afterwards, even if `f`
    /// fails. An error from `f` wins over an error from the pop.
    ///
    /// # Errors
    ///
    /// Whatever `f` returns, or the pop's `MarkerMismatch` if `f` left a
    /// marker of its own pushed.
    #[track_caller]
    pub fn scope<R, E, F>(&mut self, tag: &'static str, f: F) -> Result<R, E>
    where
        E: From<MemoryError>,
        F: FnOnce(&mut Self) -> Result<R, E>,
    {
        let marker = self.push_marker(tag);
        let result = f(self);
        let popped = self.pop(marker);
        let value = result?;
        popped?;
        Ok(value)
    }

    /// Grows the top allocation in place by `extra_bytes`.
    ///
    /// Returns a view of the whole grown allocation, starting at its original
    /// offset.
    ///
    /// # Errors
    ///
    /// `NoTopAllocation` if a marker was pushed or popped since the last
    /// allocation, `CapacityExhausted` if the growth does not fit.
    #[track_caller]
    pub fn extend_top(&mut self, extra_bytes: usize) -> MemoryResult<BufferView<u8>> {
        let id = self.id();
        let capacity = self.capacity();
        let cursor = self.cursor;
        let top = match self.live.last_mut() {
            Some(top) if self.top_extendable => top,
            _ => return Err(MemoryError::NoTopAllocation),
        };
        debug_assert_eq!(top.offset as usize + top.len as usize, cursor);
        if extra_bytes > capacity - cursor {
            return Err(MemoryError::CapacityExhausted {
                arena: ArenaKind::Stack,
                site: AllocSite {
                    tag: top.site.tag,
                    location: Location::caller(),
                },
                requested: extra_bytes,
                used: cursor,
                capacity,
            });
        }
        top.len += extra_bytes as u32;
        let record = *top;
        self.storage.zero(cursor, extra_bytes);
        self.cursor += extra_bytes;
        tracing::trace!(arena = %id, offset = record.offset, len = record.len, "stack extend");
        Ok(view_of(id, &record, record.len))
    }

    /// Grows the top allocation by `extra_count` elements of `T`.
    ///
    /// # Errors
    ///
    /// `TopAllocationLayout` if the top allocation does not hold whole,
    /// aligned `T`s, plus the errors of [`StackAllocator::extend_top`].
    #[track_caller]
    pub fn extend_top_slice<T: Pod>(&mut self, extra_count: u32) -> MemoryResult<BufferView<T>> {
        let elem_size = std::mem::size_of::<T>();
        let align = std::mem::align_of::<T>();
        let top = match self.live.last() {
            Some(top) if self.top_extendable => *top,
            _ => return Err(MemoryError::NoTopAllocation),
        };
        if elem_size == 0 || top.len as usize % elem_size != 0 || top.offset as usize % align != 0 {
            return Err(MemoryError::TopAllocationLayout {
                offset: top.offset,
                len: top.len as usize,
                elem_size,
                align,
            });
        }
        let site = AllocSite::here(top.site.tag);
        let extra = byte_size_of::<T>(extra_count).ok_or_else(|| self.exhausted(site, usize::MAX))?;
        let grown = self.extend_top(extra)?;
        Ok(BufferView::new(
            self.id(),
            top.serial,
            top.offset,
            (grown.byte_len() / elem_size) as u32,
        ))
    }

    /// Opens an append region for `T`: an empty top allocation that grows one
    /// item at a time.
    ///
    /// The region mutably borrows the stack, so nothing else can allocate
    /// until it is finished.
    ///
    /// # Errors
    ///
    /// `UnsupportedAlignment` for over-aligned `T`, `CapacityExhausted` if
    /// even the alignment padding does not fit.
    #[track_caller]
    pub fn begin_append<T: Pod>(&mut self, tag: &'static str) -> MemoryResult<AppendRegion<'_, T>> {
        let alignment = Alignment::of::<T>()?;
        let record = self.bump(0, alignment, AllocSite::here(tag))?;
        Ok(AppendRegion {
            stack: self,
            offset: record.offset,
            serial: record.serial,
            count: 0,
            _marker: PhantomData,
        })
    }

    /// Number of markers currently pushed.
    #[inline]
    #[must_use]
    pub fn depth(&self) -> usize {
        self.markers.len()
    }

    /// Sites of the markers still pushed, outermost first.
    pub fn open_markers(&self) -> impl Iterator<Item = AllocSite> + '_ {
        self.markers.iter().map(|m| m.site)
    }

    fn bump(&mut self, byte_size: usize, alignment: Alignment, site: AllocSite) -> MemoryResult<LiveAllocation> {
        let start = alignment.align_up(self.cursor);
        if start > self.capacity() || byte_size > self.capacity() - start {
            return Err(self.exhausted(site, byte_size));
        }
        let record = LiveAllocation {
            offset: start as u32,
            len: byte_size as u32,
            serial: self.next_serial,
            site,
        };
        self.next_serial += 1;
        self.storage.zero(start, byte_size);
        self.cursor = start + byte_size;
        self.live.push(record);
        self.top_extendable = true;
        tracing::trace!(arena = %self.id(), offset = start, bytes = byte_size, tag = site.tag, "stack alloc");
        Ok(record)
    }

    fn exhausted(&self, site: AllocSite, requested: usize) -> MemoryError {
        MemoryError::CapacityExhausted {
            arena: ArenaKind::Stack,
            site,
            requested,
            used: self.cursor,
            capacity: self.capacity(),
        }
    }

    fn check<T>(&self, view: &BufferView<T>) -> MemoryResult<()> {
        check_owner(self.id(), view)?;
        let live = self
            .live
            .binary_search_by_key(&view.stamp(), |a| a.serial)
            .ok()
            .map(|i| self.live[i])
            .filter(|a| {
                view.offset() >= a.offset && view.end_offset() <= a.offset as usize + a.len as usize
            });
        match live {
            Some(_) => Ok(()),
            None => Err(MemoryError::StaleView {
                arena: ArenaKind::Stack,
                offset: view.offset(),
            }),
        }
    }
}

fn view_of<T>(arena: ArenaId, record: &LiveAllocation, count: u32) -> BufferView<T> {
    if count == 0 {
        return BufferView::null();
    }
    BufferView::new(arena, record.serial, record.offset, count)
}

impl Arena for StackAllocator {
    #[inline]
    fn id(&self) -> ArenaId {
        self.storage.id()
    }

    #[inline]
    fn kind(&self) -> ArenaKind {
        ArenaKind::Stack
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

/// An open, growing array at the top of a [`StackAllocator`].
///
/// Replaces "allocate, then extend the last allocation" with a borrow that
/// makes an intervening allocation a compile error.
pub struct AppendRegion<'a, T: Pod> {
    stack: &'a mut StackAllocator,
    offset: u32,
    serial: u64,
    count: u32,
    _marker: PhantomData<T>,
}

impl<T: Pod> AppendRegion<'_, T> {
    /// Appends one item.
    ///
    /// # Errors
    ///
    /// `CapacityExhausted` if the arena is full.
    #[track_caller]
    pub fn push(&mut self, item: T) -> MemoryResult<()> {
        self.extend_from_slice(std::slice::from_ref(&item))
    }

    /// Appends every item of `items`.
    ///
    /// # Errors
    ///
    /// `CapacityExhausted` if the arena is full.
    #[track_caller]
    pub fn extend_from_slice(&mut self, items: &[T]) -> MemoryResult<()> {
        let bytes: &[u8] = bytemuck::cast_slice(items);
        let start = self.stack.cursor;
        self.stack.extend_top(bytes.len())?;
        self.stack.storage.write(start, bytes);
        self.count += items.len() as u32;
        Ok(())
    }

    /// Number of items appended so far.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.count as usize
    }

    /// Checks if nothing has been appended.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Closes the region and returns a view of everything appended.
    #[must_use]
    pub fn finish(self) -> BufferView<T> {
        if self.count == 0 {
            return BufferView::null();
        }
        BufferView::new(self.stack.id(), self.serial, self.offset, self.count)
    }
}
