//! # Buffer Views
//!
//! A typed, non-owning window into arena memory.
//!
//! A view is an (arena, stamp, offset, count) record rather than a pointer.
//! Resolving it through the arena that produced it yields a slice; the stamp
//! lets the arena reject views whose memory was reset, popped or released.

use std::fmt;
use std::marker::PhantomData;

use crate::memory::ArenaId;

/// A window of `count` elements of `T` inside an arena.
///
/// Views are `Copy` and carry no lifetime: validity is checked when the view
/// is resolved with [`Arena::get`](crate::memory::Arena::get), not when it
/// is created.
///
/// A view is null if and only if its count is zero.
///
/// # Example
///
/// ```rust,ignore
/// let view = linear.alloc_slice::<u32>(4)?;
/// linear.get_mut(view)?.copy_from_slice(&[1, 2, 3, 4]);
/// linear.reset();
/// assert!(linear.get(view).is_err()); // stale after reset
/// ```
pub struct BufferView<T> {
    arena: ArenaId,
    stamp: u64,
    offset: u32,
    count: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> BufferView<T> {
    #[inline]
    pub(crate) const fn new(arena: ArenaId, stamp: u64, offset: u32, count: u32) -> Self {
        Self {
            arena,
            stamp,
            offset,
            count,
            _marker: PhantomData,
        }
    }

    /// The empty view. Resolves to an empty slice in every arena.
    #[inline]
    #[must_use]
    pub const fn null() -> Self {
        Self::new(ArenaId::NONE, 0, 0, 0)
    }

    /// Checks if this is the null view.
    #[inline]
    #[must_use]
    pub const fn is_null(&self) -> bool {
        self.count == 0
    }

    /// Number of elements.
    #[inline]
    #[must_use]
    pub const fn count(&self) -> u32 {
        self.count
    }

    /// Number of elements as `usize`.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.count as usize
    }

    /// Same as [`BufferView::is_null`].
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.is_null()
    }

    /// Byte offset of the first element inside the arena.
    #[inline]
    #[must_use]
    pub const fn offset(&self) -> u32 {
        self.offset
    }

    /// Size of the viewed region in bytes.
    #[inline]
    #[must_use]
    pub const fn byte_len(&self) -> usize {
        self.count as usize * std::mem::size_of::<T>()
    }

    /// Byte offset one past the last element.
    #[inline]
    #[must_use]
    pub const fn end_offset(&self) -> usize {
        self.offset as usize + self.byte_len()
    }

    /// The arena that produced this view.
    #[inline]
    #[must_use]
    pub const fn arena(&self) -> ArenaId {
        self.arena
    }

    #[inline]
    pub(crate) const fn stamp(&self) -> u64 {
        self.stamp
    }

    /// The same region viewed as raw bytes.
    #[inline]
    #[must_use]
    pub fn as_bytes(self) -> BufferView<u8> {
        if self.is_null() {
            return BufferView::null();
        }
        BufferView::new(self.arena, self.stamp, self.offset, self.byte_len() as u32)
    }
}

impl<T> Clone for BufferView<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for BufferView<T> {}

impl<T> PartialEq for BufferView<T> {
    fn eq(&self, other: &Self) -> bool {
        self.arena == other.arena
            && self.stamp == other.stamp
            && self.offset == other.offset
            && self.count == other.count
    }
}

impl<T> Eq for BufferView<T> {}

impl<T> Default for BufferView<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T> fmt::Debug for BufferView<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferView")
            .field("arena", &self.arena)
            .field("offset", &self.offset)
            .field("count", &self.count)
            .field("elem", &std::any::type_name::<T>())
            .finish()
    }
}
